//! cpal-backed capture and playback streams.
//!
//! Both callbacks only convert into pre-allocated storage and publish through
//! the bridge: no locks, no allocation, no logging on the data path. Devices
//! that run in `i16` or `u16` are converted to and from `f32` on the fly.

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SizedSample,
};

use crate::{
    AudioConfig, AudioMode, BeatFrameError, CrossThreadSampleBridge, Result, SampleReader,
    SampleSource, SampleWriter,
};

/// Upper bound on frames per callback when the backend ignores the requested
/// buffer size.
const MAX_CALLBACK_FRAMES: usize = 8192;

/// An open device stream. Dropping it closes the stream and stops the
/// callback.
pub struct DeviceStream {
    stream: cpal::Stream,
    mode: AudioMode,
    device_name: String,
}

impl DeviceStream {
    /// Opens the default input device and publishes every captured block.
    pub fn capture(config: &AudioConfig) -> Result<(Self, SampleReader)> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| BeatFrameError::device("no default input device found"))?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());

        let supported = device
            .default_input_config()
            .map_err(|err| BeatFrameError::device(format!("failed to query input config: {err}")))?;

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let capacity = bridge_capacity(config.frames_per_buffer, channels);
        let (writer, reader) = CrossThreadSampleBridge::new(capacity, channels, sample_rate);

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: buffer_size(config.frames_per_buffer, supported.buffer_size())?,
        };
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_capture::<f32>(&device, &stream_config, writer),
            cpal::SampleFormat::I16 => build_capture::<i16>(&device, &stream_config, writer),
            cpal::SampleFormat::U16 => build_capture::<u16>(&device, &stream_config, writer),
            other => {
                return Err(BeatFrameError::device(format!(
                    "input device `{device_name}` uses unsupported sample format {other}"
                )))
            }
        }?;

        tracing::info!(
            device = %device_name,
            sample_rate,
            channels,
            format = %supported.sample_format(),
            "capture stream opened"
        );

        Ok((
            Self {
                stream,
                mode: AudioMode::Capture,
                device_name,
            },
            reader,
        ))
    }

    /// Opens the default output device and plays `source` through it. Every
    /// block sent to the hardware is echoed into the bridge.
    pub fn playback(
        source: Box<dyn SampleSource>,
        config: &AudioConfig,
    ) -> Result<(Self, SampleReader)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| BeatFrameError::device("no default output device found"))?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());

        let supported = device
            .default_output_config()
            .map_err(|err| BeatFrameError::device(format!("failed to query output config: {err}")))?;

        let channels = source.channels();
        let sample_rate = source.sample_rate();
        let capacity = bridge_capacity(config.frames_per_buffer, channels);
        let (writer, reader) = CrossThreadSampleBridge::new(capacity, channels, sample_rate);

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: buffer_size(config.frames_per_buffer, supported.buffer_size())?,
        };
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                build_playback::<f32>(&device, &stream_config, source, writer)
            }
            cpal::SampleFormat::I16 => {
                build_playback::<i16>(&device, &stream_config, source, writer)
            }
            cpal::SampleFormat::U16 => {
                build_playback::<u16>(&device, &stream_config, source, writer)
            }
            other => {
                return Err(BeatFrameError::device(format!(
                    "output device `{device_name}` uses unsupported sample format {other}"
                )))
            }
        }?;

        tracing::info!(
            device = %device_name,
            sample_rate,
            channels,
            format = %supported.sample_format(),
            "playback stream opened"
        );

        Ok((
            Self {
                stream,
                mode: AudioMode::Playback,
                device_name,
            },
            reader,
        ))
    }

    pub fn mode(&self) -> AudioMode {
        self.mode
    }

    pub fn play(&self) -> Result<()> {
        self.stream
            .play()
            .map_err(|err| BeatFrameError::device(format!("failed to start stream: {err}")))
    }

    pub fn pause(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|err| BeatFrameError::device(format!("failed to stop stream: {err}")))
    }
}

impl std::fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStream")
            .field("mode", &self.mode)
            .field("device_name", &self.device_name)
            .finish()
    }
}

fn build_capture<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut writer: SampleWriter,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut scratch = vec![0.0_f32; writer.capacity()];
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let len = samples_to_f32(data, &mut scratch);
                writer.publish(&scratch[..len]);
            },
            |err| tracing::warn!(%err, "input stream error"),
            None,
        )
        .map_err(|err| BeatFrameError::device(format!("failed to open input stream: {err}")))
}

fn build_playback<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut source: Box<dyn SampleSource>,
    mut writer: SampleWriter,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch = vec![0.0_f32; writer.capacity()];
    let silence = T::EQUILIBRIUM;
    let mut finished = false;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // Callbacks larger than the bridge slot are served in slot-sized chunks.
                for chunk in data.chunks_mut(scratch.len().max(1)) {
                    if finished {
                        chunk.fill(silence);
                        continue;
                    }
                    let pulled = &mut scratch[..chunk.len()];
                    let written = source.fill(pulled);
                    pulled[written..].fill(0.0);
                    f32_to_samples(pulled, chunk);
                    if written < chunk.len() {
                        writer.publish_final(&pulled[..written]);
                        finished = true;
                    } else {
                        writer.publish(pulled);
                    }
                }
            },
            |err| tracing::warn!(%err, "output stream error"),
            None,
        )
        .map_err(|err| BeatFrameError::device(format!("failed to open output stream: {err}")))
}

/// Converts device samples into `out`, returning how many were written.
fn samples_to_f32<T>(input: &[T], out: &mut [f32]) -> usize
where
    T: Sample,
    f32: FromSample<T>,
{
    let len = input.len().min(out.len());
    for (slot, sample) in out.iter_mut().zip(&input[..len]) {
        *slot = sample.to_sample::<f32>();
    }
    len
}

fn f32_to_samples<T>(input: &[f32], out: &mut [T])
where
    T: Sample + FromSample<f32>,
{
    for (slot, sample) in out.iter_mut().zip(input) {
        *slot = sample.to_sample::<T>();
    }
}

/// Requests the configured period when the device supports it, the backend
/// default otherwise.
fn buffer_size(
    frames_per_buffer: usize,
    supported: &cpal::SupportedBufferSize,
) -> Result<cpal::BufferSize> {
    let frames = u32::try_from(frames_per_buffer).map_err(|_| {
        BeatFrameError::config(format!(
            "frames per buffer {frames_per_buffer} does not fit a device period"
        ))
    })?;

    Ok(match supported {
        cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames) => {
            cpal::BufferSize::Fixed(frames)
        }
        _ => cpal::BufferSize::Default,
    })
}

fn bridge_capacity(frames_per_buffer: usize, channels: u16) -> usize {
    frames_per_buffer.max(MAX_CALLBACK_FRAMES) * channels as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_samples_are_normalised() {
        let mut out = [9.0_f32; 4];

        let written = samples_to_f32(&[0_i16, i16::MIN, 16_384, -16_384], &mut out);
        assert_eq!(written, 4);
        assert_eq!(out, [0.0, -1.0, 0.5, -0.5]);

        let written = samples_to_f32(&[32_768_u16, 0, 49_152], &mut out);
        assert_eq!(written, 3);
        assert_eq!(&out[..3], &[0.0, -1.0, 0.5]);
    }

    #[test]
    fn conversion_stops_at_the_scratch_capacity() {
        let mut out = [0.0_f32; 2];
        assert_eq!(samples_to_f32(&[0.25_f32, 0.5, 0.75], &mut out), 2);
        assert_eq!(out, [0.25, 0.5]);
    }

    #[test]
    fn playback_converts_back_to_device_format() {
        let mut out = [1_i16; 3];
        f32_to_samples(&[0.0, -1.0, 0.5], &mut out);
        assert_eq!(out, [0, i16::MIN, 16_384]);

        let mut unsigned = [0_u16; 2];
        f32_to_samples(&[0.0, -1.0], &mut unsigned);
        assert_eq!(unsigned, [32_768, 0]);
    }

    #[test]
    fn buffer_size_falls_back_outside_the_supported_range() {
        let range = cpal::SupportedBufferSize::Range { min: 64, max: 4096 };

        assert_eq!(buffer_size(1024, &range).unwrap(), cpal::BufferSize::Fixed(1024));
        assert_eq!(buffer_size(8192, &range).unwrap(), cpal::BufferSize::Default);
        assert_eq!(
            buffer_size(1024, &cpal::SupportedBufferSize::Unknown).unwrap(),
            cpal::BufferSize::Default
        );
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_period_is_a_configuration_error() {
        let range = cpal::SupportedBufferSize::Unknown;
        let err = buffer_size(u32::MAX as usize + 1, &range).unwrap_err();
        assert!(matches!(err, BeatFrameError::Configuration(_)));
    }
}

mod block;
mod bridge;
#[cfg(feature = "device")]
mod device;
mod driver;
mod source;

pub use block::SampleBlock;
pub use bridge::{CrossThreadSampleBridge, SampleReader, SampleWriter};
#[cfg(feature = "device")]
pub use device::DeviceStream;
pub use driver::SimulatedDevice;
pub use source::{MemorySource, SampleSource, ToneSource};

use crate::{AudioConfig, Result};

/// Mode enum describes how the audio subsystem operates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    /// Samples come from an input device.
    Capture,
    /// Samples come from a [`SampleSource`] and are echoed while played.
    Playback,
}

/// A running stream, whichever driver backs it.
#[derive(Debug)]
pub enum AudioStream {
    Simulated(SimulatedDevice),
    #[cfg(feature = "device")]
    Device(DeviceStream),
}

impl AudioStream {
    pub fn mode(&self) -> AudioMode {
        match self {
            Self::Simulated(_) => AudioMode::Playback,
            #[cfg(feature = "device")]
            Self::Device(stream) => stream.mode(),
        }
    }

    pub fn pause(&self) -> Result<()> {
        match self {
            Self::Simulated(device) => {
                device.pause();
                Ok(())
            }
            #[cfg(feature = "device")]
            Self::Device(stream) => stream.pause(),
        }
    }

    pub fn resume(&self) -> Result<()> {
        match self {
            Self::Simulated(device) => {
                device.resume();
                Ok(())
            }
            #[cfg(feature = "device")]
            Self::Device(stream) => stream.play(),
        }
    }

    /// Only the simulated driver can tell when its source ran dry; device
    /// playback reports the end through the bridge instead.
    pub fn is_finished(&self) -> bool {
        match self {
            Self::Simulated(device) => device.is_finished(),
            #[cfg(feature = "device")]
            Self::Device(_) => false,
        }
    }
}

/// High level audio engine façade that opens streams wired to a fresh bridge.
#[derive(Debug, Clone)]
pub struct AudioEngine {
    config: AudioConfig,
}

impl AudioEngine {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Plays `source` on the simulated device thread.
    pub fn simulate(&self, source: Box<dyn SampleSource>) -> Result<(AudioStream, SampleReader)> {
        let block_len = self.config.frames_per_buffer * source.channels() as usize;
        let (writer, reader) =
            CrossThreadSampleBridge::new(block_len, source.channels(), source.sample_rate());
        let device = SimulatedDevice::spawn(source, writer, self.config.frames_per_buffer)?;
        Ok((AudioStream::Simulated(device), reader))
    }

    /// Plays `source` through the default output device.
    pub fn play(&self, source: Box<dyn SampleSource>) -> Result<(AudioStream, SampleReader)> {
        #[cfg(feature = "device")]
        {
            let (stream, reader) = DeviceStream::playback(source, &self.config)?;
            stream.play()?;
            Ok((AudioStream::Device(stream), reader))
        }
        #[cfg(not(feature = "device"))]
        {
            let _ = source;
            Err(no_device_support())
        }
    }

    /// Captures from the default input device.
    pub fn capture(&self) -> Result<(AudioStream, SampleReader)> {
        #[cfg(feature = "device")]
        {
            let (stream, reader) = DeviceStream::capture(&self.config)?;
            stream.play()?;
            Ok((AudioStream::Device(stream), reader))
        }
        #[cfg(not(feature = "device"))]
        {
            Err(no_device_support())
        }
    }
}

#[cfg(not(feature = "device"))]
fn no_device_support() -> crate::BeatFrameError {
    crate::BeatFrameError::device("built without audio device support (enable the `device` feature)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_stream_reports_playback_mode() {
        let engine = AudioEngine::new(AudioConfig {
            sample_rate: 1_000,
            channels: 1,
            frames_per_buffer: 10,
        });
        let source = MemorySource::new(vec![0.5; 25], 1, 1_000).unwrap();

        let (stream, _reader) = engine.simulate(Box::new(source)).unwrap();

        assert_eq!(stream.mode(), AudioMode::Playback);
        stream.pause().unwrap();
        stream.resume().unwrap();
    }

    #[cfg(not(feature = "device"))]
    #[test]
    fn device_streams_need_the_feature() {
        let engine = AudioEngine::new(AudioConfig::default());

        let err = engine.capture().unwrap_err();
        assert!(matches!(err, crate::BeatFrameError::Device(_)));
    }
}

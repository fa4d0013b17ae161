use std::f32::consts::PI;

use crate::{BeatFrameError, Result, SampleBlock};

/// Pull-based producer of interleaved samples.
///
/// Implementations are driven from the device thread, so `fill` must not
/// allocate or block.
pub trait SampleSource: Send {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Writes up to `out.len()` interleaved samples and returns how many were
    /// written. A short count marks the end of the stream.
    fn fill(&mut self, out: &mut [f32]) -> usize;

    /// Rewinds to the beginning of the stream.
    fn reset(&mut self);

    /// Allocating convenience wrapper around [`SampleSource::fill`] for
    /// callers that are not on the device thread.
    fn read_block(&mut self, max_samples: usize) -> SampleBlock {
        let mut samples = vec![0.0; max_samples];
        let written = self.fill(&mut samples);
        samples.truncate(written);
        SampleBlock::new(samples, self.channels(), self.sample_rate())
    }
}

/// Decoded audio held in memory with a read cursor.
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: Vec<f32>,
    position: usize,
    channels: u16,
    sample_rate: u32,
}

impl MemorySource {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Self> {
        if channels == 0 {
            return Err(BeatFrameError::config("source needs at least one channel"));
        }
        if sample_rate == 0 {
            return Err(BeatFrameError::config("source sample rate must be positive"));
        }

        Ok(Self {
            samples,
            position: 0,
            channels,
            sample_rate,
        })
    }

    /// Interleaved samples not yet delivered.
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }

    pub fn duration_seconds(&self) -> f32 {
        (self.samples.len() / self.channels as usize) as f32 / self.sample_rate as f32
    }
}

impl SampleSource for MemorySource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn fill(&mut self, out: &mut [f32]) -> usize {
        let count = out.len().min(self.remaining());
        out[..count].copy_from_slice(&self.samples[self.position..self.position + count]);
        self.position += count;
        count
    }

    fn reset(&mut self) {
        self.position = 0;
    }
}

/// Finite sine tone, identical on every channel. Handy when no file or input
/// device is available.
#[derive(Debug, Clone)]
pub struct ToneSource {
    frequency: f32,
    amplitude: f32,
    sample_rate: u32,
    channels: u16,
    total_frames: u64,
    frame: u64,
    phase: f32,
}

impl ToneSource {
    pub fn new(
        frequency: f32,
        amplitude: f32,
        seconds: f32,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(BeatFrameError::config(
                "tone needs a positive sample rate and channel count",
            ));
        }
        if !(seconds >= 0.0) || !frequency.is_finite() || !amplitude.is_finite() {
            return Err(BeatFrameError::config("tone parameters must be finite"));
        }

        Ok(Self {
            frequency,
            amplitude,
            sample_rate,
            channels,
            total_frames: (seconds as f64 * sample_rate as f64).round() as u64,
            frame: 0,
            phase: 0.0,
        })
    }

    /// Five seconds of a 440 Hz tone at half scale, stereo 44.1 kHz.
    pub fn test_tone() -> Self {
        Self {
            frequency: 440.0,
            amplitude: 0.5,
            sample_rate: 44_100,
            channels: 2,
            total_frames: 5 * 44_100,
            frame: 0,
            phase: 0.0,
        }
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }
}

impl SampleSource for ToneSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn fill(&mut self, out: &mut [f32]) -> usize {
        let channels = self.channels as usize;
        let available = (self.total_frames - self.frame) as usize;
        let frames = (out.len() / channels).min(available);
        let step = 2.0 * PI * self.frequency / self.sample_rate as f32;

        for frame in out[..frames * channels].chunks_exact_mut(channels) {
            frame.fill(self.amplitude * self.phase.sin());
            // Wrapped so long tones keep f32 precision.
            self.phase = (self.phase + step) % (2.0 * PI);
            self.frame += 1;
        }

        frames * channels
    }

    fn reset(&mut self) {
        self.frame = 0;
        self.phase = 0.0;
    }
}

/// Interleaved floating point samples tagged with their stream format.
///
/// A block is immutable once built: stages hand it on by value and only read
/// from it.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl SampleBlock {
    /// Wraps interleaved samples. A channel count of zero is treated as mono.
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    /// A block carrying no samples, used for starved or finished streams.
    pub fn empty(channels: u16, sample_rate: u32) -> Self {
        Self::new(Vec::new(), channels, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of complete frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Duration covered by the block, zero when the rate is unknown.
    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Averages the channels of each frame into `out`, zero-filling whatever
    /// the block does not cover. Frames beyond `out.len()` are ignored.
    ///
    /// Returns the number of frames written.
    pub fn downmix_into(&self, out: &mut [f32]) -> usize {
        let channels = self.channels as usize;
        let written = self.frames().min(out.len());
        let scale = 1.0 / channels as f32;

        for (slot, frame) in out.iter_mut().zip(self.samples.chunks_exact(channels)) {
            *slot = frame.iter().sum::<f32>() * scale;
        }
        out[written..].fill(0.0);

        written
    }
}

impl Default for SampleBlock {
    fn default() -> Self {
        Self::empty(1, 0)
    }
}

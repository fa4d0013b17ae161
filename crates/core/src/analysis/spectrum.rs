use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{BeatFrameError, Result, SampleBlock, SpectrumConfig};

/// Offset added before taking the logarithm so silent bins stay finite.
const LOG_EPSILON: f32 = 1e-6;

/// Converts one block of samples into a normalised, smoothed magnitude
/// spectrum of `window_size / 2 + 1` bins.
///
/// Every bin lies in `[0, 1]`: bins above DC are mapped from
/// `[floor_db, 0] dB` and low-pass filtered against the previous frame, while
/// the DC bin keeps its raw (clamped) magnitude.
pub struct SpectralAnalyzer {
    window_size: usize,
    smoothing: f32,
    floor_db: f32,
    window: Vec<f32>,
    fft: FftResources,
    magnitudes: Vec<f32>,
}

impl SpectralAnalyzer {
    /// Creates an analyzer with the default smoothing and dB floor.
    pub fn new(window_size: usize) -> Result<Self> {
        Self::with_config(&SpectrumConfig {
            window_size,
            ..SpectrumConfig::default()
        })
    }

    pub fn with_config(config: &SpectrumConfig) -> Result<Self> {
        let window_size = config.window_size;
        if window_size == 0 {
            return Err(BeatFrameError::config("window size must be positive"));
        }
        if !(config.floor_db < 0.0) {
            return Err(BeatFrameError::config("spectrum floor must be negative dB"));
        }

        let fft = FftResources::plan(window_size)?;
        let num_bins = window_size / 2 + 1;
        if fft.spectrum.len() != num_bins {
            return Err(BeatFrameError::config(format!(
                "transform plan produced {} bins, expected {num_bins}",
                fft.spectrum.len()
            )));
        }

        let window = (0..window_size).map(|i| hann_value(i, window_size)).collect();

        tracing::info!(window_size, bins = num_bins, "spectral analyzer ready");

        Ok(Self {
            window_size,
            smoothing: config.smoothing.clamp(0.0, 1.0),
            floor_db: config.floor_db,
            window,
            fft,
            magnitudes: vec![0.0; num_bins],
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn num_bins(&self) -> usize {
        self.magnitudes.len()
    }

    /// Centre frequency of `bin` for a stream at `sample_rate`.
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.window_size as f32
    }

    /// Latest spectrum; unchanged until the next non-empty [`process`] call.
    ///
    /// [`process`]: SpectralAnalyzer::process
    pub fn spectrum(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Analyses the first `window_size` frames of `block`, down-mixed to mono.
    /// An empty block leaves the spectrum untouched.
    pub fn process(&mut self, block: &SampleBlock) -> Result<()> {
        if block.is_empty() {
            return Ok(());
        }

        let fft = &mut self.fft;
        block.downmix_into(&mut fft.input);
        for (sample, weight) in fft.input.iter_mut().zip(&self.window) {
            *sample *= weight;
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let scale = 2.0 / self.window_size as f32;
        let range = -self.floor_db;
        let keep = 1.0 - self.smoothing;

        // DC has no negative-frequency twin: raw magnitude only.
        self.magnitudes[0] = (scale * fft.spectrum[0].norm()).clamp(0.0, 1.0);

        for (slot, bin) in self.magnitudes[1..].iter_mut().zip(&fft.spectrum[1..]) {
            let magnitude = scale * bin.norm();
            let db = 20.0 * (magnitude + LOG_EPSILON).log10();
            let normalised = ((db - self.floor_db) / range).clamp(0.0, 1.0);
            *slot = self.smoothing * normalised + keep * *slot;
        }

        Ok(())
    }

    /// Forgets the smoothing history.
    pub fn reset(&mut self) {
        self.magnitudes.fill(0.0);
    }
}

/// Averages a spectrum into `bands` contiguous groups of bins. Bins that do
/// not divide evenly are spread over the leading bands.
pub fn fold_bands(spectrum: &[f32], bands: usize) -> Vec<f32> {
    if bands == 0 || spectrum.is_empty() {
        return Vec::new();
    }

    let bands = bands.min(spectrum.len());
    let base = spectrum.len() / bands;
    let extra = spectrum.len() % bands;
    let mut folded = Vec::with_capacity(bands);
    let mut start = 0;

    for band in 0..bands {
        let width = base + usize::from(band < extra);
        let slice = &spectrum[start..start + width];
        folded.push(slice.iter().sum::<f32>() / width as f32);
        start += width;
    }

    folded
}

/// Plan plus the buffers it works on, allocated together and released
/// together.
struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl FftResources {
    fn plan(size: usize) -> Result<Self> {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);
        if plan.len() != size {
            return Err(BeatFrameError::config(format!(
                "failed to plan a transform of length {size}"
            )));
        }

        Ok(Self {
            input: plan.make_input_vec(),
            spectrum: plan.make_output_vec(),
            scratch: plan.make_scratch_vec(),
            plan,
        })
    }
}

impl fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("window_size", &self.window_size)
            .field("bins", &self.magnitudes.len())
            .field("smoothing", &self.smoothing)
            .field("floor_db", &self.floor_db)
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

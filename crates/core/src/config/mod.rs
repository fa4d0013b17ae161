use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{BeatFrameError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub spectrum: SpectrumConfig,
    pub onset: OnsetConfig,
    pub visuals: VisualConfig,
}

impl AppConfig {
    pub fn live_defaults() -> Self {
        Self::default()
    }

    /// Reads a JSON configuration file. Missing sections fall back to their
    /// defaults; the result is validated before it is returned.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every knob that would otherwise fail at component construction.
    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.spectrum.validate()?;
        self.onset.validate()?;
        self.visuals.validate()
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames delivered per device period.
    pub frames_per_buffer: usize,
}

impl AudioConfig {
    /// Interleaved samples in one device period; sizes the bridge slots.
    pub fn block_len(&self) -> usize {
        self.frames_per_buffer * self.channels as usize
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(BeatFrameError::config("sample rate must be positive"));
        }
        if self.channels == 0 {
            return Err(BeatFrameError::config("channel count must be positive"));
        }
        if self.frames_per_buffer == 0 {
            return Err(BeatFrameError::config("frames per buffer must be positive"));
        }
        Ok(())
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            frames_per_buffer: 1024,
        }
    }
}

/// Spectral transform settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Transform length. Frequency resolution is `sample_rate / window_size`.
    pub window_size: usize,
    /// Weight of the freshly computed value in the per-bin low-pass filter.
    pub smoothing: f32,
    pub floor_db: f32,
}

impl SpectrumConfig {
    fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(BeatFrameError::config("window size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(BeatFrameError::config("smoothing must lie in [0, 1]"));
        }
        if !(self.floor_db < 0.0) {
            return Err(BeatFrameError::config("spectrum floor must be negative dB"));
        }
        Ok(())
    }
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            window_size: 2048,
            smoothing: 0.8,
            floor_db: -96.0,
        }
    }
}

/// Onset detector tuning. Only `history_len`, `sensitivity` and
/// `cooldown_ticks` are expected to be touched in practice; the rest are the
/// empirically tuned constants of the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// Clamped into [0.05, 0.5] when the detector is initialised.
    pub sensitivity: f32,
    pub cooldown_ticks: u32,
    /// Capacity of the energy history, about one second of ticks.
    pub history_len: usize,
    pub min_history: usize,
    /// Decay constant `k` of the exponential history weights.
    pub decay: f32,
    /// Samples considered by the first-difference energy term.
    pub derivative_window: usize,
    /// Average energy above which the sensitivity is boosted.
    pub dense_mix_level: f32,
    pub dense_mix_boost: f32,
    pub threshold_floor: f32,
    /// Required ratio over the previous history entry.
    pub rise_ratio: f32,
    /// Required ratio over the weighted average.
    pub average_margin: f32,
}

impl OnsetConfig {
    fn validate(&self) -> Result<()> {
        if self.history_len < 2 {
            return Err(BeatFrameError::config("energy history needs at least 2 entries"));
        }
        if self.min_history < 2 || self.min_history > self.history_len {
            return Err(BeatFrameError::config(format!(
                "minimum history must lie in [2, {}], got {}",
                self.history_len, self.min_history
            )));
        }
        if self.derivative_window < 2 {
            return Err(BeatFrameError::config("derivative window needs at least 2 samples"));
        }
        if !self.sensitivity.is_finite() || !self.decay.is_finite() || self.decay < 0.0 {
            return Err(BeatFrameError::config("sensitivity and decay must be finite"));
        }
        Ok(())
    }
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.15,
            cooldown_ticks: 4,
            history_len: 43,
            min_history: 4,
            decay: 0.1,
            derivative_window: 1024,
            dense_mix_level: 0.3,
            dense_mix_boost: 1.5,
            threshold_floor: 0.01,
            rise_ratio: 1.1,
            average_margin: 1.1,
        }
    }
}

/// Settings shared by the built-in visualizers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub width: f32,
    pub height: f32,
    /// Seed for the particle generator; fixed seeds give repeatable output.
    pub seed: u64,
    /// Index of the visualizer selected at start-up.
    pub initial: usize,
    /// Seconds between automatic visualizer switches, `0` disables cycling.
    pub cycle_seconds: f32,
}

impl VisualConfig {
    fn validate(&self) -> Result<()> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(BeatFrameError::config("viewport dimensions must be positive"));
        }
        Ok(())
    }
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
            seed: 0x5eed,
            initial: 0,
            cycle_seconds: 0.0,
        }
    }
}

//! OnsetDetector - energy based beat detection with an adaptive threshold
//!
//! Every tick:
//! 1. energy = 0.5 * RMS(block) + 0.5 * RMS(first difference of a bounded prefix)
//! 2. push energy into a bounded history (about one second of ticks)
//! 3. threshold = recency-weighted mean + sensitivity * std dev, floored
//! 4. fire when energy beats the threshold, rises over the previous tick and
//!    clears the weighted mean by a margin; then stay quiet for a cooldown

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{OnsetConfig, SampleBlock};

pub const MIN_SENSITIVITY: f32 = 0.05;
pub const MAX_SENSITIVITY: f32 = 0.5;

/// Whether a beat may fire on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnsetPhase {
    Armed,
    Cooldown,
}

/// Result of the most recent [`OnsetDetector::analyze`] call.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BeatState {
    pub energy: f32,
    pub threshold: f32,
    pub detected: bool,
    pub cooldown_remaining: u32,
}

impl BeatState {
    pub fn phase(&self) -> OnsetPhase {
        if self.cooldown_remaining > 0 {
            OnsetPhase::Cooldown
        } else {
            OnsetPhase::Armed
        }
    }
}

/// Adaptive onset detector working on raw time-domain blocks.
#[derive(Debug, Clone)]
pub struct OnsetDetector {
    config: OnsetConfig,
    sensitivity: f32,
    history: VecDeque<f32>,
    state: BeatState,
}

impl OnsetDetector {
    pub fn new(config: OnsetConfig) -> Self {
        let mut detector = Self {
            history: VecDeque::with_capacity(config.history_len + 1),
            sensitivity: config.sensitivity,
            state: BeatState::default(),
            config,
        };
        detector.initialize(detector.sensitivity);
        detector
    }

    /// Sets the sensitivity (clamped into [0.05, 0.5]) and forgets all
    /// history, threshold and cooldown state.
    pub fn initialize(&mut self, sensitivity: f32) {
        self.sensitivity = if sensitivity.is_nan() {
            MIN_SENSITIVITY
        } else {
            sensitivity.clamp(MIN_SENSITIVITY, MAX_SENSITIVITY)
        };
        self.history.clear();
        self.state = BeatState::default();

        tracing::debug!(
            sensitivity = self.sensitivity,
            history = self.config.history_len,
            cooldown = self.config.cooldown_ticks,
            "onset detector initialised"
        );
    }

    /// Advances the detector by one tick. Empty blocks are ignored and leave
    /// the previous result in place.
    pub fn analyze(&mut self, block: &SampleBlock) {
        if block.is_empty() {
            return;
        }

        let samples = block.samples();
        let rms = root_mean_square(samples);
        let derivative =
            derivative_rms(samples, block.channels() as usize, self.config.derivative_window);
        let energy = 0.5 * rms + 0.5 * derivative;

        self.history.push_back(energy);
        while self.history.len() > self.config.history_len {
            self.history.pop_front();
        }
        self.state.energy = energy;

        if self.history.len() < self.config.min_history.max(2) {
            self.state.detected = false;
            return;
        }

        let average = self.weighted_average();
        let deviation = self.deviation_around(average);
        let sensitivity = if average > self.config.dense_mix_level {
            self.sensitivity * self.config.dense_mix_boost
        } else {
            self.sensitivity
        };
        self.state.threshold = (average + sensitivity * deviation).max(self.config.threshold_floor);

        if self.state.cooldown_remaining > 0 {
            self.state.cooldown_remaining -= 1;
            self.state.detected = false;
            return;
        }

        let previous = self.history[self.history.len() - 2];
        let above_threshold = energy > self.state.threshold;
        let rising = energy > previous * self.config.rise_ratio;
        let above_average = energy > average * self.config.average_margin;

        self.state.detected = above_threshold && rising && above_average;
        if self.state.detected {
            self.state.cooldown_remaining = self.config.cooldown_ticks;
            tracing::trace!(energy, threshold = self.state.threshold, "onset");
        }
    }

    pub fn is_beat_detected(&self) -> bool {
        self.state.detected
    }

    pub fn energy(&self) -> f32 {
        self.state.energy
    }

    pub fn threshold(&self) -> f32 {
        self.state.threshold
    }

    pub fn state(&self) -> BeatState {
        self.state
    }

    pub fn phase(&self) -> OnsetPhase {
        self.state.phase()
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Mean with weights `exp(k * (i - n + 1))`, so the newest entry weighs 1.
    fn weighted_average(&self) -> f32 {
        let newest = self.history.len() as f32 - 1.0;
        let (sum, weights) = self
            .history
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(sum, weights), (i, energy)| {
                let weight = (self.config.decay * (i as f32 - newest)).exp();
                (sum + weight * energy, weights + weight)
            });
        sum / weights
    }

    fn deviation_around(&self, average: f32) -> f32 {
        let variance = self
            .history
            .iter()
            .map(|energy| (energy - average) * (energy - average))
            .sum::<f32>()
            / self.history.len() as f32;
        variance.sqrt()
    }
}

fn root_mean_square(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

/// RMS of the per-channel first difference over the first `window` samples.
/// Sharp transients score high; smooth swells barely register.
fn derivative_rms(samples: &[f32], channels: usize, window: usize) -> f32 {
    let prefix = &samples[..samples.len().min(window)];
    let channels = channels.max(1);
    if prefix.len() <= channels {
        return 0.0;
    }

    let sum: f32 = prefix
        .iter()
        .zip(&prefix[channels..])
        .map(|(previous, current)| (current - previous) * (current - previous))
        .sum();
    (sum / (prefix.len() - channels) as f32).sqrt()
}

use std::f32::consts::TAU;

use super::{band_mean, bass_level, decay_beat, Color, DrawList, Primitive, Viewport, Visualizer};
use crate::FeatureFrame;

const POINT_COUNT: usize = 100;
const EASE_RATE: f32 = 5.0;
const PHASE_RATE: f32 = 2.0;

const BASE_COLOR: Color = Color::rgb(0.0, 0.8, 0.8);
const BEAT_COLOR: Color = Color::rgb(1.0, 0.4, 0.8);

/// Two layered sines across the screen: bass drives the spatial frequency,
/// mids drive the amplitude.
#[derive(Debug, Clone)]
pub struct WaveVisualizer {
    viewport: Viewport,
    points: Vec<[f32; 2]>,
    phase: f32,
    frequency: f32,
    amplitude: f32,
    beat_intensity: f32,
    thickness: f32,
    color: Color,
}

impl WaveVisualizer {
    pub fn new() -> Self {
        Self {
            viewport: Viewport::new(0.0, 0.0),
            points: vec![[0.0, 0.0]; POINT_COUNT],
            phase: 0.0,
            frequency: 0.5,
            amplitude: 100.0,
            beat_intensity: 0.0,
            thickness: 3.0,
            color: BASE_COLOR,
        }
    }

    pub fn points(&self) -> &[[f32; 2]] {
        &self.points
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    pub fn thickness(&self) -> f32 {
        self.thickness
    }
}

impl Default for WaveVisualizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualizer for WaveVisualizer {
    fn initialize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        let (_, center_y) = viewport.center();
        let step = viewport.width / (POINT_COUNT - 1) as f32;
        for (i, point) in self.points.iter_mut().enumerate() {
            *point = [i as f32 * step, center_y];
        }
    }

    fn update(&mut self, frame: &FeatureFrame) {
        let dt = frame.delta_time;
        self.beat_intensity = decay_beat(self.beat_intensity, frame);

        self.phase += dt * PHASE_RATE;
        if self.phase > TAU {
            self.phase -= TAU;
        }

        let spectrum = &frame.spectrum;
        let bass = bass_level(spectrum);
        let mids = band_mean(spectrum, spectrum.len() / 8, spectrum.len() / 2);

        let target_frequency = 0.5 + bass * 2.0;
        let mut target_amplitude = 50.0 + mids * 150.0;
        if frame.beat {
            target_amplitude *= 1.5;
        }

        let ease = (dt * EASE_RATE).min(1.0);
        self.frequency += (target_frequency - self.frequency) * ease;
        self.amplitude += (target_amplitude - self.amplitude) * ease;

        let (_, center_y) = self.viewport.center();
        let step = self.viewport.width / (POINT_COUNT - 1) as f32;
        for (i, point) in self.points.iter_mut().enumerate() {
            let offset = i as f32;
            let y = center_y
                + (self.phase + offset * 0.1 * self.frequency).sin() * self.amplitude
                + (self.phase * 0.7 + offset * 0.2).sin() * self.amplitude * 0.3;
            *point = [offset * step, y];
        }

        self.color = BASE_COLOR.mix(BEAT_COLOR, self.beat_intensity);
        self.thickness = 3.0 + self.beat_intensity * 3.0;
    }

    fn render(&self, out: &mut DrawList) {
        out.push(Primitive::Polyline {
            points: self.points.clone(),
            thickness: self.thickness,
            color: self.color,
        });
    }

    fn name(&self) -> &'static str {
        "wave"
    }
}

use super::{decay_beat, Color, DrawList, Primitive, Viewport, Visualizer};
use crate::FeatureFrame;

const BAR_COUNT: usize = 64;
const BAR_WIDTH: f32 = 8.0;
const BAR_SPACING: f32 = 2.0;
const EASE_RATE: f32 = 8.0;
const BASS_BOOST: f32 = 1.2;
const TREBLE_BOOST: f32 = 1.1;

const BASE_COLOR: Color = Color::rgb(0.2, 0.6, 1.0);
const BEAT_COLOR: Color = Color::rgb(1.0, 0.2, 0.4);

/// Classic spectrum bars rising from a baseline at 80% of the height.
#[derive(Debug, Clone)]
pub struct BarsVisualizer {
    viewport: Viewport,
    heights: Vec<f32>,
    targets: Vec<f32>,
    colors: Vec<Color>,
    beat_intensity: f32,
}

impl BarsVisualizer {
    pub fn new() -> Self {
        Self {
            viewport: Viewport::new(0.0, 0.0),
            heights: vec![0.0; BAR_COUNT],
            targets: vec![0.0; BAR_COUNT],
            colors: vec![BASE_COLOR; BAR_COUNT],
            beat_intensity: 0.0,
        }
    }

    /// Current bar heights as a fraction of the maximum bar height.
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn beat_intensity(&self) -> f32 {
        self.beat_intensity
    }
}

impl Default for BarsVisualizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualizer for BarsVisualizer {
    fn initialize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.heights.fill(0.0);
        self.targets.fill(0.0);
        self.colors.fill(BASE_COLOR);
    }

    fn update(&mut self, frame: &FeatureFrame) {
        self.beat_intensity = decay_beat(self.beat_intensity, frame);

        let spectrum = &frame.spectrum;
        if spectrum.is_empty() {
            return;
        }

        let step = (spectrum.len() / BAR_COUNT).max(1);
        let ease = (frame.delta_time * EASE_RATE).min(1.0);
        let pulse = 1.0 + self.beat_intensity * 0.5;

        for bar in 0..BAR_COUNT {
            let target = match spectrum.get(bar * step) {
                Some(&level) => {
                    let boosted = if bar < BAR_COUNT / 4 {
                        level * BASS_BOOST
                    } else if bar > BAR_COUNT * 3 / 4 {
                        level * TREBLE_BOOST
                    } else {
                        level
                    };
                    let target = boosted.min(1.0);
                    if frame.beat {
                        target * pulse
                    } else {
                        target
                    }
                }
                None => 0.0,
            };
            self.targets[bar] = target;

            let height = &mut self.heights[bar];
            *height += (target - *height) * ease;

            let mix = self.beat_intensity * 0.6 + *height * 0.4;
            self.colors[bar] = BASE_COLOR.mix(BEAT_COLOR, mix);
        }
    }

    fn render(&self, out: &mut DrawList) {
        let Viewport { width, height } = self.viewport;
        let total_width = BAR_COUNT as f32 * (BAR_WIDTH + BAR_SPACING) - BAR_SPACING;
        let start_x = (width - total_width) * 0.5;
        let baseline = height * 0.8;

        for (bar, (&level, &color)) in self.heights.iter().zip(&self.colors).enumerate() {
            let bar_height = height * 0.6 * level;
            if bar_height <= 1.0 {
                continue;
            }
            out.push(Primitive::Rect {
                x: start_x + bar as f32 * (BAR_WIDTH + BAR_SPACING),
                y: baseline - bar_height,
                width: BAR_WIDTH,
                height: bar_height,
                color,
            });
        }
    }

    fn name(&self) -> &'static str {
        "bars"
    }
}

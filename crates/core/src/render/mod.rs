//! Visualizers turn a [`FeatureFrame`] into backend-agnostic draw commands.
//!
//! A graphics backend only has to rasterise the three [`Primitive`] shapes;
//! everything musical happens here.

mod bars;
mod particles;
mod wave;

pub use bars::BarsVisualizer;
pub use particles::ParticlesVisualizer;
pub use wave::WaveVisualizer;

use serde::{Deserialize, Serialize};

use crate::{BeatFrameError, FeatureFrame, Result, VisualConfig};

/// Straight RGBA colour with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Linear blend of the colour channels; alpha is taken from `self`.
    pub fn mix(self, other: Color, amount: f32) -> Self {
        let keep = 1.0 - amount;
        Self {
            r: self.r * keep + other.r * amount,
            g: self.g * keep + other.g * amount,
            b: self.b * keep + other.b * amount,
            a: self.a,
        }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

/// Drawable area in pixels, origin top-left, y pointing down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width * 0.5, self.height * 0.5)
    }
}

impl From<&VisualConfig> for Viewport {
    fn from(config: &VisualConfig) -> Self {
        Self::new(config.width, config.height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Color,
    },
    Polyline {
        points: Vec<[f32; 2]>,
        thickness: f32,
        color: Color,
    },
    Circle {
        x: f32,
        y: f32,
        radius: f32,
        color: Color,
    },
}

/// Per-shape counts of a [`DrawList`], used for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub rects: usize,
    pub polylines: usize,
    pub circles: usize,
}

/// Ordered draw commands for one rendered frame. The list is reused across
/// frames so steady-state rendering does not reallocate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawList {
    primitives: Vec<Primitive>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.primitives.clear();
    }

    pub fn push(&mut self, primitive: Primitive) {
        self.primitives.push(primitive);
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn stats(&self) -> DrawStats {
        self.primitives
            .iter()
            .fold(DrawStats::default(), |mut stats, primitive| {
                match primitive {
                    Primitive::Rect { .. } => stats.rects += 1,
                    Primitive::Polyline { .. } => stats.polylines += 1,
                    Primitive::Circle { .. } => stats.circles += 1,
                }
                stats
            })
    }
}

/// Interchangeable feature-to-picture mapping.
pub trait Visualizer: Send {
    /// Called whenever the visualizer becomes active or the viewport changes.
    fn initialize(&mut self, viewport: Viewport);

    /// Advances animation state by one tick. The frame is read-only.
    fn update(&mut self, frame: &FeatureFrame);

    /// Appends this tick's draw commands to `out`.
    fn render(&self, out: &mut DrawList);

    fn name(&self) -> &'static str;
}

/// The built-in visualizers, in registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualizerKind {
    Bars,
    Wave,
    Particles,
}

impl VisualizerKind {
    pub const ALL: [VisualizerKind; 3] = [Self::Bars, Self::Wave, Self::Particles];

    pub fn build(self, config: &VisualConfig) -> Box<dyn Visualizer> {
        match self {
            Self::Bars => Box::new(BarsVisualizer::new()),
            Self::Wave => Box::new(WaveVisualizer::new()),
            Self::Particles => Box::new(ParticlesVisualizer::with_seed(config.seed)),
        }
    }
}

/// Holds the visualizers and forwards ticks to the selected one.
pub struct VisualizerRegistry {
    visualizers: Vec<Box<dyn Visualizer>>,
    current: usize,
    viewport: Viewport,
}

impl VisualizerRegistry {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            visualizers: Vec::new(),
            current: 0,
            viewport,
        }
    }

    /// Registry with every [`VisualizerKind`], starting on `config.initial`.
    pub fn with_defaults(config: &VisualConfig) -> Result<Self> {
        let mut registry = Self::new(Viewport::from(config));
        for kind in VisualizerKind::ALL {
            registry.register(kind.build(config));
        }
        registry.select(config.initial)?;
        tracing::info!(
            count = registry.len(),
            current = registry.current_name(),
            "visualizers ready"
        );
        Ok(registry)
    }

    /// Appends a visualizer. The first one registered becomes active.
    pub fn register(&mut self, mut visualizer: Box<dyn Visualizer>) {
        if self.visualizers.is_empty() {
            visualizer.initialize(self.viewport);
        }
        self.visualizers.push(visualizer);
    }

    pub fn len(&self) -> usize {
        self.visualizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visualizers.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_name(&self) -> &'static str {
        self.visualizers
            .get(self.current)
            .map(|visualizer| visualizer.name())
            .unwrap_or("none")
    }

    /// Activates the visualizer at `index`, re-initialising it if it was not
    /// already active.
    pub fn select(&mut self, index: usize) -> Result<()> {
        if index >= self.visualizers.len() {
            return Err(BeatFrameError::msg(format!(
                "no visualizer at index {index} ({} registered)",
                self.visualizers.len()
            )));
        }
        if index != self.current {
            self.visualizers[index].initialize(self.viewport);
            self.current = index;
            tracing::info!(visualizer = self.current_name(), "switched visualizer");
        }
        Ok(())
    }

    /// Cycles to the next visualizer, wrapping around.
    pub fn next(&mut self) -> Result<()> {
        if self.visualizers.is_empty() {
            return Ok(());
        }
        self.select((self.current + 1) % self.visualizers.len())
    }

    pub fn update(&mut self, frame: &FeatureFrame) {
        if let Some(visualizer) = self.visualizers.get_mut(self.current) {
            visualizer.update(frame);
        }
    }

    /// Replaces the contents of `out` with the active visualizer's frame.
    pub fn render(&self, out: &mut DrawList) {
        out.clear();
        if let Some(visualizer) = self.visualizers.get(self.current) {
            visualizer.render(out);
        }
    }
}

impl std::fmt::Debug for VisualizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.visualizers.iter().map(|v| v.name()).collect();
        f.debug_struct("VisualizerRegistry")
            .field("visualizers", &names)
            .field("current", &self.current)
            .field("viewport", &self.viewport)
            .finish()
    }
}

/// Mean of `spectrum[range]`, zero for an empty range.
pub(crate) fn band_mean(spectrum: &[f32], start: usize, end: usize) -> f32 {
    let end = end.min(spectrum.len());
    if start >= end {
        return 0.0;
    }
    spectrum[start..end].iter().sum::<f32>() / (end - start) as f32
}

/// Bass level shared by the wave and particle visualizers: the mean of the
/// lowest `min(8, n / 8)` bins.
pub(crate) fn bass_level(spectrum: &[f32]) -> f32 {
    band_mean(spectrum, 0, (spectrum.len() / 8).min(8))
}

/// Beat flash shared by all visualizers: jumps to 1 on a beat and decays at
/// three units per second.
pub(crate) fn decay_beat(intensity: f32, frame: &FeatureFrame) -> f32 {
    if frame.beat {
        1.0
    } else {
        intensity * (1.0 - frame.delta_time * 3.0).max(0.0)
    }
}

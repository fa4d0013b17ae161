use std::f32::consts::TAU;

use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{band_mean, bass_level, decay_beat, Color, DrawList, Primitive, Viewport, Visualizer};
use crate::FeatureFrame;

const MAX_PARTICLES: usize = 500;
const EMISSION_RATE: f32 = 100.0;
const GRAVITY: f32 = 30.0;
const DRAG: f32 = 0.99;
const BEAT_BURST: usize = 5;

const BASE_COLOR: Color = Color::rgb(0.2, 0.5, 1.0);
const BEAT_COLOR: Color = Color::rgb(1.0, 0.3, 0.7);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub size: f32,
    pub life: f32,
    pub max_life: f32,
    pub color: Color,
}

/// Particles flung outwards from spectrum-dependent points around the centre.
#[derive(Debug, Clone)]
pub struct ParticlesVisualizer {
    viewport: Viewport,
    particles: Vec<Particle>,
    spectrum: Vec<f32>,
    rng: StdRng,
    emission_timer: f32,
    beat_intensity: f32,
    bass: f32,
    treble: f32,
}

impl ParticlesVisualizer {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            viewport: Viewport::new(0.0, 0.0),
            particles: Vec::with_capacity(MAX_PARTICLES),
            spectrum: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            emission_timer: 0.0,
            beat_intensity: 0.0,
            bass: 0.0,
            treble: 0.0,
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    fn step_particles(&mut self, dt: f32) {
        for p in &mut self.particles {
            p.x += p.vx * dt;
            p.y += p.vy * dt;
            p.vy += GRAVITY * dt;
            p.vx *= DRAG;
            p.vy *= DRAG;
            p.life -= dt;
        }
        self.particles.retain(|p| p.life > 0.0);
    }

    /// Picks a spawn point from a random bin: the bin index sets the angle
    /// around the centre, its level the distance.
    fn spawn_point(&mut self) -> (f32, f32) {
        let (cx, cy) = self.viewport.center();
        if self.spectrum.is_empty() {
            return (cx, cy);
        }

        let bins = self.spectrum.len();
        let bin = ((self.rng.gen::<f32>() * bins as f32) as usize).min(bins - 1);
        let angle = bin as f32 / bins as f32 * TAU;
        let distance = self.viewport.height * 0.4 * self.spectrum[bin];
        (cx + angle.cos() * distance, cy + angle.sin() * distance)
    }

    fn spawn(&mut self, count: usize, x: f32, y: f32, energy: f32) {
        let (cx, cy) = self.viewport.center();
        let mix = self.beat_intensity.max(energy.min(1.0) * 0.7);
        let tint = BASE_COLOR.mix(BEAT_COLOR, mix);
        let rng = &mut self.rng;

        for _ in 0..count {
            if self.particles.len() >= MAX_PARTICLES {
                break;
            }

            let px = x + (rng.gen::<f32>() - 0.5) * 10.0;
            let py = y + (rng.gen::<f32>() - 0.5) * 10.0;

            let speed = 50.0 + energy * 100.0;
            let (mut dx, mut dy) = (px - cx, py - cy);
            let length = (dx * dx + dy * dy).sqrt();
            if length > 1e-4 {
                dx /= length;
                dy /= length;
            } else {
                dx = rng.gen::<f32>() * 2.0 - 1.0;
                dy = rng.gen::<f32>() * 2.0 - 1.0;
            }
            let vx = dx * speed * (0.5 + rng.gen::<f32>() * 0.5);
            let vy = dy * speed * (0.5 + rng.gen::<f32>() * 0.5);

            let size = 2.0 + energy * 8.0 * rng.gen::<f32>();
            let max_life = 1.0 + rng.gen::<f32>() * 2.0;

            let color = Color {
                r: (tint.r + tint_offset(rng.gen())).clamp(0.0, 1.0),
                g: (tint.g + tint_offset(rng.gen())).clamp(0.0, 1.0),
                b: (tint.b + tint_offset(rng.gen())).clamp(0.0, 1.0),
                a: 1.0,
            };

            self.particles.push(Particle {
                x: px,
                y: py,
                vx,
                vy,
                size,
                life: max_life,
                max_life,
                color,
            });
        }
    }
}

fn tint_offset(unit: f32) -> f32 {
    (unit - 0.5) * 0.2
}

impl Visualizer for ParticlesVisualizer {
    fn initialize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.particles.clear();
        self.emission_timer = 0.0;
    }

    fn update(&mut self, frame: &FeatureFrame) {
        let dt = frame.delta_time;
        self.beat_intensity = decay_beat(self.beat_intensity, frame);

        if !frame.spectrum.is_empty() {
            self.spectrum.clear();
            self.spectrum.extend_from_slice(&frame.spectrum);
            let bins = frame.spectrum.len();
            self.bass = bass_level(&frame.spectrum);
            self.treble = band_mean(&frame.spectrum, (bins as f32 * 0.75) as usize, bins);
        }

        self.step_particles(dt);

        self.emission_timer += dt;
        let interval = 1.0 / (EMISSION_RATE * (1.0 + self.bass * 2.0));
        let burst = if frame.beat { BEAT_BURST } else { 1 };
        let energy = self.bass + self.treble * 0.5;

        while self.emission_timer >= interval {
            self.emission_timer -= interval;
            let (x, y) = self.spawn_point();
            self.spawn(burst, x, y, energy);
        }
    }

    fn render(&self, out: &mut DrawList) {
        for p in &self.particles {
            out.push(Primitive::Circle {
                x: p.x,
                y: p.y,
                radius: p.size,
                color: p.color.with_alpha(p.color.a * (p.life / p.max_life)),
            });
        }
    }

    fn name(&self) -> &'static str {
        "particles"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::frame;

    fn visualizer(seed: u64) -> ParticlesVisualizer {
        let mut particles = ParticlesVisualizer::with_seed(seed);
        particles.initialize(Viewport::new(800.0, 600.0));
        particles
    }

    #[test]
    fn silence_emits_at_base_rate() {
        let mut particles = visualizer(1);
        particles.update(&frame(vec![0.0; 129], false, 0.1));

        // 100 per second at zero bass; allow for float accumulation.
        let count = particles.particles().len();
        assert!((9..=10).contains(&count), "count {count}");
    }

    #[test]
    fn beats_emit_bursts() {
        let mut quiet = visualizer(2);
        let mut beat = visualizer(2);
        quiet.update(&frame(vec![0.0; 129], false, 0.05));
        beat.update(&frame(vec![0.0; 129], true, 0.05));

        assert_eq!(beat.particles().len(), 5 * quiet.particles().len());
    }

    #[test]
    fn population_is_capped() {
        let mut particles = visualizer(3);
        for _ in 0..20 {
            particles.update(&frame(vec![1.0; 129], true, 0.1));
        }
        assert_eq!(particles.particles().len(), MAX_PARTICLES);
    }

    #[test]
    fn particles_expire() {
        let mut particles = visualizer(4);
        particles.update(&frame(vec![0.5; 129], false, 0.05));
        assert!(!particles.particles().is_empty());

        // Emission never stops; lifetimes top out at three seconds.
        for _ in 0..4 {
            particles.update(&frame(vec![0.5; 129], false, 1.0));
        }
        assert!(particles
            .particles()
            .iter()
            .all(|p| p.max_life - p.life <= 2.0 + 1e-4));
    }

    #[test]
    fn same_seed_same_output() {
        let mut a = visualizer(9);
        let mut b = visualizer(9);
        for step in 0..10 {
            let spectrum = vec![0.1 * (step % 5) as f32; 129];
            a.update(&frame(spectrum.clone(), step % 3 == 0, 0.03));
            b.update(&frame(spectrum, step % 3 == 0, 0.03));
        }
        assert_eq!(a.particles(), b.particles());
    }

    #[test]
    fn render_fades_with_life() {
        let mut particles = visualizer(5);
        particles.update(&frame(vec![0.2; 129], false, 0.05));

        let mut list = DrawList::new();
        particles.render(&mut list);

        assert_eq!(list.len(), particles.particles().len());
        for (primitive, particle) in list.primitives().iter().zip(particles.particles()) {
            match primitive {
                Primitive::Circle { color, .. } => {
                    let expected = particle.life / particle.max_life;
                    assert!((color.a - expected).abs() < 1e-6);
                    assert!(color.a <= 1.0);
                }
                other => panic!("unexpected primitive {other:?}"),
            }
        }
    }

    #[test]
    fn particles_stay_within_colour_range() {
        let mut particles = visualizer(6);
        particles.update(&frame(vec![1.0; 129], true, 0.1));
        for p in particles.particles() {
            for channel in [p.color.r, p.color.g, p.color.b] {
                assert!((0.0..=1.0).contains(&channel));
            }
        }
    }
}

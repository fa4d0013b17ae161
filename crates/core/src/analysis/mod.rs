mod onset;
mod report;
mod spectrum;

pub use onset::{BeatState, OnsetDetector, OnsetPhase, MAX_SENSITIVITY, MIN_SENSITIVITY};
pub use report::{analyze_source, AnalysisReport, FeatureSnapshot};
pub use spectrum::{fold_bands, SpectralAnalyzer};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AppConfig, PlaybackClock, Result, SampleBlock, SampleReader};

const MAX_BEAT_HISTORY: usize = 32;

/// Summary of the analysis metadata accumulated so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisSummary {
    pub sample_rate: u32,
    /// Ticks that carried fresh samples.
    pub ticks: u64,
    pub beats: u64,
    pub tempo_bpm: Option<f32>,
    pub duration_seconds: Option<f32>,
}

/// Everything a renderer needs for one tick. Renderers only read it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    /// Index of the tick that produced the samples.
    pub tick: u64,
    /// Clock time at the end of the tick, in seconds.
    pub time: f32,
    pub delta_time: f32,
    pub samples: SampleBlock,
    pub spectrum: Vec<f32>,
    pub beat: bool,
    pub energy: f32,
    pub threshold: f32,
    /// Set when no new samples arrived and the frame repeats older data.
    pub stale: bool,
}

impl FeatureFrame {
    fn silent(bins: usize) -> Self {
        Self {
            tick: 0,
            time: 0.0,
            delta_time: 0.0,
            samples: SampleBlock::default(),
            spectrum: vec![0.0; bins],
            beat: false,
            energy: 0.0,
            threshold: 0.0,
            stale: true,
        }
    }
}

/// Single-threaded feature extraction: spectrum, onsets and a rough tempo
/// estimate, one sample block per tick.
pub struct AnalysisEngine {
    analyzer: SpectralAnalyzer,
    detector: OnsetDetector,
    clock: PlaybackClock,
    summary: AnalysisSummary,
    beat_timestamps: Vec<f32>,
    frame: FeatureFrame,
}

impl AnalysisEngine {
    pub fn new(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let analyzer = SpectralAnalyzer::with_config(&config.spectrum)?;
        let detector = OnsetDetector::new(config.onset.clone());
        let frame = FeatureFrame::silent(analyzer.num_bins());

        Ok(Self {
            analyzer,
            detector,
            clock: PlaybackClock::default(),
            summary: AnalysisSummary {
                sample_rate: config.audio.sample_rate,
                ..Default::default()
            },
            beat_timestamps: Vec::with_capacity(MAX_BEAT_HISTORY + 1),
            frame,
        })
    }

    pub fn analyzer(&self) -> &SpectralAnalyzer {
        &self.analyzer
    }

    pub fn detector(&self) -> &OnsetDetector {
        &self.detector
    }

    /// Returns metadata collected so far about the analysed stream.
    pub fn summary(&self) -> &AnalysisSummary {
        &self.summary
    }

    pub fn frame(&self) -> &FeatureFrame {
        &self.frame
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    /// Clears the accumulated state while preserving configuration.
    pub fn reset(&mut self) {
        self.analyzer.reset();
        self.detector.initialize(self.detector.sensitivity());
        self.clock.reset();
        self.summary = AnalysisSummary {
            sample_rate: self.summary.sample_rate,
            ..Default::default()
        };
        self.beat_timestamps.clear();
        self.frame = FeatureFrame::silent(self.analyzer.num_bins());
    }

    /// Runs one tick over `block`. Empty blocks degrade to [`hold`].
    ///
    /// [`hold`]: AnalysisEngine::hold
    pub fn process_block(&mut self, block: SampleBlock, delta_time: f32) -> Result<&FeatureFrame> {
        if block.is_empty() {
            return Ok(self.hold(delta_time));
        }

        self.analyzer.process(&block)?;
        self.detector.analyze(&block);
        self.clock.advance(delta_time);

        let time = self.clock.time_seconds;
        let beat = self.detector.is_beat_detected();
        if beat {
            self.record_beat(time);
        }

        self.summary.ticks += 1;
        self.summary.sample_rate = block.sample_rate();
        self.summary.duration_seconds = Some(time);

        let state = self.detector.state();
        let frame = &mut self.frame;
        frame.tick = self.summary.ticks;
        frame.time = time;
        frame.delta_time = delta_time;
        frame.spectrum.copy_from_slice(self.analyzer.spectrum());
        frame.samples = block;
        frame.beat = beat;
        frame.energy = state.energy;
        frame.threshold = state.threshold;
        frame.stale = false;

        Ok(&self.frame)
    }

    /// A tick without new samples: the previous features are held, but the
    /// beat flag is cleared so one onset is never shown twice.
    pub fn hold(&mut self, delta_time: f32) -> &FeatureFrame {
        self.clock.advance(delta_time);
        let frame = &mut self.frame;
        frame.time = self.clock.time_seconds;
        frame.delta_time = delta_time;
        frame.beat = false;
        frame.stale = true;
        &self.frame
    }

    fn record_beat(&mut self, timestamp: f32) {
        self.summary.beats += 1;
        self.beat_timestamps.push(timestamp);
        if self.beat_timestamps.len() > MAX_BEAT_HISTORY {
            let overflow = self.beat_timestamps.len() - MAX_BEAT_HISTORY;
            self.beat_timestamps.drain(0..overflow);
        }
        self.update_tempo_estimate();
    }

    fn update_tempo_estimate(&mut self) {
        if self.beat_timestamps.len() < 2 {
            return;
        }

        let mut sum = 0.0;
        let mut count = 0;
        for window in self.beat_timestamps.windows(2) {
            let interval = window[1] - window[0];
            if interval > f32::EPSILON {
                sum += interval;
                count += 1;
            }
        }

        if count > 0 {
            let average_interval = sum / count as f32;
            if average_interval > 0.0 {
                self.summary.tempo_bpm = Some(60.0 / average_interval);
            }
        }
    }
}

impl fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisEngine")
            .field("analyzer", &self.analyzer)
            .field("beat_state", &self.detector.state())
            .field("summary", &self.summary)
            .field("beat_timestamps", &self.beat_timestamps.len())
            .finish()
    }
}

/// Consumer side of the live pipeline: pulls the freshest block from the
/// bridge on every render tick and runs it through the [`AnalysisEngine`].
#[derive(Debug)]
pub struct FeaturePipeline {
    reader: SampleReader,
    engine: AnalysisEngine,
}

impl FeaturePipeline {
    pub fn new(reader: SampleReader, config: &AppConfig) -> Result<Self> {
        Ok(Self {
            reader,
            engine: AnalysisEngine::new(config)?,
        })
    }

    /// Advances by one render tick. When the device has published nothing
    /// since the last tick the previous frame is held.
    pub fn tick(&mut self, delta_time: f32) -> Result<&FeatureFrame> {
        match self.reader.consume_fresh() {
            Some(block) => self.engine.process_block(block, delta_time),
            None => Ok(self.engine.hold(delta_time)),
        }
    }

    pub fn frame(&self) -> &FeatureFrame {
        self.engine.frame()
    }

    pub fn summary(&self) -> &AnalysisSummary {
        self.engine.summary()
    }

    pub fn engine(&self) -> &AnalysisEngine {
        &self.engine
    }

    /// True once a finite stream delivered its final block.
    pub fn is_drained(&self) -> bool {
        self.reader.is_drained()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CrossThreadSampleBridge;

    fn config(sample_rate: u32) -> AppConfig {
        let mut config = AppConfig::default();
        config.audio.sample_rate = sample_rate;
        config.audio.channels = 1;
        config.spectrum.window_size = 256;
        config
    }

    fn block(value: f32, len: usize, sample_rate: u32) -> SampleBlock {
        let samples = (0..len)
            .map(|i| if i % 2 == 0 { value } else { -value })
            .collect();
        SampleBlock::new(samples, 1, sample_rate)
    }

    #[test]
    fn computes_basic_features() {
        let mut engine = AnalysisEngine::new(&config(48_000)).unwrap();
        let frame = engine.process_block(block(0.0, 1024, 48_000), 0.02).unwrap();

        assert_eq!(frame.energy, 0.0);
        assert!(!frame.beat);
        assert!(!frame.stale);
        assert_eq!(frame.spectrum.len(), 129);
        assert!(frame.spectrum.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn empty_block_holds_previous_frame() {
        let mut engine = AnalysisEngine::new(&config(100)).unwrap();
        for _ in 0..4 {
            engine.process_block(block(0.0, 64, 100), 0.1).unwrap();
        }
        let fired = engine.process_block(block(0.8, 64, 100), 0.1).unwrap().clone();
        assert!(fired.beat);

        let held = engine.process_block(SampleBlock::empty(1, 100), 0.1).unwrap();

        assert!(held.stale);
        assert!(!held.beat);
        assert_eq!(held.spectrum, fired.spectrum);
        assert_eq!(held.samples, fired.samples);
        assert_eq!(held.tick, fired.tick);
        assert!(held.time > fired.time);
    }

    #[test]
    fn updates_duration_and_tempo() {
        let mut engine = AnalysisEngine::new(&config(100)).unwrap();

        // One spike every 25 ticks of 20 ms: a beat every half second.
        for tick in 0..200 {
            let value = if tick >= 10 && (tick - 10) % 25 == 0 { 0.8 } else { 0.0 };
            engine.process_block(block(value, 64, 100), 0.02).unwrap();
        }

        let summary = engine.summary();
        assert_eq!(summary.ticks, 200);
        assert!(summary.beats >= 7);
        assert!(summary.duration_seconds.unwrap() > 3.9);
        let tempo = summary.tempo_bpm.expect("tempo should be detected");
        assert!((tempo - 120.0).abs() < 2.0, "tempo {tempo}");
    }

    #[test]
    fn reset_clears_progress() {
        let mut engine = AnalysisEngine::new(&config(100)).unwrap();
        for _ in 0..10 {
            engine.process_block(block(0.3, 64, 100), 0.1).unwrap();
        }

        engine.reset();

        assert_eq!(engine.summary().ticks, 0);
        assert_eq!(engine.detector().history_len(), 0);
        assert_eq!(engine.clock().time_seconds, 0.0);
        assert!(engine.frame().stale);
    }

    #[test]
    fn rejects_invalid_configuration() {
        let mut config = config(100);
        config.spectrum.window_size = 0;

        assert!(AnalysisEngine::new(&config).is_err());
    }

    #[test]
    fn pipeline_holds_frame_when_starved() {
        let (mut writer, reader) = CrossThreadSampleBridge::new(64, 1, 100);
        let mut pipeline = FeaturePipeline::new(reader, &config(100)).unwrap();

        assert!(pipeline.tick(0.016).unwrap().stale);

        writer.publish(block(0.5, 64, 100).samples());
        let fresh = pipeline.tick(0.016).unwrap().clone();
        assert!(!fresh.stale);
        assert_eq!(fresh.samples.len(), 64);

        let starved = pipeline.tick(0.016).unwrap();
        assert!(starved.stale);
        assert_eq!(starved.spectrum, fresh.spectrum);
        assert_eq!(pipeline.summary().ticks, 1);
    }

    #[test]
    fn pipeline_reports_drained_stream() {
        let (mut writer, reader) = CrossThreadSampleBridge::new(64, 1, 100);
        let mut pipeline = FeaturePipeline::new(reader, &config(100)).unwrap();

        writer.publish_final(&[0.25; 10]);
        pipeline.tick(0.016).unwrap();

        assert!(pipeline.is_drained());
        assert!(pipeline.tick(0.016).unwrap().stale);
    }
}

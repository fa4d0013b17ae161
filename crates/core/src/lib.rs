//! Core library for the Beatframe audio visualiser.
//!
//! Samples flow from an audio device thread through a lock-free
//! [`CrossThreadSampleBridge`] to the consumer thread, where the
//! [`SpectralAnalyzer`] and [`OnsetDetector`] turn each block into a
//! [`FeatureFrame`]. Visualizers in [`render`] map those frames to draw
//! commands for whatever graphics backend hosts them.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod render;
pub mod timeline;

pub use analysis::{
    analyze_source, fold_bands, AnalysisEngine, AnalysisReport, AnalysisSummary, BeatState,
    FeatureFrame, FeaturePipeline, FeatureSnapshot, OnsetDetector, OnsetPhase, SpectralAnalyzer,
};
pub use audio::{
    AudioEngine, AudioMode, AudioStream, CrossThreadSampleBridge, MemorySource, SampleBlock,
    SampleReader, SampleSource, SampleWriter, SimulatedDevice, ToneSource,
};
#[cfg(feature = "device")]
pub use audio::DeviceStream;
pub use config::{AppConfig, AudioConfig, OnsetConfig, SpectrumConfig, VisualConfig};
pub use error::{BeatFrameError, Result};
pub use render::{
    Color, DrawList, DrawStats, Primitive, Viewport, Visualizer, VisualizerKind,
    VisualizerRegistry,
};
pub use timeline::{IntervalTimer, PlaybackClock};

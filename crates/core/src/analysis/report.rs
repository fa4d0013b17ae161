use serde::{Deserialize, Serialize};

use super::{fold_bands, AnalysisEngine, AnalysisSummary};
use crate::{AppConfig, Result, SampleSource};

/// Features of one analysed block, reduced for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub time: f32,
    pub energy: f32,
    pub threshold: f32,
    pub beat: bool,
    pub bands: Vec<f32>,
}

/// Offline analysis result, serialised as JSON by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub summary: AnalysisSummary,
    pub frames: Vec<FeatureSnapshot>,
}

impl AnalysisReport {
    pub fn beat_times(&self) -> impl Iterator<Item = f32> + '_ {
        self.frames
            .iter()
            .filter(|frame| frame.beat)
            .map(|frame| frame.time)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs the whole of `source` through a fresh [`AnalysisEngine`] as fast as
/// possible, one period of `frames_per_buffer` frames per tick. Each spectrum
/// is folded into `bands` averages.
pub fn analyze_source(
    source: &mut dyn SampleSource,
    config: &AppConfig,
    bands: usize,
) -> Result<AnalysisReport> {
    let mut engine = AnalysisEngine::new(config)?;
    let block_len = config.audio.frames_per_buffer * source.channels() as usize;
    let mut frames = Vec::new();

    loop {
        let block = source.read_block(block_len);
        if block.is_empty() {
            break;
        }
        let delta_time = block.duration_seconds();
        let short = block.len() < block_len;

        let frame = engine.process_block(block, delta_time)?;
        frames.push(FeatureSnapshot {
            time: frame.time,
            energy: frame.energy,
            threshold: frame.threshold,
            beat: frame.beat,
            bands: fold_bands(&frame.spectrum, bands),
        });

        if short {
            break;
        }
    }

    let summary = engine.summary().clone();
    tracing::info!(
        ticks = summary.ticks,
        beats = summary.beats,
        tempo = ?summary.tempo_bpm,
        "offline analysis finished"
    );

    Ok(AnalysisReport { summary, frames })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemorySource, ToneSource};

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.audio.sample_rate = 8_000;
        config.audio.channels = 1;
        config.audio.frames_per_buffer = 200;
        config.spectrum.window_size = 256;
        config
    }

    #[test]
    fn steady_tone_produces_no_beats() {
        let mut source = ToneSource::new(440.0, 0.5, 2.0, 8_000, 1).unwrap();

        let report = analyze_source(&mut source, &config(), 16).unwrap();

        assert_eq!(report.frames.len(), 80);
        assert_eq!(report.summary.beats, 0);
        assert!(report.frames.iter().all(|frame| frame.bands.len() == 16));
        let duration = report.summary.duration_seconds.unwrap();
        assert!((duration - 2.0).abs() < 1e-3, "duration {duration}");
    }

    #[test]
    fn clicks_are_reported_as_beats() {
        // 200 frames of silence per tick, a burst every 20 ticks.
        let mut samples = vec![0.0; 8_000 * 2];
        for tick in (10..80).step_by(20) {
            let start = tick * 200;
            for (offset, sample) in samples[start..start + 200].iter_mut().enumerate() {
                *sample = if offset % 2 == 0 { 0.8 } else { -0.8 };
            }
        }
        let mut source = MemorySource::new(samples, 1, 8_000).unwrap();

        let report = analyze_source(&mut source, &config(), 4).unwrap();

        let beats: Vec<f32> = report.beat_times().collect();
        assert_eq!(beats.len(), 4);
        assert!((beats[0] - 11.0 * 0.025).abs() < 1e-4);
        let tempo = report.summary.tempo_bpm.unwrap();
        assert!((tempo - 120.0).abs() < 1.0, "tempo {tempo}");
    }

    #[test]
    fn report_serialises_to_json() {
        let mut source = MemorySource::new(vec![0.1; 500], 1, 8_000).unwrap();

        let report = analyze_source(&mut source, &config(), 2).unwrap();
        let json = report.to_json_pretty().unwrap();
        let parsed: AnalysisReport = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.frames.len(), 3);
        assert_eq!(parsed.summary.ticks, report.summary.ticks);
        assert!(json.contains("\"tempo_bpm\": null"));
    }
}

//! End-to-end tests for the device thread to feature frame pipeline.

use std::{
    thread,
    time::{Duration, Instant},
};

use beatframe_core::{
    AnalysisEngine, AppConfig, AudioConfig, AudioEngine, CrossThreadSampleBridge, DrawList,
    FeaturePipeline, MemorySource, SampleBlock, SampleSource, ToneSource, VisualizerRegistry,
};

fn config(sample_rate: u32, frames_per_buffer: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.audio = AudioConfig {
        sample_rate,
        channels: 1,
        frames_per_buffer,
    };
    config.spectrum.window_size = 256;
    config
}

/// Silence with a loud alternating burst on every `every`-th block.
fn click_track(blocks: usize, block_len: usize, every: usize) -> Vec<f32> {
    let mut samples = vec![0.0; blocks * block_len];
    for block in (every..blocks).step_by(every) {
        for (offset, sample) in samples[block * block_len..(block + 1) * block_len]
            .iter_mut()
            .enumerate()
        {
            *sample = if offset % 2 == 0 { 0.8 } else { -0.8 };
        }
    }
    samples
}

/// Concurrent publishes never produce a torn block: every block the reader
/// sees was written in one piece.
#[test]
fn bridge_never_tears_blocks() {
    const BLOCKS: usize = 20_000;
    let (mut writer, mut reader) = CrossThreadSampleBridge::new(256, 2, 48_000);

    let producer = thread::spawn(move || {
        let mut block = vec![0.0_f32; 256];
        for index in 1..=BLOCKS {
            block.fill(index as f32);
            writer.publish(&block);
        }
        writer.publish_final(&[]);
    });

    let mut last_value = 0.0;
    let mut blocks_seen = 0;
    let started = Instant::now();
    while !reader.is_drained() && started.elapsed() < Duration::from_secs(10) {
        if let Some(block) = reader.consume_fresh() {
            if block.is_empty() {
                continue;
            }
            let first = block.samples()[0];
            assert_eq!(block.len(), 256);
            assert!(block.samples().iter().all(|sample| *sample == first));
            assert!(first > last_value, "blocks went backwards");
            last_value = first;
            blocks_seen += 1;
        }
    }

    producer.join().unwrap();
    assert!(reader.is_drained());
    assert!(blocks_seen > 0);
    assert!(blocks_seen <= BLOCKS);
}

/// A simulated device feeding the live pipeline: beats arrive, the stream
/// drains, and no block is analysed twice.
#[test]
fn simulated_device_drives_feature_pipeline() {
    let config = config(4_000, 100);
    let samples = click_track(40, 100, 10);
    let source = MemorySource::new(samples, 1, 4_000).unwrap();

    let engine = AudioEngine::new(config.audio.clone());
    let (stream, reader) = engine.simulate(Box::new(source)).unwrap();
    let mut pipeline = FeaturePipeline::new(reader, &config).unwrap();

    let mut beats = 0;
    let started = Instant::now();
    while !pipeline.is_drained() && started.elapsed() < Duration::from_secs(10) {
        thread::sleep(Duration::from_millis(2));
        if pipeline.tick(0.002).unwrap().beat {
            beats += 1;
        }
    }

    assert!(pipeline.is_drained());
    // The device flags completion just after publishing its final block.
    while !stream.is_finished() && started.elapsed() < Duration::from_secs(10) {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(stream.is_finished());
    assert!(beats >= 1, "no beats detected");
    assert_eq!(pipeline.summary().beats, beats);
    assert!(pipeline.summary().ticks <= 41);
}

/// The built-in test tone lands in the bin nearest 440 Hz and never beats
/// once the detector has settled.
#[test]
fn test_tone_peaks_at_concert_a() {
    let mut config = config(44_100, 1024);
    config.audio.channels = 2;
    config.spectrum.window_size = 2048;

    let mut source = ToneSource::test_tone();
    let mut engine = AnalysisEngine::new(&config).unwrap();
    let block_len = config.audio.block_len();

    for _ in 0..40 {
        let block = source.read_block(block_len);
        let delta_time = block.duration_seconds();
        let frame = engine.process_block(block, delta_time).unwrap();
        assert!(!frame.beat);
    }

    let spectrum = &engine.frame().spectrum;
    let peak = spectrum
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(bin, _)| bin)
        .unwrap();
    let peak_hz = engine.analyzer().bin_frequency(peak, 44_100);
    assert!((peak_hz - 440.0).abs() < 44_100.0 / 2048.0, "peak at {peak_hz} Hz");
}

/// Starved ticks keep visualizers drawing the last known features.
#[test]
fn visualizers_survive_starvation() {
    let config = config(8_000, 128);
    let (mut writer, reader) = CrossThreadSampleBridge::new(128, 1, 8_000);
    let mut pipeline = FeaturePipeline::new(reader, &config).unwrap();
    let mut registry = VisualizerRegistry::with_defaults(&config.visuals).unwrap();
    let mut list = DrawList::new();

    let loud: Vec<f32> = (0..128).map(|i| if i % 2 == 0 { 0.6 } else { -0.6 }).collect();
    writer.publish_block(&SampleBlock::new(loud, 1, 8_000));

    for tick in 0..10 {
        let frame = pipeline.tick(1.0 / 60.0).unwrap();
        assert_eq!(frame.stale, tick > 0);
        registry.update(frame);
        registry.render(&mut list);
        assert!(!list.is_empty(), "bars vanished on tick {tick}");
    }
}

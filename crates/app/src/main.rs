mod wav;

use std::{
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use beatframe_core::{
    analyze_source, AppConfig, AudioEngine, AudioStream, DrawList, FeaturePipeline,
    IntervalTimer, SampleReader, ToneSource, VisualizerRegistry,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

fn main() -> beatframe_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.overrides.resolve()?;

    match cli.command {
        Commands::Live { seconds } => run_live(&config, seconds),
        Commands::Play {
            input,
            simulate,
            seconds,
        } => run_play(&config, &input, simulate, seconds),
        Commands::Tone { seconds } => run_tone(&config, seconds),
        Commands::Analyze {
            input,
            output,
            bands,
        } => run_analyze(&config, &input, &output, bands),
    }
}

fn run_live(config: &AppConfig, seconds: Option<f32>) -> beatframe_core::Result<()> {
    tracing::info!("starting live capture");

    let engine = AudioEngine::new(config.audio.clone());
    let (stream, reader) = engine.capture()?;
    run_visuals(stream, reader, config, seconds)
}

fn run_play(
    config: &AppConfig,
    input: &Path,
    simulate: bool,
    seconds: Option<f32>,
) -> beatframe_core::Result<()> {
    tracing::info!(?input, simulate, "starting playback");

    let source = Box::new(wav::load_wav(input)?);
    let engine = AudioEngine::new(config.audio.clone());
    let (stream, reader) = if simulate {
        engine.simulate(source)?
    } else {
        engine.play(source)?
    };
    run_visuals(stream, reader, config, seconds)
}

fn run_tone(config: &AppConfig, seconds: Option<f32>) -> beatframe_core::Result<()> {
    tracing::info!("playing test tone on the simulated device");

    let engine = AudioEngine::new(config.audio.clone());
    let (stream, reader) = engine.simulate(Box::new(ToneSource::test_tone()))?;
    run_visuals(stream, reader, config, seconds)
}

fn run_analyze(
    config: &AppConfig,
    input: &Path,
    output: &Path,
    bands: usize,
) -> beatframe_core::Result<()> {
    tracing::info!(?input, ?output, bands, "running offline analysis");

    let mut source = wav::load_wav(input)?;
    let report = analyze_source(&mut source, config, bands)?;
    std::fs::write(output, report.to_json_pretty()?)?;

    tracing::info!(
        beats = report.summary.beats,
        tempo = ?report.summary.tempo_bpm,
        frames = report.frames.len(),
        "analysis written"
    );
    Ok(())
}

/// Consumer loop: one feature tick, one visualizer update and one render per
/// display frame, until the stream drains or the time limit passes.
fn run_visuals(
    stream: AudioStream,
    reader: SampleReader,
    config: &AppConfig,
    seconds: Option<f32>,
) -> beatframe_core::Result<()> {
    let mut pipeline = FeaturePipeline::new(reader, config)?;
    let mut registry = VisualizerRegistry::with_defaults(&config.visuals)?;
    let mut cycle = IntervalTimer::new(config.visuals.cycle_seconds);
    let mut stats_timer = IntervalTimer::new(1.0);
    let mut draw_list = DrawList::new();

    tracing::info!(mode = ?stream.mode(), visualizer = registry.current_name(), "render loop started");

    let started = Instant::now();
    let mut last_tick = started;
    let mut stale_ticks = 0_u64;

    loop {
        thread::sleep(FRAME_INTERVAL);
        let now = Instant::now();
        let delta_time = now.duration_since(last_tick).as_secs_f32();
        last_tick = now;

        let frame = pipeline.tick(delta_time)?;
        if frame.stale {
            stale_ticks += 1;
        }
        if frame.beat {
            tracing::info!(
                time = frame.time,
                energy = frame.energy,
                threshold = frame.threshold,
                "beat"
            );
        }

        registry.update(frame);
        registry.render(&mut draw_list);

        for _ in 0..cycle.tick(delta_time) {
            registry.next()?;
        }

        if stats_timer.tick(delta_time) > 0 {
            tracing::debug!(
                visualizer = registry.current_name(),
                primitives = draw_list.len(),
                stats = ?draw_list.stats(),
                stale_ticks,
                "frame stats"
            );
        }

        if pipeline.is_drained() {
            tracing::info!("stream finished");
            break;
        }
        if seconds.is_some_and(|limit| started.elapsed().as_secs_f32() >= limit) {
            tracing::info!("time limit reached");
            break;
        }
    }

    stream.pause()?;
    let summary = pipeline.summary();
    tracing::info!(
        ticks = summary.ticks,
        beats = summary.beats,
        tempo = ?summary.tempo_bpm,
        stale_ticks,
        "render loop stopped"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time spectrum and beat visualiser", long_about = None)]
struct Cli {
    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Commands,
}

/// Command-line knobs layered over the configuration file.
#[derive(Args, Debug, Default)]
struct ConfigOverrides {
    /// JSON configuration file; missing fields use the built-in defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Transform length in samples.
    #[arg(long, global = true)]
    window_size: Option<usize>,

    /// Onset sensitivity, clamped into [0.05, 0.5].
    #[arg(long, global = true)]
    sensitivity: Option<f32>,

    /// Ticks to stay quiet after a beat.
    #[arg(long, global = true)]
    cooldown: Option<u32>,
}

impl ConfigOverrides {
    fn resolve(&self) -> beatframe_core::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_json_file(path)?,
            None => AppConfig::live_defaults(),
        };

        if let Some(window_size) = self.window_size {
            config.spectrum.window_size = window_size;
        }
        if let Some(sensitivity) = self.sensitivity {
            config.onset.sensitivity = sensitivity;
        }
        if let Some(cooldown) = self.cooldown {
            config.onset.cooldown_ticks = cooldown;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Visualise the default input device.
    Live {
        /// Stop after this many seconds.
        #[arg(short, long)]
        seconds: Option<f32>,
    },
    /// Play a WAV file and visualise it.
    Play {
        /// WAV file to play.
        input: PathBuf,
        /// Use the simulated device instead of the default output.
        #[arg(long)]
        simulate: bool,
        /// Stop after this many seconds.
        #[arg(short, long)]
        seconds: Option<f32>,
    },
    /// Visualise the built-in 440 Hz test tone.
    Tone {
        /// Stop after this many seconds.
        #[arg(short, long)]
        seconds: Option<f32>,
    },
    /// Analyse a WAV file offline and write the features as JSON.
    Analyze {
        /// WAV file to analyse.
        input: PathBuf,
        /// Output path for the JSON report.
        output: PathBuf,
        /// Number of spectrum bands kept per frame.
        #[arg(long, default_value_t = 32)]
        bands: usize,
    },
}

use std::time::{Duration, Instant};

use binaural_engine::output::CpalBackend;
use binaural_engine::{EngineConfig, EngineController, Mode, ParamUpdate, PresetLibrary};
use clap::{Args as ClapArgs, Parser, Subcommand};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Play binaural and isochronic tone sessions on the default audio device
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a preset from a preset feed
    Play(PlayArgs),
    /// Play a static tone
    Tone(ToneArgs),
    /// List the presets in a preset feed
    List(ListArgs),
    /// Generate a default config file and exit
    GenerateConfig(ConfigArgs),
}

#[derive(ClapArgs)]
struct PlayArgs {
    /// Path to the preset JSON file
    #[arg(long)]
    presets: String,
    /// Preset name (case-insensitive)
    #[arg(long)]
    name: String,
    /// Override the preset's duration in minutes
    #[arg(long)]
    minutes: Option<f32>,
    /// Engine config TOML
    #[arg(long)]
    config: Option<String>,
}

#[derive(ClapArgs)]
struct ToneArgs {
    /// binaural, monaural or isochronic
    #[arg(long, default_value = "binaural")]
    mode: String,
    /// Carrier frequency in Hz
    #[arg(long, default_value_t = 200.0)]
    base: f32,
    /// Beat frequency in Hz
    #[arg(long, default_value_t = 10.0)]
    beat: f32,
    /// Stop after this many seconds (runs until Ctrl+C otherwise)
    #[arg(long)]
    seconds: Option<f32>,
    /// Engine config TOML
    #[arg(long)]
    config: Option<String>,
}

#[derive(ClapArgs)]
struct ListArgs {
    /// Path to the preset JSON file
    #[arg(long)]
    presets: String,
}

#[derive(ClapArgs)]
struct ConfigArgs {
    /// Output path for the generated configuration
    #[arg(long, default_value = "config.toml")]
    out: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Play(args) => play_command(args)?,
        Commands::Tone(args) => tone_command(args)?,
        Commands::List(args) => {
            let library = PresetLibrary::load(&args.presets)?;
            for p in library.iter() {
                println!(
                    "{:<24} {:<10} {:>7.1} Hz  beat {:>5.1} -> {:<5.1} Hz  {:>5.1} min",
                    p.name,
                    format!("{:?}", p.mode).to_lowercase(),
                    p.base_freq_hz,
                    p.beat_hz_start,
                    p.beat_hz_end,
                    p.duration_min
                );
            }
        }
        Commands::GenerateConfig(cfg) => {
            EngineConfig::generate_default(&cfg.out)?;
            println!("Generated default config at {}", cfg.out);
        }
    }
    Ok(())
}

fn load_config(path: Option<&str>) -> EngineConfig {
    path.map(EngineConfig::load_or_default).unwrap_or_default()
}

fn ctrlc_channel() -> Result<Receiver<()>, ctrlc::Error> {
    let (tx, rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })?;
    Ok(rx)
}

/// Block until Ctrl+C or until `limit` has passed.
fn wait(stop_rx: &Receiver<()>, limit: Option<Duration>) {
    let started = Instant::now();
    loop {
        let tick = match limit {
            Some(limit) => match limit.checked_sub(started.elapsed()) {
                Some(left) => left.min(Duration::from_secs(1)),
                None => return,
            },
            None => Duration::from_secs(1),
        };
        match stop_rx.recv_timeout(tick) {
            Err(RecvTimeoutError::Timeout) => continue,
            _ => return,
        }
    }
}

fn finish(
    mut controller: EngineController<CpalBackend>,
) -> Result<(), Box<dyn std::error::Error>> {
    controller.stop()?;
    let fade = controller.config().fade_ms as u64 + controller.config().suspend_guard_ms as u64;
    std::thread::sleep(Duration::from_millis(fade));
    let status = controller.query_state();
    controller.dispose();
    info!("rendered {:.1}s of audio", status.elapsed_secs);
    println!("{}", serde_json::to_string_pretty(&controller.session_summary())?);
    Ok(())
}

fn play_command(args: PlayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let library = PresetLibrary::load(&args.presets)?;
    let mut preset = library
        .find(&args.name)
        .cloned()
        .ok_or_else(|| format!("no preset named {:?}", args.name))?;
    if let Some(minutes) = args.minutes {
        preset.duration_min = minutes;
    }

    let config = load_config(args.config.as_deref());
    let backend = CpalBackend::new(config.preferred_sample_rate);
    let mut controller = EngineController::new(backend, config);
    controller.initialize()?;
    controller.apply_preset(&preset)?;
    let stop_rx = ctrlc_channel()?;
    controller.start()?;

    println!("Playing {}... press Ctrl+C to stop", preset.name);
    wait(&stop_rx, Some(Duration::from_secs_f64(preset.duration_secs())));
    finish(controller)
}

fn tone_command(args: ToneArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mode = Mode::parse(&args.mode).ok_or_else(|| format!("unknown mode {:?}", args.mode))?;
    let config = load_config(args.config.as_deref());
    let backend = CpalBackend::new(config.preferred_sample_rate);
    let mut controller = EngineController::new(backend, config);
    controller.set_parameters(ParamUpdate::new().mode(mode).base_freq(args.base).beat_hz(args.beat))?;
    let stop_rx = ctrlc_channel()?;
    controller.start()?;

    let status = controller.query_state();
    println!(
        "{} tone at {} Hz, beat {} Hz ({} Hz output)... press Ctrl+C to stop",
        args.mode,
        args.base,
        args.beat,
        status.sample_rate.unwrap_or_default()
    );
    let limit = args
        .seconds
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(Duration::from_secs_f32);
    wait(&stop_rx, limit);
    finish(controller)
}

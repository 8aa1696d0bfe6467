//! Modular Radio CLI

mod render;
mod signal;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use modradio_core::domain::audio::{BufferSource, ProcessSpec};
use modradio_core::domain::chain::{EffectKind, ParamId};
use modradio_core::domain::config::{ConfigManager, EffectPreset, ModRadioConfig, PresetManager};
use modradio_core::domain::controls::ControlSurface;
use modradio_core::domain::dsp::FilterMode;
use modradio_core::domain::player::{Player, TransportState};
use modradio_infra::audio::{list_output_devices, PlaybackEngine, StreamOptions, TransportCommand};

use render::render_offline;
use signal::{synthesize, SignalKind, SignalSpec};

#[derive(Parser)]
#[command(name = "modradio")]
#[command(author, version, about = "Pitch-shifting effect player", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration directory (default: the platform config dir)
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a test signal through the chain offline
    Render(RenderArgs),

    /// Play a test signal through the chain on an output device
    Play(PlayArgs),

    /// List output devices
    Devices {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List effect units and their parameters
    Effects,

    /// Manage named presets
    #[command(subcommand)]
    Preset(PresetCommand),
}

#[derive(Subcommand)]
enum PresetCommand {
    /// List saved presets
    List,

    /// Save the configured preset, with flags applied, under a name
    Save {
        name: String,

        #[command(flatten)]
        effects: EffectArgs,
    },

    /// Print a preset
    Show {
        name: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a preset
    Delete { name: String },
}

#[derive(Args, Clone)]
struct SignalArgs {
    /// Test signal waveform
    #[arg(long, value_enum, default_value_t = SignalKind::Sine)]
    signal: SignalKind,

    /// Sine frequency in Hz
    #[arg(long, default_value = "440.0")]
    freq: f32,

    /// Track length in seconds
    #[arg(long, default_value = "2.0")]
    seconds: f32,

    /// Peak amplitude (0-1)
    #[arg(long, default_value = "0.5")]
    amplitude: f32,

    /// Noise seed
    #[arg(long, default_value = "1")]
    seed: u32,

    /// Loop the track
    #[arg(long = "loop")]
    looping: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliFilterMode {
    Lp,
    Hp,
    Bp,
}

impl From<CliFilterMode> for FilterMode {
    fn from(mode: CliFilterMode) -> Self {
        match mode {
            CliFilterMode::Lp => FilterMode::LowPass,
            CliFilterMode::Hp => FilterMode::HighPass,
            CliFilterMode::Bp => FilterMode::BandPass,
        }
    }
}

#[derive(Args, Clone, Default)]
struct EffectArgs {
    /// Start from a named preset instead of the configured one
    #[arg(long, value_name = "NAME")]
    preset: Option<String>,

    /// Enable effect units (comma separated, e.g. delay,reverb)
    #[arg(long, value_delimiter = ',', value_parser = parse_effect)]
    enable: Vec<EffectKind>,

    /// Bypass effect units (comma separated)
    #[arg(long, value_delimiter = ',', value_parser = parse_effect)]
    disable: Vec<EffectKind>,

    /// Set a normalized parameter, e.g. --set delay_time=0.25
    #[arg(long = "set", value_name = "PARAM=VALUE", value_parser = parse_assignment)]
    params: Vec<(ParamId, f32)>,

    /// Filter mode
    #[arg(long, value_enum)]
    filter_mode: Option<CliFilterMode>,

    /// Pitch offset in semitones (-12 to 12)
    #[arg(long, allow_negative_numbers = true)]
    pitch: Option<f32>,

    /// Master gain (0-1)
    #[arg(long)]
    gain: Option<f32>,
}

#[derive(Args)]
struct RenderArgs {
    #[command(flatten)]
    signal: SignalArgs,

    #[command(flatten)]
    effects: EffectArgs,

    /// Output length in seconds (default: the track length)
    #[arg(long)]
    duration: Option<f32>,

    /// Sample rate (default: from config)
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Write raw interleaved f32 little-endian samples here
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct PlayArgs {
    #[command(flatten)]
    signal: SignalArgs,

    #[command(flatten)]
    effects: EffectArgs,

    /// Output device name (default: from config, then the system default)
    #[arg(long)]
    device: Option<String>,

    /// How long to play in seconds (default: until the track ends)
    #[arg(long)]
    duration: Option<f32>,
}

fn parse_effect(name: &str) -> Result<EffectKind, String> {
    EffectKind::parse(name).ok_or_else(|| {
        let known: Vec<&str> = EffectKind::ORDER.iter().map(|k| k.as_str()).collect();
        format!("unknown effect '{name}' (expected one of {})", known.join(", "))
    })
}

fn parse_assignment(arg: &str) -> Result<(ParamId, f32), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected PARAM=VALUE, got '{arg}'"))?;
    let id = ParamId::parse(name.trim()).ok_or_else(|| format!("unknown parameter '{name}'"))?;
    let value: f32 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for {id}: {e}"))?;
    Ok((id, value))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn config_manager(dir: Option<PathBuf>) -> anyhow::Result<ConfigManager> {
    let dir = match dir {
        Some(dir) => dir,
        None => {
            ConfigManager::default_config_dir().context("Failed to locate config directory")?
        }
    };
    Ok(ConfigManager::new(dir))
}

/// Resolve the effect preset: configured or named, then flag overrides
async fn resolve_preset(
    args: &EffectArgs,
    config: &ModRadioConfig,
    presets: &PresetManager,
) -> anyhow::Result<EffectPreset> {
    let mut preset = match &args.preset {
        Some(name) => presets
            .load_preset(name)
            .await
            .with_context(|| format!("Failed to load preset '{name}'"))?,
        None => config.preset.clone(),
    };

    for &kind in &args.enable {
        preset.set_enabled(kind, true);
    }
    for &kind in &args.disable {
        preset.set_enabled(kind, false);
    }
    if let Some(mode) = args.filter_mode {
        preset.params.filter.mode = mode.into();
    }
    for &(id, value) in &args.params {
        preset.set_param(id, value);
    }
    if let Some(pitch) = args.pitch {
        preset.pitch_semitones = pitch;
    }
    if let Some(gain) = args.gain {
        preset.master_gain = gain;
    }
    preset.validate().context("Invalid effect settings")?;
    Ok(preset)
}

fn build_track(args: &SignalArgs, sample_rate: u32) -> anyhow::Result<BufferSource> {
    if args.seconds.is_nan() || args.seconds <= 0.0 {
        bail!("--seconds must be positive");
    }
    let samples = synthesize(&SignalSpec {
        kind: args.signal,
        frequency: args.freq,
        seconds: args.seconds,
        amplitude: args.amplitude,
        sample_rate,
        seed: args.seed,
    });
    Ok(BufferSource::mono(samples, sample_rate).with_looping(args.looping))
}

/// A player whose controls hold `preset`, with `track` loaded
fn build_player(
    preset: &EffectPreset,
    spec: Option<&ProcessSpec>,
    track: BufferSource,
) -> Player<BufferSource> {
    let controls = ControlSurface::shared();
    preset.apply_to_controls(&controls);
    let mut player = Player::new(controls);
    if let Some(spec) = spec {
        player.prepare(spec);
    }
    // loading resets pitch, so publish it again afterwards
    player.load_track(track);
    player.controls().set_pitch_semitones(preset.pitch_semitones);
    player
}

async fn run_render(
    args: RenderArgs,
    config: &ModRadioConfig,
    presets: &PresetManager,
) -> anyhow::Result<()> {
    let preset = resolve_preset(&args.effects, config, presets).await?;
    let sample_rate = args.sample_rate.unwrap_or(config.engine.sample_rate);
    let spec = ProcessSpec::new(sample_rate, config.engine.block_size, config.engine.channels);

    let track = build_track(&args.signal, spec.sample_rate)?;
    let duration = args.duration.unwrap_or(args.signal.seconds).max(0.0);
    let frames = (duration * spec.sample_rate as f32).round() as usize;
    let mut player = build_player(&preset, Some(&spec), track);

    info!(frames, sample_rate = spec.sample_rate, "Rendering offline");
    let mut bytes = Vec::new();
    let mut interleaved = vec![0.0f32; spec.max_block_size * spec.channels];
    let write_output = args.output.is_some();
    let report = render_offline(&mut player, &spec, frames, |block| {
        if write_output {
            let n = block.len() * spec.channels;
            block.write_interleaved(&mut interleaved[..n], spec.channels);
            bytes.extend(interleaved[..n].iter().flat_map(|s| s.to_le_bytes()));
        }
    });

    if let Some(path) = &args.output {
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote raw output");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Rendered {} frames at {} Hz ({} ch)",
            report.frames_rendered, report.sample_rate, report.channels
        );
        println!(
            "  source consumed: {} frames (x{:.3})",
            report.source_frames, report.speed
        );
        println!("  peak: {:.4}  rms: {:.4}", report.peak, report.rms);
        let enabled: Vec<&str> = report.enabled.iter().map(|k| k.as_str()).collect();
        println!(
            "  effects: {}  pitch: {:+.2} st",
            if enabled.is_empty() { "none".to_string() } else { enabled.join(", ") },
            report.pitch_semitones
        );
        if report.underruns > 0 || report.dropped_frames > 0 {
            println!(
                "  underruns: {}  dropped: {}",
                report.underruns, report.dropped_frames
            );
        }
    }
    Ok(())
}

async fn run_play(
    args: PlayArgs,
    config: &ModRadioConfig,
    presets: &PresetManager,
) -> anyhow::Result<()> {
    let preset = resolve_preset(&args.effects, config, presets).await?;
    let options = StreamOptions {
        device: args.device.or_else(|| config.engine.output_device().map(str::to_string)),
        sample_rate: config.engine.sample_rate,
        block_size: config.engine.block_size,
    };

    let controls = ControlSurface::shared();
    preset.apply_to_controls(&controls);
    let player = Player::new(controls);
    let mut handle =
        PlaybackEngine::start(player, &options).context("Failed to open output stream")?;

    // the device decides the rate, so synthesize only now
    let track = build_track(&args.signal, handle.spec().sample_rate)?;
    handle.load_track(track)?;
    handle.controls().set_pitch_semitones(preset.pitch_semitones);
    handle.send(TransportCommand::Play)?;

    let limit = args.duration.map(|d| Duration::from_secs_f32(d.max(0.0)));
    let started = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    info!(device = handle.device(), "Playing; press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }

        let stats = handle.check_health();
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        // length stays 0 until the callback has taken the track
        if stats.length > 0 && stats.state == TransportState::Stopped {
            info!(position = stats.position, "Track finished");
            break;
        }
    }

    handle.send(TransportCommand::Stop).ok();
    handle.stop();
    Ok(())
}

fn run_devices(json: bool) -> anyhow::Result<()> {
    let devices = list_output_devices().context("Failed to enumerate output devices")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No output devices found.");
        return Ok(());
    }
    println!("Output Devices");
    println!("==============\n");
    for (idx, device) in devices.iter().enumerate() {
        let marker = if device.is_default { " (default)" } else { "" };
        let rate = device
            .default_sample_rate
            .map_or_else(|| "?".to_string(), |r| r.to_string());
        let channels = device
            .default_channels
            .map_or_else(|| "?".to_string(), |c| c.to_string());
        println!("  [{idx}] {} ({rate} Hz, {channels} ch){marker}", device.name);
    }
    Ok(())
}

fn run_effects() {
    let defaults = EffectPreset::default();
    for kind in EffectKind::ORDER {
        println!("{kind}");
        for id in kind.params() {
            println!("  {:<24} {:.3}", id.as_str(), defaults.param(id));
        }
    }
    println!("\nfilter modes: lp, hp, bp; pitch: -12..12 st; gain: 0..1");
}

fn print_preset(name: &str, preset: &EffectPreset) {
    println!("{name}");
    println!(
        "  pitch: {:+.2} st  gain: {:.2}",
        preset.pitch_semitones, preset.master_gain
    );
    println!("  filter mode: {:?}", preset.params.filter.mode);
    for kind in EffectKind::ORDER {
        let state = if preset.is_enabled(kind) { "on" } else { "off" };
        println!("  {kind} [{state}]");
        for id in kind.params() {
            println!("    {:<24} {:.3}", id.as_str(), preset.param(id));
        }
    }
}

async fn run_preset(
    command: PresetCommand,
    config: &ModRadioConfig,
    presets: &PresetManager,
) -> anyhow::Result<()> {
    match command {
        PresetCommand::List => {
            let names = presets.list_presets().await.context("Failed to list presets")?;
            if names.is_empty() {
                println!("No presets in {}", presets.preset_dir().display());
            }
            for name in names {
                println!("{name}");
            }
        }
        PresetCommand::Save { name, effects } => {
            let preset = resolve_preset(&effects, config, presets).await?;
            presets
                .save_preset(&name, &preset)
                .await
                .with_context(|| format!("Failed to save preset '{name}'"))?;
            println!("Saved preset '{name}'");
        }
        PresetCommand::Show { name, json } => {
            let preset = presets
                .load_preset(&name)
                .await
                .with_context(|| format!("Failed to load preset '{name}'"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&preset)?);
            } else {
                print_preset(&name, &preset);
            }
        }
        PresetCommand::Delete { name } => {
            presets
                .delete_preset(&name)
                .await
                .with_context(|| format!("Failed to delete preset '{name}'"))?;
            println!("Deleted preset '{name}'");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let manager = config_manager(cli.config_dir)?;
    let config = manager.load().await;
    let presets = manager.preset_manager(&config.engine);
    debug!(config = %manager.config_path().display(), "Configuration ready");

    match cli.command {
        Commands::Render(args) => run_render(args, &config, &presets).await,
        Commands::Play(args) => run_play(args, &config, &presets).await,
        Commands::Devices { json } => run_devices(json),
        Commands::Effects => {
            run_effects();
            Ok(())
        }
        Commands::Preset(command) => run_preset(command, &config, &presets).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("delay_time=0.25").unwrap(),
            (ParamId::DelayTime, 0.25)
        );
        assert_eq!(
            parse_assignment(" Reverb_Mix = 1 ").unwrap(),
            (ParamId::ReverbMix, 1.0)
        );
        assert!(parse_assignment("delay_time").is_err());
        assert!(parse_assignment("nope=1").is_err());
        assert!(parse_assignment("delay_time=abc").is_err());
    }

    #[test]
    fn test_parse_render_flags() {
        let cli = Cli::try_parse_from([
            "modradio",
            "render",
            "--signal",
            "impulse",
            "--enable",
            "delay,reverb",
            "--set",
            "delay_time=0.1",
            "--pitch",
            "-7",
            "--filter-mode",
            "hp",
            "--json",
        ])
        .unwrap();

        let Commands::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.signal.signal, SignalKind::Impulse);
        assert_eq!(args.effects.enable, vec![EffectKind::Delay, EffectKind::Reverb]);
        assert_eq!(args.effects.params, vec![(ParamId::DelayTime, 0.1)]);
        assert_eq!(args.effects.pitch, Some(-7.0));
        assert!(args.json);
    }

    #[test]
    fn test_unknown_effect_is_rejected() {
        assert!(Cli::try_parse_from(["modradio", "render", "--enable", "flanger"]).is_err());
    }

    #[tokio::test]
    async fn test_resolve_preset_applies_flags() {
        let dir = tempfile::TempDir::new().unwrap();
        let presets = PresetManager::new(dir.path().to_path_buf());
        let config = ModRadioConfig::factory_default();
        let args = EffectArgs {
            enable: vec![EffectKind::Chorus, EffectKind::Filter],
            disable: vec![EffectKind::Chorus],
            params: vec![(ParamId::FilterCutoff, 0.2)],
            filter_mode: Some(CliFilterMode::Bp),
            pitch: Some(3.0),
            ..EffectArgs::default()
        };

        let preset = resolve_preset(&args, &config, &presets).await.unwrap();
        assert_eq!(preset.enabled, vec![EffectKind::Filter]);
        assert_eq!(preset.params.filter.mode, FilterMode::BandPass);
        assert_eq!(preset.param(ParamId::FilterCutoff), 0.2);
        assert_eq!(preset.pitch_semitones, 3.0);
    }

    #[tokio::test]
    async fn test_resolve_preset_rejects_bad_pitch() {
        let dir = tempfile::TempDir::new().unwrap();
        let presets = PresetManager::new(dir.path().to_path_buf());
        let args = EffectArgs {
            pitch: Some(24.0),
            ..EffectArgs::default()
        };
        assert!(resolve_preset(&args, &ModRadioConfig::default(), &presets)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_named_preset_is_loaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let presets = PresetManager::new(dir.path().to_path_buf());
        let mut saved = EffectPreset::default();
        saved.set_enabled(EffectKind::BitReducer, true);
        presets.save_preset("lofi", &saved).await.unwrap();

        let args = EffectArgs {
            preset: Some("lofi".to_string()),
            ..EffectArgs::default()
        };
        let preset = resolve_preset(&args, &ModRadioConfig::default(), &presets)
            .await
            .unwrap();
        assert_eq!(preset, saved);
    }

    #[test]
    fn test_build_player_keeps_preset_pitch() {
        let mut preset = EffectPreset::default();
        preset.pitch_semitones = -4.0;
        preset.set_enabled(EffectKind::Delay, true);
        let track = BufferSource::mono(vec![0.0; 100], 48000);
        let spec = ProcessSpec::default();

        let player = build_player(&preset, Some(&spec), track);
        assert_eq!(player.controls().pitch_semitones(), -4.0);
        assert!(!player.controls().is_bypassed(EffectKind::Delay));
        assert!(player.has_track());
    }
}

//! Example demonstrating configuration and preset management
//!
//! Run with: cargo run --package modradio-core --example config_demo

use modradio_core::domain::chain::{EffectChain, EffectKind, ParamId};
use modradio_core::domain::config::{EffectPreset, ModRadioConfig, PresetManager};
use modradio_core::domain::controls::ControlSurface;
use modradio_core::domain::dsp::FilterMode;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("modradio_core=debug,info")
        .init();

    println!("=== Modular Radio Configuration Demo ===\n");

    // 1. Factory default: every unit bypassed
    println!("1. Creating factory default configuration...");
    let mut config = ModRadioConfig::factory_default();
    println!(
        "   ✓ {} Hz, {} frames, {} effects enabled",
        config.engine.sample_rate,
        config.engine.block_size,
        config.preset.enabled.len()
    );

    // 2. Dial in a sound on the control surface, as a UI would
    println!("\n2. Dialing in a dub preset on the control surface...");
    let surface = ControlSurface::new();
    surface.set_bypass(EffectKind::Delay, false);
    surface.set_bypass(EffectKind::Reverb, false);
    surface.set_bypass(EffectKind::Filter, false);
    surface.set_param(ParamId::DelayTime, 0.125);
    surface.set_param(ParamId::DelayFeedback, 0.6);
    surface.set_filter_mode(FilterMode::LowPass);
    surface.set_param(ParamId::FilterCutoff, 0.35);
    surface.set_pitch_semitones(-2.0);

    config.preset = EffectPreset::from_controls(&surface);
    for kind in &config.preset.enabled {
        println!("   - {}", kind);
    }

    // 3. Save and reload the configuration
    println!("\n3. Saving configuration...");
    let config_path = "demo_config.toml";
    config.save_to_file(config_path).await?;
    let loaded = ModRadioConfig::load_from_file(config_path).await?;
    println!("   ✓ Reloaded, identical: {}", loaded == config);

    // 4. Preset management
    println!("\n4. Preset management:");
    let preset_dir = std::path::PathBuf::from("demo_presets");
    let preset_manager = PresetManager::new(preset_dir.clone());
    preset_manager.save_preset("dub", &loaded.preset).await?;
    preset_manager
        .save_preset("clean", &EffectPreset::default())
        .await?;
    for name in preset_manager.list_presets().await? {
        println!("   - {}", name);
    }

    // 5. Apply a preset to a chain
    println!("\n5. Applying 'dub' to a fresh chain...");
    let preset = preset_manager.load_preset("dub").await?;
    let mut chain = EffectChain::new();
    preset.apply_to_chain(&mut chain);
    println!(
        "   ✓ Delay {:.0} ms, filter cutoff {:.0} Hz",
        chain.delay().time_secs() * 1000.0,
        chain.filter().cutoff_hz()
    );

    println!("\n=== Demo Complete ===");

    std::fs::remove_file(config_path)?;
    std::fs::remove_dir_all(preset_dir)?;

    Ok(())
}

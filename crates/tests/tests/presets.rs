//! Presets saved to disk reproduce the exact sound they were captured from

use tempfile::TempDir;

use modradio_core::domain::audio::BufferSource;
use modradio_core::domain::chain::{EffectKind, ParamId};
use modradio_core::domain::config::{ConfigManager, EffectPreset, ModRadioConfig, PresetManager};
use modradio_core::domain::controls::ControlSurface;
use modradio_core::domain::dsp::FilterMode;
use modradio_tests::{player, render, sine, unity_controls, SAMPLE_RATE};

fn clip() -> BufferSource {
    BufferSource::mono(sine(262.0, 0.5, 0.6), SAMPLE_RATE)
}

/// Hand-tuned settings on a live surface
fn dial_in(controls: &ControlSurface) {
    controls.set_bypass(EffectKind::Distortion, false);
    controls.set_bypass(EffectKind::Filter, false);
    controls.set_bypass(EffectKind::Delay, false);
    controls.set_bypass(EffectKind::Reverb, false);
    controls.set_param(ParamId::DistortionDrive, 0.4);
    controls.set_filter_mode(FilterMode::HighPass);
    controls.set_param(ParamId::FilterCutoff, 0.3);
    controls.set_param(ParamId::DelayTime, 0.07);
    controls.set_param(ParamId::DelayFeedback, 0.6);
    controls.set_param(ParamId::ReverbRoomSize, 0.8);
    controls.set_pitch_semitones(3.0);
    controls.set_master_gain(0.9);
}

#[tokio::test]
async fn test_saved_preset_sounds_identical() {
    let dir = TempDir::new().unwrap();
    let presets = PresetManager::new(dir.path().to_path_buf());

    let live = unity_controls();
    let mut original = player(live.clone(), 2, 512, clip());
    dial_in(&live);
    original.play();
    let expected = render(&mut original, 24_000);

    presets
        .save_preset("warm", &EffectPreset::from_controls(&live))
        .await
        .unwrap();
    let loaded = presets.load_preset("warm").await.unwrap();

    let restored = ControlSurface::shared();
    let mut replay = player(restored.clone(), 2, 512, clip());
    loaded.apply_to_controls(&restored);
    assert_eq!(restored.filter_mode(), FilterMode::HighPass);
    assert_eq!(restored.pitch_semitones(), 3.0);
    replay.play();

    assert_eq!(render(&mut replay, 24_000), expected);
}

#[tokio::test]
async fn test_config_file_carries_the_startup_preset() {
    let dir = TempDir::new().unwrap();
    let manager = ConfigManager::new(dir.path().to_path_buf());

    let mut config = ModRadioConfig::default();
    config.preset.set_enabled(EffectKind::Chorus, true);
    config.preset.set_param(ParamId::ChorusDepth, 0.9);
    config.preset.pitch_semitones = -5.0;
    manager.save(&config).await.unwrap();

    let loaded = manager.load().await;
    assert_eq!(loaded, config);
    assert!(loaded.preset.is_enabled(EffectKind::Chorus));
    assert_eq!(loaded.preset.param(ParamId::ChorusDepth), 0.9);

    let presets = manager.preset_manager(&loaded.engine);
    assert!(presets.preset_dir().starts_with(dir.path()));
    assert!(presets.list_presets().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_preset_lifecycle_on_disk() {
    let dir = TempDir::new().unwrap();
    let presets = PresetManager::new(dir.path().join("presets"));

    let mut lofi = EffectPreset::default();
    lofi.set_enabled(EffectKind::BitReducer, true);
    lofi.set_param(ParamId::BitReducerBitDepth, 0.2);
    presets.save_preset("lofi", &lofi).await.unwrap();
    presets.save_preset("clean", &EffectPreset::default()).await.unwrap();

    assert_eq!(presets.list_presets().await.unwrap(), vec!["clean", "lofi"]);
    assert!(presets.preset_exists("lofi").await);

    presets.delete_preset("lofi").await.unwrap();
    assert!(!presets.preset_exists("lofi").await);
    assert!(presets.load_preset("lofi").await.is_err());
}

//! Configuration and effect presets
//!
//! Everything persisted by Modular Radio is TOML: the engine settings and
//! the effect preset that is active at startup live in `config.toml`, and
//! named presets live as `<name>.toml` under the preset directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

use crate::domain::audio::ProcessSpec;
use crate::domain::chain::{ChainParams, EffectChain, EffectKind, ParamId};
use crate::domain::controls::{ControlSurface, DEFAULT_MASTER_GAIN};
use crate::domain::pitch::MAX_SEMITONES;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Complete state of the effect section
///
/// Parameters are stored normalized, exactly as the control surface holds
/// them, so a preset is independent of the sample rate it was saved at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectPreset {
    /// Units switched on, in any order
    pub enabled: Vec<EffectKind>,

    /// Normalized parameters of every unit (filter mode included)
    pub params: ChainParams,

    /// Pitch offset in semitones
    pub pitch_semitones: f32,

    /// Master output gain in [0, 1]
    pub master_gain: f32,
}

impl Default for EffectPreset {
    fn default() -> Self {
        Self {
            enabled: Vec::new(),
            params: ChainParams::default(),
            pitch_semitones: 0.0,
            master_gain: DEFAULT_MASTER_GAIN,
        }
    }
}

impl EffectPreset {
    /// Capture a chain's settings (pitch and gain at their defaults)
    pub fn from_chain(chain: &EffectChain) -> Self {
        Self {
            enabled: chain.enabled(),
            params: chain.params(),
            ..Self::default()
        }
    }

    /// Capture everything the control surface currently holds
    pub fn from_controls(surface: &ControlSurface) -> Self {
        let mut chain = EffectChain::new();
        chain.set_filter_mode(surface.filter_mode());
        for id in ParamId::ALL {
            chain.set_parameter(id, surface.param(id));
        }
        for kind in EffectKind::ORDER {
            chain.set_bypass(kind, surface.is_bypassed(kind));
        }

        Self {
            pitch_semitones: surface.pitch_semitones(),
            master_gain: surface.master_gain(),
            ..Self::from_chain(&chain)
        }
    }

    pub fn is_enabled(&self, kind: EffectKind) -> bool {
        self.enabled.contains(&kind)
    }

    /// Switch a unit on or off, keeping `enabled` in processing order
    pub fn set_enabled(&mut self, kind: EffectKind, enabled: bool) {
        self.enabled.retain(|&k| k != kind);
        if enabled {
            self.enabled.push(kind);
            self.enabled.sort_by_key(|k| k.index());
        }
    }

    /// Normalized value of one parameter
    pub fn param(&self, id: ParamId) -> f32 {
        let mut chain = EffectChain::new();
        chain.set_params(&self.params);
        chain.parameter(id)
    }

    /// Set one parameter, clamped the way the chain clamps it
    pub fn set_param(&mut self, id: ParamId, value: f32) {
        let mut chain = EffectChain::new();
        chain.set_params(&self.params);
        chain.set_parameter(id, value);
        self.params = chain.params();
    }

    /// Push parameters and bypass flags into a chain
    ///
    /// Pitch and master gain are not chain state; use
    /// [`apply_to_controls`](Self::apply_to_controls) for those.
    pub fn apply_to_chain(&self, chain: &mut EffectChain) {
        chain.set_params(&self.params);
        for kind in EffectKind::ORDER {
            chain.set_bypass(kind, !self.is_enabled(kind));
        }
    }

    /// Publish the whole preset on a control surface
    ///
    /// Values go through the chain's own clamping first, so the surface
    /// receives exactly what a chain would hold.
    pub fn apply_to_controls(&self, surface: &ControlSurface) {
        let mut chain = EffectChain::new();
        self.apply_to_chain(&mut chain);

        surface.set_filter_mode(chain.filter_mode());
        for id in ParamId::ALL {
            surface.set_param(id, chain.parameter(id));
        }
        for kind in EffectKind::ORDER {
            surface.set_bypass(kind, chain.is_bypassed(kind));
        }
        surface.set_pitch_semitones(self.pitch_semitones);
        surface.set_master_gain(self.master_gain);
    }

    /// Reject values no control would ever produce
    pub fn validate(&self) -> Result<()> {
        if !self.pitch_semitones.is_finite() || self.pitch_semitones.abs() > MAX_SEMITONES {
            return Err(ConfigError::Invalid(format!(
                "pitch_semitones {} outside ±{}",
                self.pitch_semitones, MAX_SEMITONES
            )));
        }
        if !(0.0..=1.0).contains(&self.master_gain) {
            return Err(ConfigError::Invalid(format!(
                "master_gain {} outside [0, 1]",
                self.master_gain
            )));
        }
        let mut chain = EffectChain::new();
        chain.set_params(&self.params);
        if chain.params() != self.params {
            return Err(ConfigError::Invalid(
                "effect parameters must be normalized to [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a preset file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).await?;
        let preset: Self = toml::from_str(&contents)?;
        preset.validate()?;

        debug!(path = %path.display(), enabled = preset.enabled.len(), "Preset loaded");
        Ok(preset)
    }

    /// Save a preset file, creating its directory if needed
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!(path = %path.display(), "Preset saved");
        Ok(())
    }
}

/// Audio engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate used for offline rendering and as the device request
    pub sample_rate: u32,

    /// Largest block the host will ask for
    pub block_size: usize,

    /// Output channel count
    pub channels: usize,

    /// Output device name (empty = system default)
    pub output_device: String,

    /// Directory holding named presets
    pub preset_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            channels: 2,
            output_device: String::new(),
            preset_dir: PathBuf::from("presets"),
        }
    }
}

impl EngineConfig {
    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec::new(self.sample_rate, self.block_size, self.channels)
    }

    pub fn output_device(&self) -> Option<&str> {
        if self.output_device.is_empty() {
            None
        } else {
            Some(&self.output_device)
        }
    }
}

/// Complete Modular Radio configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModRadioConfig {
    pub engine: EngineConfig,
    pub preset: EffectPreset,
}

impl ModRadioConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.preset.validate()?;
        if config.engine.sample_rate == 0 || config.engine.block_size == 0 {
            return Err(ConfigError::Invalid(
                "sample_rate and block_size must be non-zero".to_string(),
            ));
        }

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Factory configuration: default engine, every effect bypassed
    pub fn factory_default() -> Self {
        Self::default()
    }
}

/// Named presets stored as `<dir>/<name>.toml`
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    pub fn preset_dir(&self) -> &Path {
        &self.preset_dir
    }

    fn preset_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ConfigError::Invalid(format!("invalid preset name {name:?}")));
        }
        Ok(self.preset_dir.join(format!("{name}.toml")))
    }

    /// List all available presets, sorted by name
    ///
    /// A missing preset directory lists as empty.
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        let mut entries = match fs::read_dir(&self.preset_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(presets),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "toml") {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<EffectPreset> {
        let path = self.preset_path(name)?;
        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        EffectPreset::load_from_file(&path).await
    }

    #[instrument(skip(self, preset))]
    pub async fn save_preset(&self, name: &str, preset: &EffectPreset) -> Result<()> {
        let path = self.preset_path(name)?;
        preset.save_to_file(&path).await?;
        info!(name, "Preset saved");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name)?;
        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    pub async fn preset_exists(&self, name: &str) -> bool {
        self.preset_path(name).map(|p| p.exists()).unwrap_or(false)
    }
}

/// Manages `config.toml` in the user's config directory
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// `~/.config/modradio` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("modradio"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Presets live next to the config unless the config says otherwise
    pub fn preset_manager(&self, config: &EngineConfig) -> PresetManager {
        let dir = if config.preset_dir.is_absolute() {
            config.preset_dir.clone()
        } else {
            self.config_dir.join(&config.preset_dir)
        };
        PresetManager::new(dir)
    }

    /// Load configuration from file
    ///
    /// A missing file yields (and writes) the factory default. A corrupt
    /// file is copied to `config.toml.corrupt` and the factory default is
    /// returned.
    #[instrument(skip(self))]
    pub async fn load(&self) -> ModRadioConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = ModRadioConfig::factory_default();
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }
            return config;
        }

        match ModRadioConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                ModRadioConfig::factory_default()
            }
        }
    }

    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &ModRadioConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    /// Delete the config file if present
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        if self.config_path.exists() {
            fs::remove_file(&self.config_path).await?;
            info!(path = %self.config_path.display(), "Configuration cleared");
        }
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}

//! Domain entities and business rules

pub mod audio;
pub mod chain;
pub mod config;
pub mod controls;
pub mod dsp;
pub mod fifo;
pub mod pitch;
pub mod player;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{
    AudioBlock, AudioBlockSource, AudioError, BufferSource, DeviceId, DeviceInfo,
    PositionableSource, ProcessSpec,
};
pub use chain::{ChainParams, EffectChain, EffectKind, ParamId};
pub use config::{
    ConfigError, ConfigManager, EffectPreset, EngineConfig, ModRadioConfig, PresetManager,
};
pub use controls::{ControlReader, ControlSurface, ControlUpdate, DEFAULT_MASTER_GAIN};
pub use dsp::{Effect, FilterMode};
pub use fifo::SampleFifo;
pub use pitch::{PitchControl, PitchShiftStage, StageState, StageStats};
pub use player::{Player, PlayerStats, TransportState};

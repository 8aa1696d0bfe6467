//! Output host built on CPAL
//!
//! CPAL abstracts the platform APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio

pub mod cpal_backend;
pub mod engine;

pub use cpal_backend::{list_output_devices, CpalOutputHost};
pub use engine::{
    EngineStatus, PlaybackEngine, PlaybackHandle, StreamOptions, StreamRenderer, Track,
    TransportCommand,
};

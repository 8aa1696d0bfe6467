//! Modular Radio core: effect chain, pitch-shifting source, and presets
//!
//! Nothing in this crate touches an audio device. The host layer lives in
//! `modradio-infra`.

pub mod domain;

//! Modular Radio host layer: device discovery and the real-time output stream

pub mod audio;

//! Soft-clip distortion

use serde::{Deserialize, Serialize};

use super::{params, wet_dry, Effect};
use crate::domain::audio::{AudioBlock, ProcessSpec};

/// Distortion parameters (normalized)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistortionParams {
    pub drive: f32,
    pub mix: f32,
}

impl Default for DistortionParams {
    fn default() -> Self {
        Self {
            drive: 0.0,
            mix: 0.5,
        }
    }
}

/// `tanh` waveshaper
///
/// The output is not scaled back down by the drive factor, so raising the
/// drive also raises the perceived level.
#[derive(Debug)]
pub struct Distortion {
    bypass: bool,
    params: DistortionParams,
    drive: f32,
}

impl Distortion {
    pub fn new() -> Self {
        let defaults = DistortionParams::default();
        Self {
            bypass: true,
            params: defaults,
            drive: params::distortion_drive(defaults.drive),
        }
    }

    /// Set drive (normalized, maps to 1x..11x)
    pub fn set_drive(&mut self, p: f32) {
        self.params.drive = params::normalized(p);
        self.drive = params::distortion_drive(p);
    }

    pub fn set_mix(&mut self, p: f32) {
        self.params.mix = params::normalized(p);
    }

    /// Current drive multiplier
    pub fn drive(&self) -> f32 {
        self.drive
    }

    pub fn params(&self) -> DistortionParams {
        self.params
    }

    pub fn set_params(&mut self, params: DistortionParams) {
        self.set_drive(params.drive);
        self.set_mix(params.mix);
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Distortion {
    fn prepare(&mut self, _spec: &ProcessSpec) {}

    fn process(&mut self, block: &mut AudioBlock) {
        if self.bypass {
            return;
        }
        let drive = self.drive;
        let mix = self.params.mix;
        for ch in 0..block.channels() {
            for sample in block.channel_mut(ch) {
                let dry = *sample;
                *sample = wet_dry(dry, (drive * dry).tanh(), mix);
            }
        }
    }

    // Stateless
    fn reset(&mut self) {}

    fn release(&mut self) {}

    fn is_bypassed(&self) -> bool {
        self.bypass
    }

    fn set_bypass(&mut self, bypass: bool) {
        if self.bypass != bypass {
            self.reset();
        }
        self.bypass = bypass;
    }

    fn name(&self) -> &str {
        "Distortion"
    }
}

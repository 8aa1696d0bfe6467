//! Bit-depth and sample-rate reduction

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{params, wet_dry, Effect};
use crate::domain::audio::{AudioBlock, ProcessSpec};

/// Bit-reducer parameters (normalized)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BitReducerParams {
    pub bit_depth: f32,
    pub crush: f32,
    pub mix: f32,
}

impl Default for BitReducerParams {
    fn default() -> Self {
        Self {
            bit_depth: 1.0,
            crush: 0.0,
            mix: 0.5,
        }
    }
}

/// Per-channel sample-and-hold register
#[derive(Debug, Clone, Copy, Default)]
struct HoldState {
    counter: usize,
    held: f32,
}

/// Quantizer with sample-and-hold decimation
///
/// A fresh sample is quantized every `hold` samples and repeated in
/// between; `hold` is the integer part of the crush factor.
#[derive(Debug)]
pub struct BitReducer {
    bypass: bool,
    params: BitReducerParams,
    step: f32,
    hold: usize,
    state: Vec<HoldState>,
}

impl BitReducer {
    pub fn new() -> Self {
        let defaults = BitReducerParams::default();
        let mut reducer = Self {
            bypass: true,
            params: defaults,
            step: 0.0,
            hold: 1,
            state: Vec::new(),
        };
        reducer.update_coefficients();
        reducer
    }

    /// Set bit depth (normalized, maps to 1..16 bits)
    pub fn set_bit_depth(&mut self, p: f32) {
        self.params.bit_depth = params::normalized(p);
        self.update_coefficients();
    }

    /// Set crush factor (normalized, maps to a 1..32 sample hold)
    pub fn set_crush(&mut self, p: f32) {
        self.params.crush = params::normalized(p);
        self.update_coefficients();
    }

    pub fn set_mix(&mut self, p: f32) {
        self.params.mix = params::normalized(p);
    }

    pub fn bits(&self) -> f32 {
        params::bit_depth(self.params.bit_depth)
    }

    /// Quantization step size
    pub fn step(&self) -> f32 {
        self.step
    }

    /// Samples each quantized value is held for
    pub fn hold_length(&self) -> usize {
        self.hold
    }

    pub fn params(&self) -> BitReducerParams {
        self.params
    }

    pub fn set_params(&mut self, params: BitReducerParams) {
        self.params.bit_depth = params::normalized(params.bit_depth);
        self.params.crush = params::normalized(params.crush);
        self.params.mix = params::normalized(params.mix);
        self.update_coefficients();
    }

    fn update_coefficients(&mut self) {
        self.step = 2.0 / self.bits().exp2();
        self.hold = (params::crush_factor(self.params.crush) as usize).max(1);
        trace!(step = self.step, hold = self.hold, "Bit-reducer updated");
    }

    #[inline]
    fn quantize(&self, x: f32) -> f32 {
        ((x / self.step).floor() * self.step).clamp(-1.0, 1.0 - self.step)
    }
}

impl Default for BitReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for BitReducer {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.state = vec![HoldState::default(); spec.channels];
    }

    fn process(&mut self, block: &mut AudioBlock) {
        if self.bypass {
            return;
        }
        let mix = self.params.mix;
        let hold = self.hold;
        let channels = block.channels().min(self.state.len());

        for ch in 0..channels {
            let mut state = self.state[ch];
            // the hold length may have shrunk since the last block
            if state.counter >= hold {
                state.counter = 0;
            }
            for sample in block.channel_mut(ch) {
                let dry = *sample;
                if state.counter == 0 {
                    state.held = self.quantize(dry);
                }
                state.counter += 1;
                if state.counter >= hold {
                    state.counter = 0;
                }
                *sample = wet_dry(dry, state.held, mix);
            }
            self.state[ch] = state;
        }
    }

    fn reset(&mut self) {
        self.state.fill(HoldState::default());
    }

    fn release(&mut self) {
        self.state = Vec::new();
    }

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
        "BitReducer"
    }
}

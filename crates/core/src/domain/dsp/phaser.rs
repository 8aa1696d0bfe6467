//! Six-stage phaser

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use super::{params, wet_dry, Effect, Lfo};
use crate::domain::audio::{AudioBlock, ProcessSpec};

/// Number of allpass stages in the cascade
pub const STAGES: usize = 6;
/// Break frequency at the centre of the sweep (Hz)
pub const CENTRE_HZ: f32 = 1300.0;
/// Sweep half-width at full depth (octaves)
pub const SWEEP_OCTAVES: f32 = 2.0;

const DEFAULT_RATE_HZ: f32 = 1.0;

/// Phaser parameters (normalized)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaserParams {
    pub rate: f32,
    pub depth: f32,
    pub feedback: f32,
    pub mix: f32,
}

impl Default for PhaserParams {
    fn default() -> Self {
        Self {
            rate: (DEFAULT_RATE_HZ - params::PHASER_RATE_MIN) / params::PHASER_RATE_SPAN,
            depth: 0.5,
            feedback: 0.0,
            mix: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PhaserChannel {
    stages: [f32; STAGES],
    last_wet: f32,
    lfo: Lfo,
}

/// LFO-swept cascade of first-order TPT allpass filters
///
/// All stages share one break frequency per sample, which moves
/// exponentially around [`CENTRE_HZ`].
#[derive(Debug)]
pub struct Phaser {
    bypass: bool,
    sample_rate: f32,
    params: PhaserParams,
    rate_hz: f32,
    feedback: f32,
    channels: Vec<PhaserChannel>,
}

impl Phaser {
    pub fn new() -> Self {
        let defaults = PhaserParams::default();
        Self {
            bypass: true,
            sample_rate: 48_000.0,
            params: defaults,
            rate_hz: params::phaser_rate_hz(defaults.rate),
            feedback: params::modulation_feedback(defaults.feedback),
            channels: Vec::new(),
        }
    }

    /// Set LFO rate (normalized, maps to 0.1..10 Hz)
    pub fn set_rate(&mut self, p: f32) {
        self.params.rate = params::normalized(p);
        self.rate_hz = params::phaser_rate_hz(p);
    }

    pub fn set_depth(&mut self, p: f32) {
        self.params.depth = params::normalized(p);
    }

    /// Set feedback (normalized, maps to 0..0.9)
    pub fn set_feedback(&mut self, p: f32) {
        self.params.feedback = params::normalized(p);
        self.feedback = params::modulation_feedback(p);
    }

    pub fn set_mix(&mut self, p: f32) {
        self.params.mix = params::normalized(p);
    }

    pub fn rate_hz(&self) -> f32 {
        self.rate_hz
    }

    pub fn params(&self) -> PhaserParams {
        self.params
    }

    pub fn set_params(&mut self, params: PhaserParams) {
        self.set_rate(params.rate);
        self.set_depth(params.depth);
        self.set_feedback(params.feedback);
        self.set_mix(params.mix);
    }

    /// Allpass gain factor `G = g / (1 + g)` for a given LFO value
    #[inline]
    fn stage_gain(&self, lfo: f32) -> f32 {
        let octaves = SWEEP_OCTAVES * self.params.depth * lfo;
        let freq = (CENTRE_HZ * octaves.exp2()).min(0.49 * self.sample_rate);
        let g = (PI * freq / self.sample_rate).tan();
        g / (1.0 + g)
    }
}

impl Default for Phaser {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Phaser {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate_f32();
        self.channels = vec![PhaserChannel::default(); spec.channels];
    }

    fn process(&mut self, block: &mut AudioBlock) {
        if self.bypass {
            return;
        }
        let mix = self.params.mix;
        let feedback = self.feedback;
        let channels = block.channels().min(self.channels.len());

        for ch in 0..channels {
            let mut state = self.channels[ch];
            for sample in block.channel_mut(ch) {
                let dry = *sample;
                let lfo = state.lfo.advance(self.rate_hz, self.sample_rate);
                let gain = self.stage_gain(lfo);

                let mut x = dry + feedback * state.last_wet;
                for s in state.stages.iter_mut() {
                    let v = (x - *s) * gain;
                    let lp = v + *s;
                    *s = lp + v;
                    x = 2.0 * lp - x;
                }
                state.last_wet = x;
                *sample = wet_dry(dry, x, mix);
            }
            self.channels[ch] = state;
        }
    }

    fn reset(&mut self) {
        self.channels.fill(PhaserChannel::default());
    }

    fn release(&mut self) {
        self.channels = Vec::new();
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
        "Phaser"
    }
}

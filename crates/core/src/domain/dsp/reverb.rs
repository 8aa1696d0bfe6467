//! Freeverb-style reverb
//!
//! Eight damped lowpass-feedback comb filters in parallel feed four
//! Schroeder allpasses in series. Tunings are the classic 44.1 kHz values,
//! rescaled to the session rate. Odd channels use slightly longer lines so
//! a stereo pair decorrelates.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{params, wet_dry, Effect};
use crate::domain::audio::{AudioBlock, ProcessSpec};

const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;
const TUNING_RATE: f32 = 44_100.0;

const INPUT_GAIN: f32 = 0.015;
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;
const DAMP_SCALE: f32 = 0.4;
const ALLPASS_FEEDBACK: f32 = 0.5;
const WET_SCALE: f32 = 3.0;

/// Reverb parameters (normalized)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbParams {
    pub room_size: f32,
    pub damping: f32,
    pub mix: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            room_size: 0.8,
            damping: 0.5,
            mix: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f32>,
    index: usize,
    store: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
            store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.index];
        self.store = output * (1.0 - damp) + self.store * damp;
        self.buffer[self.index] = input + self.store * feedback;
        self.index += 1;
        if self.index == self.buffer.len() {
            self.index = 0;
        }
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
        self.store = 0.0;
    }
}

#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f32>,
    index: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = input + buffered * ALLPASS_FEEDBACK;
        self.index += 1;
        if self.index == self.buffer.len() {
            self.index = 0;
        }
        buffered - input
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

#[derive(Debug, Clone)]
struct ReverbChannel {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
}

impl ReverbChannel {
    fn new(sample_rate: f32, spread: usize) -> Self {
        let scale = |len: usize| ((len + spread) as f32 * sample_rate / TUNING_RATE).round() as usize;
        Self {
            combs: COMB_TUNINGS.iter().map(|&len| Comb::new(scale(len))).collect(),
            allpasses: ALLPASS_TUNINGS
                .iter()
                .map(|&len| Allpass::new(scale(len)))
                .collect(),
        }
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(Comb::clear);
        self.allpasses.iter_mut().for_each(Allpass::clear);
    }
}

/// Freeverb reverb, one tank per channel
#[derive(Debug)]
pub struct Reverb {
    bypass: bool,
    params: ReverbParams,
    feedback: f32,
    damp: f32,
    channels: Vec<ReverbChannel>,
}

impl Reverb {
    pub fn new() -> Self {
        let mut reverb = Self {
            bypass: true,
            params: ReverbParams::default(),
            feedback: 0.0,
            damp: 0.0,
            channels: Vec::new(),
        };
        reverb.update_coefficients();
        reverb
    }

    pub fn set_room_size(&mut self, p: f32) {
        self.params.room_size = params::normalized(p);
        self.update_coefficients();
    }

    pub fn set_damping(&mut self, p: f32) {
        self.params.damping = params::normalized(p);
        self.update_coefficients();
    }

    pub fn set_mix(&mut self, p: f32) {
        self.params.mix = params::normalized(p);
    }

    /// Comb feedback derived from the room size
    pub fn comb_feedback(&self) -> f32 {
        self.feedback
    }

    pub fn params(&self) -> ReverbParams {
        self.params
    }

    pub fn set_params(&mut self, params: ReverbParams) {
        self.params.room_size = params::normalized(params.room_size);
        self.params.damping = params::normalized(params.damping);
        self.params.mix = params::normalized(params.mix);
        self.update_coefficients();
    }

    fn update_coefficients(&mut self) {
        self.feedback = self.params.room_size * ROOM_SCALE + ROOM_OFFSET;
        self.damp = self.params.damping * DAMP_SCALE;
        trace!(feedback = self.feedback, damp = self.damp, "Reverb updated");
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Reverb {
    fn prepare(&mut self, spec: &ProcessSpec) {
        let sample_rate = spec.sample_rate_f32();
        self.channels = (0..spec.channels)
            .map(|ch| {
                let spread = if ch % 2 == 1 { STEREO_SPREAD } else { 0 };
                ReverbChannel::new(sample_rate, spread)
            })
            .collect();
    }

    fn process(&mut self, block: &mut AudioBlock) {
        if self.bypass {
            return;
        }
        let (feedback, damp, mix) = (self.feedback, self.damp, self.params.mix);
        let channels = block.channels().min(self.channels.len());

        for ch in 0..channels {
            let tank = &mut self.channels[ch];
            for sample in block.channel_mut(ch) {
                let dry = *sample;
                let input = dry * INPUT_GAIN;
                let mut acc = 0.0;
                for comb in tank.combs.iter_mut() {
                    acc += comb.process(input, feedback, damp);
                }
                for allpass in tank.allpasses.iter_mut() {
                    acc = allpass.process(acc);
                }
                *sample = wet_dry(dry, acc * WET_SCALE, mix);
            }
        }
    }

    fn reset(&mut self) {
        self.channels.iter_mut().for_each(ReverbChannel::clear);
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
        "Reverb"
    }
}

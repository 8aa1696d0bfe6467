//! Feedback delay

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{params, wet_dry, DelayLine, Effect};
use crate::domain::audio::{AudioBlock, ProcessSpec};

const DEFAULT_TIME_SECS: f32 = 0.5;
const DEFAULT_FEEDBACK: f32 = 0.3;

/// Delay parameters (normalized)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayParams {
    pub time: f32,
    pub feedback: f32,
    pub mix: f32,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            time: DEFAULT_TIME_SECS / params::DELAY_MAX_SECS,
            feedback: DEFAULT_FEEDBACK / params::DELAY_FEEDBACK_MAX,
            mix: 0.5,
        }
    }
}

/// Single-tap feedback delay, one circular line per channel
///
/// The line is read before it is written, so a delay of `D` samples
/// returns exactly the input from `D` samples ago.
#[derive(Debug)]
pub struct Delay {
    bypass: bool,
    sample_rate: f32,
    params: DelayParams,
    delay_samples: usize,
    feedback: f32,
    lines: Vec<DelayLine>,
}

impl Delay {
    pub fn new() -> Self {
        let defaults = DelayParams::default();
        let mut delay = Self {
            bypass: true,
            sample_rate: 48_000.0,
            params: defaults,
            delay_samples: 1,
            feedback: params::delay_feedback(defaults.feedback),
            lines: Vec::new(),
        };
        delay.update_delay_samples();
        delay
    }

    /// Set delay time (normalized, 1.0 = 3 seconds)
    pub fn set_time(&mut self, p: f32) {
        self.params.time = params::normalized(p);
        self.update_delay_samples();
    }

    pub fn set_feedback(&mut self, p: f32) {
        self.params.feedback = params::normalized(p);
        self.feedback = params::delay_feedback(p);
    }

    pub fn set_mix(&mut self, p: f32) {
        self.params.mix = params::normalized(p);
    }

    pub fn time_secs(&self) -> f32 {
        params::delay_time_secs(self.params.time)
    }

    /// Current delay length in samples (never below one)
    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    pub fn params(&self) -> DelayParams {
        self.params
    }

    pub fn set_params(&mut self, params: DelayParams) {
        self.set_time(params.time);
        self.set_feedback(params.feedback);
        self.set_mix(params.mix);
    }

    fn update_delay_samples(&mut self) {
        let samples = (self.time_secs() * self.sample_rate).round() as usize;
        self.delay_samples = samples.max(1);
        trace!(
            time_secs = self.time_secs(),
            delay_samples = self.delay_samples,
            "Delay time updated"
        );
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Delay {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate_f32();
        let max_delay = (params::DELAY_MAX_SECS * self.sample_rate).ceil() as usize + 1;
        self.lines = (0..spec.channels)
            .map(|_| DelayLine::with_max_delay(max_delay))
            .collect();
        self.update_delay_samples();
    }

    fn process(&mut self, block: &mut AudioBlock) {
        if self.bypass {
            return;
        }
        let mix = self.params.mix;
        let feedback = self.feedback;
        let delay = self.delay_samples;
        let channels = block.channels().min(self.lines.len());

        for ch in 0..channels {
            let line = &mut self.lines[ch];
            for sample in block.channel_mut(ch) {
                let x = *sample;
                let delayed = line.read(delay);
                line.write(x + feedback * delayed);
                *sample = wet_dry(x, delayed, mix);
            }
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
    }

    fn release(&mut self) {
        self.lines = Vec::new();
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
        "Delay"
    }
}

//! Modulated-delay chorus

use serde::{Deserialize, Serialize};

use super::{params, wet_dry, DelayLine, Effect, Lfo};
use crate::domain::audio::{AudioBlock, ProcessSpec};

/// Centre of the modulated read tap (ms)
pub const CENTRE_DELAY_MS: f32 = 7.0;
/// Tap excursion at full depth (ms)
pub const MOD_DEPTH_MS: f32 = 5.0;
/// LFO phase offset between adjacent channels (cycles)
pub const CHANNEL_PHASE_OFFSET: f32 = 0.25;

const DEFAULT_RATE_HZ: f32 = 1.0;

/// Chorus parameters (normalized)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChorusParams {
    pub rate: f32,
    pub depth: f32,
    pub feedback: f32,
    pub mix: f32,
}

impl Default for ChorusParams {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE_HZ / params::CHORUS_RATE_MAX,
            depth: 0.25,
            feedback: 0.0,
            mix: 0.5,
        }
    }
}

/// Chorus built on a linearly interpolated delay line per channel
#[derive(Debug)]
pub struct Chorus {
    bypass: bool,
    sample_rate: f32,
    params: ChorusParams,
    rate_hz: f32,
    feedback: f32,
    lines: Vec<DelayLine>,
    lfos: Vec<Lfo>,
}

impl Chorus {
    pub fn new() -> Self {
        let defaults = ChorusParams::default();
        Self {
            bypass: true,
            sample_rate: 48_000.0,
            params: defaults,
            rate_hz: params::chorus_rate_hz(defaults.rate),
            feedback: params::modulation_feedback(defaults.feedback),
            lines: Vec::new(),
            lfos: Vec::new(),
        }
    }

    /// Set LFO rate (normalized, maps to 0..10 Hz)
    pub fn set_rate(&mut self, p: f32) {
        self.params.rate = params::normalized(p);
        self.rate_hz = params::chorus_rate_hz(p);
    }

    pub fn set_depth(&mut self, p: f32) {
        self.params.depth = params::normalized(p);
    }

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

    pub fn params(&self) -> ChorusParams {
        self.params
    }

    pub fn set_params(&mut self, params: ChorusParams) {
        self.set_rate(params.rate);
        self.set_depth(params.depth);
        self.set_feedback(params.feedback);
        self.set_mix(params.mix);
    }

    fn initial_phase(channel: usize) -> f32 {
        channel as f32 * CHANNEL_PHASE_OFFSET
    }
}

impl Default for Chorus {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Chorus {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate_f32();
        let max_ms = CENTRE_DELAY_MS + MOD_DEPTH_MS;
        let max_delay = (max_ms * 0.001 * self.sample_rate).ceil() as usize + 2;
        self.lines = (0..spec.channels)
            .map(|_| DelayLine::with_max_delay(max_delay))
            .collect();
        self.lfos = (0..spec.channels)
            .map(|ch| Lfo::with_phase(Self::initial_phase(ch)))
            .collect();
    }

    fn process(&mut self, block: &mut AudioBlock) {
        if self.bypass {
            return;
        }
        let ms_to_samples = 0.001 * self.sample_rate;
        let depth = self.params.depth;
        let mix = self.params.mix;
        let feedback = self.feedback;
        let channels = block.channels().min(self.lines.len());

        for ch in 0..channels {
            let line = &mut self.lines[ch];
            let lfo = &mut self.lfos[ch];
            for sample in block.channel_mut(ch) {
                let dry = *sample;
                let m = lfo.advance(self.rate_hz, self.sample_rate);
                let tap_ms = CENTRE_DELAY_MS + depth * MOD_DEPTH_MS * m;
                let wet = line.read_fractional(tap_ms * ms_to_samples);
                line.write(dry + feedback * wet);
                *sample = wet_dry(dry, wet, mix);
            }
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
        for (ch, lfo) in self.lfos.iter_mut().enumerate() {
            lfo.reset_to(Self::initial_phase(ch));
        }
    }

    fn release(&mut self) {
        self.lines = Vec::new();
        self.lfos = Vec::new();
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
        "Chorus"
    }
}

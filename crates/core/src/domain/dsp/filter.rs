//! Resonant multimode filter
//!
//! Topology-preserving-transform state-variable filter (Zavalishin). The
//! trapezoidal integrators keep the response stable while the cutoff is
//! swept from the control surface.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use tracing::trace;

use super::{params, Effect};
use crate::domain::audio::{AudioBlock, ProcessSpec};

/// Lower edge of the lowpass/bandpass cutoff sweep (Hz)
pub const LP_CUTOFF_MIN_HZ: f32 = 100.0;
/// Ratio between the top and bottom of the lowpass/bandpass sweep
pub const LP_CUTOFF_SPAN: f32 = 200.0;
/// Lower edge of the highpass cutoff sweep (Hz)
pub const HP_CUTOFF_MIN_HZ: f32 = 20.0;
/// Ratio between the top and bottom of the highpass sweep
pub const HP_CUTOFF_SPAN: f32 = 500.0;

const DEFAULT_RESONANCE: f32 = 1.0;
const DEFAULT_GAIN: f32 = 1.0;

/// Filter response type
///
/// The integer codes are the ones carried by the control surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    LowPass,
    HighPass,
    BandPass,
}

impl FilterMode {
    pub const ALL: [FilterMode; 3] = [Self::LowPass, Self::HighPass, Self::BandPass];

    pub fn code(self) -> u8 {
        match self {
            Self::LowPass => 0,
            Self::HighPass => 1,
            Self::BandPass => 2,
        }
    }

    /// Decode a control code; unknown codes fall back to lowpass
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::HighPass,
            2 => Self::BandPass,
            _ => Self::LowPass,
        }
    }

    /// Map a normalized cutoff to Hz for this mode
    ///
    /// Lowpass and bandpass sweep upward from 100 Hz to 20 kHz; highpass
    /// sweeps downward from 10 kHz to 20 Hz so that raising the control
    /// always opens the filter.
    pub fn cutoff_hz(self, p: f32) -> f32 {
        let p = params::normalized(p);
        match self {
            Self::LowPass | Self::BandPass => LP_CUTOFF_MIN_HZ * LP_CUTOFF_SPAN.powf(p),
            Self::HighPass => HP_CUTOFF_MIN_HZ * HP_CUTOFF_SPAN.powf(1.0 - p),
        }
    }
}

/// Filter parameters (normalized, plus the mode)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub cutoff: f32,
    pub resonance: f32,
    pub gain: f32,
    pub mode: FilterMode,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            cutoff: 0.5,
            resonance: (DEFAULT_RESONANCE - params::RESONANCE_MIN) / params::RESONANCE_SPAN,
            gain: (DEFAULT_GAIN - params::FILTER_GAIN_MIN) / params::FILTER_GAIN_SPAN,
            mode: FilterMode::LowPass,
        }
    }
}

/// Integrator state of one channel
#[derive(Debug, Clone, Copy, Default)]
struct SvfState {
    ic1eq: f32,
    ic2eq: f32,
}

/// State-variable filter with post gain
#[derive(Debug)]
pub struct Filter {
    bypass: bool,
    sample_rate: f32,
    params: FilterParams,
    cutoff_hz: f32,
    resonance: f32,
    gain: f32,
    a1: f32,
    a2: f32,
    a3: f32,
    k: f32,
    state: Vec<SvfState>,
}

impl Filter {
    pub fn new() -> Self {
        let defaults = FilterParams::default();
        let mut filter = Self {
            bypass: true,
            sample_rate: 48_000.0,
            params: defaults,
            cutoff_hz: 0.0,
            resonance: params::filter_resonance(defaults.resonance),
            gain: params::filter_gain(defaults.gain),
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            k: 0.0,
            state: Vec::new(),
        };
        filter.update_coefficients();
        filter
    }

    /// Set cutoff (normalized; the sweep direction depends on the mode)
    pub fn set_cutoff(&mut self, p: f32) {
        self.params.cutoff = params::normalized(p);
        self.update_coefficients();
    }

    /// Set resonance (normalized, maps to 0.5..10)
    pub fn set_resonance(&mut self, p: f32) {
        self.params.resonance = params::normalized(p);
        self.resonance = params::filter_resonance(p);
        self.update_coefficients();
    }

    /// Set post-filter gain (normalized, maps to 0.1..2.0)
    pub fn set_gain(&mut self, p: f32) {
        self.params.gain = params::normalized(p);
        self.gain = params::filter_gain(p);
    }

    /// Change the response type
    ///
    /// The stored normalized cutoff is re-mapped through the new mode's
    /// sweep and the integrators are cleared.
    pub fn set_mode(&mut self, mode: FilterMode) {
        if self.params.mode == mode {
            return;
        }
        self.params.mode = mode;
        self.update_coefficients();
        self.reset();
    }

    pub fn mode(&self) -> FilterMode {
        self.params.mode
    }

    /// Effective cutoff in Hz after clamping to the sample rate
    pub fn cutoff_hz(&self) -> f32 {
        self.cutoff_hz
    }

    pub fn resonance(&self) -> f32 {
        self.resonance
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn params(&self) -> FilterParams {
        self.params
    }

    pub fn set_params(&mut self, params: FilterParams) {
        self.set_mode(params.mode);
        self.set_cutoff(params.cutoff);
        self.set_resonance(params.resonance);
        self.set_gain(params.gain);
    }

    fn update_coefficients(&mut self) {
        let nyquist_guard = 0.49 * self.sample_rate;
        self.cutoff_hz = self
            .params
            .mode
            .cutoff_hz(self.params.cutoff)
            .clamp(HP_CUTOFF_MIN_HZ, nyquist_guard);

        let g = (PI * self.cutoff_hz / self.sample_rate).tan();
        self.k = 1.0 / self.resonance;
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;

        trace!(
            mode = ?self.params.mode,
            cutoff_hz = self.cutoff_hz,
            resonance = self.resonance,
            "Filter coefficients updated"
        );
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Filter {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate_f32();
        self.state = vec![SvfState::default(); spec.channels];
        self.update_coefficients();
    }

    fn process(&mut self, block: &mut AudioBlock) {
        if self.bypass {
            return;
        }
        let (a1, a2, a3, k) = (self.a1, self.a2, self.a3, self.k);
        let mode = self.params.mode;
        let gain = self.gain;
        let channels = block.channels().min(self.state.len());

        for ch in 0..channels {
            let mut s = self.state[ch];
            for sample in block.channel_mut(ch) {
                let v0 = *sample;
                let v3 = v0 - s.ic2eq;
                let v1 = a1 * s.ic1eq + a2 * v3;
                let v2 = s.ic2eq + a2 * s.ic1eq + a3 * v3;
                s.ic1eq = 2.0 * v1 - s.ic1eq;
                s.ic2eq = 2.0 * v2 - s.ic2eq;

                let y = match mode {
                    FilterMode::LowPass => v2,
                    FilterMode::BandPass => v1,
                    FilterMode::HighPass => v0 - k * v1 - v2,
                };
                *sample = y * gain;
            }
            self.state[ch] = s;
        }
    }

    fn reset(&mut self) {
        self.state.fill(SvfState::default());
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
        "Filter"
    }
}

//! Digital Signal Processing effects for the Modular Radio signal path
//!
//! This module provides the seven effect units driven by the
//! [`EffectChain`](crate::domain::chain::EffectChain):
//! - Phaser (LFO-swept allpass cascade)
//! - Delay (feedback delay line)
//! - Chorus (modulated fractional delay)
//! - Distortion (tanh waveshaper)
//! - Reverb (Freeverb-style comb/allpass tank)
//! - Filter (state-variable LP/HP/BP)
//! - Bit-Reducer (quantizer with sample-and-hold decimation)
//!
//! All effects are designed for:
//! - Zero allocations in the hot path (buffers are sized in `prepare`)
//! - Normalized `[0, 1]` parameter inputs, clamped rather than rejected
//! - Clearing internal state on every bypass transition

use crate::domain::audio::{AudioBlock, ProcessSpec};

pub mod bit_reducer;
pub mod chorus;
pub mod delay;
pub mod distortion;
pub mod filter;
pub mod phaser;
pub mod reverb;

pub use bit_reducer::{BitReducer, BitReducerParams};
pub use chorus::{Chorus, ChorusParams};
pub use delay::{Delay, DelayParams};
pub use distortion::{Distortion, DistortionParams};
pub use filter::{Filter, FilterMode, FilterParams};
pub use phaser::{Phaser, PhaserParams};
pub use reverb::{Reverb, ReverbParams};

/// Core trait for all audio effects
///
/// All effects process planar blocks in place, with samples normalized to
/// [-1.0, 1.0].
pub trait Effect: Send {
    /// Size internal buffers for the session
    ///
    /// Called outside the audio callback; may allocate.
    fn prepare(&mut self, spec: &ProcessSpec);

    /// Process the active region of a block in-place
    ///
    /// # Requirements
    /// - No allocations
    /// - Channels beyond the prepared count are left untouched
    fn process(&mut self, block: &mut AudioBlock);

    /// Reset effect state to silence
    ///
    /// Clears delay lines, filter memory and modulation phases. Parameters
    /// are left as they are.
    fn reset(&mut self);

    /// Free the buffers allocated in `prepare`
    fn release(&mut self);

    /// Check if effect is bypassed
    fn is_bypassed(&self) -> bool;

    /// Change bypass state; any transition flushes internal state
    fn set_bypass(&mut self, bypass: bool);

    /// Get effect name for debugging/display
    fn name(&self) -> &str;
}

/// Parameter ranges and normalized-to-engineering mappings
///
/// Every external value passes through [`normalized`](params::normalized)
/// first, so out-of-range input (including NaN) is corrected, never rejected.
pub mod params {
    /// Phaser LFO range (Hz)
    pub const PHASER_RATE_MIN: f32 = 0.1;
    pub const PHASER_RATE_SPAN: f32 = 9.9;

    /// Longest delay time (seconds)
    pub const DELAY_MAX_SECS: f32 = 3.0;
    pub const DELAY_FEEDBACK_MAX: f32 = 0.95;

    /// Chorus LFO top speed (Hz)
    pub const CHORUS_RATE_MAX: f32 = 10.0;

    /// Feedback ceiling for the modulation effects
    pub const MODULATION_FEEDBACK_MAX: f32 = 0.9;

    /// Distortion drive multiplier range (1x to 11x)
    pub const DRIVE_MIN: f32 = 1.0;
    pub const DRIVE_SPAN: f32 = 10.0;

    /// Filter resonance range
    pub const RESONANCE_MIN: f32 = 0.5;
    pub const RESONANCE_SPAN: f32 = 9.5;

    /// Filter output gain range
    pub const FILTER_GAIN_MIN: f32 = 0.1;
    pub const FILTER_GAIN_SPAN: f32 = 1.9;

    /// Bit depth range (bits)
    pub const BIT_DEPTH_MIN: f32 = 1.0;
    pub const BIT_DEPTH_SPAN: f32 = 15.0;

    /// Sample-rate reduction range (hold length in samples)
    pub const CRUSH_MIN: f32 = 1.0;
    pub const CRUSH_SPAN: f32 = 31.0;

    /// Clamp to [0, 1]; NaN becomes 0
    #[inline]
    pub fn normalized(p: f32) -> f32 {
        if p.is_nan() {
            0.0
        } else {
            p.clamp(0.0, 1.0)
        }
    }

    pub fn phaser_rate_hz(p: f32) -> f32 {
        PHASER_RATE_MIN + normalized(p) * PHASER_RATE_SPAN
    }

    pub fn delay_time_secs(p: f32) -> f32 {
        (normalized(p) * DELAY_MAX_SECS).clamp(0.0, DELAY_MAX_SECS)
    }

    pub fn delay_feedback(p: f32) -> f32 {
        (normalized(p) * DELAY_FEEDBACK_MAX).clamp(0.0, DELAY_FEEDBACK_MAX)
    }

    pub fn chorus_rate_hz(p: f32) -> f32 {
        normalized(p) * CHORUS_RATE_MAX
    }

    pub fn modulation_feedback(p: f32) -> f32 {
        normalized(p) * MODULATION_FEEDBACK_MAX
    }

    pub fn distortion_drive(p: f32) -> f32 {
        DRIVE_MIN + normalized(p) * DRIVE_SPAN
    }

    pub fn filter_resonance(p: f32) -> f32 {
        RESONANCE_MIN + normalized(p) * RESONANCE_SPAN
    }

    pub fn filter_gain(p: f32) -> f32 {
        FILTER_GAIN_MIN + normalized(p) * FILTER_GAIN_SPAN
    }

    pub fn bit_depth(p: f32) -> f32 {
        BIT_DEPTH_MIN + normalized(p) * BIT_DEPTH_SPAN
    }

    pub fn crush_factor(p: f32) -> f32 {
        CRUSH_MIN + normalized(p) * CRUSH_SPAN
    }
}

/// Blend dry and processed signal
#[inline]
pub fn wet_dry(dry: f32, wet: f32, mix: f32) -> f32 {
    dry * (1.0 - mix) + wet * mix
}

// ============================================================================
// DELAY LINE (shared by Delay and Chorus)
// ============================================================================

/// Circular delay line, read before write
///
/// A line of length `L` can be read at delays `1..=L` samples.
#[derive(Debug, Clone, Default)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write: usize,
}

impl DelayLine {
    /// Allocate a line able to delay by up to `max_delay` samples
    pub fn with_max_delay(max_delay: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay.max(1)],
            write: 0,
        }
    }

    /// Longest readable delay in samples
    pub fn max_delay(&self) -> usize {
        self.buffer.len()
    }

    /// Sample written `delay` samples ago (clamped to `1..=max_delay`)
    #[inline]
    pub fn read(&self, delay: usize) -> f32 {
        let len = self.buffer.len();
        if len == 0 {
            return 0.0;
        }
        let delay = delay.clamp(1, len);
        self.buffer[(self.write + len - delay) % len]
    }

    /// Linearly interpolated read at a fractional delay
    #[inline]
    pub fn read_fractional(&self, delay: f32) -> f32 {
        let len = self.buffer.len();
        if len < 2 {
            return self.read(1);
        }
        let delay = delay.clamp(1.0, (len - 1) as f32);
        let whole = delay.floor();
        let frac = delay - whole;
        let a = self.read(whole as usize);
        let b = self.read(whole as usize + 1);
        a + frac * (b - a)
    }

    #[inline]
    pub fn write(&mut self, sample: f32) {
        let len = self.buffer.len();
        if len == 0 {
            return;
        }
        self.buffer[self.write] = sample;
        self.write = (self.write + 1) % len;
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write = 0;
    }
}

// ============================================================================
// LFO
// ============================================================================

/// Sine low-frequency oscillator (phase in cycles, [0, 1))
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Lfo {
    phase: f32,
}

impl Lfo {
    pub fn with_phase(phase: f32) -> Self {
        Self {
            phase: phase.rem_euclid(1.0),
        }
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Current value in [-1, 1], then advance by one sample
    #[inline]
    pub fn advance(&mut self, freq_hz: f32, sample_rate: f32) -> f32 {
        let value = (self.phase * std::f32::consts::TAU).sin();
        self.phase += freq_hz / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        value
    }

    pub fn reset_to(&mut self, phase: f32) {
        self.phase = phase.rem_euclid(1.0);
    }
}

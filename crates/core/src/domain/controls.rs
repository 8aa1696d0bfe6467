//! Cross-thread control surface
//!
//! The UI (or any automation thread) writes plain scalar values into a
//! shared [`ControlSurface`]; the audio thread polls them once per block
//! through a [`ControlReader`] and forwards only the values that changed.
//!
//! All loads and stores are `Relaxed`. A value read mid-update lands one
//! block later, which is inaudible for controls that move at human speed.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::domain::chain::{EffectChain, EffectKind, ParamId};
use crate::domain::dsp::{params, FilterMode};
use crate::domain::pitch::MAX_SEMITONES;

/// Master output gain applied after the chain
pub const DEFAULT_MASTER_GAIN: f32 = 0.7;

#[derive(Debug)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Lock-free parameter store shared between threads
///
/// Setters clamp their input the same way the chain does, so the surface
/// never holds a value the chain would reject.
#[derive(Debug)]
pub struct ControlSurface {
    params: [AtomicF32; ParamId::COUNT],
    bypass: [AtomicBool; EffectKind::COUNT],
    filter_mode: AtomicU8,
    pitch_semitones: AtomicF32,
    master_gain: AtomicF32,
}

impl ControlSurface {
    /// Surface mirroring a default chain: every effect bypassed
    pub fn new() -> Self {
        Self::from_chain(&EffectChain::new())
    }

    /// Surface initialised from a chain's current settings
    pub fn from_chain(chain: &EffectChain) -> Self {
        Self {
            params: std::array::from_fn(|i| AtomicF32::new(chain.parameter(ParamId::ALL[i]))),
            bypass: std::array::from_fn(|i| {
                AtomicBool::new(chain.is_bypassed(EffectKind::ORDER[i]))
            }),
            filter_mode: AtomicU8::new(chain.filter_mode().code()),
            pitch_semitones: AtomicF32::new(0.0),
            master_gain: AtomicF32::new(DEFAULT_MASTER_GAIN),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Set a normalized parameter (clamped to [0, 1], NaN becomes 0)
    pub fn set_param(&self, id: ParamId, value: f32) {
        self.params[id.index()].store(params::normalized(value));
    }

    pub fn param(&self, id: ParamId) -> f32 {
        self.params[id.index()].load()
    }

    pub fn set_bypass(&self, kind: EffectKind, bypass: bool) {
        self.bypass[kind.index()].store(bypass, Ordering::Relaxed);
    }

    pub fn is_bypassed(&self, kind: EffectKind) -> bool {
        self.bypass[kind.index()].load(Ordering::Relaxed)
    }

    pub fn set_filter_mode(&self, mode: FilterMode) {
        self.filter_mode.store(mode.code(), Ordering::Relaxed);
    }

    pub fn filter_mode(&self) -> FilterMode {
        FilterMode::from_code(self.filter_mode.load(Ordering::Relaxed))
    }

    /// Set the pitch in semitones (clamped to ±12)
    pub fn set_pitch_semitones(&self, semitones: f32) {
        let st = if semitones.is_nan() {
            0.0
        } else {
            semitones.clamp(-MAX_SEMITONES, MAX_SEMITONES)
        };
        self.pitch_semitones.store(st);
    }

    pub fn pitch_semitones(&self) -> f32 {
        self.pitch_semitones.load()
    }

    /// Set the master gain (clamped to [0, 1])
    pub fn set_master_gain(&self, gain: f32) {
        self.master_gain.store(params::normalized(gain));
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain.load()
    }
}

impl Default for ControlSurface {
    fn default() -> Self {
        Self::new()
    }
}

/// Values read from the surface that are not chain settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlUpdate {
    /// New pitch target, if it changed since the last poll
    pub pitch_semitones: Option<f32>,
    pub master_gain: f32,
}

/// Audio-thread side of the control surface
///
/// Remembers the last value forwarded for every control and only calls
/// chain setters on change, so coefficient updates and bypass flushes
/// happen at most once per edit.
#[derive(Debug)]
pub struct ControlReader {
    surface: Arc<ControlSurface>,
    params: [f32; ParamId::COUNT],
    bypass: [bool; EffectKind::COUNT],
    filter_mode: FilterMode,
    pitch_semitones: f32,
}

impl ControlReader {
    pub fn new(surface: Arc<ControlSurface>) -> Self {
        Self {
            params: std::array::from_fn(|i| surface.param(ParamId::ALL[i])),
            bypass: std::array::from_fn(|i| surface.is_bypassed(EffectKind::ORDER[i])),
            filter_mode: surface.filter_mode(),
            pitch_semitones: surface.pitch_semitones(),
            surface,
        }
    }

    pub fn surface(&self) -> &Arc<ControlSurface> {
        &self.surface
    }

    /// Push every surface value into the chain, changed or not
    pub fn sync_all(&mut self, chain: &mut EffectChain) -> ControlUpdate {
        chain.set_filter_mode(self.surface.filter_mode());
        for id in ParamId::ALL {
            let value = self.surface.param(id);
            chain.set_parameter(id, value);
            self.params[id.index()] = value;
        }
        for kind in EffectKind::ORDER {
            let bypass = self.surface.is_bypassed(kind);
            chain.set_bypass(kind, bypass);
            self.bypass[kind.index()] = bypass;
        }
        self.filter_mode = chain.filter_mode();
        self.pitch_semitones = self.surface.pitch_semitones();
        ControlUpdate {
            pitch_semitones: Some(self.pitch_semitones),
            master_gain: self.surface.master_gain(),
        }
    }

    /// Read the pitch target now and treat it as forwarded
    pub fn latch_pitch(&mut self) -> f32 {
        self.pitch_semitones = self.surface.pitch_semitones();
        self.pitch_semitones
    }

    /// Forward changed values into the chain
    ///
    /// Called once per block on the audio thread; never allocates.
    pub fn apply(&mut self, chain: &mut EffectChain) -> ControlUpdate {
        // mode first: it re-maps the stored cutoff
        let mode = self.surface.filter_mode();
        if mode != self.filter_mode {
            chain.set_filter_mode(mode);
            self.filter_mode = mode;
        }

        for id in ParamId::ALL {
            let value = self.surface.param(id);
            let last = &mut self.params[id.index()];
            if value.to_bits() != last.to_bits() {
                trace!(param = %id, value, "Control changed");
                chain.set_parameter(id, value);
                *last = value;
            }
        }

        for kind in EffectKind::ORDER {
            let bypass = self.surface.is_bypassed(kind);
            let last = &mut self.bypass[kind.index()];
            if bypass != *last {
                chain.set_bypass(kind, bypass);
                *last = bypass;
            }
        }

        let semitones = self.surface.pitch_semitones();
        let pitch_semitones = if semitones.to_bits() != self.pitch_semitones.to_bits() {
            self.pitch_semitones = semitones;
            Some(semitones)
        } else {
            None
        };

        ControlUpdate {
            pitch_semitones,
            master_gain: self.surface.master_gain(),
        }
    }
}

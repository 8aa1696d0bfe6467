//! Fixed-order effect chain
//!
//! The chain owns one instance of every effect unit and always runs them in
//! the same order: Phaser → Delay → Chorus → Distortion → Reverb → Filter →
//! BitReducer. Units are addressed by [`EffectKind`] and their parameters by
//! [`ParamId`]; both are closed enums, so dispatch is a `match`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::domain::audio::{AudioBlock, ProcessSpec};
use crate::domain::dsp::{
    BitReducer, BitReducerParams, Chorus, ChorusParams, Delay, DelayParams, Distortion,
    DistortionParams, Effect, Filter, FilterMode, FilterParams, Phaser, PhaserParams, Reverb,
    ReverbParams,
};

/// Run `$body` once per unit in chain order, `$unit` bound to the field
macro_rules! each_unit {
    ($chain:expr, |$unit:ident| $body:expr) => {{
        let $unit = &mut $chain.phaser;
        $body;
        let $unit = &mut $chain.delay;
        $body;
        let $unit = &mut $chain.chorus;
        $body;
        let $unit = &mut $chain.distortion;
        $body;
        let $unit = &mut $chain.reverb;
        $body;
        let $unit = &mut $chain.filter;
        $body;
        let $unit = &mut $chain.bit_reducer;
        $body;
    }};
}

/// Run `$body` on the unit `$kind` names
macro_rules! with_unit {
    ($chain:expr, $kind:expr, |$unit:ident| $body:expr) => {
        match $kind {
            EffectKind::Phaser => {
                let $unit = &mut $chain.phaser;
                $body
            }
            EffectKind::Delay => {
                let $unit = &mut $chain.delay;
                $body
            }
            EffectKind::Chorus => {
                let $unit = &mut $chain.chorus;
                $body
            }
            EffectKind::Distortion => {
                let $unit = &mut $chain.distortion;
                $body
            }
            EffectKind::Reverb => {
                let $unit = &mut $chain.reverb;
                $body
            }
            EffectKind::Filter => {
                let $unit = &mut $chain.filter;
                $body
            }
            EffectKind::BitReducer => {
                let $unit = &mut $chain.bit_reducer;
                $body
            }
        }
    };
}

/// One of the seven effect units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Phaser,
    Delay,
    Chorus,
    Distortion,
    Reverb,
    Filter,
    BitReducer,
}

impl EffectKind {
    /// Processing order
    pub const ORDER: [EffectKind; 7] = [
        Self::Phaser,
        Self::Delay,
        Self::Chorus,
        Self::Distortion,
        Self::Reverb,
        Self::Filter,
        Self::BitReducer,
    ];

    pub const COUNT: usize = Self::ORDER.len();

    /// Position in [`EffectKind::ORDER`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phaser => "phaser",
            Self::Delay => "delay",
            Self::Chorus => "chorus",
            Self::Distortion => "distortion",
            Self::Reverb => "reverb",
            Self::Filter => "filter",
            Self::BitReducer => "bit_reducer",
        }
    }

    /// Parse a name as used on the command line and in presets
    pub fn parse(name: &str) -> Option<Self> {
        Self::ORDER
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }

    /// Parameters belonging to this unit
    pub fn params(self) -> impl Iterator<Item = ParamId> {
        ParamId::ALL.into_iter().filter(move |p| p.kind() == self)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every normalized parameter exposed by the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamId {
    PhaserRate,
    PhaserDepth,
    PhaserFeedback,
    PhaserMix,
    DelayTime,
    DelayFeedback,
    DelayMix,
    ChorusRate,
    ChorusDepth,
    ChorusFeedback,
    ChorusMix,
    DistortionDrive,
    DistortionMix,
    ReverbRoomSize,
    ReverbDamping,
    ReverbMix,
    FilterCutoff,
    FilterResonance,
    FilterGain,
    BitReducerBitDepth,
    BitReducerCrush,
    BitReducerMix,
}

impl ParamId {
    pub const ALL: [ParamId; 22] = [
        Self::PhaserRate,
        Self::PhaserDepth,
        Self::PhaserFeedback,
        Self::PhaserMix,
        Self::DelayTime,
        Self::DelayFeedback,
        Self::DelayMix,
        Self::ChorusRate,
        Self::ChorusDepth,
        Self::ChorusFeedback,
        Self::ChorusMix,
        Self::DistortionDrive,
        Self::DistortionMix,
        Self::ReverbRoomSize,
        Self::ReverbDamping,
        Self::ReverbMix,
        Self::FilterCutoff,
        Self::FilterResonance,
        Self::FilterGain,
        Self::BitReducerBitDepth,
        Self::BitReducerCrush,
        Self::BitReducerMix,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Dense index, suitable for parameter tables
    pub fn index(self) -> usize {
        self as usize
    }

    /// The unit this parameter belongs to
    pub fn kind(self) -> EffectKind {
        use ParamId::*;
        match self {
            PhaserRate | PhaserDepth | PhaserFeedback | PhaserMix => EffectKind::Phaser,
            DelayTime | DelayFeedback | DelayMix => EffectKind::Delay,
            ChorusRate | ChorusDepth | ChorusFeedback | ChorusMix => EffectKind::Chorus,
            DistortionDrive | DistortionMix => EffectKind::Distortion,
            ReverbRoomSize | ReverbDamping | ReverbMix => EffectKind::Reverb,
            FilterCutoff | FilterResonance | FilterGain => EffectKind::Filter,
            BitReducerBitDepth | BitReducerCrush | BitReducerMix => EffectKind::BitReducer,
        }
    }

    pub fn as_str(self) -> &'static str {
        use ParamId::*;
        match self {
            PhaserRate => "phaser_rate",
            PhaserDepth => "phaser_depth",
            PhaserFeedback => "phaser_feedback",
            PhaserMix => "phaser_mix",
            DelayTime => "delay_time",
            DelayFeedback => "delay_feedback",
            DelayMix => "delay_mix",
            ChorusRate => "chorus_rate",
            ChorusDepth => "chorus_depth",
            ChorusFeedback => "chorus_feedback",
            ChorusMix => "chorus_mix",
            DistortionDrive => "distortion_drive",
            DistortionMix => "distortion_mix",
            ReverbRoomSize => "reverb_room_size",
            ReverbDamping => "reverb_damping",
            ReverbMix => "reverb_mix",
            FilterCutoff => "filter_cutoff",
            FilterResonance => "filter_resonance",
            FilterGain => "filter_gain",
            BitReducerBitDepth => "bit_reducer_bit_depth",
            BitReducerCrush => "bit_reducer_crush",
            BitReducerMix => "bit_reducer_mix",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of every unit's normalized parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParams {
    pub phaser: PhaserParams,
    pub delay: DelayParams,
    pub chorus: ChorusParams,
    pub distortion: DistortionParams,
    pub reverb: ReverbParams,
    pub filter: FilterParams,
    pub bit_reducer: BitReducerParams,
}

/// The effect chain
///
/// Holds the seven units as concrete fields. `process` calls them in a
/// literal sequence; bypassed units return immediately.
#[derive(Debug, Default)]
pub struct EffectChain {
    spec: Option<ProcessSpec>,
    phaser: Phaser,
    delay: Delay,
    chorus: Chorus,
    distortion: Distortion,
    reverb: Reverb,
    filter: Filter,
    bit_reducer: BitReducer,
}

impl EffectChain {
    /// Create a chain with every unit bypassed and at its defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Size every unit for the session
    ///
    /// Repeating the call with the same spec keeps buffers and state.
    pub fn prepare(&mut self, spec: &ProcessSpec) {
        if self.spec.as_ref() == Some(spec) {
            debug!(?spec, "Effect chain already prepared");
            return;
        }
        info!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            max_block = spec.max_block_size,
            "Preparing effect chain"
        );
        each_unit!(self, |unit| unit.prepare(spec));
        self.spec = Some(*spec);
    }

    /// Run the active region of `block` through every enabled unit
    pub fn process(&mut self, block: &mut AudioBlock) {
        if block.is_empty() {
            return;
        }
        self.phaser.process(block);
        self.delay.process(block);
        self.chorus.process(block);
        self.distortion.process(block);
        self.reverb.process(block);
        self.filter.process(block);
        self.bit_reducer.process(block);
    }

    /// Clear all unit state; parameters are kept
    pub fn reset(&mut self) {
        each_unit!(self, |unit| unit.reset());
    }

    /// Free all unit buffers
    pub fn release(&mut self) {
        if self.spec.take().is_some() {
            info!("Releasing effect chain");
        }
        each_unit!(self, |unit| unit.release());
    }

    pub fn spec(&self) -> Option<&ProcessSpec> {
        self.spec.as_ref()
    }

    /// Enable or bypass a unit; a transition flushes its state
    pub fn set_bypass(&mut self, kind: EffectKind, bypass: bool) {
        if self.is_unit_bypassed(kind) != bypass {
            debug!(effect = %kind, bypass, "Bypass changed");
        }
        with_unit!(self, kind, |unit| unit.set_bypass(bypass));
    }

    pub fn is_bypassed(&self, kind: EffectKind) -> bool {
        self.is_unit_bypassed(kind)
    }

    /// Set any parameter from a normalized value
    pub fn set_parameter(&mut self, id: ParamId, value: f32) {
        use ParamId::*;
        match id {
            PhaserRate => self.phaser.set_rate(value),
            PhaserDepth => self.phaser.set_depth(value),
            PhaserFeedback => self.phaser.set_feedback(value),
            PhaserMix => self.phaser.set_mix(value),
            DelayTime => self.delay.set_time(value),
            DelayFeedback => self.delay.set_feedback(value),
            DelayMix => self.delay.set_mix(value),
            ChorusRate => self.chorus.set_rate(value),
            ChorusDepth => self.chorus.set_depth(value),
            ChorusFeedback => self.chorus.set_feedback(value),
            ChorusMix => self.chorus.set_mix(value),
            DistortionDrive => self.distortion.set_drive(value),
            DistortionMix => self.distortion.set_mix(value),
            ReverbRoomSize => self.reverb.set_room_size(value),
            ReverbDamping => self.reverb.set_damping(value),
            ReverbMix => self.reverb.set_mix(value),
            FilterCutoff => self.filter.set_cutoff(value),
            FilterResonance => self.filter.set_resonance(value),
            FilterGain => self.filter.set_gain(value),
            BitReducerBitDepth => self.bit_reducer.set_bit_depth(value),
            BitReducerCrush => self.bit_reducer.set_crush(value),
            BitReducerMix => self.bit_reducer.set_mix(value),
        }
    }

    /// Current normalized value of a parameter
    pub fn parameter(&self, id: ParamId) -> f32 {
        use ParamId::*;
        match id {
            PhaserRate => self.phaser.params().rate,
            PhaserDepth => self.phaser.params().depth,
            PhaserFeedback => self.phaser.params().feedback,
            PhaserMix => self.phaser.params().mix,
            DelayTime => self.delay.params().time,
            DelayFeedback => self.delay.params().feedback,
            DelayMix => self.delay.params().mix,
            ChorusRate => self.chorus.params().rate,
            ChorusDepth => self.chorus.params().depth,
            ChorusFeedback => self.chorus.params().feedback,
            ChorusMix => self.chorus.params().mix,
            DistortionDrive => self.distortion.params().drive,
            DistortionMix => self.distortion.params().mix,
            ReverbRoomSize => self.reverb.params().room_size,
            ReverbDamping => self.reverb.params().damping,
            ReverbMix => self.reverb.params().mix,
            FilterCutoff => self.filter.params().cutoff,
            FilterResonance => self.filter.params().resonance,
            FilterGain => self.filter.params().gain,
            BitReducerBitDepth => self.bit_reducer.params().bit_depth,
            BitReducerCrush => self.bit_reducer.params().crush,
            BitReducerMix => self.bit_reducer.params().mix,
        }
    }

    pub fn set_filter_mode(&mut self, mode: FilterMode) {
        self.filter.set_mode(mode);
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.filter.mode()
    }

    pub fn params(&self) -> ChainParams {
        ChainParams {
            phaser: self.phaser.params(),
            delay: self.delay.params(),
            chorus: self.chorus.params(),
            distortion: self.distortion.params(),
            reverb: self.reverb.params(),
            filter: self.filter.params(),
            bit_reducer: self.bit_reducer.params(),
        }
    }

    pub fn set_params(&mut self, params: &ChainParams) {
        self.phaser.set_params(params.phaser);
        self.delay.set_params(params.delay);
        self.chorus.set_params(params.chorus);
        self.distortion.set_params(params.distortion);
        self.reverb.set_params(params.reverb);
        self.filter.set_params(params.filter);
        self.bit_reducer.set_params(params.bit_reducer);
    }

    /// Kinds of all units currently enabled, in processing order
    pub fn enabled(&self) -> Vec<EffectKind> {
        EffectKind::ORDER
            .into_iter()
            .filter(|&kind| !self.is_bypassed(kind))
            .collect()
    }

    pub fn phaser(&self) -> &Phaser {
        &self.phaser
    }

    pub fn phaser_mut(&mut self) -> &mut Phaser {
        &mut self.phaser
    }

    pub fn delay(&self) -> &Delay {
        &self.delay
    }

    pub fn delay_mut(&mut self) -> &mut Delay {
        &mut self.delay
    }

    pub fn chorus(&self) -> &Chorus {
        &self.chorus
    }

    pub fn chorus_mut(&mut self) -> &mut Chorus {
        &mut self.chorus
    }

    pub fn distortion(&self) -> &Distortion {
        &self.distortion
    }

    pub fn distortion_mut(&mut self) -> &mut Distortion {
        &mut self.distortion
    }

    pub fn reverb(&self) -> &Reverb {
        &self.reverb
    }

    pub fn reverb_mut(&mut self) -> &mut Reverb {
        &mut self.reverb
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut Filter {
        &mut self.filter
    }

    pub fn bit_reducer(&self) -> &BitReducer {
        &self.bit_reducer
    }

    pub fn bit_reducer_mut(&mut self) -> &mut BitReducer {
        &mut self.bit_reducer
    }

    fn is_unit_bypassed(&self, kind: EffectKind) -> bool {
        match kind {
            EffectKind::Phaser => self.phaser.is_bypassed(),
            EffectKind::Delay => self.delay.is_bypassed(),
            EffectKind::Chorus => self.chorus.is_bypassed(),
            EffectKind::Distortion => self.distortion.is_bypassed(),
            EffectKind::Reverb => self.reverb.is_bypassed(),
            EffectKind::Filter => self.filter.is_bypassed(),
            EffectKind::BitReducer => self.bit_reducer.is_bypassed(),
        }
    }
}

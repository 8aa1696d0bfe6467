//! Session sequencing: transport, pitch stage, effect chain and master gain
//!
//! [`Player`] is what a host drives from its audio callback. It owns the
//! pull chain (track → [`PitchShiftStage`] → [`EffectChain`]) and applies
//! the reset policy for every transport operation:
//!
//! | operation    | pitch stage | effect state |
//! |--------------|-------------|--------------|
//! | pause        | kept        | kept (reverb tail resumes) |
//! | stop         | rewound, flushed | flushed |
//! | seek         | flushed, re-primed | flushed |
//! | track change | rebuilt     | flushed, pitch back to 0 st |

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::audio::{AudioBlock, AudioBlockSource, PositionableSource, ProcessSpec};
use crate::domain::chain::EffectChain;
use crate::domain::controls::{ControlReader, ControlSurface};
use crate::domain::pitch::PitchShiftStage;

/// Default channel count for a track loaded before `prepare`
const DEFAULT_CHANNELS: usize = 2;

/// Transport state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Snapshot of playback counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub state: TransportState,
    /// Source frame the next output frame comes from
    pub position: u64,
    pub length: u64,
    /// Output frames rendered while playing
    pub frames_rendered: u64,
    pub underruns: u64,
    pub dropped_frames: u64,
}

/// Real-time player
pub struct Player<S: PositionableSource> {
    spec: Option<ProcessSpec>,
    chain: EffectChain,
    stage: Option<PitchShiftStage<S>>,
    controls: ControlReader,
    transport: TransportState,
    gain: f32,
    frames_rendered: u64,
}

impl<S: PositionableSource> Player<S> {
    /// Create a player driven by `surface`
    pub fn new(surface: Arc<ControlSurface>) -> Self {
        let gain = surface.master_gain();
        Self {
            spec: None,
            chain: EffectChain::new(),
            stage: None,
            controls: ControlReader::new(surface),
            transport: TransportState::Stopped,
            gain,
            frames_rendered: 0,
        }
    }

    /// The surface this player reads its controls from
    pub fn controls(&self) -> Arc<ControlSurface> {
        Arc::clone(self.controls.surface())
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut EffectChain {
        &mut self.chain
    }

    pub fn stage(&self) -> Option<&PitchShiftStage<S>> {
        self.stage.as_ref()
    }

    pub fn spec(&self) -> Option<&ProcessSpec> {
        self.spec.as_ref()
    }

    /// Allocate everything for a session
    pub fn prepare(&mut self, spec: &ProcessSpec) {
        info!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            max_block = spec.max_block_size,
            "Preparing player"
        );
        self.chain.prepare(spec);

        if let Some(stage) = self.stage.take() {
            let mut stage = if stage.channels() == spec.channels {
                stage
            } else {
                PitchShiftStage::new(stage.into_source(), spec.channels)
            };
            stage.prepare(spec.max_block_size, spec.sample_rate);
            self.stage = Some(stage);
        }

        let update = self.controls.sync_all(&mut self.chain);
        if let (Some(stage), Some(st)) = (self.stage.as_mut(), update.pitch_semitones) {
            stage.set_pitch_semitones(st);
        }
        self.gain = update.master_gain;
        self.spec = Some(*spec);
    }

    /// Tear the session down; a later `prepare` starts over
    pub fn release(&mut self) {
        info!("Releasing player");
        if let Some(stage) = self.stage.as_mut() {
            stage.release();
        }
        self.chain.release();
        self.spec = None;
        self.transport = TransportState::Stopped;
    }

    /// Replace the current track
    ///
    /// Builds the new stage here, so this allocates; a running host builds
    /// the stage off the audio thread and calls [`swap_stage`](Self::swap_stage)
    /// instead. The pitch control is set back to 0 semitones before the
    /// swap. Returns the previous track's source.
    pub fn load_track(&mut self, source: S) -> Option<S> {
        let stage = match self.spec {
            Some(spec) => PitchShiftStage::prepared(source, &spec),
            None => PitchShiftStage::new(source, DEFAULT_CHANNELS),
        };
        self.controls.surface().set_pitch_semitones(0.0);
        self.swap_stage(stage).map(|mut previous| {
            previous.release();
            previous.into_source()
        })
    }

    /// Swap in a stage built with [`PitchShiftStage::prepared`]
    ///
    /// The effect chain is flushed, the stage starts at the surface's
    /// current pitch without a ramp, and the transport state is kept, so a
    /// playing player keeps playing the new track. Neither allocates nor
    /// frees: the previous stage is handed back whole.
    pub fn swap_stage(&mut self, mut stage: PitchShiftStage<S>) -> Option<PitchShiftStage<S>> {
        let semitones = self.controls.latch_pitch();
        stage.set_pitch_semitones(semitones);
        stage.snap_pitch();

        let length = stage.length();
        let channels = stage.channels();
        let previous = self.stage.replace(stage);
        self.chain.reset();
        self.frames_rendered = 0;

        info!(length, channels, "Track loaded");
        previous
    }

    /// Remove the current track and stop
    pub fn unload_track(&mut self) -> Option<S> {
        self.transport = TransportState::Stopped;
        self.chain.reset();
        self.take_source()
    }

    fn take_source(&mut self) -> Option<S> {
        self.stage.take().map(|mut stage| {
            stage.release();
            stage.into_source()
        })
    }

    pub fn has_track(&self) -> bool {
        self.stage.is_some()
    }

    pub fn play(&mut self) {
        if self.stage.is_none() {
            debug!("Play ignored: no track loaded");
            return;
        }
        if self.is_finished() {
            self.seek(0);
        }
        self.transport = TransportState::Playing;
        debug!("Playing");
    }

    /// Pause without touching any effect state
    pub fn pause(&mut self) {
        if self.transport == TransportState::Playing {
            self.transport = TransportState::Paused;
            debug!("Paused");
        }
    }

    /// Toggle between playing and paused
    pub fn toggle_play(&mut self) {
        match self.transport {
            TransportState::Playing => self.pause(),
            TransportState::Stopped | TransportState::Paused => self.play(),
        }
    }

    /// Stop, rewind to the start and flush everything
    pub fn stop(&mut self) {
        self.transport = TransportState::Stopped;
        if let Some(stage) = self.stage.as_mut() {
            stage.set_position(0);
        }
        self.chain.reset();
        debug!("Stopped");
    }

    /// Move the read position; the stage re-primes and effects are flushed
    pub fn seek(&mut self, frame: u64) {
        if let Some(stage) = self.stage.as_mut() {
            stage.set_position(frame);
        }
        self.chain.reset();
    }

    pub fn state(&self) -> TransportState {
        self.transport
    }

    pub fn position(&self) -> u64 {
        self.stage.as_ref().map_or(0, |s| s.position())
    }

    pub fn length(&self) -> u64 {
        self.stage.as_ref().map_or(0, |s| s.length())
    }

    /// Whether a non-looping track has been delivered to its end
    pub fn is_finished(&self) -> bool {
        self.stage
            .as_ref()
            .is_some_and(|s| !s.is_looping() && s.position() >= s.length())
    }

    pub fn stats(&self) -> PlayerStats {
        let stage_stats = self.stage.as_ref().map(|s| s.stats()).unwrap_or_default();
        PlayerStats {
            state: self.transport,
            position: self.position(),
            length: self.length(),
            frames_rendered: self.frames_rendered,
            underruns: stage_stats.underruns,
            dropped_frames: stage_stats.dropped_frames,
        }
    }

    /// Fill the active region of `block`
    ///
    /// Silence unless playing. Never allocates.
    pub fn render(&mut self, block: &mut AudioBlock) {
        if self.spec.is_none() {
            block.clear();
            return;
        }

        let update = self.controls.apply(&mut self.chain);
        if let (Some(stage), Some(st)) = (self.stage.as_mut(), update.pitch_semitones) {
            stage.set_pitch_semitones(st);
        }

        let stage = match (self.transport, self.stage.as_mut()) {
            (TransportState::Playing, Some(stage)) => stage,
            _ => {
                block.clear();
                self.gain = update.master_gain;
                return;
            }
        };

        let frames = block.len();
        stage.next_block(block, frames);
        self.chain.process(block);
        block.apply_gain_ramp(self.gain, update.master_gain);
        self.gain = update.master_gain;
        self.frames_rendered += frames as u64;

        if self.is_finished() {
            info!(position = self.position(), "Track finished");
            self.transport = TransportState::Stopped;
        }
    }
}

impl<S: PositionableSource> Default for Player<S> {
    fn default() -> Self {
        Self::new(ControlSurface::shared())
    }
}

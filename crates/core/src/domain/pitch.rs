//! Pitch/tempo shifting source
//!
//! [`PitchShiftStage`] wraps any [`PositionableSource`] and plays it back at
//! a variable rate, like a turntable: `ratio = 2^(semitones / 12)` source
//! frames are consumed per output frame, so pitch and tempo move together.
//!
//! Upstream frames go through a streaming 4-point Hermite interpolator into
//! a [`SampleFifo`], which absorbs the per-pull variation in yield; the host
//! always receives exactly the number of frames it asked for.

use std::fmt;

use tracing::{debug, info, trace};

use crate::domain::audio::{AudioBlock, AudioBlockSource, PositionableSource, ProcessSpec};
use crate::domain::fifo::SampleFifo;

/// Pitch control range (semitones)
pub const MAX_SEMITONES: f32 = 12.0;
pub const MIN_RATIO: f32 = 0.5;
pub const MAX_RATIO: f32 = 2.0;

/// Length of the ramp between pitch settings
pub const PITCH_RAMP_MS: f32 = 5.0;

/// Upper bound on upstream pulls per host request
pub const MAX_FILL_ITERATIONS: usize = 16;

/// Frames of look-ahead the interpolator needs before its first output
pub const RESAMPLER_LATENCY: usize = 2;

/// Map semitones to a playback ratio, clamped to [0.5, 2.0]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    let st = if semitones.is_nan() {
        0.0
    } else {
        semitones.clamp(-MAX_SEMITONES, MAX_SEMITONES)
    };
    (st / 12.0).exp2().clamp(MIN_RATIO, MAX_RATIO)
}

// ============================================================================
// PITCH CONTROL
// ============================================================================

/// Smoothed playback ratio
///
/// A new target is approached linearly over [`PITCH_RAMP_MS`] of output
/// and lands on the target exactly.
#[derive(Debug, Clone)]
pub struct PitchControl {
    semitones: f32,
    target: f32,
    current: f32,
    step: f32,
    remaining: usize,
    ramp_frames: usize,
}

impl PitchControl {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            semitones: 0.0,
            target: 1.0,
            current: 1.0,
            step: 0.0,
            remaining: 0,
            ramp_frames: Self::ramp_frames_for(sample_rate),
        }
    }

    fn ramp_frames_for(sample_rate: u32) -> usize {
        ((PITCH_RAMP_MS * 0.001 * sample_rate as f32).ceil() as usize).max(1)
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.ramp_frames = Self::ramp_frames_for(sample_rate);
    }

    /// Set the target in semitones (clamped to ±12)
    pub fn set_semitones(&mut self, semitones: f32) {
        let target = semitones_to_ratio(semitones);
        self.semitones = if semitones.is_nan() {
            0.0
        } else {
            semitones.clamp(-MAX_SEMITONES, MAX_SEMITONES)
        };
        if target == self.target {
            return;
        }
        self.target = target;
        self.remaining = self.ramp_frames;
        self.step = (target - self.current) / self.ramp_frames as f32;
        trace!(semitones = self.semitones, ratio = target, "Pitch target changed");
    }

    /// Jump straight to the target, skipping the ramp
    pub fn snap(&mut self) {
        self.current = self.target;
        self.remaining = 0;
        self.step = 0.0;
    }

    pub fn semitones(&self) -> f32 {
        self.semitones
    }

    pub fn target_ratio(&self) -> f32 {
        self.target
    }

    pub fn current_ratio(&self) -> f32 {
        self.current
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// Ratio for the next output frame, then advance the ramp
    #[inline]
    pub fn next_ratio(&mut self) -> f32 {
        let ratio = self.current;
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.step
            };
        }
        ratio
    }
}

// ============================================================================
// HERMITE RESAMPLER
// ============================================================================

/// Streaming 4-point, 3rd-order Hermite interpolator
///
/// Interpolates between the middle two points of `[x-1, x0, x1, x2]`; at
/// fractional phase 0 the output is exactly `x0`.
#[derive(Debug, Clone)]
pub struct HermiteResampler {
    history: Vec<[f32; 4]>,
    pushed: usize,
    phase: f64,
}

impl HermiteResampler {
    pub fn new(channels: usize) -> Self {
        Self {
            history: vec![[0.0; 4]; channels.max(1)],
            pushed: 0,
            phase: 0.0,
        }
    }

    pub fn channels(&self) -> usize {
        self.history.len()
    }

    /// Feed one source frame
    pub fn push(&mut self, frame: &[f32]) {
        for (ch, h) in self.history.iter_mut().enumerate() {
            let x = frame.get(ch).copied().unwrap_or(0.0);
            *h = [h[1], h[2], h[3], x];
        }
        self.pushed = self.pushed.saturating_add(1);
        if self.pushed > RESAMPLER_LATENCY + 1 {
            self.phase -= 1.0;
        }
    }

    /// Whether an output frame is available at the current phase
    #[inline]
    pub fn has_output(&self) -> bool {
        self.pushed > RESAMPLER_LATENCY && self.phase < 1.0
    }

    /// Interpolate the current phase into `out`
    #[inline]
    pub fn emit(&self, out: &mut [f32]) {
        let t = self.phase as f32;
        for (y, h) in out.iter_mut().zip(&self.history) {
            *y = Self::interpolate(h, t);
        }
    }

    /// Move the phase forward by `ratio` source frames
    #[inline]
    pub fn advance(&mut self, ratio: f32) {
        self.phase += ratio as f64;
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.history.fill([0.0; 4]);
        self.pushed = 0;
        self.phase = 0.0;
    }

    #[inline]
    fn interpolate(h: &[f32; 4], t: f32) -> f32 {
        let [xm1, x0, x1, x2] = *h;
        let c1 = 0.5 * (x1 - xm1);
        let c2 = xm1 - 2.5 * x0 + 2.0 * x1 - 0.5 * x2;
        let c3 = 0.5 * (x2 - xm1) + 1.5 * (x0 - x1);
        ((c3 * t + c2) * t + c1) * t + x0
    }
}

// ============================================================================
// PITCH SHIFT STAGE
// ============================================================================

/// Lifecycle of the stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Not pulled since construction, reset or release
    Idle,
    /// Filling the interpolator and FIFO after start, seek or track change
    Priming,
    /// Normal operation
    Steady,
}

/// Counters maintained on the audio thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    /// Pulls that had to be padded
    pub underruns: u64,
    /// Interpolated frames dropped because the FIFO was full
    pub dropped_frames: u64,
}

/// Variable-rate playback stage
///
/// Implements the same pull interface as its upstream source. Requests of
/// any size are served; internally the upstream is pulled in chunks of at
/// most `max_block` frames.
pub struct PitchShiftStage<S: PositionableSource> {
    source: S,
    channels: usize,
    max_block: usize,
    prepared: bool,
    state: StageState,
    pitch: PitchControl,
    resampler: HermiteResampler,
    fifo: SampleFifo,
    input: AudioBlock,
    frame: Vec<f32>,
    advance: Vec<f32>,
    seek_base: u64,
    consumed: f64,
    stats: StageStats,
}

impl<S: PositionableSource> PitchShiftStage<S> {
    /// Wrap `source`, producing `channels` output channels
    pub fn new(source: S, channels: usize) -> Self {
        let channels = channels.max(1);
        let seek_base = source.position();
        Self {
            source,
            channels,
            max_block: 0,
            prepared: false,
            state: StageState::Idle,
            pitch: PitchControl::new(48_000),
            resampler: HermiteResampler::new(channels),
            fifo: SampleFifo::empty(),
            input: AudioBlock::empty(channels),
            frame: vec![0.0; channels + 1],
            advance: Vec::new(),
            seek_base,
            consumed: 0.0,
            stats: StageStats::default(),
        }
    }

    /// Build a stage ready to be swapped into a running session
    ///
    /// Allocates every buffer the stage needs for `spec`, so call it off
    /// the audio thread.
    pub fn prepared(source: S, spec: &ProcessSpec) -> Self {
        let mut stage = Self::new(source, spec.channels);
        stage.prepare(spec.max_block_size, spec.sample_rate);
        stage
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn stats(&self) -> StageStats {
        self.stats
    }

    pub fn pitch_control(&self) -> &PitchControl {
        &self.pitch
    }

    /// Set the pitch target in semitones (clamped to ±12, ramped)
    pub fn set_pitch_semitones(&mut self, semitones: f32) {
        self.pitch.set_semitones(semitones);
    }

    /// Jump to the pitch target without ramping
    pub fn snap_pitch(&mut self) {
        self.pitch.snap();
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Flush everything and return to `Idle`; the upstream position is kept
    pub fn reset(&mut self) {
        self.flush();
        self.state = StageState::Idle;
        self.stats = StageStats::default();
    }

    /// Frames buffered in the FIFO
    pub fn buffered(&self) -> usize {
        self.fifo.len()
    }

    fn flush(&mut self) {
        self.resampler.reset();
        self.fifo.clear();
        self.seek_base = self.source.position();
        self.consumed = 0.0;
    }

    /// Pull upstream until the FIFO holds `want` frames or the iteration
    /// budget runs out
    fn fill(&mut self, want: usize) {
        let mut iterations = 0;
        while self.fifo.len() < want && iterations < MAX_FILL_ITERATIONS {
            let deficit = (want - self.fifo.len()) as f32;
            let chunk = ((deficit * self.pitch.current_ratio()).ceil() as usize)
                .clamp(1, self.max_block);

            self.source.next_block(&mut self.input, chunk);
            let pulled = self.input.len();
            for i in 0..pulled {
                for ch in 0..self.channels {
                    self.frame[ch] = self.input.sample(ch, i);
                }
                self.resampler.push(&self.frame[..self.channels]);
                while self.resampler.has_output() {
                    let ratio = self.pitch.next_ratio();
                    self.resampler.emit(&mut self.frame[..self.channels]);
                    self.frame[self.channels] = ratio;
                    if !self.fifo.write_frame(&self.frame) {
                        self.stats.dropped_frames += 1;
                    }
                    self.resampler.advance(ratio);
                }
            }
            iterations += 1;
        }
    }

    /// Drain `n` frames into `block` at `offset`, returning the real count
    fn drain_into(&mut self, block: &mut AudioBlock, offset: usize, n: usize) -> usize {
        let channels = self.channels.min(block.channels());
        let ratio_lane = self.channels;
        let advance = &mut self.advance;
        let real = self.fifo.drain(n, |lane, frame, sample| {
            if lane < channels {
                block.channel_mut(lane)[offset + frame] = sample;
            } else if lane == ratio_lane {
                advance[frame] = sample;
            }
        });
        self.consumed += self.advance[..real]
            .iter()
            .map(|&r| r as f64)
            .sum::<f64>();
        real
    }
}

impl<S: PositionableSource> fmt::Debug for PitchShiftStage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PitchShiftStage")
            .field("channels", &self.channels)
            .field("prepared", &self.prepared)
            .field("state", &self.state)
            .field("length", &self.source.length())
            .finish_non_exhaustive()
    }
}

impl<S: PositionableSource> AudioBlockSource for PitchShiftStage<S> {
    fn prepare(&mut self, block_size: usize, sample_rate: u32) {
        let max_block = block_size.max(1);
        info!(
            block_size = max_block,
            sample_rate,
            channels = self.channels,
            "Preparing pitch stage"
        );
        self.source.prepare(max_block, sample_rate);
        self.max_block = max_block;
        self.pitch.set_sample_rate(sample_rate);
        self.pitch.snap();
        self.fifo = SampleFifo::with_capacity(self.channels + 1, 4 * max_block + 8);
        self.input = AudioBlock::new(self.channels, max_block);
        self.advance = vec![0.0; max_block];
        self.resampler = HermiteResampler::new(self.channels);
        self.prepared = true;
        self.state = StageState::Idle;
        self.flush();
    }

    fn next_block(&mut self, block: &mut AudioBlock, frames: usize) {
        block.set_len(frames);
        let frames = block.len();
        if !self.prepared {
            block.clear();
            return;
        }
        if self.state == StageState::Idle {
            debug!("Pitch stage priming");
            self.state = StageState::Priming;
        }

        let mut filled = 0;
        while filled < frames {
            let take = (frames - filled).min(self.max_block);
            self.fill(take);
            let real = self.drain_into(block, filled, take);
            if real < take {
                self.stats.underruns += 1;
            } else if self.state == StageState::Priming {
                debug!(buffered = self.fifo.len(), "Pitch stage steady");
                self.state = StageState::Steady;
            }
            filled += take;
        }

        // mono-to-many: channels past the stage's own are silent
        for ch in self.channels..block.channels() {
            block.channel_mut(ch).fill(0.0);
        }
    }

    fn release(&mut self) {
        if self.prepared {
            info!("Releasing pitch stage");
        }
        self.source.release();
        self.prepared = false;
        self.state = StageState::Idle;
        self.fifo = SampleFifo::empty();
        self.input = AudioBlock::empty(self.channels);
        self.advance = Vec::new();
        self.resampler.reset();
    }
}

impl<S: PositionableSource> PositionableSource for PitchShiftStage<S> {
    /// Seek upstream and re-prime
    ///
    /// `position()` reports the accepted target exactly until new frames
    /// are delivered.
    fn set_position(&mut self, frame: u64) {
        self.source.set_position(frame);
        self.flush();
        if self.prepared {
            self.state = StageState::Priming;
        }
        debug!(requested = frame, position = self.seek_base, "Pitch stage seek");
    }

    fn position(&self) -> u64 {
        let advanced = (self.consumed + 1e-6).floor() as u64;
        let position = self.seek_base + advanced;
        let length = self.source.length();
        if self.source.is_looping() && length > 0 {
            position % length
        } else if length > 0 {
            position.min(length)
        } else {
            position
        }
    }

    fn length(&self) -> u64 {
        self.source.length()
    }

    fn is_looping(&self) -> bool {
        self.source.is_looping()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audio::BufferSource;
    use proptest::prelude::*;

    const SAMPLE_RATE: u32 = 48_000;

    fn ramp_source(frames: usize) -> BufferSource {
        BufferSource::mono((0..frames).map(|i| i as f32 / frames as f32).collect(), SAMPLE_RATE)
    }

    fn stage(frames: usize, block: usize) -> PitchShiftStage<BufferSource> {
        let mut stage = PitchShiftStage::new(ramp_source(frames), 1);
        stage.prepare(block, SAMPLE_RATE);
        stage
    }

    #[test]
    fn test_semitones_to_ratio() {
        assert_eq!(semitones_to_ratio(0.0), 1.0);
        assert!((semitones_to_ratio(12.0) - 2.0).abs() < 1e-6);
        assert!((semitones_to_ratio(-12.0) - 0.5).abs() < 1e-6);
        assert!((semitones_to_ratio(40.0) - 2.0).abs() < 1e-6);
        assert_eq!(semitones_to_ratio(f32::NAN), 1.0);
    }

    #[test]
    fn test_pitch_ramp_lands_on_target() {
        let mut pitch = PitchControl::new(SAMPLE_RATE);
        pitch.set_semitones(12.0);
        assert!(pitch.is_ramping());

        let ramp = (PITCH_RAMP_MS * 0.001 * SAMPLE_RATE as f32).ceil() as usize;
        let mut previous = pitch.next_ratio();
        assert_eq!(previous, 1.0);
        for _ in 1..ramp {
            let r = pitch.next_ratio();
            assert!(r >= previous);
            previous = r;
        }
        assert!(!pitch.is_ramping());
        assert_eq!(pitch.current_ratio(), pitch.target_ratio());
        assert_eq!(pitch.next_ratio(), pitch.target_ratio());
    }

    #[test]
    fn test_hermite_exact_at_zero_phase() {
        let mut resampler = HermiteResampler::new(1);
        let mut out = [0.0f32];
        let input = [0.3, -0.7, 0.1, 0.9, -0.2];
        let mut produced = Vec::new();
        for x in input {
            resampler.push(&[x]);
            while resampler.has_output() {
                resampler.emit(&mut out);
                produced.push(out[0]);
                resampler.advance(1.0);
            }
        }
        assert_eq!(produced, &input[..3]);
    }

    #[test]
    fn test_stage_starts_idle_then_steady() {
        let mut stage = stage(4096, 256);
        assert_eq!(stage.state(), StageState::Idle);
        let mut block = AudioBlock::new(1, 256);
        stage.next_block(&mut block, 256);
        assert_eq!(stage.state(), StageState::Steady);
    }

    #[test]
    fn test_zero_semitones_is_transparent() {
        let frames = 3000;
        let source = ramp_source(frames);
        let expected: Vec<f32> = (0..frames).map(|i| i as f32 / frames as f32).collect();
        let mut stage = PitchShiftStage::new(source, 1);
        stage.prepare(128, SAMPLE_RATE);

        let mut out = Vec::new();
        let mut block = AudioBlock::new(1, 128);
        while out.len() < frames {
            stage.next_block(&mut block, 100);
            out.extend_from_slice(block.channel(0));
        }
        assert_eq!(&out[..frames], expected.as_slice());
        assert_eq!(stage.stats().underruns, 0);
    }

    #[test]
    fn test_position_tracks_delivered_frames() {
        let mut stage = stage(10_000, 256);
        let mut block = AudioBlock::new(1, 256);
        stage.next_block(&mut block, 256);
        stage.next_block(&mut block, 200);
        assert_eq!(stage.position(), 456);
    }

    #[test]
    fn test_seek_reports_target_and_reprimes() {
        let mut stage = stage(10_000, 256);
        let mut block = AudioBlock::new(1, 256);
        stage.next_block(&mut block, 256);

        stage.set_position(5_000);
        assert_eq!(stage.state(), StageState::Priming);
        assert_eq!(stage.position(), 5_000);
        assert_eq!(stage.buffered(), 0);

        stage.next_block(&mut block, 1);
        assert_eq!(block.sample(0, 0), 0.5);
        assert_eq!(stage.position(), 5_001);
    }

    #[test]
    fn test_octave_up_consumes_twice_the_source() {
        let mut stage = stage(48_000 * 4, 512);
        stage.set_pitch_semitones(12.0);
        let mut block = AudioBlock::new(1, 512);
        let mut delivered = 0;
        while delivered < SAMPLE_RATE as usize {
            let n = (SAMPLE_RATE as usize - delivered).min(512);
            stage.next_block(&mut block, n);
            delivered += n;
        }
        let consumed = stage.position() as f64 / SAMPLE_RATE as f64;
        assert!((consumed - 2.0).abs() < 0.01, "consumed {consumed} s");
    }

    #[test]
    fn test_octave_down_consumes_half_the_source() {
        let mut stage = stage(48_000 * 2, 512);
        stage.set_pitch_semitones(-12.0);
        let mut block = AudioBlock::new(1, 512);
        for _ in 0..(SAMPLE_RATE as usize / 480) {
            stage.next_block(&mut block, 480);
        }
        let consumed = stage.position() as f64 / SAMPLE_RATE as f64;
        assert!((consumed - 0.5).abs() < 0.01, "consumed {consumed} s");
    }

    #[test]
    fn test_oversized_request_is_filled() {
        let mut stage = stage(10_000, 64);
        let mut block = AudioBlock::new(1, 1000);
        stage.next_block(&mut block, 1000);
        assert_eq!(block.len(), 1000);
        assert_eq!(block.sample(0, 999), 999.0 / 10_000.0);
    }

    #[test]
    fn test_unprepared_stage_outputs_silence() {
        let mut stage = PitchShiftStage::new(ramp_source(100), 1);
        let mut block = AudioBlock::from_channels(vec![vec![1.0; 16]]).unwrap();
        stage.next_block(&mut block, 16);
        assert!(block.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_release_returns_to_idle() {
        let mut stage = stage(1000, 64);
        let mut block = AudioBlock::new(1, 64);
        stage.next_block(&mut block, 64);
        stage.release();
        assert_eq!(stage.state(), StageState::Idle);
        stage.next_block(&mut block, 64);
        assert!(block.channel(0).iter().all(|&s| s == 0.0));
    }

    proptest! {
        #[test]
        fn prop_next_block_fills_exactly(st in -12.0f32..12.0, n in 1usize..700) {
            let mut stage = stage(5_000, 256);
            stage.set_pitch_semitones(st);
            let mut block = AudioBlock::new(1, 700);
            stage.next_block(&mut block, n);
            prop_assert_eq!(block.len(), n);
            prop_assert!(block.channel(0).iter().all(|s| s.is_finite()));
        }

        #[test]
        fn prop_position_is_monotonic(st in -12.0f32..12.0) {
            let mut stage = stage(20_000, 256);
            stage.set_pitch_semitones(st);
            let mut block = AudioBlock::new(1, 256);
            let mut last = stage.position();
            for _ in 0..20 {
                stage.next_block(&mut block, 256);
                let pos = stage.position();
                prop_assert!(pos >= last);
                last = pos;
            }
        }
    }
}

//! Audio blocks, session specs and the pull-source abstraction
//!
//! This module defines the core audio types shared by the effect chain,
//! the pitch stage and the host. Device I/O lives in the `infra` crate;
//! decoding is out of scope, so the only concrete source here is the
//! in-memory [`BufferSource`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the audio subsystem
///
/// None of these are produced on the real-time path. They surface from
/// setup-time operations (building sources, opening devices).
#[derive(Debug, Error)]
pub enum AudioError {
    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Error in audio stream creation or processing
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Invalid configuration for a source or device
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Device does not support the requested configuration
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Session parameters handed to `prepare`
///
/// Fixed between `prepare` and `release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub sample_rate: u32,
    pub max_block_size: usize,
    pub channels: usize,
}

impl ProcessSpec {
    pub const MIN_SAMPLE_RATE: u32 = 8_000;
    pub const MAX_SAMPLE_RATE: u32 = 384_000;

    /// Create a spec, silently correcting out-of-range values
    pub fn new(sample_rate: u32, max_block_size: usize, channels: usize) -> Self {
        Self {
            sample_rate: sample_rate.clamp(Self::MIN_SAMPLE_RATE, Self::MAX_SAMPLE_RATE),
            max_block_size: max_block_size.max(1),
            channels: channels.max(1),
        }
    }

    pub fn sample_rate_f32(&self) -> f32 {
        self.sample_rate as f32
    }
}

impl Default for ProcessSpec {
    fn default() -> Self {
        Self::new(48_000, 512, 2)
    }
}

/// Planar multichannel block of `f32` samples
///
/// Channel count and capacity are fixed at construction; the active
/// length may shrink and grow up to the capacity without reallocating.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    data: Vec<f32>,
    channels: usize,
    capacity: usize,
    len: usize,
}

impl AudioBlock {
    /// Allocate a silent block whose active length equals its capacity
    pub fn new(channels: usize, capacity: usize) -> Self {
        let channels = channels.max(1);
        Self {
            data: vec![0.0; channels * capacity],
            channels,
            capacity,
            len: capacity,
        }
    }

    /// A zero-capacity block; does not allocate
    pub fn empty(channels: usize) -> Self {
        Self {
            data: Vec::new(),
            channels: channels.max(1),
            capacity: 0,
            len: 0,
        }
    }

    /// Allocate a block matching a session spec
    pub fn for_spec(spec: &ProcessSpec) -> Self {
        Self::new(spec.channels, spec.max_block_size)
    }

    /// Build a block from per-channel sample vectors of equal length
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Result<Self> {
        let frames = validate_channels(&channels)?;
        let mut block = Self::new(channels.len(), frames);
        for (ch, samples) in channels.iter().enumerate() {
            block.channel_mut(ch).copy_from_slice(samples);
        }
        Ok(block)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Change the active length (clamped to capacity)
    pub fn set_len(&mut self, frames: usize) {
        self.len = frames.min(self.capacity);
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch * self.capacity;
        &self.data[start..start + self.len]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let start = ch * self.capacity;
        &mut self.data[start..start + self.len]
    }

    #[inline]
    pub fn sample(&self, ch: usize, frame: usize) -> f32 {
        self.channel(ch)[frame]
    }

    /// Zero the active region
    pub fn clear(&mut self) {
        for ch in 0..self.channels {
            self.channel_mut(ch).fill(0.0);
        }
    }

    /// Zero frames `[from, len)` of every channel
    pub fn clear_from(&mut self, from: usize) {
        if from >= self.len {
            return;
        }
        for ch in 0..self.channels {
            self.channel_mut(ch)[from..].fill(0.0);
        }
    }

    pub fn apply_gain(&mut self, gain: f32) {
        if gain == 1.0 {
            return;
        }
        for ch in 0..self.channels {
            for sample in self.channel_mut(ch) {
                *sample *= gain;
            }
        }
    }

    /// Multiply by a gain moving linearly from `start` to `end` across the block
    pub fn apply_gain_ramp(&mut self, start: f32, end: f32) {
        if start == end {
            self.apply_gain(end);
            return;
        }
        let len = self.len;
        if len == 0 {
            return;
        }
        let step = (end - start) / len as f32;
        for ch in 0..self.channels {
            for (i, sample) in self.channel_mut(ch).iter_mut().enumerate() {
                *sample *= start + step * (i + 1) as f32;
            }
        }
    }

    /// Fill from interleaved samples; frames beyond `src` are zeroed
    pub fn read_interleaved(&mut self, src: &[f32]) {
        let channels = self.channels;
        let frames = (src.len() / channels).min(self.len);
        for ch in 0..channels {
            let data = self.channel_mut(ch);
            for (i, sample) in data.iter_mut().enumerate().take(frames) {
                *sample = src[i * channels + ch];
            }
        }
        self.clear_from(frames);
    }

    /// Write the active region into an interleaved buffer with `out_channels` lanes
    ///
    /// Missing block channels are filled from the last available channel
    /// so that a mono block plays on both sides of a stereo device.
    pub fn write_interleaved(&self, dst: &mut [f32], out_channels: usize) {
        let out_channels = out_channels.max(1);
        let frames = (dst.len() / out_channels).min(self.len);
        for out_ch in 0..out_channels {
            let src = self.channel(out_ch.min(self.channels - 1));
            for i in 0..frames {
                dst[i * out_channels + out_ch] = src[i];
            }
        }
    }
}

fn validate_channels(channels: &[Vec<f32>]) -> Result<usize> {
    let first = channels.first().ok_or_else(|| {
        AudioError::InvalidConfiguration("at least one channel is required".to_string())
    })?;
    let frames = first.len();
    if channels.iter().any(|c| c.len() != frames) {
        return Err(AudioError::InvalidConfiguration(
            "all channels must have the same length".to_string(),
        ));
    }
    Ok(frames)
}

/// Pull-based provider of audio blocks
pub trait AudioBlockSource: Send {
    /// Called once before the first pull of a session
    fn prepare(&mut self, block_size: usize, sample_rate: u32);

    /// Fill `frames` frames of `block` (clamped to its capacity) and set its
    /// active length accordingly. Exhausted sources clear the block.
    fn next_block(&mut self, block: &mut AudioBlock, frames: usize);

    /// Release any resources acquired in `prepare`
    fn release(&mut self);
}

/// A source that can report and change its read position
pub trait PositionableSource: AudioBlockSource {
    fn set_position(&mut self, frame: u64);

    /// Frame index of the next frame `next_block` will produce
    fn position(&self) -> u64;

    fn length(&self) -> u64;

    fn is_looping(&self) -> bool;
}

impl<T: AudioBlockSource + ?Sized> AudioBlockSource for Box<T> {
    fn prepare(&mut self, block_size: usize, sample_rate: u32) {
        (**self).prepare(block_size, sample_rate);
    }

    fn next_block(&mut self, block: &mut AudioBlock, frames: usize) {
        (**self).next_block(block, frames);
    }

    fn release(&mut self) {
        (**self).release();
    }
}

impl<T: PositionableSource + ?Sized> PositionableSource for Box<T> {
    fn set_position(&mut self, frame: u64) {
        (**self).set_position(frame);
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn length(&self) -> u64 {
        (**self).length()
    }

    fn is_looping(&self) -> bool {
        (**self).is_looping()
    }
}

/// In-memory PCM source
///
/// Stands in for a decoded track. Fewer source channels than block
/// channels are duplicated cyclically (mono plays on both sides).
#[derive(Debug, Clone)]
pub struct BufferSource {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
    position: u64,
    looping: bool,
}

impl BufferSource {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        validate_channels(&channels)?;
        Ok(Self {
            channels,
            sample_rate,
            position: 0,
            looping: false,
        })
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
            position: 0,
            looping: false,
        }
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }
}

impl AudioBlockSource for BufferSource {
    fn prepare(&mut self, _block_size: usize, _sample_rate: u32) {}

    fn next_block(&mut self, block: &mut AudioBlock, frames: usize) {
        block.set_len(frames);
        let frames = block.len();
        let length = self.length();

        if length == 0 {
            block.clear();
            return;
        }

        let start = self.position;
        for ch in 0..block.channels() {
            let src = &self.channels[ch % self.channels.len()];
            let dst = block.channel_mut(ch);
            let mut pos = start;
            for sample in dst.iter_mut() {
                if pos >= length {
                    if self.looping {
                        pos %= length;
                    } else {
                        *sample = 0.0;
                        continue;
                    }
                }
                *sample = src[pos as usize];
                pos += 1;
            }
        }

        let advanced = start + frames as u64;
        self.position = if self.looping {
            advanced % length
        } else {
            advanced.min(length)
        };
    }

    fn release(&mut self) {}
}

impl PositionableSource for BufferSource {
    fn set_position(&mut self, frame: u64) {
        let length = self.length();
        self.position = if self.looping && length > 0 {
            frame % length
        } else {
            frame.min(length)
        };
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn length(&self) -> u64 {
        self.channels.first().map_or(0, |c| c.len() as u64)
    }

    fn is_looping(&self) -> bool {
        self.looping
    }
}

/// Identifier for an output device (the host-reported name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Information about an output device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub default_sample_rate: Option<u32>,
    pub default_channels: Option<u16>,
    pub is_default: bool,
}

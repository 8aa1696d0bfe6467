//! Planar FIFO between the pitch stage's variable-rate producer and the
//! host's fixed-size pulls
//!
//! Performance characteristics:
//! - Single producer, single consumer
//! - Power-of-two lanes, indexes wrap with a mask
//! - Monotonic counters in cache-padded atomics
//! - No allocations after construction
//!
//! Overflow and underrun are policies, not errors: a write keeps the
//! prefix that fits and drops the rest, and a read always yields the
//! requested number of frames, repeating each lane's last delivered sample
//! when starved.

use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::audio::AudioBlock;

/// Fixed-capacity multi-lane sample FIFO
#[derive(Debug)]
pub struct SampleFifo {
    /// One ring per lane, all the same power-of-two length
    lanes: Vec<Vec<f32>>,

    /// Last sample handed to the consumer, per lane
    last: Vec<f32>,

    /// Total frames ever written (wraps)
    write_pos: CachePadded<AtomicUsize>,

    /// Total frames ever read (wraps)
    read_pos: CachePadded<AtomicUsize>,

    capacity: usize,
    mask: usize,
}

impl SampleFifo {
    /// Create a FIFO with `lanes` lanes holding at least `frames` frames
    ///
    /// Capacity will be rounded up to the next power of 2.
    pub fn with_capacity(lanes: usize, frames: usize) -> Self {
        let capacity = frames.max(1).next_power_of_two();
        let lanes = lanes.max(1);
        Self {
            lanes: vec![vec![0.0; capacity]; lanes],
            last: vec![0.0; lanes],
            write_pos: CachePadded::new(AtomicUsize::new(0)),
            read_pos: CachePadded::new(AtomicUsize::new(0)),
            capacity,
            mask: capacity - 1,
        }
    }

    /// A FIFO with no storage; every write is dropped and reads are silent
    ///
    /// Does not allocate.
    pub fn empty() -> Self {
        Self {
            lanes: Vec::new(),
            last: Vec::new(),
            write_pos: CachePadded::new(AtomicUsize::new(0)),
            read_pos: CachePadded::new(AtomicUsize::new(0)),
            capacity: 0,
            mask: 0,
        }
    }

    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames available to read
    pub fn len(&self) -> usize {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        write_pos.wrapping_sub(read_pos)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames that can be written before the FIFO is full
    pub fn free(&self) -> usize {
        self.capacity - self.len()
    }

    /// Append one frame (one sample per lane)
    ///
    /// Returns `false` and drops the frame when the FIFO is full. Missing
    /// lanes in `frame` are written as zero.
    pub fn write_frame(&mut self, frame: &[f32]) -> bool {
        if self.free() == 0 {
            return false;
        }
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let idx = write_pos & self.mask;
        for (lane, ring) in self.lanes.iter_mut().enumerate() {
            ring[idx] = frame.get(lane).copied().unwrap_or(0.0);
        }
        self.write_pos
            .store(write_pos.wrapping_add(1), Ordering::Release);
        true
    }

    /// Append up to `frames` frames from a block
    ///
    /// Lanes beyond the block's channel count repeat its last channel.
    /// Returns the number of frames actually written; the rest is dropped.
    pub fn write(&mut self, block: &AudioBlock, frames: usize) -> usize {
        let to_write = frames.min(block.len()).min(self.free());
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let last_channel = block.channels() - 1;
        for (lane, ring) in self.lanes.iter_mut().enumerate() {
            let src = block.channel(lane.min(last_channel));
            for (i, &sample) in src.iter().take(to_write).enumerate() {
                ring[write_pos.wrapping_add(i) & self.mask] = sample;
            }
        }
        self.write_pos
            .store(write_pos.wrapping_add(to_write), Ordering::Release);
        to_write
    }

    /// Read exactly `n` frames into `block` starting at frame 0
    ///
    /// The block's active length becomes `n` (clamped to its capacity).
    /// Block channels beyond the lane count are left untouched. Returns the
    /// number of real frames; the remainder is padding.
    pub fn read(&mut self, block: &mut AudioBlock, n: usize) -> usize {
        block.set_len(n);
        let n = block.len();
        let channels = block.channels();
        self.drain(n, |lane, frame, sample| {
            if lane < channels {
                block.channel_mut(lane)[frame] = sample;
            }
        })
    }

    /// Consume `n` frames, handing each `(lane, frame, sample)` to `sink`
    ///
    /// Frames past the available data are padded with the lane's last
    /// delivered sample. Returns the number of real frames.
    pub fn drain(&mut self, n: usize, mut sink: impl FnMut(usize, usize, f32)) -> usize {
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let real = n.min(self.len());

        for (lane, ring) in self.lanes.iter().enumerate() {
            let mut last = self.last[lane];
            for frame in 0..real {
                last = ring[read_pos.wrapping_add(frame) & self.mask];
                sink(lane, frame, last);
            }
            for frame in real..n {
                sink(lane, frame, last);
            }
            self.last[lane] = last;
        }

        self.read_pos
            .store(read_pos.wrapping_add(real), Ordering::Release);
        real
    }

    /// Drop all buffered frames and forget the padding values
    pub fn clear(&mut self) {
        self.write_pos.store(0, Ordering::Release);
        self.read_pos.store(0, Ordering::Release);
        self.last.fill(0.0);
    }
}

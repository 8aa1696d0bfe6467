//! Shared fixtures for the end-to-end tests
//!
//! Signal generators, level meters, an FFT pitch detector, and helpers that
//! build a prepared [`Player`] and drain it block by block.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f32::consts::TAU;
use std::sync::Arc;

use modradio_core::domain::audio::{AudioBlock, BufferSource, ProcessSpec};
use modradio_core::domain::controls::ControlSurface;
use modradio_core::domain::player::Player;

pub const SAMPLE_RATE: u32 = 48000;

/// Sine of `seconds` at `freq` Hz
pub fn sine(freq: f32, seconds: f32, amplitude: f32) -> Vec<f32> {
    let frames = (seconds * SAMPLE_RATE as f32) as usize;
    (0..frames)
        .map(|i| (i as f32 * freq * TAU / SAMPLE_RATE as f32).sin() * amplitude)
        .collect()
}

/// A single sample of `amplitude` followed by silence
pub fn impulse(frames: usize, amplitude: f32) -> Vec<f32> {
    let mut samples = vec![0.0; frames];
    if let Some(first) = samples.first_mut() {
        *first = amplitude;
    }
    samples
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
}

/// Strongest frequency in `samples`, refined by parabolic interpolation
pub fn dominant_frequency(samples: &[f32], sample_rate: u32) -> f32 {
    let n = samples.len();
    if n < 4 {
        return 0.0;
    }

    let mut buffer: Vec<Complex<f32>> = samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let window = 0.5 - 0.5 * (TAU * i as f32 / (n - 1) as f32).cos();
            Complex::new(s * window, 0.0)
        })
        .collect();

    let mut planner = FftPlanner::<f32>::new();
    planner.plan_fft_forward(n).process(&mut buffer);

    let magnitudes: Vec<f32> = buffer[..n / 2].iter().map(|c| c.norm()).collect();
    let (k, _) = magnitudes
        .iter()
        .enumerate()
        .skip(1)
        .fold((1, 0.0f32), |best, (i, &m)| if m > best.1 { (i, m) } else { best });

    let delta = if k + 1 < magnitudes.len() {
        let (a, b, c) = (magnitudes[k - 1], magnitudes[k], magnitudes[k + 1]);
        let denom = a - 2.0 * b + c;
        if denom.abs() > f32::EPSILON {
            0.5 * (a - c) / denom
        } else {
            0.0
        }
    } else {
        0.0
    };

    (k as f32 + delta) * sample_rate as f32 / n as f32
}

/// Surface at unity master gain, everything else at defaults
pub fn unity_controls() -> Arc<ControlSurface> {
    let controls = ControlSurface::shared();
    controls.set_master_gain(1.0);
    controls
}

/// Prepared player at 48 kHz with `track` loaded (not yet playing)
pub fn player(
    controls: Arc<ControlSurface>,
    channels: usize,
    block_size: usize,
    track: BufferSource,
) -> Player<BufferSource> {
    let mut player = Player::new(controls);
    player.prepare(&ProcessSpec::new(SAMPLE_RATE, block_size, channels));
    player.load_track(track);
    player
}

/// Render `frames` frames in blocks of the prepared size; returns planar output
pub fn render(player: &mut Player<BufferSource>, frames: usize) -> Vec<Vec<f32>> {
    let spec = player
        .spec()
        .copied()
        .unwrap_or_else(|| ProcessSpec::new(SAMPLE_RATE, 512, 1));
    let mut block = AudioBlock::for_spec(&spec);
    let mut out = vec![Vec::with_capacity(frames); spec.channels];

    let mut remaining = frames;
    while remaining > 0 {
        let n = remaining.min(spec.max_block_size);
        block.set_len(n);
        player.render(&mut block);
        for (ch, lane) in out.iter_mut().enumerate() {
            lane.extend_from_slice(block.channel(ch));
        }
        remaining -= n;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominant_frequency_of_sine() {
        let tone = sine(1000.0, 0.25, 0.5);
        let freq = dominant_frequency(&tone, SAMPLE_RATE);
        assert!((freq - 1000.0).abs() < 2.0, "detected {freq}");
    }

    #[test]
    fn test_levels() {
        let tone = sine(100.0, 1.0, 0.5);
        assert!((peak(&tone) - 0.5).abs() < 1e-3);
        assert!((rms(&tone) - 0.5 / 2f32.sqrt()).abs() < 1e-3);
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(peak(&impulse(8, -0.25)), 0.25);
    }
}

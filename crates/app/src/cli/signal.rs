//! Test signals fed through the player

use clap::ValueEnum;
use serde::Serialize;
use std::f32::consts::TAU;

/// Waveform of the synthesized track
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    #[default]
    Sine,
    /// A single full-scale sample at frame 0, then silence
    Impulse,
    /// Uniform white noise
    Noise,
}

/// Everything needed to synthesize a mono track
#[derive(Clone, Copy, Debug)]
pub struct SignalSpec {
    pub kind: SignalKind,
    pub frequency: f32,
    pub seconds: f32,
    pub amplitude: f32,
    pub sample_rate: u32,
    pub seed: u32,
}

impl SignalSpec {
    pub fn frames(&self) -> usize {
        (self.seconds.max(0.0) * self.sample_rate as f32).round() as usize
    }
}

/// Render the signal into a sample vector
pub fn synthesize(spec: &SignalSpec) -> Vec<f32> {
    let frames = spec.frames();
    let amplitude = spec.amplitude.clamp(0.0, 1.0);

    match spec.kind {
        SignalKind::Sine => {
            let step = spec.frequency / spec.sample_rate as f32;
            let mut phase = 0.0f32;
            (0..frames)
                .map(|_| {
                    let s = (phase * TAU).sin() * amplitude;
                    phase = (phase + step).fract();
                    s
                })
                .collect()
        }
        SignalKind::Impulse => {
            let mut samples = vec![0.0; frames];
            if let Some(first) = samples.first_mut() {
                *first = amplitude;
            }
            samples
        }
        SignalKind::Noise => {
            // xorshift32; zero is a fixed point
            let mut state = spec.seed.max(1);
            (0..frames)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    (state as f32 / u32::MAX as f32 * 2.0 - 1.0) * amplitude
                })
                .collect()
        }
    }
}

//! Offline rendering through a [`Player`]

use serde::Serialize;
use modradio_core::domain::audio::{AudioBlock, BufferSource, ProcessSpec};
use modradio_core::domain::chain::EffectKind;
use modradio_core::domain::player::Player;

/// Summary printed after a render
#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
    pub sample_rate: u32,
    pub channels: usize,
    pub frames_rendered: u64,
    pub source_frames: u64,
    /// Source frames consumed per output frame
    pub speed: f64,
    pub peak: f32,
    pub rms: f32,
    pub underruns: u64,
    pub dropped_frames: u64,
    pub enabled: Vec<EffectKind>,
    pub pitch_semitones: f32,
    pub finished: bool,
}

/// Accumulates peak and RMS over every channel of every block
#[derive(Debug, Default)]
struct Meter {
    peak: f32,
    sum_squares: f64,
    samples: u64,
}

impl Meter {
    fn update(&mut self, block: &AudioBlock) {
        for ch in 0..block.channels() {
            for &s in block.channel(ch) {
                self.peak = self.peak.max(s.abs());
                self.sum_squares += f64::from(s) * f64::from(s);
            }
            self.samples += block.len() as u64;
        }
    }

    fn rms(&self) -> f32 {
        if self.samples == 0 {
            0.0
        } else {
            (self.sum_squares / self.samples as f64).sqrt() as f32
        }
    }
}

/// Play the loaded track for `frames` output frames, block by block
///
/// `player` must be prepared for `spec` and have a track loaded. Every
/// rendered block is handed to `sink`. Frames past the end of a
/// non-looping track are silence.
pub fn render_offline(
    player: &mut Player<BufferSource>,
    spec: &ProcessSpec,
    frames: usize,
    mut sink: impl FnMut(&AudioBlock),
) -> RenderReport {
    let mut block = AudioBlock::for_spec(spec);
    let mut meter = Meter::default();
    let pitch_semitones = player.controls().pitch_semitones();
    let enabled: Vec<EffectKind> = EffectKind::ORDER
        .into_iter()
        .filter(|&kind| !player.controls().is_bypassed(kind))
        .collect();

    player.play();
    let mut remaining = frames;
    while remaining > 0 {
        let n = remaining.min(spec.max_block_size);
        block.set_len(n);
        player.render(&mut block);
        meter.update(&block);
        sink(&block);
        remaining -= n;
    }

    let stats = player.stats();
    let finished = player.is_finished();
    let source_frames = if finished { stats.length } else { stats.position };
    RenderReport {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        frames_rendered: frames as u64,
        source_frames,
        speed: if stats.frames_rendered == 0 {
            0.0
        } else {
            source_frames as f64 / stats.frames_rendered as f64
        },
        peak: meter.peak,
        rms: meter.rms(),
        underruns: stats.underruns,
        dropped_frames: stats.dropped_frames,
        enabled,
        pitch_semitones,
        finished,
    }
}

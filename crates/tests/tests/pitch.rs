//! Pitch shifting by resampling, checked by spectrum and source consumption

use modradio_core::domain::audio::{
    AudioBlock, AudioBlockSource, BufferSource, PositionableSource,
};
use modradio_core::domain::pitch::{PitchShiftStage, StageState};
use modradio_tests::{dominant_frequency, player, render, sine, unity_controls, SAMPLE_RATE};

const BLOCK: usize = 512;

/// Frequency of the player's output after the pitch ramp has settled
fn shifted_frequency(semitones: f32, source_freq: f32) -> (f32, u64) {
    let controls = unity_controls();
    let track = BufferSource::mono(sine(source_freq, 4.0, 0.5), SAMPLE_RATE);
    let mut player = player(controls.clone(), 1, BLOCK, track);
    controls.set_pitch_semitones(semitones);
    player.play();

    let out = render(&mut player, SAMPLE_RATE as usize);
    let consumed = player.position();
    // skip the 5 ms ramp
    let window = &out[0][4800..4800 + 16384];
    (dominant_frequency(window, SAMPLE_RATE), consumed)
}

#[test]
fn test_octave_up_doubles_frequency_and_consumes_two_seconds() {
    let (freq, consumed) = shifted_frequency(12.0, 440.0);
    assert!((freq - 880.0).abs() < 5.0, "detected {freq} Hz");

    let expected = 2 * SAMPLE_RATE as u64;
    let error = consumed.abs_diff(expected);
    assert!(error < SAMPLE_RATE as u64 / 100, "consumed {consumed}");
}

#[test]
fn test_octave_down_halves_frequency_and_consumes_half_a_second() {
    let (freq, consumed) = shifted_frequency(-12.0, 440.0);
    assert!((freq - 220.0).abs() < 3.0, "detected {freq} Hz");

    let expected = SAMPLE_RATE as u64 / 2;
    let error = consumed.abs_diff(expected);
    assert!(error < SAMPLE_RATE as u64 / 100, "consumed {consumed}");
}

#[test]
fn test_fifth_up() {
    let (freq, _) = shifted_frequency(7.0, 400.0);
    let expected = 400.0 * 2f32.powf(7.0 / 12.0);
    assert!((freq - expected).abs() < 4.0, "detected {freq} Hz, expected {expected}");
}

#[test]
fn test_zero_semitones_is_transparent_for_any_block_size() {
    let tone = sine(997.0, 0.5, 0.6);
    for block in [1, 7, 64, 333, 1024] {
        let mut stage = PitchShiftStage::new(BufferSource::mono(tone.clone(), SAMPLE_RATE), 1);
        stage.prepare(block, SAMPLE_RATE);

        let mut out = Vec::with_capacity(tone.len());
        let mut buf = AudioBlock::new(1, block);
        while out.len() < tone.len() {
            let n = block.min(tone.len() - out.len());
            stage.next_block(&mut buf, n);
            out.extend_from_slice(buf.channel(0));
        }
        assert_eq!(out, tone, "block size {block}");
        assert_eq!(stage.position(), tone.len() as u64);
    }
}

#[test]
fn test_seek_reports_target_and_reprimes() {
    let tone = sine(440.0, 2.0, 0.5);
    let mut stage = PitchShiftStage::new(BufferSource::mono(tone.clone(), SAMPLE_RATE), 1);
    stage.prepare(BLOCK, SAMPLE_RATE);
    stage.set_pitch_semitones(5.0);

    let mut buf = AudioBlock::new(1, BLOCK);
    stage.next_block(&mut buf, BLOCK);

    stage.set_position(30_000);
    assert_eq!(stage.state(), StageState::Priming);
    assert_eq!(stage.position(), 30_000);

    stage.next_block(&mut buf, BLOCK);
    assert_eq!(stage.state(), StageState::Steady);
    assert!(stage.position() > 30_000);
}

#[test]
fn test_pitch_resets_on_track_change() {
    let controls = unity_controls();
    let track = BufferSource::mono(sine(440.0, 1.0, 0.5), SAMPLE_RATE);
    let mut player = player(controls.clone(), 1, BLOCK, track);
    controls.set_pitch_semitones(-3.0);
    player.play();
    render(&mut player, BLOCK);

    player.load_track(BufferSource::mono(sine(440.0, 1.0, 0.5), SAMPLE_RATE));
    assert_eq!(controls.pitch_semitones(), 0.0);

    render(&mut player, BLOCK);
    assert_eq!(player.position(), BLOCK as u64);
}

//! Transport reset policy as seen from the output

use std::sync::Arc;

use modradio_core::domain::audio::BufferSource;
use modradio_core::domain::chain::{EffectKind, ParamId};
use modradio_core::domain::controls::ControlSurface;
use modradio_core::domain::player::TransportState;
use modradio_tests::{impulse, peak, player, render, sine, unity_controls, SAMPLE_RATE};

const BLOCK: usize = 256;

/// Every unit enabled with audible settings
fn busy_controls() -> Arc<ControlSurface> {
    let controls = unity_controls();
    for kind in EffectKind::ORDER {
        controls.set_bypass(kind, false);
    }
    controls.set_param(ParamId::DelayTime, 0.05);
    controls.set_param(ParamId::DelayFeedback, 0.5);
    controls.set_param(ParamId::ReverbMix, 0.5);
    controls
}

fn clip() -> BufferSource {
    BufferSource::mono(sine(330.0, 1.0, 0.5), SAMPLE_RATE)
}

#[test]
fn test_pause_resumes_exactly_where_it_left_off() {
    let mut reference = player(busy_controls(), 2, BLOCK, clip());
    reference.play();
    let expected = render(&mut reference, 8 * BLOCK);

    let mut paused = player(busy_controls(), 2, BLOCK, clip());
    paused.play();
    let mut out = render(&mut paused, 4 * BLOCK);

    paused.pause();
    let silence = render(&mut paused, 3 * BLOCK);
    assert!(silence.iter().flatten().all(|&s| s == 0.0));
    assert_eq!(paused.position(), 4 * BLOCK as u64);

    paused.play();
    let resumed = render(&mut paused, 4 * BLOCK);
    for (ch, rest) in out.iter_mut().zip(resumed) {
        ch.extend(rest);
    }
    assert_eq!(out, expected);
}

#[test]
fn test_reverb_tail_survives_pause() {
    let controls = unity_controls();
    controls.set_bypass(EffectKind::Reverb, false);
    controls.set_param(ParamId::ReverbMix, 1.0);

    let track = BufferSource::mono(impulse(SAMPLE_RATE as usize, 1.0), SAMPLE_RATE);
    let mut player = player(controls, 1, BLOCK, track);
    player.play();
    render(&mut player, BLOCK);

    player.pause();
    render(&mut player, 10 * BLOCK);
    player.play();

    let tail = render(&mut player, 20 * BLOCK);
    assert!(peak(&tail[0]) > 1e-4, "reverb tail was lost");
}

#[test]
fn test_stop_then_play_matches_a_fresh_start() {
    let mut fresh = player(busy_controls(), 2, BLOCK, clip());
    fresh.play();
    let expected = render(&mut fresh, 6 * BLOCK);

    let mut player = player(busy_controls(), 2, BLOCK, clip());
    player.play();
    render(&mut player, 10 * BLOCK);

    player.stop();
    assert_eq!(player.state(), TransportState::Stopped);
    assert_eq!(player.position(), 0);

    player.play();
    assert_eq!(render(&mut player, 6 * BLOCK), expected);
}

#[test]
fn test_seek_matches_a_fresh_start_at_the_target() {
    let target = 12_000;

    let mut fresh = player(busy_controls(), 1, BLOCK, clip());
    fresh.seek(target);
    fresh.play();
    let expected = render(&mut fresh, 4 * BLOCK);

    let mut player = player(busy_controls(), 1, BLOCK, clip());
    player.play();
    render(&mut player, 7 * BLOCK);
    player.seek(target);
    assert_eq!(player.position(), target);

    assert_eq!(render(&mut player, 4 * BLOCK), expected);
}

#[test]
fn test_track_end_stops_and_play_starts_over() {
    let tone = sine(330.0, 0.05, 0.5);
    let frames = tone.len();
    let track = BufferSource::mono(tone.clone(), SAMPLE_RATE);
    let mut player = player(unity_controls(), 1, BLOCK, track);
    player.play();

    let out = render(&mut player, frames + 4 * BLOCK);
    assert_eq!(player.state(), TransportState::Stopped);
    assert_eq!(&out[0][..frames], tone.as_slice());
    assert!(out[0][frames..].iter().all(|&s| s == 0.0));

    player.play();
    assert_eq!(player.position(), 0);
    assert_eq!(&render(&mut player, BLOCK)[0][..], &tone[..BLOCK]);
}

#[test]
fn test_looping_track_never_finishes() {
    let tone = sine(330.0, 0.05, 0.5);
    let frames = tone.len();
    let track = BufferSource::mono(tone.clone(), SAMPLE_RATE).with_looping(true);
    let mut player = player(unity_controls(), 1, BLOCK, track);
    player.play();

    let out = render(&mut player, 3 * frames);
    assert_eq!(player.state(), TransportState::Playing);
    assert_eq!(&out[0][2 * frames..], tone.as_slice());
}

#[test]
fn test_new_track_starts_clean_while_playing() {
    let controls = busy_controls();
    let mut player = player(controls.clone(), 1, BLOCK, clip());
    player.play();
    render(&mut player, 8 * BLOCK);

    let previous = player.load_track(clip());
    assert!(previous.is_some());
    assert_eq!(player.state(), TransportState::Playing);

    let mut fresh = modradio_tests::player(busy_controls(), 1, BLOCK, clip());
    fresh.play();
    assert_eq!(render(&mut player, 4 * BLOCK), render(&mut fresh, 4 * BLOCK));
}

//! End-to-end scenarios through the full pull chain
//!
//! Every test drives a prepared `Player`: track → pitch stage → effect
//! chain → master gain, exactly as a host callback would.

use modradio_core::domain::audio::BufferSource;
use modradio_core::domain::chain::{EffectKind, ParamId};
use modradio_core::domain::dsp::params;
use modradio_tests::{impulse, player, render, sine, unity_controls, SAMPLE_RATE};

// ============================================================================
// PASS-THROUGH
// ============================================================================

#[test]
fn test_bypassed_chain_is_sample_identical() {
    let tone = sine(440.0, 1.0, 0.8);
    let mut player = player(
        unity_controls(),
        1,
        512,
        BufferSource::mono(tone.clone(), SAMPLE_RATE),
    );
    player.play();

    let out = render(&mut player, tone.len());
    assert_eq!(out[0], tone);
}

#[test]
fn test_master_gain_is_the_only_change() {
    let tone = sine(440.0, 0.5, 0.8);
    let controls = unity_controls();
    controls.set_master_gain(0.5);
    let mut player = player(controls, 2, 256, BufferSource::mono(tone.clone(), SAMPLE_RATE));
    player.play();

    let out = render(&mut player, tone.len());
    for ch in &out {
        for (o, i) in ch.iter().zip(&tone) {
            assert!((o - 0.5 * i).abs() < 1e-6);
        }
    }
}

// ============================================================================
// DISTORTION
// ============================================================================

#[test]
fn test_unity_drive_full_wet_is_tanh() {
    let tone = sine(220.0, 0.25, 0.9);
    let controls = unity_controls();
    controls.set_bypass(EffectKind::Distortion, false);
    controls.set_param(ParamId::DistortionDrive, 0.0);
    controls.set_param(ParamId::DistortionMix, 1.0);

    let mut player = player(controls, 1, 512, BufferSource::mono(tone.clone(), SAMPLE_RATE));
    player.play();
    let out = render(&mut player, tone.len());

    for (o, i) in out[0].iter().zip(&tone) {
        assert!((o - i.tanh()).abs() < 1e-6, "{o} vs tanh({i})");
    }
}

// ============================================================================
// DELAY
// ============================================================================

#[test]
fn test_delay_echo_train() {
    let d = (0.3 * SAMPLE_RATE as f32).round() as usize;
    let controls = unity_controls();
    controls.set_bypass(EffectKind::Delay, false);
    controls.set_param(ParamId::DelayTime, 0.1);
    controls.set_param(ParamId::DelayFeedback, 0.3 / params::DELAY_FEEDBACK_MAX);
    controls.set_param(ParamId::DelayMix, 0.5);

    let frames = 5 * d;
    let mut player = player(controls, 1, 512, BufferSource::mono(impulse(frames, 1.0), SAMPLE_RATE));
    player.play();
    let out = &render(&mut player, frames)[0];

    assert!((out[0] - 0.5).abs() < 1e-6);
    for n in 0..4 {
        let expected = 0.5 * 0.3f32.powi(n as i32);
        let at = (n + 1) * d;
        assert!(
            (out[at] - expected).abs() < 1e-5,
            "echo {n} at {at}: {} != {expected}",
            out[at]
        );
    }

    // nothing between the echoes
    let echoes: Vec<usize> = (0..5).map(|n| n * d).collect();
    for (i, &s) in out.iter().enumerate() {
        if !echoes.contains(&i) {
            assert_eq!(s, 0.0, "unexpected sample at {i}");
        }
    }
}

// ============================================================================
// BIT REDUCER
// ============================================================================

#[test]
fn test_sixteen_bit_without_decimation_is_near_identity() {
    let tone = sine(1000.0, 0.25, 0.7);
    let controls = unity_controls();
    controls.set_bypass(EffectKind::BitReducer, false);
    controls.set_param(ParamId::BitReducerBitDepth, 1.0);
    controls.set_param(ParamId::BitReducerCrush, 0.0);
    controls.set_param(ParamId::BitReducerMix, 1.0);

    let mut player = player(controls, 1, 512, BufferSource::mono(tone.clone(), SAMPLE_RATE));
    player.play();
    let out = render(&mut player, tone.len());

    let step = 1.0 / 32768.0;
    for (o, i) in out[0].iter().zip(&tone) {
        assert!((o - i).abs() < step);
    }
}

#[test]
fn test_full_crush_holds_for_32_samples() {
    let tone = sine(100.0, 0.1, 0.7);
    let controls = unity_controls();
    controls.set_bypass(EffectKind::BitReducer, false);
    controls.set_param(ParamId::BitReducerCrush, 1.0);
    controls.set_param(ParamId::BitReducerMix, 1.0);

    let mut player = player(controls, 1, 100, BufferSource::mono(tone.clone(), SAMPLE_RATE));
    player.play();
    let out = &render(&mut player, tone.len())[0];

    // block boundaries (every 100 frames) must not restart the hold
    for window in out.chunks(32) {
        assert!(window.iter().all(|&s| s == window[0]));
    }
}

// ============================================================================
// BYPASS FLUSH
// ============================================================================

#[test]
fn test_bypass_toggle_flushes_every_unit() {
    let block = 1024;
    for kind in EffectKind::ORDER {
        let controls = unity_controls();
        controls.set_bypass(kind, false);
        controls.set_param(ParamId::DelayTime, 0.02);
        controls.set_param(ParamId::DelayFeedback, 0.9);
        controls.set_param(ParamId::ChorusFeedback, 0.9);
        controls.set_param(ParamId::PhaserFeedback, 0.9);
        controls.set_param(ParamId::FilterResonance, 1.0);

        let track = BufferSource::mono(impulse(SAMPLE_RATE as usize * 2, 1.0), SAMPLE_RATE);
        let mut player = player(controls.clone(), 1, block, track);
        player.play();

        // let the impulse get into the unit's state
        let primed = render(&mut player, 4 * block);
        assert!(primed[0].iter().any(|&s| s != 0.0), "{kind} produced nothing");

        controls.set_bypass(kind, true);
        render(&mut player, block);
        controls.set_bypass(kind, false);

        let after = render(&mut player, SAMPLE_RATE as usize / 2);
        assert!(
            after[0].iter().all(|&s| s == 0.0),
            "{kind} leaked pre-bypass state"
        );
    }
}

//! Randomized checks of the render contract
//!
//! Whatever the pitch and however the host slices its buffers, every render
//! call fills exactly the frames asked for and playback only moves forward.

use proptest::prelude::*;

use modradio_core::domain::audio::{AudioBlock, BufferSource, ProcessSpec};
use modradio_core::domain::player::TransportState;
use modradio_tests::{player, sine, unity_controls, SAMPLE_RATE};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn render_fills_every_frame_and_never_rewinds(
        semitones in -12.0f32..=12.0,
        block_size in 1usize..1024,
        lengths in prop::collection::vec(1usize..=1024, 1..12),
    ) {
        let controls = unity_controls();
        controls.set_pitch_semitones(semitones);
        let track = BufferSource::mono(sine(440.0, 1.0, 0.5), SAMPLE_RATE);
        let mut player = player(controls, 2, block_size, track);
        player.play();

        let mut block = AudioBlock::for_spec(&ProcessSpec::new(SAMPLE_RATE, block_size, 2));
        let mut position = player.position();
        for len in lengths {
            let n = len.min(block_size);
            let before = player.stats().frames_rendered;
            block.set_len(n);
            player.render(&mut block);

            prop_assert_eq!(block.len(), n);
            prop_assert_eq!(player.stats().frames_rendered - before, n as u64);
            for ch in 0..2 {
                prop_assert!(block.channel(ch).iter().all(|s| s.is_finite()));
            }

            let now = player.position();
            prop_assert!(now >= position, "position went back from {} to {}", position, now);
            position = now;
        }
        prop_assert_eq!(player.state(), TransportState::Playing);
    }

    #[test]
    fn pitch_moves_mid_stream_keep_the_contract(
        steps in prop::collection::vec(-12.0f32..=12.0, 1..16),
        block_size in 16usize..512,
    ) {
        let controls = unity_controls();
        let track = BufferSource::mono(sine(330.0, 1.0, 0.5), SAMPLE_RATE);
        let mut player = player(controls.clone(), 1, block_size, track);
        player.play();

        let mut block = AudioBlock::for_spec(&ProcessSpec::new(SAMPLE_RATE, block_size, 1));
        let mut position = player.position();
        for (i, semitones) in steps.into_iter().enumerate() {
            controls.set_pitch_semitones(semitones);
            block.set_len(block_size);
            player.render(&mut block);

            prop_assert_eq!(player.stats().frames_rendered, ((i + 1) * block_size) as u64);
            prop_assert!(player.position() >= position);
            position = player.position();
        }
    }
}

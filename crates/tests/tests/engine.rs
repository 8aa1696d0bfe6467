//! The device-side renderer, driven without a device

use crossbeam::channel::bounded;
use std::sync::Arc;

use modradio_core::domain::audio::{BufferSource, PositionableSource, ProcessSpec};
use modradio_core::domain::chain::EffectKind;
use modradio_core::domain::controls::ControlSurface;
use modradio_core::domain::player::{Player, TransportState};
use modradio_infra::audio::{EngineStatus, StreamRenderer, Track, TransportCommand};
use modradio_tests::{player, render, sine, SAMPLE_RATE};

const BLOCK: usize = 128;

fn all_on() -> Arc<ControlSurface> {
    let controls = ControlSurface::shared();
    controls.set_master_gain(0.8);
    for kind in EffectKind::ORDER {
        controls.set_bypass(kind, false);
    }
    controls
}

fn clip() -> BufferSource {
    BufferSource::mono(sine(440.0, 0.5, 0.5), SAMPLE_RATE)
}

#[test]
fn test_device_buffers_match_block_rendering() {
    let mut reference = player(all_on(), 2, BLOCK, clip());
    reference.play();
    let planar = render(&mut reference, 3000);

    let spec = ProcessSpec::new(SAMPLE_RATE, BLOCK, 2);
    let mut engine_player = Player::new(all_on());
    engine_player.prepare(&spec);
    let (commands, command_rx) = bounded(8);
    let (retired_tx, _retired) = bounded(8);
    let status = Arc::new(EngineStatus::default());
    let mut renderer =
        StreamRenderer::new(engine_player, &spec, command_rx, retired_tx, Arc::clone(&status));

    commands
        .send(TransportCommand::LoadTrack(Track::prepared(clip(), &spec)))
        .unwrap();
    commands.send(TransportCommand::Play).unwrap();

    // device callbacks of 300 frames never line up with the 128-frame block
    let mut interleaved = Vec::new();
    for _ in 0..10 {
        let mut data = vec![0.0; 600];
        renderer.render_interleaved(&mut data, 2);
        interleaved.extend(data);
    }

    for (i, frame) in interleaved.chunks(2).enumerate() {
        assert_eq!(frame[0], planar[0][i], "left frame {i}");
        assert_eq!(frame[1], planar[1][i], "right frame {i}");
    }

    let stats = status.snapshot();
    assert_eq!(stats.state, TransportState::Playing);
    assert_eq!(stats.frames_rendered, 3000);
    assert_eq!(stats.position, 3000);
}

#[test]
fn test_transport_commands_land_between_callbacks() {
    let spec = ProcessSpec::new(SAMPLE_RATE, BLOCK, 1);
    let controls = ControlSurface::shared();
    controls.set_master_gain(1.0);
    let mut player = Player::new(Arc::clone(&controls));
    player.prepare(&spec);

    let (commands, command_rx) = bounded(8);
    let (retired_tx, retired) = bounded(8);
    let status = Arc::new(EngineStatus::default());
    let mut renderer =
        StreamRenderer::new(player, &spec, command_rx, retired_tx, Arc::clone(&status));
    let mut data = vec![0.0; 256];

    commands
        .send(TransportCommand::LoadTrack(Track::prepared(clip(), &spec)))
        .unwrap();
    commands.send(TransportCommand::Play).unwrap();
    renderer.render_interleaved(&mut data, 1);
    assert_eq!(status.snapshot().position, 256);

    commands.send(TransportCommand::Pause).unwrap();
    renderer.render_interleaved(&mut data, 1);
    assert!(data.iter().all(|&s| s == 0.0));
    assert_eq!(status.snapshot().state, TransportState::Paused);

    commands.send(TransportCommand::Seek(10_000)).unwrap();
    commands.send(TransportCommand::Play).unwrap();
    renderer.render_interleaved(&mut data, 1);
    assert_eq!(status.snapshot().position, 10_256);

    // the new track starts at whatever the surface holds when it lands
    controls.set_pitch_semitones(4.0);
    commands
        .send(TransportCommand::LoadTrack(Track::prepared(clip(), &spec)))
        .unwrap();
    renderer.render_interleaved(&mut data, 1);
    assert_eq!(controls.pitch_semitones(), 4.0);
    let stage = renderer.player().stage().unwrap();
    assert_eq!(stage.pitch_control().semitones(), 4.0);
    assert!(!stage.pitch_control().is_ramping());
    assert!(status.snapshot().position > 256);
    assert_eq!(retired.try_recv().map(|s| s.length()).ok(), Some(24_000));

    commands.send(TransportCommand::Stop).unwrap();
    renderer.render_interleaved(&mut data, 1);
    let stats = status.snapshot();
    assert_eq!(stats.state, TransportState::Stopped);
    assert_eq!(stats.position, 0);
}

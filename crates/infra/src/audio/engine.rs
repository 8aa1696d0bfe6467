//! Real-time playback engine
//!
//! [`PlaybackEngine`] opens an output device, prepares a [`Player`] for its
//! rate and channel count, and drives it from the CPAL callback. The
//! control thread talks to the callback through two channels only:
//! transport commands go in over a bounded crossbeam channel, and tracks
//! replaced by a track change come back out so they are freed off the
//! audio thread. Parameter changes go through the player's
//! [`ControlSurface`].
//!
//! A new track crosses over already wrapped in a prepared
//! [`PitchShiftStage`]; the callback only swaps pointers.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use modradio_core::domain::audio::{AudioBlock, AudioError, BufferSource, ProcessSpec, Result};
use modradio_core::domain::controls::ControlSurface;
use modradio_core::domain::pitch::PitchShiftStage;
use modradio_core::domain::player::{Player, PlayerStats, TransportState};

use super::cpal_backend::{device_name, CpalOutputHost};

/// Commands queued per callback
const COMMAND_QUEUE_DEPTH: usize = 32;

/// Replaced tracks waiting to be freed by the control thread
const RETIRED_QUEUE_DEPTH: usize = 2 * COMMAND_QUEUE_DEPTH;

/// A decoded track behind its pitch stage, as the player holds it
pub type Track = PitchShiftStage<BufferSource>;

/// Transport request for the audio thread
#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum TransportCommand {
    Play,
    Pause,
    Stop,
    Seek(u64),
    /// Swap in a track built with [`Track::prepared`] for the stream's spec
    LoadTrack(Track),
}

/// Stream parameters requested by the caller
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Output device name (`None` = system default)
    pub device: Option<String>,

    /// Preferred sample rate; the device may impose another
    pub sample_rate: u32,

    /// Largest block the player renders at once
    pub block_size: usize,
}

/// Player counters published by the audio thread after every callback
#[derive(Debug, Default)]
pub struct EngineStatus {
    state: AtomicU8,
    position: AtomicU64,
    length: AtomicU64,
    frames_rendered: AtomicU64,
    underruns: AtomicU64,
    dropped_frames: AtomicU64,
}

impl EngineStatus {
    fn state_code(state: TransportState) -> u8 {
        match state {
            TransportState::Stopped => 0,
            TransportState::Playing => 1,
            TransportState::Paused => 2,
        }
    }

    fn state_from_code(code: u8) -> TransportState {
        match code {
            1 => TransportState::Playing,
            2 => TransportState::Paused,
            _ => TransportState::Stopped,
        }
    }

    pub fn publish(&self, stats: &PlayerStats) {
        self.state
            .store(Self::state_code(stats.state), Ordering::Relaxed);
        self.position.store(stats.position, Ordering::Relaxed);
        self.length.store(stats.length, Ordering::Relaxed);
        self.frames_rendered
            .store(stats.frames_rendered, Ordering::Relaxed);
        self.underruns.store(stats.underruns, Ordering::Relaxed);
        self.dropped_frames
            .store(stats.dropped_frames, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PlayerStats {
        PlayerStats {
            state: Self::state_from_code(self.state.load(Ordering::Relaxed)),
            position: self.position.load(Ordering::Relaxed),
            length: self.length.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
        }
    }
}

/// Audio-thread half of the engine
///
/// Owns the player and renders it into interleaved device buffers. Kept
/// separate from the CPAL stream so it can be driven without a device.
///
/// Replaced tracks are never freed here. When the retired queue is full
/// the track is parked and further commands wait until it drains.
pub struct StreamRenderer {
    player: Player<BufferSource>,
    block: AudioBlock,
    commands: Receiver<TransportCommand>,
    retired: Sender<Track>,
    parked: Option<Track>,
    status: Arc<EngineStatus>,
}

impl StreamRenderer {
    /// Wrap a player already prepared for `spec`
    pub fn new(
        player: Player<BufferSource>,
        spec: &ProcessSpec,
        commands: Receiver<TransportCommand>,
        retired: Sender<Track>,
        status: Arc<EngineStatus>,
    ) -> Self {
        Self {
            player,
            block: AudioBlock::for_spec(spec),
            commands,
            retired,
            parked: None,
            status,
        }
    }

    pub fn player(&self) -> &Player<BufferSource> {
        &self.player
    }

    /// Whether a replaced track is waiting for room in the retired queue
    pub fn has_parked_track(&self) -> bool {
        self.parked.is_some()
    }

    /// Hand the parked track to the control thread; false while it stays
    fn retire_parked(&mut self) -> bool {
        let Some(track) = self.parked.take() else {
            return true;
        };
        match self.retired.try_send(track) {
            Ok(()) => true,
            Err(TrySendError::Full(track)) | Err(TrySendError::Disconnected(track)) => {
                self.parked = Some(track);
                false
            }
        }
    }

    /// Apply queued transport commands
    ///
    /// Stops early while a replaced track is parked, so commands stay in
    /// order behind the track change.
    pub fn handle_commands(&mut self) {
        if !self.retire_parked() {
            return;
        }
        while let Ok(command) = self.commands.try_recv() {
            match command {
                TransportCommand::Play => self.player.play(),
                TransportCommand::Pause => self.player.pause(),
                TransportCommand::Stop => self.player.stop(),
                TransportCommand::Seek(frame) => self.player.seek(frame),
                TransportCommand::LoadTrack(track) => {
                    self.parked = self.player.swap_stage(track);
                    if !self.retire_parked() {
                        break;
                    }
                }
            }
        }
    }

    /// Fill an interleaved device buffer with `channels` lanes
    pub fn render_interleaved(&mut self, data: &mut [f32], channels: usize) {
        self.handle_commands();

        let channels = channels.max(1);
        let frames = data.len() / channels;
        let chunk = self.block.capacity().max(1);
        let mut offset = 0;
        while offset < frames {
            let n = (frames - offset).min(chunk);
            self.block.set_len(n);
            self.player.render(&mut self.block);
            self.block
                .write_interleaved(&mut data[offset * channels..(offset + n) * channels], channels);
            offset += n;
        }
        data[frames * channels..].fill(0.0);

        self.status.publish(&self.player.stats());
    }
}

/// Control-thread handle to a running stream
pub struct PlaybackHandle {
    stream: cpal::Stream,
    commands: Sender<TransportCommand>,
    retired: Receiver<Track>,
    controls: Arc<ControlSurface>,
    status: Arc<EngineStatus>,
    spec: ProcessSpec,
    device: String,
    reported: (u64, u64),
}

impl PlaybackHandle {
    /// Queue a transport command for the next callback
    pub fn send(&self, command: TransportCommand) -> Result<()> {
        while self.retired.try_recv().is_ok() {}

        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => AudioError::StreamError("command queue full".to_string()),
            TrySendError::Disconnected(_) => {
                AudioError::StreamError("audio thread has stopped".to_string())
            }
        })
    }

    /// Prepare `source` for this stream and queue it as the current track
    ///
    /// The pitch control goes back to 0 semitones first, so the new track
    /// starts unshifted unless the caller sets a pitch after this returns.
    pub fn load_track(&self, source: BufferSource) -> Result<()> {
        let track = Track::prepared(source, &self.spec);
        let semitones = self.controls.pitch_semitones();
        self.controls.set_pitch_semitones(0.0);
        self.send(TransportCommand::LoadTrack(track)).map_err(|e| {
            self.controls.set_pitch_semitones(semitones);
            e
        })
    }

    pub fn controls(&self) -> Arc<ControlSurface> {
        Arc::clone(&self.controls)
    }

    /// Session the player was prepared with
    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Latest counters published by the audio thread
    pub fn stats(&self) -> PlayerStats {
        self.status.snapshot()
    }

    /// Snapshot the counters, warning about new underruns or drops
    pub fn check_health(&mut self) -> PlayerStats {
        let stats = self.stats();
        let (underruns, dropped) = self.reported;
        if stats.underruns > underruns {
            warn!(
                new = stats.underruns - underruns,
                total = stats.underruns,
                "Pitch stage underrun"
            );
        }
        if stats.dropped_frames > dropped {
            warn!(
                new = stats.dropped_frames - dropped,
                total = stats.dropped_frames,
                "Pitch stage FIFO overflow"
            );
        }
        self.reported = (stats.underruns, stats.dropped_frames);
        stats
    }

    /// Pause the device stream without touching the transport
    pub fn suspend(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamError(format!("Failed to pause stream: {}", e)))
    }

    pub fn resume(&self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start stream: {}", e)))
    }

    /// Close the stream
    pub fn stop(self) {
        drop(self.stream);
        info!(device = %self.device, "Playback stopped");
    }
}

/// Opens output streams driven by a [`Player`]
pub struct PlaybackEngine;

impl PlaybackEngine {
    /// Open the device, prepare `player` for it, and start streaming
    pub fn start(
        mut player: Player<BufferSource>,
        options: &StreamOptions,
    ) -> Result<PlaybackHandle> {
        let host = CpalOutputHost::new();
        let device = host.find_output_device(options.device.as_deref())?;
        let name = device_name(&device);

        let requested_rate = if options.sample_rate == 0 {
            ProcessSpec::default().sample_rate
        } else {
            options.sample_rate
        };
        let supported = host.output_config(&device, requested_rate)?;
        let config: cpal::StreamConfig = supported.config();
        let channels = config.channels as usize;

        let block_size = if options.block_size == 0 {
            ProcessSpec::default().max_block_size
        } else {
            options.block_size
        };
        let spec = ProcessSpec::new(config.sample_rate, block_size, channels);
        if spec.sample_rate != config.sample_rate {
            return Err(AudioError::UnsupportedConfiguration(format!(
                "sample rate {} Hz is out of range",
                config.sample_rate
            )));
        }

        info!(
            device = %name,
            sample_rate = spec.sample_rate,
            channels,
            block_size,
            "Creating output stream"
        );

        player.prepare(&spec);
        let controls = player.controls();

        let (command_tx, command_rx) = bounded(COMMAND_QUEUE_DEPTH);
        let (retired_tx, retired_rx) = bounded(RETIRED_QUEUE_DEPTH);
        let status = Arc::new(EngineStatus::default());
        let mut renderer =
            StreamRenderer::new(player, &spec, command_rx, retired_tx, Arc::clone(&status));

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.render_interleaved(data, channels);
                },
                |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start stream: {}", e)))?;
        debug!(device = %name, "Output stream started");

        Ok(PlaybackHandle {
            stream,
            commands: command_tx,
            retired: retired_rx,
            controls,
            status,
            spec,
            device: name,
            reported: (0, 0),
        })
    }
}

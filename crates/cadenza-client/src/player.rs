//! Per-guild playback session.
//!
//! One `Player` owns all mutable session state for its guild: the queue
//! (head = currently-playing track), repeat flags, filters and the voice
//! link. The node it is bound to is fixed at creation. All state lives
//! behind one mutex; the design assumes one logical writer per guild.

use std::sync::{Arc, Weak};

use cadenza_proto::filters::{
    Band, ChannelMix, Distortion, FilterPayload, Karaoke, LowPass, Rotation, Timescale, Tremolo,
    Vibrato,
};
use cadenza_proto::{
    EndReason, EventKind, NodeEvent, Outbound, PlayerState, Track, VoiceServerUpdate,
};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::events::ManagerEvent;
use crate::manager::Shared;
use crate::node::Node;

/// Number of equalizer bands a node exposes.
pub const EQ_BANDS: usize = 16;

/// Voice close codes after which the node expects the client to rejoin the
/// channel (server-initiated resume).
const REJOIN_CLOSE_CODES: [u16; 2] = [4015, 4009];

/// Parameters for creating a session.
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    pub guild_id: String,
    pub voice_channel: Option<String>,
    /// Opaque host-defined notification channel id.
    pub text_channel: Option<String>,
    pub volume: u16,
    pub self_mute: bool,
    pub self_deaf: bool,
}

impl PlayerOptions {
    pub fn new(guild_id: impl Into<String>, voice_channel: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            voice_channel: Some(voice_channel.into()),
            text_channel: None,
            volume: 100,
            self_mute: false,
            self_deaf: false,
        }
    }

    pub fn text_channel(mut self, channel: impl Into<String>) -> Self {
        self.text_channel = Some(channel.into());
        self
    }

    pub fn volume(mut self, volume: u16) -> Self {
        self.volume = volume;
        self
    }

    pub fn self_deaf(mut self, deaf: bool) -> Self {
        self.self_deaf = deaf;
        self
    }

    pub fn self_mute(mut self, mute: bool) -> Self {
        self.self_mute = mute;
        self
    }
}

/// Overrides for a `play` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayOptions {
    pub start_time: u64,
    pub no_replace: bool,
    pub pause: bool,
}

struct VoiceLink {
    session_id: String,
    event: VoiceServerUpdate,
}

struct PlayerInner {
    /// FIFO queue; the head is the currently-playing track.
    queue: std::collections::VecDeque<Track>,
    track_repeat: bool,
    queue_repeat: bool,
    playing: bool,
    paused: bool,
    position: u64,
    volume: u16,
    bands: [f64; EQ_BANDS],
    voice_channel: Option<String>,
    text_channel: Option<String>,
    self_mute: bool,
    self_deaf: bool,
    voice: Option<VoiceLink>,
    destroyed: bool,
}

pub struct Player {
    guild_id: String,
    node: Arc<Node>,
    shared: Weak<Shared>,
    inner: Mutex<PlayerInner>,
}

impl Player {
    pub(crate) fn new(options: PlayerOptions, node: Arc<Node>, shared: Weak<Shared>) -> Self {
        Self {
            guild_id: options.guild_id,
            node,
            shared,
            inner: Mutex::new(PlayerInner {
                queue: std::collections::VecDeque::new(),
                track_repeat: false,
                queue_repeat: false,
                playing: false,
                paused: false,
                position: 0,
                volume: options.volume,
                bands: [0.0; EQ_BANDS],
                voice_channel: options.voice_channel,
                text_channel: options.text_channel,
                self_mute: options.self_mute,
                self_deaf: options.self_deaf,
                voice: None,
                destroyed: false,
            }),
        }
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    /// The node this session was bound to at creation. Never reassigned.
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().playing
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    pub fn position(&self) -> u64 {
        self.inner.lock().position
    }

    pub fn volume(&self) -> u16 {
        self.inner.lock().volume
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// The currently-playing track (the queue head), if any.
    pub fn current(&self) -> Option<Track> {
        self.inner.lock().queue.front().cloned()
    }

    pub fn text_channel(&self) -> Option<String> {
        self.inner.lock().text_channel.clone()
    }

    pub fn voice_channel(&self) -> Option<String> {
        self.inner.lock().voice_channel.clone()
    }

    pub fn enqueue(&self, track: Track) {
        self.inner.lock().queue.push_back(track);
    }

    pub fn enqueue_all(&self, tracks: impl IntoIterator<Item = Track>) {
        self.inner.lock().queue.extend(tracks);
    }

    pub fn clear_queue(&self) {
        self.inner.lock().queue.clear();
    }

    pub fn set_track_repeat(&self, repeat: bool) {
        self.inner.lock().track_repeat = repeat;
    }

    pub fn set_queue_repeat(&self, repeat: bool) {
        self.inner.lock().queue_repeat = repeat;
    }

    /// Start playing the queue head. Returns `Ok(false)` when the queue is
    /// empty and there is nothing to play.
    pub fn play(&self, options: PlayOptions) -> Result<bool> {
        let (track, volume) = {
            let mut inner = self.inner.lock();
            let Some(head) = inner.queue.front() else {
                return Ok(false);
            };
            let encoded = head.encoded.clone();
            inner.playing = true;
            inner.paused = options.pause;
            inner.position = options.start_time;
            (encoded, inner.volume)
        };

        self.node.send(&Outbound::Play {
            guild_id: self.guild_id.clone(),
            track,
            start_time: options.start_time,
            volume,
            no_replace: options.no_replace,
            pause: options.pause,
        })?;
        Ok(true)
    }

    /// Stop the current track, skipping `amount` tracks in total. `amount`
    /// beyond the queue length is rejected. The node answers with a
    /// STOPPED track-end, which drops the head, so `amount - 1` entries are
    /// removed up front.
    pub fn stop(&self, amount: usize) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if amount == 0 || (amount > 1 && amount > inner.queue.len()) {
                return Err(ClientError::InvalidSkipAmount {
                    amount,
                    queued: inner.queue.len(),
                });
            }
            if amount > 1 {
                inner.queue.drain(..amount - 1);
            }
        }

        self.node.send(&Outbound::Stop {
            guild_id: self.guild_id.clone(),
        })?;
        Ok(())
    }

    /// Pause or resume. A no-op on an empty queue or when already in the
    /// requested state.
    pub fn pause(&self, pause: bool) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.queue.is_empty() || inner.paused == pause {
                return Ok(());
            }
            inner.playing = !pause;
            inner.paused = pause;
        }

        self.node.send(&Outbound::Pause {
            guild_id: self.guild_id.clone(),
            pause,
        })?;
        Ok(())
    }

    /// Seek within the current track; positions past the end clamp to the
    /// track duration.
    pub fn seek(&self, position: u64) -> Result<()> {
        let clamped = {
            let mut inner = self.inner.lock();
            let Some(current) = inner.queue.front() else {
                return Err(ClientError::EmptyQueue);
            };
            let clamped = position.min(current.info.length);
            inner.position = clamped;
            clamped
        };

        self.node.send(&Outbound::Seek {
            guild_id: self.guild_id.clone(),
            position: clamped,
        })?;
        Ok(())
    }

    pub fn set_volume(&self, volume: u16) -> Result<()> {
        if volume > 1000 {
            return Err(ClientError::InvalidVolume(volume));
        }
        self.inner.lock().volume = volume;
        self.node.send(&Outbound::Volume {
            guild_id: self.guild_id.clone(),
            volume,
        })?;
        Ok(())
    }

    /// Apply equalizer band gains. Requires an active track; every band
    /// must name an index below [`EQ_BANDS`] with a gain in `-0.25..=1.0`.
    pub fn set_equalizer(&self, bands: &[Band]) -> Result<()> {
        self.ensure_playing()?;
        for band in bands {
            if band.band as usize >= EQ_BANDS || !(-0.25..=1.0).contains(&band.gain) {
                return Err(ClientError::InvalidBand {
                    band: band.band,
                    gain: band.gain,
                });
            }
        }

        {
            let mut inner = self.inner.lock();
            for band in bands {
                inner.bands[band.band as usize] = band.gain;
            }
        }
        self.node.send(&Outbound::Equalizer {
            guild_id: self.guild_id.clone(),
            bands: bands.to_vec(),
        })?;
        Ok(())
    }

    /// Per-band gains as last applied through [`set_equalizer`].
    pub fn equalizer(&self) -> [f64; EQ_BANDS] {
        self.inner.lock().bands
    }

    pub fn set_karaoke(&self, karaoke: Karaoke) -> Result<()> {
        self.send_filters(FilterPayload {
            karaoke: Some(karaoke),
            ..FilterPayload::default()
        })
    }

    pub fn set_timescale(&self, timescale: Timescale) -> Result<()> {
        self.send_filters(FilterPayload {
            timescale: Some(timescale),
            ..FilterPayload::default()
        })
    }

    pub fn set_tremolo(&self, tremolo: Tremolo) -> Result<()> {
        self.send_filters(FilterPayload {
            tremolo: Some(tremolo),
            ..FilterPayload::default()
        })
    }

    pub fn set_vibrato(&self, vibrato: Vibrato) -> Result<()> {
        self.send_filters(FilterPayload {
            vibrato: Some(vibrato),
            ..FilterPayload::default()
        })
    }

    pub fn set_rotation(&self, rotation: Rotation) -> Result<()> {
        self.send_filters(FilterPayload {
            rotation: Some(rotation),
            ..FilterPayload::default()
        })
    }

    pub fn set_distortion(&self, distortion: Distortion) -> Result<()> {
        self.send_filters(FilterPayload {
            distortion: Some(distortion),
            ..FilterPayload::default()
        })
    }

    pub fn set_channel_mix(&self, channel_mix: ChannelMix) -> Result<()> {
        self.send_filters(FilterPayload {
            channel_mix: Some(channel_mix),
            ..FilterPayload::default()
        })
    }

    pub fn set_low_pass(&self, low_pass: LowPass) -> Result<()> {
        self.send_filters(FilterPayload {
            low_pass: Some(low_pass),
            ..FilterPayload::default()
        })
    }

    /// Drop every active filter node-side.
    pub fn clear_filters(&self) -> Result<()> {
        self.send_filters(FilterPayload::clear())
    }

    fn send_filters(&self, payload: FilterPayload) -> Result<()> {
        self.ensure_playing()?;
        self.node.send(&Outbound::Filters {
            guild_id: self.guild_id.clone(),
            payload,
        })?;
        Ok(())
    }

    fn ensure_playing(&self) -> Result<()> {
        if self.inner.lock().playing {
            Ok(())
        } else {
            Err(ClientError::NotPlaying)
        }
    }

    /// Hand the node the correlated voice pair, opening the voice link.
    pub fn connect_voice(&self, session_id: String, event: VoiceServerUpdate) -> Result<()> {
        self.inner.lock().voice = Some(VoiceLink {
            session_id: session_id.clone(),
            event: event.clone(),
        });
        self.node.send(&Outbound::VoiceUpdate {
            guild_id: self.guild_id.clone(),
            session_id,
            event,
        })?;
        Ok(())
    }

    /// Leave the voice channel via the host shard. A no-op when no voice
    /// channel is set.
    pub fn disconnect_voice(&self) -> Result<()> {
        let paused = {
            let inner = self.inner.lock();
            if inner.voice_channel.is_none() {
                return Ok(());
            }
            inner.paused
        };
        if paused {
            self.pause(false)?;
        }

        if let Some(shared) = self.shared.upgrade() {
            (shared.transfer)(json!({
                "op": 4,
                "d": {
                    "guild_id": self.guild_id,
                    "channel_id": null,
                    "self_mute": false,
                    "self_deaf": false,
                }
            }));
        }
        let mut inner = self.inner.lock();
        inner.voice_channel = None;
        inner.voice = None;
        Ok(())
    }

    /// Tear the session down: leave voice, destroy the node-side player and
    /// deregister. Calling this twice is harmless; the second call does
    /// nothing.
    pub fn destroy(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                return Ok(());
            }
            inner.destroyed = true;
        }

        self.disconnect_voice()?;
        self.node.send(&Outbound::Destroy {
            guild_id: self.guild_id.clone(),
        })?;

        if let Some(shared) = self.shared.upgrade() {
            shared.emit(ManagerEvent::PlayerDestroy {
                guild_id: self.guild_id.clone(),
            });
            shared.players.remove(&self.guild_id);
        }
        debug!(guild_id = %self.guild_id, "player destroyed");
        Ok(())
    }

    pub(crate) fn set_voice_channel(&self, channel: Option<String>) {
        self.inner.lock().voice_channel = channel;
    }

    pub(crate) fn update_state(&self, state: PlayerState) {
        if let Some(position) = state.position {
            self.inner.lock().position = position;
        }
    }

    /// Interpret one node lifecycle event for this guild.
    pub(crate) fn handle_event(&self, event: NodeEvent) -> Result<()> {
        match event.kind {
            EventKind::TrackStart { track } => {
                self.emit(ManagerEvent::TrackStart {
                    guild_id: self.guild_id.clone(),
                    track,
                });
            }
            EventKind::TrackEnd { track, reason } => {
                let queue_ended = self.advance_on_end(reason)?;
                if queue_ended {
                    self.emit(ManagerEvent::QueueEnd {
                        guild_id: self.guild_id.clone(),
                    });
                }
                self.emit(ManagerEvent::TrackEnd {
                    guild_id: self.guild_id.clone(),
                    track,
                    reason,
                });
            }
            EventKind::TrackStuck { track, threshold_ms } => {
                self.inner.lock().queue.pop_front();
                self.emit(ManagerEvent::TrackStuck {
                    guild_id: self.guild_id.clone(),
                    track,
                    threshold_ms,
                });
            }
            EventKind::TrackException {
                track,
                error,
                exception,
            } => {
                self.inner.lock().queue.pop_front();
                let error = error.or_else(|| exception.and_then(|e| e.message));
                self.emit(ManagerEvent::TrackException {
                    guild_id: self.guild_id.clone(),
                    track,
                    error,
                });
            }
            EventKind::WebSocketClosed {
                code,
                reason,
                by_remote,
            } => {
                if REJOIN_CLOSE_CODES.contains(&code) {
                    self.rejoin_voice_channel();
                }
                self.emit(ManagerEvent::SocketClosed {
                    guild_id: self.guild_id.clone(),
                    code,
                    reason,
                    by_remote,
                });
            }
        }
        Ok(())
    }

    /// The end-of-track decision table. Track repeat wins over queue
    /// repeat; the FINISHED/STOPPED distinction decides whether the head
    /// is dropped before advancing. Returns whether the queue ended.
    fn advance_on_end(&self, reason: EndReason) -> Result<bool> {
        enum Action {
            Replay,
            Advance,
            EndQueue,
            StopOnly,
            Nothing,
        }

        let action = {
            let mut inner = self.inner.lock();
            let len = inner.queue.len();
            match reason {
                EndReason::Finished if inner.track_repeat => Action::Replay,
                EndReason::Finished if inner.queue_repeat && len <= 1 => Action::Replay,
                EndReason::Finished if len <= 1 => {
                    inner.queue.clear();
                    inner.playing = false;
                    inner.paused = false;
                    Action::EndQueue
                }
                EndReason::Stopped if len >= 2 => {
                    inner.queue.pop_front();
                    Action::Advance
                }
                EndReason::Stopped => {
                    inner.queue.clear();
                    inner.playing = false;
                    inner.paused = false;
                    Action::StopOnly
                }
                _ if len >= 2 => {
                    inner.queue.pop_front();
                    Action::Advance
                }
                _ => Action::Nothing,
            }
        };

        match action {
            Action::Replay | Action::Advance => {
                self.play(PlayOptions::default())?;
                Ok(false)
            }
            Action::EndQueue => {
                self.node.send(&Outbound::Stop {
                    guild_id: self.guild_id.clone(),
                })?;
                Ok(true)
            }
            Action::StopOnly => {
                self.node.send(&Outbound::Stop {
                    guild_id: self.guild_id.clone(),
                })?;
                Ok(false)
            }
            Action::Nothing => Ok(false),
        }
    }

    /// The voice server asked us to re-establish: issue a fresh join for
    /// the current channel through the host shard.
    fn rejoin_voice_channel(&self) {
        let (channel, self_mute, self_deaf) = {
            let inner = self.inner.lock();
            match &inner.voice_channel {
                Some(channel) => (channel.clone(), inner.self_mute, inner.self_deaf),
                None => {
                    warn!(guild_id = %self.guild_id, "resume requested without a voice channel");
                    return;
                }
            }
        };

        if let Some(shared) = self.shared.upgrade() {
            (shared.transfer)(json!({
                "op": 4,
                "d": {
                    "guild_id": self.guild_id,
                    "channel_id": channel,
                    "self_mute": self_mute,
                    "self_deaf": self_deaf,
                }
            }));
        }
    }

    fn emit(&self, event: ManagerEvent) {
        if let Some(shared) = self.shared.upgrade() {
            shared.emit(event);
        }
    }
}

//! Control-channel message definitions

use serde::{Deserialize, Serialize};

use crate::filters::{Band, FilterPayload};
use crate::stats::Stats;
use crate::voice::VoiceServerUpdate;

/// Commands sent to an audio node, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Outbound {
    /// Start (or replace) playback of an encoded track.
    #[serde(rename_all = "camelCase")]
    Play {
        guild_id: String,
        track: String,
        start_time: u64,
        volume: u16,
        no_replace: bool,
        pause: bool,
    },
    /// Stop the player for a guild.
    #[serde(rename_all = "camelCase")]
    Stop { guild_id: String },
    /// Pause or resume playback.
    #[serde(rename_all = "camelCase")]
    Pause { guild_id: String, pause: bool },
    /// Seek within the current track, milliseconds.
    #[serde(rename_all = "camelCase")]
    Seek { guild_id: String, position: u64 },
    /// Set player volume.
    #[serde(rename_all = "camelCase")]
    Volume { guild_id: String, volume: u16 },
    /// Apply equalizer band gains.
    #[serde(rename_all = "camelCase")]
    Equalizer { guild_id: String, bands: Vec<Band> },
    /// Apply (or clear, when empty) the audio filter chain.
    #[serde(rename_all = "camelCase")]
    Filters {
        guild_id: String,
        #[serde(flatten)]
        payload: FilterPayload,
    },
    /// Hand the node the correlated voice credentials for a guild.
    #[serde(rename_all = "camelCase")]
    VoiceUpdate {
        guild_id: String,
        session_id: String,
        event: VoiceServerUpdate,
    },
    /// Tear down the node-side player for a guild.
    #[serde(rename_all = "camelCase")]
    Destroy { guild_id: String },
    /// Configure node-side session resumption.
    #[serde(rename_all = "camelCase")]
    ConfigureResuming { key: String, timeout: u64 },
}

/// Payloads pushed by an audio node, tagged by `op`.
///
/// An unrecognized tag is a decode error; the node and client would be out
/// of contract and the payload must not be silently dropped into a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Inbound {
    /// Periodic load snapshot for the whole node.
    Stats(Stats),
    /// Position/time refresh for one guild's player.
    #[serde(rename_all = "camelCase")]
    PlayerUpdate { guild_id: String, state: PlayerState },
    /// Player lifecycle event for one guild.
    Event(NodeEvent),
}

/// Last-known playback state carried by `playerUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub position: Option<u64>,
    #[serde(default)]
    pub connected: Option<bool>,
    #[serde(default)]
    pub volume: Option<u16>,
}

/// A lifecycle event for one guild's player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEvent {
    #[serde(rename = "guildId")]
    pub guild_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// The event variants a node may push, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "TrackStartEvent")]
    TrackStart { track: String },

    #[serde(rename = "TrackEndEvent")]
    TrackEnd { track: String, reason: EndReason },

    #[serde(rename = "TrackStuckEvent", rename_all = "camelCase")]
    TrackStuck { track: String, threshold_ms: u64 },

    #[serde(rename = "TrackExceptionEvent")]
    TrackException {
        #[serde(default)]
        track: Option<String>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        exception: Option<crate::track::TrackException>,
    },

    #[serde(rename = "WebSocketClosedEvent", rename_all = "camelCase")]
    WebSocketClosed {
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

/// Why a track stopped playing. Governs whether the session advances its
/// queue before deciding what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

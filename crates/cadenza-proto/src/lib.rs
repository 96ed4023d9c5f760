//! Wire model for the cadenza audio-node protocol.
//!
//! Everything an audio node sends or receives over its control channel is
//! described here as plain serde types: outbound commands, inbound
//! stats/event payloads, track adapters, filter payloads, and the raw
//! voice-gateway DTOs the host feeds in. No I/O lives in this crate.

pub mod codec;
pub mod error;
pub mod filters;
pub mod message;
pub mod stats;
pub mod track;
pub mod voice;

pub use error::{Error, Result};
pub use filters::{
    Band, ChannelMix, Distortion, FilterPayload, Karaoke, LowPass, Rotation, Timescale, Tremolo,
    Vibrato,
};
pub use message::{EndReason, EventKind, Inbound, NodeEvent, Outbound, PlayerState};
pub use stats::{CpuStats, FrameStats, MemoryStats, Stats};
pub use track::{LoadResponse, LoadType, PlaylistInfo, Track, TrackException, TrackInfo};
pub use voice::{VoiceServerUpdate, VoiceStateUpdate};

/// Normal-closure code on the node control channel. Any other close code
/// triggers reconnection.
pub const CLOSE_NORMAL: u16 = 1000;

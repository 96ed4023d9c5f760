//! Notifications delivered to the host.
//!
//! Every manager hands out one unbounded receiver at build time; there is no
//! global dispatcher. Dropping the receiver silently discards further
//! notifications without affecting playback.

use cadenza_proto::EndReason;

/// Everything the host can observe about nodes and sessions.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    /// A node finished its handshake and is eligible for selection.
    NodeConnect { node: String },
    /// A node's reconnect delay elapsed and a fresh connect is starting.
    NodeReconnect { node: String },
    /// A node's socket reported an error. Reconnection is already scheduled.
    NodeError { node: String, error: String },
    /// A node's socket closed with the given code.
    NodeClose {
        node: String,
        code: u16,
        reason: String,
    },

    TrackStart {
        guild_id: String,
        track: String,
    },
    TrackEnd {
        guild_id: String,
        track: String,
        reason: EndReason,
    },
    TrackStuck {
        guild_id: String,
        track: String,
        threshold_ms: u64,
    },
    TrackException {
        guild_id: String,
        track: Option<String>,
        error: Option<String>,
    },
    /// The node's own voice connection for a guild closed.
    SocketClosed {
        guild_id: String,
        code: u16,
        reason: String,
        by_remote: bool,
    },
    /// A session ran out of queue with no repeat active.
    QueueEnd { guild_id: String },
    PlayerDestroy { guild_id: String },

    Debug { message: String },
    /// Every payload a node pushes, verbatim, tagged with its origin.
    Raw { node: String, payload: String },
}

//! Raw voice-gateway payloads fed in by the host.
//!
//! These two events arrive independently and in either order; a voice link
//! can only be opened once both halves are present for a guild.

use serde::{Deserialize, Serialize};

/// The server half: endpoint and token for the guild's voice server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceServerUpdate {
    pub token: String,
    pub guild_id: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// The client half: the bot's own voice state for a guild. A `None` channel
/// means the bot left the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceStateUpdate {
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub user_id: String,
    pub session_id: String,
}

//! JSON codec for the node control channel.
//!
//! The control channel carries text frames, one JSON object per frame. An
//! inbound payload whose `op` (or event `type`) tag is not part of the
//! protocol fails to decode; callers treat that as a protocol violation
//! rather than guessing.

use crate::error::{Error, Result};
use crate::message::{Inbound, Outbound};

/// Encode an outbound command to its wire form.
pub fn encode(message: &Outbound) -> Result<String> {
    serde_json::to_string(message).map_err(|e| Error::Encode(e.to_string()))
}

/// Decode an inbound payload from its wire form.
pub fn decode(text: &str) -> Result<Inbound> {
    serde_json::from_str(text).map_err(|e| Error::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_round_trips_through_decode_types() {
        let msg = Outbound::Stop {
            guild_id: "123".into(),
        };
        let text = encode(&msg).unwrap();
        assert_eq!(text, r#"{"op":"stop","guildId":"123"}"#);
    }

    #[test]
    fn unknown_op_is_rejected() {
        let err = decode(r#"{"op":"teleport","guildId":"1"}"#).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}

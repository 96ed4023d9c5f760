//! Client error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Raised at build time when no transfer callback was supplied.
    #[error("a transfer callback is required")]
    MissingTransfer,

    /// Raised by `start` when no bot user id was supplied.
    #[error("a bot user id is required")]
    MissingBotId,

    /// Raised by `start` when the bot user id is not a valid snowflake.
    #[error("invalid bot user id: {0}")]
    InvalidBotId(String),

    #[error("no audio nodes are connected")]
    NoNodesAvailable,

    #[error("no results for: {0}")]
    NoResults(String),

    #[error("no player for guild {0}")]
    PlayerNotFound(String),

    #[error("player is not playing")]
    NotPlaying,

    #[error("queue is empty")]
    EmptyQueue,

    #[error("cannot skip {amount} tracks with {queued} queued")]
    InvalidSkipAmount { amount: usize, queued: usize },

    #[error("volume {0} outside 0..=1000")]
    InvalidVolume(u16),

    #[error("equalizer band {band} invalid (gain {gain})")]
    InvalidBand { band: u8, gain: f64 },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("node returned status {0}")]
    UnexpectedStatus(u16),

    #[error("protocol error: {0}")]
    Protocol(#[from] cadenza_proto::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

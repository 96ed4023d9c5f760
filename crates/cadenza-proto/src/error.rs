//! Error types for the wire model

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wire model error types
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization error
    #[error("encode error: {0}")]
    Encode(String),

    /// JSON deserialization error, including unrecognized `op`/`type` tags
    #[error("decode error: {0}")]
    Decode(String),
}

//! Error types for Spillway.

use thiserror::Error;

use crate::config::ConfigError;

/// Result alias used throughout Spillway.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by spillable collections and their spill storage.
#[derive(Error, Debug)]
pub enum Error {
    /// The backing store of a spill segment failed to read or write.
    #[error("spill I/O error: {0}")]
    SpillIo(#[from] std::io::Error),

    /// A spill segment did not contain what its writer put there.
    #[error("corrupt spill segment: {0}")]
    Corruption(String),

    /// A tuple could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The collection was used after `close`.
    #[error("{0} used after close")]
    Closed(&'static str),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A segment references a codec this build cannot decode.
    #[error("codec unavailable: {0}")]
    CodecUnavailable(String),

    /// A record transform failed.
    #[error("transform failed: {0}")]
    Transform(String),
}

impl Error {
    /// Returns `true` if this is a spill I/O failure.
    #[must_use]
    pub fn is_spill_io(&self) -> bool {
        matches!(self, Error::SpillIo(_))
    }
}

//! Error types of the core.

use thiserror::Error;

/// A frame could not be turned into a message or vice versa.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,
    #[error("unsupported protocol version {found}, expected {expected}")]
    Version { found: u8, expected: u8 },
    #[error("payload could not be decoded: {0}")]
    Payload(String),
}

/// The game configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failures on the relay channel. Surfaced to the caller, never retried internally.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RelayError {
    #[error("not connected to the relay")]
    NotConnected,
    #[error("could not reach the relay: {0}")]
    ConnectFailed(String),
    #[error("connection closed: {0}")]
    Closed(String),
    #[error("request refused by the relay: {0}")]
    Refused(String),
    #[error("no acknowledgement within {0} seconds")]
    AckTimeout(f32),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// An operation the session rejects before anything goes over the wire.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("already playing in match {0}")]
    AlreadyInMatch(String),
    #[error("not part of a match")]
    NoMatch,
}

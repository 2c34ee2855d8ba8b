//! Error types.
//!
//! Library code returns these typed errors; binaries and the server loop wrap
//! them in `anyhow` with context.

use std::io;

use thiserror::Error;

/// Wire-level failures. Any of these terminates the offending session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown packet id {0:#04x}")]
    UnknownPacket(u8),

    #[error("packet {id:#04x} encoded to {actual} payload bytes, expected {expected}")]
    SizeMismatch {
        id: u8,
        expected: usize,
        actual: usize,
    },

    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    #[error("incomplete frame for packet {id:#04x}: have {have} of {need} bytes")]
    Incomplete { id: u8, have: usize, need: usize },

    #[error("empty buffer")]
    Empty,
}

/// Save/load failures for persisted worlds.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("bad magic {0:?}")]
    BadMagic([u8; 4]),

    #[error("unsupported {record} version {version}")]
    UnsupportedVersion { record: &'static str, version: i32 },

    #[error("invalid dimensions {width}x{depth}x{height}")]
    InvalidDimensions { width: i16, depth: i16, height: i16 },

    /// The stored blocks do not match their recorded hash, length or stream.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("properties error: {0}")]
    Properties(#[from] serde_json::Error),
}

impl PersistenceError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, PersistenceError::Integrity(_))
    }
}

/// Startup-time configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("unknown world generator '{0}'")]
    UnknownGenerator(String),
}

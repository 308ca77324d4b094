//! Error taxonomy for inbound data.
//!
//! Transport faults never reach the synchronization loop as errors; the
//! connection layer turns them into connection events. What remains are
//! shape faults in individual frames or snapshots, which the caller logs and
//! drops.

use thiserror::Error;

/// A snapshot that cannot enter the interpolation window.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("snapshot is not a JSON object")]
    NotAnObject,
    #[error("snapshot timestamp is missing or not a finite number")]
    BadTimestamp,
    #[error("unknown game status {0:?}")]
    UnknownStatus(String),
}

/// A frame that could not be decoded into a protocol message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unexpected binary frame ({0} bytes)")]
    Binary(usize),
}

//! # Network Error Types
//!
//! All errors that can occur while decoding envelopes or loading config.

use thiserror::Error;
use tidewake_core::SyncError;

/// Errors produced by the networking layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// Payload failed to decode at the save or scene codec level.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Envelope carries a kind byte no handler knows.
    #[error("unknown packet kind: {0}")]
    UnknownPacketKind(u8),

    /// Envelope ended early.
    #[error("truncated packet: need {needed} bytes at offset {offset}")]
    Truncated {
        /// Offset where the read started.
        offset: usize,
        /// Bytes the read required.
        needed: usize,
    },

    /// A string field is not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// Encoded envelope does not fit in one packet.
    #[error("packet too large: {size} bytes, max {max}")]
    PacketTooLarge {
        /// Bytes the envelope needed.
        size: usize,
        /// Packet size limit.
        max: usize,
    },

    /// A string or blob is longer than its u16 length prefix allows.
    #[error("blob too large for length prefix: {0} bytes")]
    BlobTooLarge(usize),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for networking operations.
pub type NetResult<T> = Result<T, NetError>;

//! # Sync Error Types
//!
//! All errors that can occur while decoding or applying save-state data.

use thiserror::Error;

/// Errors produced by the core codecs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Blob does not start with the save magic.
    #[error("bad save magic: {0:02x?}")]
    BadMagic([u8; 4]),

    /// Blob was written by an unknown codec version.
    #[error("unsupported save version {0}")]
    UnsupportedVersion(u8),

    /// Blob ended before a declared field or header was complete.
    #[error("truncated save blob: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        /// Offset where the read started.
        offset: usize,
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the blob.
        available: usize,
    },

    /// A known field was encoded with the wrong width.
    #[error("field {field} has width {actual}, expected {expected}")]
    FieldWidth {
        /// Schema name of the field.
        field: &'static str,
        /// Width declared by the schema.
        expected: usize,
        /// Width found in the blob.
        actual: usize,
    },

    /// Byte is not a known inventory item.
    #[error("invalid inventory item: 0x{0:02x}")]
    InvalidItem(u8),

    /// Bottle slot index out of range.
    #[error("invalid bottle slot: {0}")]
    InvalidSlot(u8),

    /// Byte is not a known magic meter size.
    #[error("invalid magic meter value: 0x{0:02x}")]
    InvalidMagicMeter(u8),
}

/// Result type for core operations.
pub type SyncResult<T> = Result<T, SyncError>;

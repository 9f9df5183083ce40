//! Error taxonomy for the wire framing layer.

use std::io;

use thiserror::Error;

/// Errors surfaced while building, validating, sending, or receiving frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header magic did not match the protocol tag.
    #[error("bad magic: expected {expected:#010x}, got {actual:#010x}")]
    BadMagic {
        /// Expected magic value.
        expected: u32,
        /// Magic value actually read.
        actual: u32,
    },

    /// Header version did not match the supported protocol version.
    #[error("version mismatch: expected {expected:#06x}, got {actual:#06x}")]
    VersionMismatch {
        /// Expected version value.
        expected: u16,
        /// Version value actually read.
        actual: u16,
    },

    /// `payload_length` exceeded the configured maximum.
    #[error("payload too large: {size} bytes exceeds max {max}")]
    PayloadTooLarge {
        /// Size announced in the header.
        size: u32,
        /// Configured maximum payload size.
        max: u32,
    },

    /// Caller's receive buffer cannot hold the announced payload plus its
    /// NUL sentinel.
    #[error("buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall {
        /// Bytes required to hold the payload and its sentinel.
        needed: usize,
        /// Capacity of the caller-provided buffer.
        capacity: usize,
    },

    /// The 88-byte header could not be read in full.
    #[error("failed to read header: {message}")]
    HeaderReadFailed {
        /// Underlying I/O error kind, so callers can distinguish a read
        /// timeout (no frame arrived yet) from a dead connection.
        kind: io::ErrorKind,
        /// Human-readable detail.
        message: String,
    },

    /// The 88-byte header could not be written in full.
    #[error("failed to write header: {0}")]
    HeaderWriteFailed(String),

    /// The payload could not be read in full.
    #[error("failed to read payload: {message}")]
    PayloadReadFailed {
        /// Underlying I/O error kind.
        kind: io::ErrorKind,
        /// Human-readable detail.
        message: String,
    },

    /// The payload could not be written in full.
    #[error("failed to write payload: {0}")]
    PayloadWriteFailed(String),
}

impl ProtocolError {
    /// True for a read failure caused by the socket's receive timeout
    /// expiring before any frame arrived, rather than a dead connection.
    #[must_use]
    pub fn is_read_timeout(&self) -> bool {
        matches!(
            self,
            Self::HeaderReadFailed { kind, .. } | Self::PayloadReadFailed { kind, .. }
                if matches!(kind, io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}

/// Convenience alias for results from this crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

//! Errors surfaced by the client's request/response multiplexer.

use thiserror::Error;

/// Errors from the multiplexer's public API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultiplexerError {
    /// The background worker has exited; no further requests can be sent.
    #[error("multiplexer worker has stopped")]
    QueueStopped,

    /// The caller-provided response buffer cannot hold the reply.
    #[error("response buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall {
        /// Bytes required to hold the response payload.
        needed: usize,
        /// Capacity of the caller-provided buffer.
        capacity: usize,
    },

    /// The per-call deadline passed to [`crate::Multiplexer::send_request_timeout`]
    /// elapsed before the worker completed the request. The request remains
    /// queued; a response that arrives afterward is delivered to whichever
    /// caller is next in FIFO order, not discarded. Spec §5/§9 note this as
    /// a SHOULD, distinct from the `result = -1` shutdown case.
    #[error("request timed out waiting for a response")]
    Timeout,
}

/// Convenience alias for results from this crate.
pub type Result<T> = std::result::Result<T, MultiplexerError>;

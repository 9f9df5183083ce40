//! Server-side error types: broadcast registry failures and the
//! dispatcher's top-level error.

use thiserror::Error;

/// Errors from the broadcast registry.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry has no inactive slots left.
    #[error("broadcast registry is full")]
    Full,

    /// The target socket is not present in the registry.
    #[error("socket not found in broadcast registry")]
    NotFound,
}

/// Top-level server error, composing transport, protocol, and registry
/// failures.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Socket setup or I/O failed.
    #[error("transport error: {0}")]
    Transport(#[from] tap1_core::TransportError),

    /// Broadcast registry operation failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Frame encoding/decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] tap1_proto::ProtocolError),
}

//! Transport-layer error taxonomy.
//!
//! Distinguished by syscall origin so a peer can log the specific cause,
//! per the error handling design: framing errors live in `tap1-proto`,
//! everything below the framing layer lives here.

use std::io;

use thiserror::Error;

/// Errors from socket creation, connection setup, and I/O.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The platform socket library failed to initialize.
    #[error("network init failed: {0}")]
    NetworkInitFailed(String),

    /// `socket(2)` failed.
    #[error("socket create failed: {0}")]
    SocketCreate(#[source] io::Error),

    /// `bind(2)` failed.
    #[error("socket bind failed: {0}")]
    SocketBind(#[source] io::Error),

    /// `listen(2)` failed.
    #[error("socket listen failed: {0}")]
    SocketListen(#[source] io::Error),

    /// `connect(2)` failed.
    #[error("socket connect failed: {0}")]
    SocketConnect(#[source] io::Error),

    /// `accept(2)` failed.
    #[error("socket accept failed: {0}")]
    SocketAccept(#[source] io::Error),

    /// A receive returned zero bytes before the expected count.
    #[error("peer closed the connection")]
    PeerClosed,

    /// Any other transport error, with the platform error attached.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias for results from this crate.
pub type Result<T> = std::result::Result<T, TransportError>;

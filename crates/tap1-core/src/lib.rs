//! Blocking TCP transport primitives and the synchronization abstractions
//! shared by the server and client crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod socket;
pub mod sync;

pub use error::{Result, TransportError};
pub use socket::{ConnectionHandle, TimeoutDirection, connect_to_server, create_server, is_alive, peer_ip_string, set_timeout};

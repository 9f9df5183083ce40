//! tap1 server: the accept dispatcher and the broadcast registry.
//!
//! An application wires these two together: bind a listener, build an
//! [`AcceptContext`], run it with a per-connection handler closure that
//! reads/writes frames and registers the connection into a shared
//! [`BroadcastRegistry`] as rooms are joined and left.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod accept;
mod error;
mod registry;

pub use accept::AcceptContext;
pub use error::{RegistryError, ServerError};
pub use registry::BroadcastRegistry;

/// Server-side configuration: dispatcher and registry sizing.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind, e.g. `"0.0.0.0:7878"`.
    pub bind_address: String,
    /// Accept backlog passed to `listen(2)`.
    pub backlog: i32,
    /// Fixed capacity of the broadcast registry.
    pub registry_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7878".to_string(),
            backlog: 10,
            registry_capacity: BroadcastRegistry::DEFAULT_CAPACITY,
        }
    }
}

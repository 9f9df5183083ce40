//! The tap1 client multiplexer: one background worker per connection that
//! serializes writes, matches responses to callers in FIFO order, and
//! routes server-pushed broadcasts to a callback.
//!
//! # Components
//!
//! - [`Multiplexer`]: owns the connection and the worker thread.
//! - [`MultiplexerError`]: the error taxonomy for [`Multiplexer::send_request`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod multiplexer;

pub use error::{MultiplexerError, Result};
pub use multiplexer::Multiplexer;

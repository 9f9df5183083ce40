//! Wire framing for tap1: the fixed 88-byte header, message ids, the
//! application message-type catalogue, and full-buffer send/receive.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod frame;
mod header;
mod message_id;
pub mod message_type;

pub use error::{ProtocolError, Result};
pub use frame::{ReceivedFrame, receive_message, send_message};
pub use header::{Header, MAX_PAYLOAD_LENGTH, SESSION_TOKEN_LEN};
pub use message_id::MessageId;

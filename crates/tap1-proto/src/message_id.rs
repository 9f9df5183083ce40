//! Per-sender unique message identifiers.
//!
//! A `message_id` is 16 opaque bytes: 8 ASCII hex digits of the current Unix
//! second, followed by 8 ASCII hex digits of a process-wide monotonic
//! counter. It fills the field exactly, carries no trailing NUL, and is
//! meant for logs and correlation, not as a cryptographic nonce.

use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// 16-byte message identifier, opaque to the protocol.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId([u8; 16]);

static COUNTER: AtomicU32 = AtomicU32::new(0);

impl MessageId {
    /// Generate a fresh id from the current Unix second and the next value
    /// of the process-wide counter. The counter wraps on overflow and is not
    /// persisted across process restarts.
    #[must_use]
    pub fn generate() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as u32);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::from_parts(secs, count)
    }

    fn from_parts(secs: u32, count: u32) -> Self {
        let mut bytes = [0u8; 16];
        write_hex8(&mut bytes[0..8], secs);
        write_hex8(&mut bytes[8..16], count);
        Self(bytes)
    }

    /// The raw 16 bytes as they appear on the wire.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Build a `MessageId` from raw wire bytes without interpreting them.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MessageId").field(&String::from_utf8_lossy(&self.0)).finish()
    }
}

/// Write `value` as 8 lowercase ASCII hex digits into `out`.
fn write_hex8(out: &mut [u8], value: u32) {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    for (i, slot) in out.iter_mut().enumerate().take(8) {
        let shift = 28 - 4 * i;
        let nibble = (value >> shift) & 0xf;
        *slot = HEX[nibble as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_exactly_sixteen_bytes_with_no_nul() {
        let id = MessageId::from_parts(0x1234_5678, 0x9abc_def0);
        assert_eq!(id.as_bytes().len(), 16);
        assert!(id.as_bytes().iter().all(|&b| b != 0));
        assert_eq!(&id.as_bytes()[0..8], b"12345678");
        assert_eq!(&id.as_bytes()[8..16], b"9abcdef0");
    }

    #[test]
    fn counter_is_monotonic_within_a_second() {
        let a = MessageId::generate();
        let b = MessageId::generate();
        assert_ne!(a.as_bytes()[8..16], b.as_bytes()[8..16]);
    }
}

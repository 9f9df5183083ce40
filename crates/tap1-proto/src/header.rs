//! The fixed 88-byte frame header.
//!
//! Every field except `timestamp` is big-endian on the wire; `timestamp` is
//! native byte order because it is informational only and never validated.
//! The struct is `#[repr(C, packed)]` with `zerocopy` traits so a received
//! byte slice can be cast into a `Header` reference without copying and
//! without risking undefined behavior on arbitrary input.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    error::{ProtocolError, Result},
    message_id::MessageId,
};

/// Session tokens are carried as an opaque, NUL-padded byte field of this
/// width.
pub const SESSION_TOKEN_LEN: usize = 32;

/// Maximum payload length a header may announce.
pub const MAX_PAYLOAD_LENGTH: u32 = 1_048_576;

const MAGIC: u32 = 0x5441_5031;
const VERSION: u16 = 0x0100;

/// Fixed 88-byte frame header.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Header {
    magic: [u8; 4],
    version: [u8; 2],
    message_type: [u8; 2],
    payload_length: [u8; 4],
    message_id: [u8; 16],
    _padding_a: [u8; 4],
    timestamp: [u8; 8],
    session_token: [u8; SESSION_TOKEN_LEN],
    _reserved: [u8; 12],
    _padding_b: [u8; 4],
}

impl Header {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = 88;

    /// Protocol magic tag, `0x54415031`.
    pub const MAGIC: u32 = MAGIC;

    /// Protocol version, `0x0100`.
    pub const VERSION: u16 = VERSION;

    /// Maximum payload length a header may announce.
    pub const MAX_PAYLOAD_LENGTH: u32 = MAX_PAYLOAD_LENGTH;

    /// Build a new header: zero-fills the layout, writes magic, version,
    /// `message_type`, and `payload_length`, stamps the current Unix second
    /// as `timestamp`, generates a fresh `message_id`, and copies up to
    /// [`SESSION_TOKEN_LEN`] bytes of `session_token` (NUL-padded, never
    /// NUL-terminated if it fills the field).
    #[must_use]
    pub fn build(message_type: u16, payload_length: u32, session_token: &[u8]) -> Self {
        let mut token = [0u8; SESSION_TOKEN_LEN];
        let n = session_token.len().min(SESSION_TOKEN_LEN);
        token[..n].copy_from_slice(&session_token[..n]);

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);

        Self {
            magic: MAGIC.to_be_bytes(),
            version: VERSION.to_be_bytes(),
            message_type: message_type.to_be_bytes(),
            payload_length: payload_length.to_be_bytes(),
            message_id: *MessageId::generate().as_bytes(),
            _padding_a: [0u8; 4],
            timestamp: timestamp.to_ne_bytes(),
            session_token: token,
            _reserved: [0u8; 12],
            _padding_b: [0u8; 4],
        }
    }

    /// Check magic, version, and payload length against the fixed
    /// invariants. Unused padding/reserved bytes are never inspected.
    pub fn validate(&self) -> Result<()> {
        let magic = self.magic();
        if magic != MAGIC {
            return Err(ProtocolError::BadMagic { expected: MAGIC, actual: magic });
        }
        let version = self.version();
        if version != VERSION {
            return Err(ProtocolError::VersionMismatch { expected: VERSION, actual: version });
        }
        let payload_length = self.payload_length();
        if payload_length > MAX_PAYLOAD_LENGTH {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_length,
                max: MAX_PAYLOAD_LENGTH,
            });
        }
        Ok(())
    }

    /// Cast a byte slice of exactly [`Header::SIZE`] bytes into a header.
    /// Every 88-byte pattern is a valid `Header`; call [`Self::validate`]
    /// separately to check protocol invariants.
    #[must_use]
    pub fn ref_from_bytes(bytes: &[u8; Self::SIZE]) -> &Self {
        <Self as FromBytes>::ref_from_bytes(bytes.as_slice())
            .unwrap_or_else(|_| unreachable!("array length matches Header::SIZE"))
    }

    /// Serialize to the wire's 88-byte representation.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Protocol magic tag.
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Protocol version.
    #[must_use]
    pub fn version(&self) -> u16 {
        u16::from_be_bytes(self.version)
    }

    /// Application routing code.
    #[must_use]
    pub fn message_type(&self) -> u16 {
        u16::from_be_bytes(self.message_type)
    }

    /// Announced payload length.
    #[must_use]
    pub fn payload_length(&self) -> u32 {
        u32::from_be_bytes(self.payload_length)
    }

    /// The 16-byte opaque message identifier.
    #[must_use]
    pub fn message_id(&self) -> MessageId {
        MessageId::from_bytes(self.message_id)
    }

    /// Sender-stamped Unix-seconds timestamp. Informational, not validated.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        i64::from_ne_bytes(self.timestamp)
    }

    /// Raw 32-byte session token field, NUL-padded.
    #[must_use]
    pub fn session_token_raw(&self) -> &[u8; SESSION_TOKEN_LEN] {
        &self.session_token
    }

    /// Session token bytes up to the first NUL (or the full 32 bytes if the
    /// token fills the field with no trailing NUL).
    #[must_use]
    pub fn session_token(&self) -> &[u8] {
        let end = self.session_token.iter().position(|&b| b == 0).unwrap_or(SESSION_TOKEN_LEN);
        &self.session_token[..end]
    }
}

impl std::fmt::Debug for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Header")
            .field("magic", &format!("{:#010x}", self.magic()))
            .field("version", &format!("{:#06x}", self.version()))
            .field("message_type", &format!("{:#06x}", self.message_type()))
            .field("payload_length", &self.payload_length())
            .field("message_id", &self.message_id())
            .field("timestamp", &self.timestamp())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Header {}

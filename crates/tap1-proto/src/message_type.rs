//! The application message-type code space (§6 of the wire contract).
//!
//! The core only cares about one distinction within this space: whether a
//! code is the broadcast sentinel. Everything else here is a reference
//! table for application collaborators built on top of the core.

/// Broadcast sentinel: `ROOM_STATUS`, a server-pushed event rather than a
/// reply to a pending request.
pub const MSG_ROOM_STATUS: u16 = 0x003A;

/// Returns true if `message_type` is a broadcast sentinel rather than a
/// request/response code.
///
/// This is a predicate, not a hardcoded equality at call sites, so the set
/// of broadcast codes can grow without touching the multiplexer's dispatch
/// logic.
#[must_use]
pub fn is_broadcast(message_type: u16) -> bool {
    message_type == MSG_ROOM_STATUS
}

/// Auth
pub mod auth {
    /// Register request.
    pub const REGISTER_REQ: u16 = 0x0001;
    /// Register response.
    pub const REGISTER_RES: u16 = 0x0002;
    /// Login request.
    pub const LOGIN_REQ: u16 = 0x0003;
    /// Login response.
    pub const LOGIN_RES: u16 = 0x0004;
    /// Logout request.
    pub const LOGOUT_REQ: u16 = 0x0005;
    /// Logout response.
    pub const LOGOUT_RES: u16 = 0x0006;
}

/// Test flow
pub mod test_flow {
    /// Test configuration push.
    pub const TEST_CONFIG: u16 = 0x0010;
    /// Start-test request.
    pub const TEST_START_REQ: u16 = 0x0011;
    /// Start-test response.
    pub const TEST_START_RES: u16 = 0x0012;
    /// Question set push.
    pub const TEST_QUESTIONS: u16 = 0x0013;
    /// Submitted answers.
    pub const TEST_SUBMIT: u16 = 0x0014;
    /// Graded result.
    pub const TEST_RESULT: u16 = 0x0015;
}

/// Teacher data
pub mod teacher {
    /// Teacher data request.
    pub const REQ: u16 = 0x0020;
    /// Teacher data response.
    pub const RES: u16 = 0x0021;
}

/// Rooms
pub mod rooms {
    /// Create a room.
    pub const CREATE: u16 = 0x0030;
    /// Create-room response.
    pub const CREATE_RES: u16 = 0x0031;
    /// Join a room.
    pub const JOIN: u16 = 0x0032;
    /// Join-room response.
    pub const JOIN_RES: u16 = 0x0033;
    /// Start a room's activity.
    pub const START: u16 = 0x0034;
    /// Start response.
    pub const START_RES: u16 = 0x0035;
    /// End a room's activity.
    pub const END: u16 = 0x0036;
    /// End response.
    pub const END_RES: u16 = 0x0037;
    /// List rooms.
    pub const LIST: u16 = 0x0038;
    /// List response.
    pub const LIST_RES: u16 = 0x0039;
    /// Room status push — the broadcast sentinel, see [`super::MSG_ROOM_STATUS`].
    pub const STATUS: u16 = super::MSG_ROOM_STATUS;
}

/// Questions CRUD
pub mod questions {
    /// Create a question.
    pub const CREATE: u16 = 0x0040;
    /// Create-question response.
    pub const CREATE_RES: u16 = 0x0041;
    /// Update a question.
    pub const UPDATE: u16 = 0x0042;
    /// Update-question response.
    pub const UPDATE_RES: u16 = 0x0043;
    /// Delete a question.
    pub const DELETE: u16 = 0x0044;
    /// Delete-question response.
    pub const DELETE_RES: u16 = 0x0045;
}

/// Student-room discovery
pub mod student_room_discovery {
    /// List rooms a student may join.
    pub const LIST_REQ: u16 = 0x0046;
    /// List response.
    pub const LIST_RES: u16 = 0x0047;
    /// Fetch a room's join details.
    pub const DETAILS_REQ: u16 = 0x0048;
    /// Details response.
    pub const DETAILS_RES: u16 = 0x0049;
}

/// Room test lifecycle
pub mod room_test_lifecycle {
    /// Start the room's test.
    pub const START_REQ: u16 = 0x004A;
    /// Start response.
    pub const START_RES: u16 = 0x004B;
    /// Submit a room participant's answers.
    pub const SUBMIT_REQ: u16 = 0x004C;
    /// Submit response.
    pub const SUBMIT_RES: u16 = 0x004D;
    /// Fetch the room's graded result.
    pub const RESULT_REQ: u16 = 0x004E;
    /// Result response.
    pub const RESULT_RES: u16 = 0x004F;
}

/// Control
pub mod control {
    /// Generic error response.
    pub const ERROR: u16 = 0x00FF;
    /// Heartbeat.
    pub const HEARTBEAT: u16 = 0x00FE;
}

/// Application-level error codes carried inside payloads (§6). The core
/// never interprets these; they are re-exported as a convenience for host
/// applications that build JSON payloads on top of this wire format.
pub mod error_code {
    /// Request succeeded.
    pub const SUCCESS: u32 = 1000;
    /// Request payload was malformed.
    pub const BAD_REQUEST: u32 = 2000;
    /// Request payload was not valid JSON.
    pub const INVALID_JSON: u32 = 2001;
    /// Caller is not authenticated.
    pub const UNAUTHORIZED: u32 = 3000;
    /// Supplied credentials were rejected.
    pub const INVALID_CREDS: u32 = 3001;
    /// Session token has expired.
    pub const SESSION_EXPIRED: u32 = 3002;
    /// Caller is authenticated but not permitted to perform this action.
    pub const FORBIDDEN: u32 = 4000;
    /// Caller's role does not permit this action.
    pub const WRONG_ROLE: u32 = 4001;
    /// Request conflicts with existing state.
    pub const CONFLICT: u32 = 5000;
    /// Requested username is already taken.
    pub const USERNAME_EXISTS: u32 = 5001;
    /// Unclassified internal error.
    pub const INTERNAL: u32 = 6000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_room_status_is_a_broadcast() {
        assert!(is_broadcast(rooms::STATUS));
        assert!(!is_broadcast(rooms::CREATE));
        assert!(!is_broadcast(auth::LOGIN_REQ));
        assert!(!is_broadcast(control::HEARTBEAT));
    }
}

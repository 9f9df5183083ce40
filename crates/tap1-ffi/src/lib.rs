//! C-ABI embedding facade over `tap1-core`, `tap1-proto`, `tap1-server`, and
//! `tap1-client`.
//!
//! Every function here is a thin pointer-passing wrapper around the safe
//! Rust types the other crates already own: ownership transfers via
//! `Box::into_raw`/`Box::from_raw`, and this crate holds no state of its
//! own beyond those boxes. It is the one crate in the workspace where
//! `unsafe` is permitted, because a C-callable surface cannot avoid raw
//! pointers at the boundary.
//!
//! Callers own the lifetime of every `*mut Tap1*` handle: each `_new`/
//! `_connect`/`_accept`/`_start` function hands back a pointer that must
//! eventually reach the matching `_destroy`/`_close`/`_stop` function
//! exactly once. Passing a null pointer to any function below returns
//! [`status::NULL_ARG`] rather than dereferencing it.

#![allow(unsafe_code)]
#![warn(missing_docs)]

use std::{
    ffi::{CStr, c_char, c_void},
    net::TcpListener,
    ptr,
    sync::Arc,
};

use tap1_client::Multiplexer;
use tap1_core::{ConnectionHandle, TimeoutDirection, connect_to_server, create_server, is_alive, peer_ip_string, set_timeout};
use tap1_proto::{Header, receive_message, send_message};
use tap1_server::{AcceptContext, BroadcastRegistry};
use tracing::warn;

/// Result codes returned in place of Rust's `Result` at the C boundary.
pub mod status {
    /// Operation succeeded.
    pub const OK: i32 = 0;
    /// Caller passed a null pointer where a handle was required.
    pub const NULL_ARG: i32 = -1;
    /// Caller's buffer could not hold the result.
    pub const BUFFER_TOO_SMALL: i32 = -2;
    /// A per-call deadline elapsed before the operation completed.
    pub const TIMEOUT: i32 = -3;
    /// Transport, protocol, registry, or multiplexer operation failed; see
    /// logs for the specific cause.
    pub const ERROR: i32 = -4;
}

/// Opaque handle to one live TCP connection, server-accepted or
/// client-initiated.
pub struct Tap1Connection(ConnectionHandle);

/// Opaque handle to a listening socket not yet driven by an accept loop.
pub struct Tap1Listener(TcpListener);

/// Opaque handle to a broadcast registry.
pub struct Tap1Registry(BroadcastRegistry);

/// Opaque handle to a client-side request/response multiplexer.
pub struct Tap1Multiplexer(Multiplexer);

/// Opaque handle to a server accept dispatcher.
pub struct Tap1AcceptContext(AcceptContext);

/// C-ABI mirror of [`tap1_proto::Header`]'s externally meaningful fields.
/// Padding and reserved bytes are not exposed; callers never need to
/// inspect them (they are validated, not interpreted).
#[repr(C)]
pub struct Tap1Header {
    /// Application routing code.
    pub message_type: u16,
    /// Bytes in the payload that follows the header.
    pub payload_length: u32,
    /// The 16-byte opaque message identifier, copied verbatim.
    pub message_id: [u8; 16],
    /// Sender-stamped Unix-seconds timestamp.
    pub timestamp: i64,
}

impl From<&Header> for Tap1Header {
    fn from(header: &Header) -> Self {
        Self {
            message_type: header.message_type(),
            payload_length: header.payload_length(),
            message_id: *header.message_id().as_bytes(),
            timestamp: header.timestamp(),
        }
    }
}

/// A C function pointer invoked once per broadcast frame the multiplexer
/// dispatches. `user_data` is the opaque pointer passed to
/// [`tap1_multiplexer_start`] and is never touched by this crate; the host
/// is responsible for its lifetime exceeding the multiplexer's.
pub type BroadcastCallback =
    extern "C" fn(message_type: u16, payload: *const u8, payload_len: usize, user_data: *mut c_void);

/// Wraps a C callback pointer plus its opaque user-data pointer so it can
/// cross into the multiplexer's worker thread. `user_data` is stored as a
/// `usize` rather than a raw pointer purely so the wrapper is `Send + Sync`
/// without an unsafe trait impl; the host's contract for
/// [`tap1_multiplexer_start`] is what actually makes handing it to
/// `callback` from another thread sound, not this type.
struct CallbackHandle {
    callback: BroadcastCallback,
    user_data: usize,
}

/// A C function pointer invoked once per accepted connection, on a
/// dedicated per-connection worker thread owned by the accept loop. `conn`
/// transfers ownership to the handler: it must eventually reach
/// [`tap1_close`] exactly once. `user_data` is the opaque pointer passed to
/// [`tap1_accept_context_run`] and is never touched by this crate.
pub type AcceptHandler =
    extern "C" fn(conn: *mut Tap1Connection, client_id: u64, user_data: *mut c_void);

/// Wraps a C accept handler plus its opaque user-data pointer so it can
/// cross into the accept loop's per-connection worker threads, the same
/// `usize`-smuggling reason as [`CallbackHandle`] above.
struct AcceptHandlerHandle {
    handler: AcceptHandler,
    user_data: usize,
}

/// Bind and listen on `0.0.0.0:port` with the given accept backlog.
/// Returns null on failure.
#[unsafe(no_mangle)]
pub extern "C" fn tap1_create_server(port: u16, backlog: i32) -> *mut Tap1Listener {
    match create_server(port, backlog) {
        Ok(listener) => Box::into_raw(Box::new(Tap1Listener(listener))),
        Err(e) => {
            warn!(error = %e, "tap1_create_server failed");
            ptr::null_mut()
        },
    }
}

/// Block until a connection arrives on `listener`. Returns null on failure
/// or if `listener` is null.
///
/// # Safety
/// `listener` must be a pointer returned by [`tap1_create_server`] and not
/// yet passed to [`tap1_listener_destroy`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_accept_client(listener: *mut Tap1Listener) -> *mut Tap1Connection {
    let Some(listener) = (unsafe { listener.as_ref() }) else { return ptr::null_mut() };
    match listener.0.accept() {
        Ok((stream, _peer)) => Box::into_raw(Box::new(Tap1Connection(ConnectionHandle::new(stream)))),
        Err(e) => {
            warn!(error = %e, "tap1_accept_client failed");
            ptr::null_mut()
        },
    }
}

/// Release a listener without accepting further connections.
///
/// # Safety
/// `listener` must be null or a pointer returned by [`tap1_create_server`]
/// not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_listener_destroy(listener: *mut Tap1Listener) {
    if !listener.is_null() {
        drop(unsafe { Box::from_raw(listener) });
    }
}

/// Parse `host` as an IPv4 dotted-quad C string and connect to `host:port`.
/// Returns null on failure or if `host` is null.
///
/// # Safety
/// `host` must be null or a valid NUL-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_connect(host: *const c_char, port: u16) -> *mut Tap1Connection {
    let Some(host) = (unsafe { host.as_ref() }) else { return ptr::null_mut() };
    let host = unsafe { CStr::from_ptr(host) };
    let Ok(host) = host.to_str() else { return ptr::null_mut() };

    match connect_to_server(host, port) {
        Ok(stream) => Box::into_raw(Box::new(Tap1Connection(ConnectionHandle::new(stream)))),
        Err(e) => {
            warn!(error = %e, host, port, "tap1_connect failed");
            ptr::null_mut()
        },
    }
}

/// Close and free a connection handle.
///
/// # Safety
/// `conn` must be null or a pointer returned by [`tap1_connect`] or
/// [`tap1_accept_client`] not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_close(conn: *mut Tap1Connection) {
    if !conn.is_null() {
        drop(unsafe { Box::from_raw(conn) });
    }
}

/// Build a header, write it in full, then write exactly `payload_len`
/// bytes and up to 32 bytes of `token`. Returns total bytes sent, or a
/// negative [`status`] code on failure.
///
/// # Safety
/// `conn` must be a live connection handle. `payload`/`payload_len` and
/// `token`/`token_len` must describe valid, readable byte ranges (a null
/// pointer paired with a zero length is accepted as an empty slice).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_send_message(
    conn: *mut Tap1Connection,
    message_type: u16,
    payload: *const u8,
    payload_len: usize,
    token: *const u8,
    token_len: usize,
) -> i32 {
    let Some(conn) = (unsafe { conn.as_ref() }) else { return status::NULL_ARG };
    let payload = unsafe { byte_slice(payload, payload_len) };
    let token = unsafe { byte_slice(token, token_len) };

    let Ok(mut writer) = conn.0.try_clone_stream() else { return status::ERROR };
    match send_message(&mut writer, message_type, payload, token) {
        Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
        Err(e) => {
            warn!(error = %e, "tap1_send_message failed");
            status::ERROR
        },
    }
}

/// Read exactly one frame: validate its header, then read its payload
/// into `payload_out` (capacity `payload_cap`, which must reserve one byte
/// for the trailing NUL sentinel). Returns the payload length (excluding
/// the sentinel) on success, or a negative [`status`] code.
///
/// # Safety
/// `conn` and `header_out` must be non-null and valid for writes/reads as
/// described; `payload_out` must point to at least `payload_cap` writable
/// bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_receive_message(
    conn: *mut Tap1Connection,
    header_out: *mut Tap1Header,
    payload_out: *mut u8,
    payload_cap: usize,
) -> i32 {
    let Some(conn) = (unsafe { conn.as_ref() }) else { return status::NULL_ARG };
    if header_out.is_null() || (payload_cap > 0 && payload_out.is_null()) {
        return status::NULL_ARG;
    }

    let Ok(mut reader) = conn.0.try_clone_stream() else { return status::ERROR };
    match receive_message(&mut reader, payload_cap.saturating_sub(1)) {
        Ok(frame) => {
            unsafe { ptr::write(header_out, Tap1Header::from(frame.header())) };
            let payload = frame.payload();
            unsafe { ptr::copy_nonoverlapping(payload.as_ptr(), payload_out, payload.len()) };
            i32::try_from(payload.len()).unwrap_or(i32::MAX)
        },
        Err(e) if matches!(e, tap1_proto::ProtocolError::BufferTooSmall { .. }) => {
            status::BUFFER_TOO_SMALL
        },
        Err(e) => {
            warn!(error = %e, "tap1_receive_message failed");
            status::ERROR
        },
    }
}

/// Non-blocking liveness probe. Returns 1 if alive, 0 if the peer closed,
/// or a negative [`status`] code on error.
///
/// # Safety
/// `conn` must be null or a live connection handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_is_alive(conn: *mut Tap1Connection) -> i32 {
    let Some(conn) = (unsafe { conn.as_ref() }) else { return status::NULL_ARG };
    match is_alive(conn.0.stream()) {
        Ok(true) => 1,
        Ok(false) => 0,
        Err(e) => {
            warn!(error = %e, "tap1_is_alive failed");
            status::ERROR
        },
    }
}

/// Direction codes for [`tap1_set_timeout`].
pub mod timeout_direction {
    /// Receive timeout only.
    pub const RECV: i32 = 0;
    /// Send timeout only.
    pub const SEND: i32 = 1;
    /// Both directions.
    pub const BOTH: i32 = 2;
}

/// Set a whole-second timeout on `conn`. `direction` is one of the
/// [`timeout_direction`] constants. Returns [`status::OK`] or
/// [`status::ERROR`].
///
/// # Safety
/// `conn` must be null or a live connection handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_set_timeout(conn: *mut Tap1Connection, seconds: u64, direction: i32) -> i32 {
    let Some(conn) = (unsafe { conn.as_ref() }) else { return status::NULL_ARG };
    let direction = match direction {
        timeout_direction::RECV => TimeoutDirection::Recv,
        timeout_direction::SEND => TimeoutDirection::Send,
        _ => TimeoutDirection::Both,
    };
    match set_timeout(conn.0.stream(), seconds, direction) {
        Ok(()) => status::OK,
        Err(e) => {
            warn!(error = %e, "tap1_set_timeout failed");
            status::ERROR
        },
    }
}

/// Format the peer's IPv4 address in dotted-decimal into `buf` (capacity
/// `buf_len`, at least 16 recommended). Returns [`status::OK`],
/// [`status::BUFFER_TOO_SMALL`], or [`status::ERROR`].
///
/// # Safety
/// `conn` must be null or a live connection handle; `buf` must point to at
/// least `buf_len` writable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_get_peer_ip(conn: *mut Tap1Connection, buf: *mut c_char, buf_len: usize) -> i32 {
    let Some(conn) = (unsafe { conn.as_ref() }) else { return status::NULL_ARG };
    if buf.is_null() {
        return status::NULL_ARG;
    }

    match peer_ip_string(conn.0.stream()) {
        Ok(ip) => {
            let bytes = ip.as_bytes();
            if bytes.len() + 1 > buf_len {
                return status::BUFFER_TOO_SMALL;
            }
            let buf = buf.cast::<u8>();
            unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), buf, bytes.len()) };
            unsafe { ptr::write(buf.add(bytes.len()), 0) };
            status::OK
        },
        Err(e) => {
            warn!(error = %e, "tap1_get_peer_ip failed");
            status::ERROR
        },
    }
}

/// Create a broadcast registry with the given fixed capacity.
#[unsafe(no_mangle)]
pub extern "C" fn tap1_registry_new(capacity: usize) -> *mut Tap1Registry {
    Box::into_raw(Box::new(Tap1Registry(BroadcastRegistry::new(capacity))))
}

/// Free a broadcast registry.
///
/// # Safety
/// `registry` must be null or a pointer returned by [`tap1_registry_new`]
/// not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_registry_destroy(registry: *mut Tap1Registry) {
    if !registry.is_null() {
        drop(unsafe { Box::from_raw(registry) });
    }
}

/// Register (or move) `conn` into `room`. Returns [`status::OK`] or
/// [`status::ERROR`] (registry full).
///
/// # Safety
/// `registry` and `conn` must be null or live handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_registry_register(
    registry: *mut Tap1Registry,
    conn: *mut Tap1Connection,
    room: i32,
) -> i32 {
    let (Some(registry), Some(conn)) = (unsafe { registry.as_ref() }, unsafe { conn.as_ref() }) else {
        return status::NULL_ARG;
    };
    match registry.0.register(conn.0.clone(), room) {
        Ok(()) => status::OK,
        Err(e) => {
            warn!(error = %e, "tap1_registry_register failed");
            status::ERROR
        },
    }
}

/// Remove `conn` from the registry. Returns [`status::OK`] or
/// [`status::ERROR`] (not found).
///
/// # Safety
/// `registry` and `conn` must be null or live handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_registry_unregister(registry: *mut Tap1Registry, conn: *mut Tap1Connection) -> i32 {
    let (Some(registry), Some(conn)) = (unsafe { registry.as_ref() }, unsafe { conn.as_ref() }) else {
        return status::NULL_ARG;
    };
    match registry.0.unregister(&conn.0) {
        Ok(()) => status::OK,
        Err(e) => {
            warn!(error = %e, "tap1_registry_unregister failed");
            status::ERROR
        },
    }
}

/// Move `conn` to `new_room`. Returns [`status::OK`] or [`status::ERROR`]
/// (not found).
///
/// # Safety
/// `registry` and `conn` must be null or live handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_registry_update_room(
    registry: *mut Tap1Registry,
    conn: *mut Tap1Connection,
    new_room: i32,
) -> i32 {
    let (Some(registry), Some(conn)) = (unsafe { registry.as_ref() }, unsafe { conn.as_ref() }) else {
        return status::NULL_ARG;
    };
    match registry.0.update_room(&conn.0, new_room) {
        Ok(()) => status::OK,
        Err(e) => {
            warn!(error = %e, "tap1_registry_update_room failed");
            status::ERROR
        },
    }
}

/// Fan `(message_type, payload)` out to every connection registered to
/// `room`. Returns the number of successful deliveries.
///
/// # Safety
/// `registry` must be null or a live handle; `payload`/`payload_len` must
/// describe a valid, readable byte range.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_registry_broadcast_to_room(
    registry: *mut Tap1Registry,
    room: i32,
    message_type: u16,
    payload: *const u8,
    payload_len: usize,
) -> i32 {
    let Some(registry) = (unsafe { registry.as_ref() }) else { return status::NULL_ARG };
    let payload = unsafe { byte_slice(payload, payload_len) };
    let delivered = registry.0.broadcast_to_room(room, message_type, payload);
    i32::try_from(delivered).unwrap_or(i32::MAX)
}

/// Bind and listen on `0.0.0.0:port` with the given accept backlog, wrapped
/// in an accept dispatcher ready for [`tap1_accept_context_run`]. Returns
/// null on failure.
#[unsafe(no_mangle)]
pub extern "C" fn tap1_accept_context_new(port: u16, backlog: i32) -> *mut Tap1AcceptContext {
    let listener = match create_server(port, backlog) {
        Ok(listener) => listener,
        Err(e) => {
            warn!(error = %e, "tap1_accept_context_new failed to bind");
            return ptr::null_mut();
        },
    };
    match AcceptContext::bind(listener) {
        Ok(ctx) => Box::into_raw(Box::new(Tap1AcceptContext(ctx))),
        Err(e) => {
            warn!(error = %e, "tap1_accept_context_new failed to initialize");
            ptr::null_mut()
        },
    }
}

/// Run the accept loop on the calling thread until another thread calls
/// [`tap1_accept_context_shutdown`]. `handler` runs on a detached worker
/// thread per accepted connection, receiving ownership of the connection
/// and the dispatcher's monotonic client id, passed `user_data` unmodified.
/// Returns [`status::OK`] once the loop has stopped, or [`status::NULL_ARG`]
/// if `ctx` is null.
///
/// # Safety
/// `ctx` must be a live accept-context handle; `user_data` must be safe to
/// pass to `handler` from worker threads for as long as the accept loop
/// keeps accepting connections.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_accept_context_run(
    ctx: *mut Tap1AcceptContext,
    handler: AcceptHandler,
    user_data: *mut c_void,
) -> i32 {
    let Some(ctx) = (unsafe { ctx.as_ref() }) else { return status::NULL_ARG };
    let handle = Arc::new(AcceptHandlerHandle { handler, user_data: user_data as usize });

    ctx.0.run(move |stream, client_id| {
        let conn = Box::into_raw(Box::new(Tap1Connection(ConnectionHandle::new(stream))));
        (handle.handler)(conn, client_id, handle.user_data as *mut c_void);
    });
    status::OK
}

/// Initiate orderly shutdown from another thread: the blocked `accept()`
/// call inside an in-progress [`tap1_accept_context_run`] returns, and that
/// call's accept loop terminates.
///
/// # Safety
/// `ctx` must be null or a live accept-context handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_accept_context_shutdown(ctx: *mut Tap1AcceptContext) -> i32 {
    let Some(ctx) = (unsafe { ctx.as_ref() }) else { return status::NULL_ARG };
    ctx.0.shutdown();
    status::OK
}

/// Current active-worker count, or `-1` if `ctx` is null.
///
/// # Safety
/// `ctx` must be null or a live accept-context handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_accept_context_active_clients(ctx: *mut Tap1AcceptContext) -> i64 {
    let Some(ctx) = (unsafe { ctx.as_ref() }) else { return -1 };
    i64::try_from(ctx.0.active_clients()).unwrap_or(i64::MAX)
}

/// Free an accept context. Call only once [`tap1_accept_context_run`] has
/// returned on its thread (shut it down first).
///
/// # Safety
/// `ctx` must be null or a pointer returned by [`tap1_accept_context_new`]
/// not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_accept_context_destroy(ctx: *mut Tap1AcceptContext) {
    if !ctx.is_null() {
        drop(unsafe { Box::from_raw(ctx) });
    }
}

/// Start a client multiplexer on `conn`, consuming it: the multiplexer
/// becomes the connection's sole owner. `token`/`token_len` is the session
/// token carried on every outgoing request. `callback` fires once per
/// broadcast frame, passed `user_data` unmodified.
///
/// # Safety
/// `conn` must be a pointer returned by [`tap1_connect`] or
/// [`tap1_accept_client`] not yet freed or started; `token` must describe
/// a valid, readable byte range. `user_data` must be safe to pass to
/// `callback` from the multiplexer's worker thread for the multiplexer's
/// entire lifetime.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_multiplexer_start(
    conn: *mut Tap1Connection,
    token: *const u8,
    token_len: usize,
    callback: BroadcastCallback,
    user_data: *mut c_void,
) -> *mut Tap1Multiplexer {
    if conn.is_null() {
        return ptr::null_mut();
    }
    let conn = unsafe { Box::from_raw(conn) };
    let token = unsafe { byte_slice(token, token_len) }.to_vec();

    let Ok(stream) = conn.0.try_clone_stream() else { return ptr::null_mut() };
    let handle = Arc::new(CallbackHandle { callback, user_data: user_data as usize });

    let multiplexer = Multiplexer::start(stream, token, move |message_type, payload| {
        (handle.callback)(message_type, payload.as_ptr(), payload.len(), handle.user_data as *mut c_void);
    });

    Box::into_raw(Box::new(Tap1Multiplexer(multiplexer)))
}

/// Issue a blocking request/response round trip. Returns the response
/// length on success, or a negative [`status`] code.
///
/// # Safety
/// `mux` must be a live multiplexer handle; `payload`/`payload_len` must
/// describe a valid, readable range; `response_out` must point to at
/// least `response_cap` writable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_multiplexer_send_request(
    mux: *mut Tap1Multiplexer,
    message_type: u16,
    payload: *const u8,
    payload_len: usize,
    response_out: *mut u8,
    response_cap: usize,
) -> i32 {
    let Some(mux) = (unsafe { mux.as_ref() }) else { return status::NULL_ARG };
    if response_cap > 0 && response_out.is_null() {
        return status::NULL_ARG;
    }
    let payload = unsafe { byte_slice(payload, payload_len) };
    let response_buf = unsafe { std::slice::from_raw_parts_mut(response_out, response_cap) };

    match mux.0.send_request(message_type, payload, response_buf) {
        Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
        Err(tap1_client::MultiplexerError::BufferTooSmall { .. }) => status::BUFFER_TOO_SMALL,
        Err(e) => {
            warn!(error = %e, "tap1_multiplexer_send_request failed");
            status::ERROR
        },
    }
}

/// Like [`tap1_multiplexer_send_request`], but gives up and returns
/// [`status::TIMEOUT`] if no response arrives within `timeout_ms`
/// milliseconds.
///
/// # Safety
/// Same requirements as [`tap1_multiplexer_send_request`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_multiplexer_send_request_timeout(
    mux: *mut Tap1Multiplexer,
    message_type: u16,
    payload: *const u8,
    payload_len: usize,
    response_out: *mut u8,
    response_cap: usize,
    timeout_ms: u64,
) -> i32 {
    let Some(mux) = (unsafe { mux.as_ref() }) else { return status::NULL_ARG };
    if response_cap > 0 && response_out.is_null() {
        return status::NULL_ARG;
    }
    let payload = unsafe { byte_slice(payload, payload_len) };
    let response_buf = unsafe { std::slice::from_raw_parts_mut(response_out, response_cap) };

    match mux.0.send_request_timeout(
        message_type,
        payload,
        response_buf,
        std::time::Duration::from_millis(timeout_ms),
    ) {
        Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
        Err(tap1_client::MultiplexerError::BufferTooSmall { .. }) => status::BUFFER_TOO_SMALL,
        Err(tap1_client::MultiplexerError::Timeout) => status::TIMEOUT,
        Err(e) => {
            warn!(error = %e, "tap1_multiplexer_send_request_timeout failed");
            status::ERROR
        },
    }
}

/// Stop the multiplexer's worker, release every queued request with a
/// negative result, and free the handle.
///
/// # Safety
/// `mux` must be null or a pointer returned by [`tap1_multiplexer_start`]
/// not yet freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tap1_multiplexer_stop(mux: *mut Tap1Multiplexer) {
    if !mux.is_null() {
        drop(unsafe { Box::from_raw(mux) });
    }
}

/// Build a `&[u8]` from a possibly-null pointer and length, treating a
/// null pointer as an empty slice regardless of the length the caller
/// passed alongside it.
unsafe fn byte_slice<'a>(ptr: *const u8, len: usize) -> &'a [u8] {
    if ptr.is_null() { &[] } else { unsafe { std::slice::from_raw_parts(ptr, len) } }
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, sync::Mutex as StdMutex, thread};

    use super::*;

    #[test]
    fn send_then_receive_round_trips_through_the_c_abi() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            Tap1Connection(ConnectionHandle::new(stream))
        });

        let client_raw = unsafe { tap1_connect(c"127.0.0.1".as_ptr(), port) };
        assert!(!client_raw.is_null());

        let server_conn = server.join().unwrap();
        let server_raw = Box::into_raw(Box::new(server_conn));

        let sent = unsafe { tap1_send_message(client_raw, 0x0001, b"hi".as_ptr(), 2, ptr::null(), 0) };
        assert!(sent > 0);

        let mut header = Tap1Header { message_type: 0, payload_length: 0, message_id: [0; 16], timestamp: 0 };
        let mut payload_buf = [0u8; 16];
        let received = unsafe {
            tap1_receive_message(server_raw, &mut header, payload_buf.as_mut_ptr(), payload_buf.len())
        };
        assert_eq!(received, 2);
        assert_eq!(&payload_buf[..2], b"hi");
        assert_eq!(header.message_type, 0x0001);

        unsafe {
            tap1_close(client_raw);
            tap1_close(server_raw);
        }
    }

    #[test]
    fn registry_round_trips_through_the_c_abi() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || listener.accept().unwrap().0);
        let _client = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        let accepted = server.join().unwrap();

        let registry = tap1_registry_new(4);
        let conn = Box::into_raw(Box::new(Tap1Connection(ConnectionHandle::new(accepted))));

        assert_eq!(unsafe { tap1_registry_register(registry, conn, 7) }, status::OK);
        assert_eq!(unsafe { tap1_registry_unregister(registry, conn) }, status::OK);
        assert_eq!(unsafe { tap1_registry_unregister(registry, conn) }, status::ERROR);

        unsafe {
            tap1_close(conn);
            tap1_registry_destroy(registry);
        }
    }

    #[test]
    fn null_handles_return_null_arg_rather_than_crashing() {
        assert_eq!(unsafe { tap1_is_alive(ptr::null_mut()) }, status::NULL_ARG);
        assert_eq!(unsafe { tap1_registry_register(ptr::null_mut(), ptr::null_mut(), 0) }, status::NULL_ARG);
        assert_eq!(unsafe { tap1_accept_context_run(ptr::null_mut(), noop_accept_handler, ptr::null_mut()) }, status::NULL_ARG);
        assert_eq!(unsafe { tap1_accept_context_shutdown(ptr::null_mut()) }, status::NULL_ARG);
        assert_eq!(unsafe { tap1_accept_context_active_clients(ptr::null_mut()) }, -1);
        unsafe {
            tap1_close(ptr::null_mut());
            tap1_registry_destroy(ptr::null_mut());
            tap1_multiplexer_stop(ptr::null_mut());
            tap1_accept_context_destroy(ptr::null_mut());
        }
    }

    extern "C" fn noop_accept_handler(conn: *mut Tap1Connection, _client_id: u64, _user_data: *mut c_void) {
        unsafe { tap1_close(conn) };
    }

    static ACCEPTED_CLIENT_IDS: StdMutex<Vec<u64>> = StdMutex::new(Vec::new());

    extern "C" fn recording_accept_handler(conn: *mut Tap1Connection, client_id: u64, _user_data: *mut c_void) {
        ACCEPTED_CLIENT_IDS.lock().unwrap().push(client_id);
        unsafe { tap1_close(conn) };
    }

    #[test]
    fn accept_context_dispatches_accepted_connections_to_the_handler() {
        ACCEPTED_CLIENT_IDS.lock().unwrap().clear();

        let ctx = tap1_accept_context_new(0, 10);
        assert!(!ctx.is_null());

        let run_ctx = ctx as usize;
        let runner = thread::spawn(move || unsafe {
            tap1_accept_context_run(run_ctx as *mut Tap1AcceptContext, recording_accept_handler, ptr::null_mut());
        });

        // `tap1_accept_context_new` binds an ephemeral port; recover it the
        // same way a host language would, by asking the listener directly.
        let port = unsafe { (*ctx).0.local_addr().port() };
        let _client = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        thread::sleep(std::time::Duration::from_millis(50));

        assert_eq!(unsafe { tap1_accept_context_shutdown(ctx) }, status::OK);
        runner.join().unwrap();

        assert_eq!(ACCEPTED_CLIENT_IDS.lock().unwrap().as_slice(), &[1]);

        unsafe { tap1_accept_context_destroy(ctx) };
    }
}

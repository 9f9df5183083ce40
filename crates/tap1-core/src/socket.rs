//! Blocking IPv4 TCP socket primitives.
//!
//! Everything `std::net` exposes safely is used directly; `socket2` fills
//! the three gaps std does not cover without `unsafe`: `SO_REUSEADDR` on
//! the listener, whole-second receive/send timeouts, and the `MSG_PEEK`
//! liveness probe.

use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream},
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{Result, TransportError};

/// Which direction(s) a timeout applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutDirection {
    /// Receive timeout only.
    Recv,
    /// Send timeout only.
    Send,
    /// Both receive and send timeouts.
    Both,
}

/// Bind and listen on `0.0.0.0:port` with `SO_REUSEADDR` set and the given
/// accept backlog.
pub fn create_server(port: u16, backlog: i32) -> Result<TcpListener> {
    let socket =
        Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(TransportError::SocketCreate)?;
    socket.set_reuse_address(true).map_err(TransportError::SocketCreate)?;

    let addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into();
    socket.bind(&addr.into()).map_err(TransportError::SocketBind)?;
    socket.listen(backlog).map_err(TransportError::SocketListen)?;

    Ok(socket.into())
}

/// Parse `host` as an IPv4 dotted-quad and connect to `host:port`.
/// Hostnames and IPv6 literals are rejected — out of scope for this
/// design.
pub fn connect_to_server(host: &str, port: u16) -> Result<TcpStream> {
    let ip = Ipv4Addr::from_str(host)
        .map_err(|e| TransportError::SocketConnect(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
    let addr: SocketAddr = SocketAddrV4::new(ip, port).into();
    TcpStream::connect(addr).map_err(TransportError::SocketConnect)
}

/// Set a whole-second timeout on one or both directions of `stream`.
pub fn set_timeout(stream: &TcpStream, seconds: u64, direction: TimeoutDirection) -> Result<()> {
    let duration = if seconds == 0 { None } else { Some(Duration::from_secs(seconds)) };
    match direction {
        TimeoutDirection::Recv => stream.set_read_timeout(duration)?,
        TimeoutDirection::Send => stream.set_write_timeout(duration)?,
        TimeoutDirection::Both => {
            stream.set_read_timeout(duration)?;
            stream.set_write_timeout(duration)?;
        },
    }
    Ok(())
}

/// Probe liveness with a non-blocking single-byte `MSG_PEEK`.
///
/// Zero bytes peeked means the peer closed; `WouldBlock`/`EAGAIN` means the
/// connection is alive and idle; any other error means the connection is
/// dead. The socket's blocking mode is toggled for the probe and restored
/// before returning.
pub fn is_alive(stream: &TcpStream) -> Result<bool> {
    let socket = Socket::from(stream.try_clone()?);
    socket.set_nonblocking(true)?;

    let mut byte = [std::mem::MaybeUninit::new(0u8)];
    let result = socket.peek(&mut byte);

    socket.set_nonblocking(false)?;
    let _: TcpStream = socket.into();

    Ok(match result {
        Ok(0) => false,
        Ok(_) => true,
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => true,
        Err(_) => false,
    })
}

/// Format the peer's IPv4 address in dotted-decimal.
pub fn peer_ip_string(stream: &TcpStream) -> Result<String> {
    let addr = stream.peer_addr()?;
    Ok(addr.ip().to_string())
}

static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A cheaply cloneable, hashable reference to one TCP connection.
///
/// The broadcast registry and accept dispatcher need to name a connection
/// they do not own (spec ownership model: broadcast records reference
/// sockets the worker owns). `ConnectionHandle` duplicates the underlying
/// file descriptor via `try_clone` and pairs it with a small integer id
/// used for equality and hashing, so registry code never has to fight the
/// borrow checker over a socket a worker thread also owns.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: u64,
    stream: std::sync::Arc<TcpStream>,
}

impl ConnectionHandle {
    /// Wrap `stream` in a handle with a fresh process-wide id.
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        Self { id: HANDLE_COUNTER.fetch_add(1, Ordering::Relaxed), stream: std::sync::Arc::new(stream) }
    }

    /// The handle's stable identity, independent of the underlying socket.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Borrow the underlying stream.
    #[must_use]
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Clone the underlying file descriptor for an independent reader or
    /// writer half.
    pub fn try_clone_stream(&self) -> Result<TcpStream> {
        Ok(self.stream.try_clone()?)
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl std::hash::Hash for ConnectionHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        net::TcpStream,
        thread,
        time::Duration,
    };

    use super::*;

    #[test]
    fn loopback_round_trip_through_create_and_connect() {
        let listener = create_server(0, 10).unwrap();
        let port = listener.local_addr().unwrap().port();

        let accepted = thread::spawn(move || listener.accept().unwrap().0);

        let mut client = connect_to_server("127.0.0.1", port).unwrap();
        client.write_all(b"hi").unwrap();

        let server_side = accepted.join().unwrap();
        assert!(is_alive(&server_side).unwrap());
        drop(client);
        thread::sleep(Duration::from_millis(50));
        assert!(!is_alive(&server_side).unwrap());
    }

    #[test]
    fn connection_handles_compare_by_identity_not_socket_equality() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let _client: TcpStream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let (accepted, _) = listener.accept().unwrap();

        let a = ConnectionHandle::new(accepted.try_clone().unwrap());
        let b = ConnectionHandle::new(accepted);
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }
}

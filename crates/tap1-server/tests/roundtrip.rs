//! End-to-end loopback scenarios against a real [`AcceptContext`], covering
//! spec §8 scenarios 1 (loopback round-trip) and 2 (oversize rejection).

use std::{
    io::Write,
    net::TcpStream,
    sync::Arc,
    thread,
    time::Duration,
};

use tap1_core::{ConnectionHandle, create_server};
use tap1_proto::{Header, message_type::auth, receive_message, send_message};
use tap1_server::AcceptContext;

/// Bind a real dispatcher that echoes every frame back with
/// `message_type + 1`, exactly as `tap1-server`'s binary does for non-room
/// traffic.
fn spawn_echo_server() -> (Arc<AcceptContext>, std::net::SocketAddr) {
    let listener = create_server(0, 10).unwrap();
    let ctx = Arc::new(AcceptContext::bind(listener).unwrap());
    let addr = ctx.local_addr();

    let run_ctx = Arc::clone(&ctx);
    thread::spawn(move || {
        run_ctx.run(|stream, _client_id| {
            let handle = ConnectionHandle::new(stream);
            let mut reader = handle.try_clone_stream().unwrap();
            let Ok(frame) = receive_message(&mut reader, tap1_proto::MAX_PAYLOAD_LENGTH as usize) else {
                return;
            };
            let mut writer = handle.try_clone_stream().unwrap();
            let _ = send_message(
                &mut writer,
                frame.header().message_type().wrapping_add(1),
                frame.payload(),
                b"",
            );
        });
    });

    (ctx, addr)
}

#[test]
fn loopback_round_trip_echoes_payload_through_a_real_dispatcher() {
    let (ctx, addr) = spawn_echo_server();

    let mut client = TcpStream::connect(addr).unwrap();
    send_message(&mut client, auth::REGISTER_REQ, br#"{"u":"a"}"#, b"").unwrap();

    let reply = receive_message(&mut client, 4096).unwrap();
    assert_eq!(reply.header().message_type(), auth::REGISTER_REQ + 1);
    assert_eq!(reply.payload(), br#"{"u":"a"}"#);
    assert_eq!(reply.payload().len(), 9);

    ctx.shutdown();
}

#[test]
fn oversized_announced_payload_is_rejected_without_a_response() {
    let (ctx, addr) = spawn_echo_server();

    let mut client = TcpStream::connect(addr).unwrap();
    // Forge a header announcing an over-limit payload, then send only the
    // header: the server's receive_message must reject on the header alone,
    // never blocking trying to read payload bytes that were never sent.
    let forged = Header::build(auth::REGISTER_REQ, Header::MAX_PAYLOAD_LENGTH + 1, b"");
    client.write_all(&forged.to_bytes()).unwrap();

    client.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    let mut byte = [0u8; 1];
    let result = std::io::Read::read(&mut client, &mut byte);
    // The worker rejected the frame and exited without replying; the
    // connection is closed from the server side (a zero-byte read) rather
    // than hanging until our read timeout fires.
    assert!(matches!(result, Ok(0)) || result.is_err());

    ctx.shutdown();
}

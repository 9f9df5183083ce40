//! Multiplexer scenarios driven against a real [`tap1_server::AcceptContext`]
//! rather than a bespoke loopback stub, covering spec §8 scenarios 5 and 6.

use std::{net::TcpStream, sync::Arc, thread, time::Duration};

use tap1_client::Multiplexer;
use tap1_core::{ConnectionHandle, create_server};
use tap1_proto::{message_type::auth, receive_message, send_message};
use tap1_server::AcceptContext;

/// Bind a dispatcher that echoes every frame on a connection back
/// unchanged, looping for as long as the connection stays open — the same
/// shape as `tap1-server`'s own per-connection worker.
fn spawn_echo_server() -> (Arc<AcceptContext>, std::net::SocketAddr) {
    let listener = create_server(0, 10).unwrap();
    let ctx = Arc::new(AcceptContext::bind(listener).unwrap());
    let addr = ctx.local_addr();

    let run_ctx = Arc::clone(&ctx);
    thread::spawn(move || {
        run_ctx.run(|stream, _client_id| {
            let handle = ConnectionHandle::new(stream);
            loop {
                let mut reader = handle.try_clone_stream().unwrap();
                let Ok(frame) = receive_message(&mut reader, tap1_proto::MAX_PAYLOAD_LENGTH as usize) else {
                    return;
                };
                let mut writer = handle.try_clone_stream().unwrap();
                if send_message(&mut writer, frame.header().message_type(), frame.payload(), b"").is_err() {
                    return;
                }
            }
        });
    });

    (ctx, addr)
}

#[test]
fn four_concurrent_callers_each_receive_their_own_payload_in_order() {
    let (ctx, addr) = spawn_echo_server();

    let stream = TcpStream::connect(addr).unwrap();
    let multiplexer = Arc::new(Multiplexer::start(stream, Vec::new(), |_, _| {}));

    let handles: Vec<_> = (1..=4u8)
        .map(|i| {
            let mux = Arc::clone(&multiplexer);
            thread::spawn(move || {
                let payload = [b'0' + i];
                let mut buf = [0u8; 8];
                let len = mux.send_request(auth::REGISTER_REQ, &payload, &mut buf).unwrap();
                (i, buf[..len].to_vec())
            })
        })
        .collect();

    for h in handles {
        let (i, data) = h.join().unwrap();
        assert_eq!(data, vec![b'0' + i]);
    }

    ctx.shutdown();
}

#[test]
fn stop_releases_a_blocked_caller_without_leaking_its_request() {
    // A real `AcceptContext` that accepts the connection and then goes
    // silent, so the caller below is guaranteed to still be blocked when
    // `stop` runs.
    let listener = create_server(0, 10).unwrap();
    let ctx = Arc::new(AcceptContext::bind(listener).unwrap());
    let addr = ctx.local_addr();
    let run_ctx = Arc::clone(&ctx);
    thread::spawn(move || {
        run_ctx.run(|_stream, _client_id| {
            thread::sleep(Duration::from_secs(3));
        });
    });

    let stream = TcpStream::connect(addr).unwrap();
    let mut multiplexer = Multiplexer::start(stream, Vec::new(), |_, _| {});

    thread::scope(|scope| {
        let mux = &multiplexer;
        let caller = scope.spawn(move || {
            let mut buf = [0u8; 8];
            mux.send_request(auth::REGISTER_REQ, b"x", &mut buf)
        });

        thread::sleep(Duration::from_millis(100));
        multiplexer.stop();

        let result = caller.join().unwrap();
        assert!(matches!(result, Err(tap1_client::MultiplexerError::QueueStopped)));
    });

    ctx.shutdown();
}

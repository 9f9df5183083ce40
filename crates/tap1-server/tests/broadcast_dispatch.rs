//! End-to-end room broadcast scenario against a real [`AcceptContext`] and
//! [`BroadcastRegistry`] wired together the way `tap1-server`'s binary wires
//! them, covering spec §8 scenario 3.

use std::{sync::Arc, thread, time::Duration};

use tap1_core::{ConnectionHandle, create_server};
use tap1_proto::{message_type::rooms, receive_message, send_message};
use tap1_server::{AcceptContext, BroadcastRegistry};

#[test]
fn broadcast_to_room_reaches_only_its_members() {
    let listener = create_server(0, 10).unwrap();
    let ctx = Arc::new(AcceptContext::bind(listener).unwrap());
    let addr = ctx.local_addr();
    let registry = Arc::new(BroadcastRegistry::new(8));

    let run_ctx = Arc::clone(&ctx);
    let run_registry = Arc::clone(&registry);
    thread::spawn(move || {
        run_ctx.run(move |stream, _client_id| {
            let handle = ConnectionHandle::new(stream);
            let mut reader = handle.try_clone_stream().unwrap();
            let Ok(frame) = receive_message(&mut reader, tap1_proto::MAX_PAYLOAD_LENGTH as usize) else {
                return;
            };
            if frame.header().message_type() != rooms::JOIN {
                return;
            }
            let room: i32 = std::str::from_utf8(frame.payload()).unwrap().trim().parse().unwrap();
            run_registry.register(handle, room).unwrap();
            // Stay connected so the broadcast below has somewhere to land;
            // the worker's job here is just membership, not further I/O.
            thread::sleep(Duration::from_secs(2));
        });
    });

    let mut clients = Vec::new();
    for room in [7, 7, 9] {
        let mut client = std::net::TcpStream::connect(addr).unwrap();
        send_message(&mut client, rooms::JOIN, room.to_string().as_bytes(), b"").unwrap();
        client.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
        clients.push(client);
    }

    // Give the workers a moment to register before we broadcast.
    thread::sleep(Duration::from_millis(100));

    let delivered = registry.broadcast_to_room(7, rooms::STATUS, br#"{"n":1}"#);
    assert_eq!(delivered, 2);

    let mut received = 0;
    let mut missed = 0;
    for client in &mut clients {
        match receive_message(client, 64) {
            Ok(frame) => {
                assert_eq!(frame.header().message_type(), rooms::STATUS);
                assert_eq!(frame.payload(), br#"{"n":1}"#);
                received += 1;
            },
            Err(_) => missed += 1,
        }
    }
    assert_eq!(received, 2);
    assert_eq!(missed, 1);

    ctx.shutdown();
}

//! Manual exercising binary for the tap1 server: accepts connections,
//! echoes non-room frames back with `message_type + 1`, and lets clients
//! join rooms so they can be reached by `tap1-client`'s broadcast demo.

use std::{io::Write, net::TcpStream, sync::Arc};

use clap::Parser;
use tap1_core::{ConnectionHandle, create_server};
use tap1_proto::{message_type::rooms, receive_message, send_message};
use tap1_server::{AcceptContext, BroadcastRegistry};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// tap1 classroom protocol server.
#[derive(Parser, Debug)]
#[command(name = "tap1-server")]
struct Args {
    /// Address to bind, e.g. `0.0.0.0:7878`.
    #[arg(long, default_value = "0.0.0.0:7878")]
    bind: String,

    /// Accept backlog.
    #[arg(long, default_value_t = 10)]
    max_clients: i32,

    /// Fixed capacity of the broadcast registry.
    #[arg(long, default_value_t = BroadcastRegistry::DEFAULT_CAPACITY)]
    registry_capacity: usize,

    /// Tracing filter directive, e.g. `info` or `tap1_server=debug`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (_host, port) = args.bind.rsplit_once(':').unwrap_or((args.bind.as_str(), "7878"));
    let port: u16 = port.parse().unwrap_or(7878);

    let listener = match create_server(port, args.max_clients) {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind = %args.bind, error = %e, "failed to bind");
            std::process::exit(1);
        },
    };

    let ctx = match AcceptContext::bind(listener) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            error!(error = %e, "failed to initialize accept context");
            std::process::exit(1);
        },
    };

    info!(addr = %ctx.local_addr(), "tap1-server listening");

    let registry = Arc::new(BroadcastRegistry::new(args.registry_capacity));

    ctx.run(move |stream, client_id| handle_connection(stream, client_id, Arc::clone(&registry)));
}

fn handle_connection(stream: TcpStream, client_id: u64, registry: Arc<BroadcastRegistry>) {
    let handle = ConnectionHandle::new(stream);
    info!(client_id, "worker started");

    loop {
        let mut reader = match handle.try_clone_stream() {
            Ok(s) => s,
            Err(e) => {
                warn!(client_id, error = %e, "failed to clone stream for read");
                break;
            },
        };

        let frame = match receive_message(&mut reader, tap1_proto::MAX_PAYLOAD_LENGTH as usize) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(client_id, error = %e, "worker exiting on receive failure");
                break;
            },
        };

        let message_type = frame.header().message_type();
        let mut writer = match handle.try_clone_stream() {
            Ok(s) => s,
            Err(e) => {
                warn!(client_id, error = %e, "failed to clone stream for write");
                break;
            },
        };

        if message_type == rooms::JOIN {
            let room = parse_room(frame.payload());
            match registry.register(handle.clone(), room) {
                Ok(()) => {
                    let _ = send_message(&mut writer, rooms::JOIN_RES, b"{\"ok\":true}", b"");
                },
                Err(e) => {
                    warn!(client_id, error = %e, "join failed");
                    let _ = send_message(&mut writer, rooms::JOIN_RES, b"{\"ok\":false}", b"");
                },
            }
            continue;
        }

        if let Err(e) = send_message(&mut writer, message_type.wrapping_add(1), frame.payload(), b"") {
            warn!(client_id, error = %e, "echo failed");
            break;
        }
    }

    let _ = registry.unregister(&handle);
    if let Ok(mut stream) = handle.try_clone_stream() {
        let _ = stream.flush();
    }
    info!(client_id, "worker exiting");
}

fn parse_room(payload: &[u8]) -> i32 {
    std::str::from_utf8(payload).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(0)
}

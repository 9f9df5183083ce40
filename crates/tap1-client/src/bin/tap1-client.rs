//! Manual exercising binary for the tap1 client multiplexer: connects,
//! issues one request, prints the response, then waits to observe any
//! room broadcasts before disconnecting.

use std::time::Duration;

use clap::Parser;
use tap1_client::Multiplexer;
use tap1_core::connect_to_server;
use tap1_proto::message_type::auth;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// tap1 classroom protocol client.
#[derive(Parser, Debug)]
#[command(name = "tap1-client")]
struct Args {
    /// Server IPv4 address to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port.
    #[arg(long, default_value_t = 7878)]
    port: u16,

    /// Session token to carry on every request.
    #[arg(long, default_value = "")]
    token: String,

    /// Request payload to send once at startup.
    #[arg(long, default_value = "{}")]
    payload: String,

    /// Seconds to keep listening for broadcasts after the request completes.
    #[arg(long, default_value_t = 5)]
    listen_seconds: u64,

    /// Tracing filter directive, e.g. `info` or `tap1_client=debug`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let stream = match connect_to_server(&args.host, args.port) {
        Ok(stream) => stream,
        Err(e) => {
            error!(host = %args.host, port = args.port, error = %e, "failed to connect");
            std::process::exit(1);
        },
    };

    info!(host = %args.host, port = args.port, "connected");

    let multiplexer = Multiplexer::start(stream, args.token.into_bytes(), |msg_type, payload| {
        info!(message_type = format_args!("{msg_type:#06x}"), payload = %String::from_utf8_lossy(payload), "broadcast received");
    });

    let mut response = vec![0u8; 65536];
    match multiplexer.send_request(auth::REGISTER_REQ, args.payload.as_bytes(), &mut response) {
        Ok(len) => info!(response = %String::from_utf8_lossy(&response[..len]), "request completed"),
        Err(e) => error!(error = %e, "request failed"),
    }

    std::thread::sleep(Duration::from_secs(args.listen_seconds));
}

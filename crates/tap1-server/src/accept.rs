//! The accept dispatcher: owns the listening socket, accepts connections,
//! and hands each one to a detached per-connection worker thread.

use std::{
    net::{TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
};

use tap1_core::sync::Mutex;
use tracing::{debug, error, info, warn};

/// `Running -> Stopping -> Stopped`, tracked so the accept loop can tell a
/// transient accept failure from a deliberate shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Stopping,
    Stopped,
}

/// Owns the listening socket and the active-worker count. One accept loop
/// runs per context; any thread may call [`AcceptContext::shutdown`].
pub struct AcceptContext {
    listener: TcpListener,
    local_addr: std::net::SocketAddr,
    state: Mutex<State>,
    active_clients: Arc<AtomicU64>,
    next_client_id: AtomicU64,
    running: Arc<AtomicBool>,
}

/// Decrements the active-client count when a worker thread exits, whether
/// it returns normally or panics, so one crashed worker never leaks a
/// slot (failure isolation, spec §5).
struct ActiveGuard(Arc<AtomicU64>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AcceptContext {
    /// Bind a new accept context.
    pub fn bind(listener: TcpListener) -> std::io::Result<Self> {
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            state: Mutex::new(State::Running),
            active_clients: Arc::new(AtomicU64::new(0)),
            next_client_id: AtomicU64::new(1),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// The address the context is bound to.
    #[must_use]
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Current active-worker count.
    #[must_use]
    pub fn active_clients(&self) -> u64 {
        self.active_clients.load(Ordering::SeqCst)
    }

    /// Run the accept loop until [`Self::shutdown`] is called from another
    /// thread. `handler` runs on a detached worker thread per accepted
    /// connection, receiving the stream and its monotonic client id.
    pub fn run<F>(&self, handler: F)
    where
        F: Fn(TcpStream, u64) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if !self.running.load(Ordering::SeqCst) {
                        // Unblocked by our own shutdown self-connect; drop
                        // and terminate rather than dispatching a worker.
                        drop(stream);
                        break;
                    }

                    let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
                    self.active_clients.fetch_add(1, Ordering::SeqCst);
                    debug!(client_id, %peer, "accepted connection");

                    let handler = Arc::clone(&handler);
                    let active_clients = Arc::clone(&self.active_clients);

                    let spawned = thread::Builder::new()
                        .name(format!("tap1-worker-{client_id}"))
                        .spawn(move || {
                            let _guard = ActiveGuard(active_clients);
                            handler(stream, client_id);
                        });

                    if spawned.is_err() {
                        error!(client_id, "failed to spawn worker thread");
                        self.active_clients.fetch_sub(1, Ordering::SeqCst);
                    }
                },
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        warn!(error = %e, "transient accept error");
                        continue;
                    }
                    info!("accept loop stopping");
                    break;
                },
            }
        }

        *self.state.lock() = State::Stopped;
    }

    /// Initiate orderly shutdown: flips the running flag, transitions to
    /// `Stopping`, then connects to the listening socket itself so the
    /// blocked `accept()` call returns and the loop can observe the flag.
    pub fn shutdown(&self) {
        *self.state.lock() = State::Stopping;
        self.running.store(false, Ordering::SeqCst);
        if let Ok(stream) = TcpStream::connect(self.local_addr) {
            drop(stream);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;

    #[test]
    fn shutdown_unblocks_the_accept_loop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let ctx = Arc::new(AcceptContext::bind(listener).unwrap());

        let run_ctx = Arc::clone(&ctx);
        let runner = thread::spawn(move || run_ctx.run(|_stream, _id| {}));

        thread::sleep(Duration::from_millis(20));
        ctx.shutdown();
        runner.join().unwrap();
    }

    #[test]
    fn accepted_connections_increment_and_decrement_active_count() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let ctx = Arc::new(AcceptContext::bind(listener).unwrap());
        let addr = ctx.local_addr();

        let run_ctx = Arc::clone(&ctx);
        let runner = thread::spawn(move || {
            run_ctx.run(|_stream, _id| {
                thread::sleep(Duration::from_millis(30));
            });
        });

        let _client = TcpStream::connect(addr).unwrap();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(ctx.active_clients(), 1);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(ctx.active_clients(), 0);

        ctx.shutdown();
        runner.join().unwrap();
    }
}

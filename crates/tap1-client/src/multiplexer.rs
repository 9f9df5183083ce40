//! The client multiplexer: a single background worker that owns one
//! connection, serializes writes, and demultiplexes reads into either a
//! broadcast callback or a FIFO response waiter.
//!
//! FIFO matching assumes the peer responds to requests in the order they
//! arrived. That is valid for a single-threaded server handler per
//! connection, but is a documented precondition, not a guarantee this
//! crate can enforce — a peer that reorders responses will hand one
//! caller another caller's payload.

use std::{
    collections::VecDeque,
    net::TcpStream,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use tap1_core::sync::{Condvar, Mutex};
use tap1_proto::{message_type::is_broadcast, receive_message, send_message};
use tracing::{debug, warn};

use crate::error::{MultiplexerError, Result};

/// How long the worker blocks on a single read attempt before checking the
/// running flag again. Realizes spec's "select with a 1-second timeout"
/// atop a blocking socket's read timeout, since a single worker only ever
/// watches the one fd it owns.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A request's completion: set exactly once, whether by a successful
/// response, a send failure, or shutdown.
struct Completion {
    completed: bool,
    result: i32,
    data: Vec<u8>,
}

/// The private per-request signaling primitive described in spec §3.
struct Signal {
    lock: Mutex<Completion>,
    condvar: Condvar,
}

impl Signal {
    fn new() -> Self {
        Self { lock: Mutex::new(Completion { completed: false, result: 0, data: Vec::new() }), condvar: Condvar::new() }
    }

    fn complete(&self, result: i32, data: Vec<u8>) {
        let mut guard = self.lock.lock();
        guard.completed = true;
        guard.result = result;
        guard.data = data;
        self.condvar.notify_all();
    }

    /// Block until completed, returning `(result, data)`.
    fn wait(&self) -> (i32, Vec<u8>) {
        let guard = self.lock.lock();
        let mut guard = match self.condvar.wait_while(guard, |c| !c.completed) {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        (guard.result, std::mem::take(&mut guard.data))
    }

    /// Block until completed or `timeout` elapses, whichever comes first.
    /// Returns `None` on timeout; the request stays queued (see
    /// [`MultiplexerError::Timeout`]).
    fn wait_timeout(&self, timeout: Duration) -> Option<(i32, Vec<u8>)> {
        let guard = self.lock.lock();
        let (mut guard, wait_result) = match self.condvar.wait_timeout_while(guard, timeout, |c| !c.completed) {
            Ok(pair) => pair,
            Err(poisoned) => poisoned.into_inner(),
        };
        if wait_result.timed_out() && !guard.completed {
            return None;
        }
        Some((guard.result, std::mem::take(&mut guard.data)))
    }
}

enum State {
    Unsent,
    Sent,
}

struct PendingRequest {
    msg_type: u16,
    payload: Vec<u8>,
    state: State,
    signal: Arc<Signal>,
}

/// Owns one connection's worker thread and the queue of requests waiting
/// to be sent or matched to a response.
pub struct Multiplexer {
    queue: Arc<Mutex<VecDeque<PendingRequest>>>,
    running: Arc<std::sync::atomic::AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Multiplexer {
    /// Spawn the background worker on `stream`, sending `session_token`
    /// with every request it writes. `on_broadcast` is invoked from the
    /// worker thread whenever a frame classified as a broadcast arrives;
    /// it must not block for long, as it runs inline in the read loop.
    pub fn start<F>(stream: TcpStream, session_token: Vec<u8>, on_broadcast: F) -> Self
    where
        F: Fn(u16, &[u8]) + Send + 'static,
    {
        if let Err(e) =
            tap1_core::set_timeout(&stream, POLL_INTERVAL.as_secs(), tap1_core::TimeoutDirection::Recv)
        {
            warn!(error = %e, "failed to set multiplexer read timeout, proceeding without it");
        }

        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let running = Arc::new(std::sync::atomic::AtomicBool::new(true));

        let worker_queue = Arc::clone(&queue);
        let worker_running = Arc::clone(&running);
        match thread::Builder::new()
            .name("tap1-multiplexer".to_string())
            .spawn(move || run_worker(stream, session_token, worker_queue, worker_running, on_broadcast))
        {
            Ok(worker) => Self { queue, running, worker: Some(worker) },
            Err(e) => {
                warn!(error = %e, "failed to spawn multiplexer worker thread");
                running.store(false, std::sync::atomic::Ordering::SeqCst);
                Self { queue, running, worker: None }
            },
        }
    }

    /// Enqueue a request, block until the worker completes it, and copy at
    /// most `response_buf.len()` bytes of the response into it. Returns
    /// the response length on success, or a negative result code on
    /// failure (peer closed, send failure, or shutdown) matching spec's
    /// `result = -1` convention, wrapped in `Err` so callers do not need
    /// to special-case a sentinel integer.
    pub fn send_request(&self, msg_type: u16, payload: &[u8], response_buf: &mut [u8]) -> Result<usize> {
        let signal = self.enqueue(msg_type, payload)?;
        let (result, data) = signal.wait();
        Self::finish(result, data, response_buf)
    }

    /// Like [`Self::send_request`], but gives up and returns
    /// [`MultiplexerError::Timeout`] if no response arrives within
    /// `timeout`. This is the SHOULD from spec §5/§9: the base
    /// `send_request` has no deadline of its own, so callers that need one
    /// opt in here rather than every caller paying for a timer. A request
    /// that times out stays queued; if the peer eventually responds, that
    /// response goes to whichever caller is oldest in FIFO order, which
    /// after a timeout may no longer be the caller that gave up on it.
    pub fn send_request_timeout(
        &self,
        msg_type: u16,
        payload: &[u8],
        response_buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        let signal = self.enqueue(msg_type, payload)?;
        let Some((result, data)) = signal.wait_timeout(timeout) else {
            return Err(MultiplexerError::Timeout);
        };
        Self::finish(result, data, response_buf)
    }

    fn enqueue(&self, msg_type: u16, payload: &[u8]) -> Result<Arc<Signal>> {
        if !self.running.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(MultiplexerError::QueueStopped);
        }

        let signal = Arc::new(Signal::new());
        self.queue.lock().push_back(PendingRequest {
            msg_type,
            payload: payload.to_vec(),
            state: State::Unsent,
            signal: Arc::clone(&signal),
        });
        Ok(signal)
    }

    fn finish(result: i32, data: Vec<u8>, response_buf: &mut [u8]) -> Result<usize> {
        if result < 0 {
            return Err(MultiplexerError::QueueStopped);
        }
        if data.len() > response_buf.len() {
            return Err(MultiplexerError::BufferTooSmall { needed: data.len(), capacity: response_buf.len() });
        }
        response_buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    /// Stop the worker and release every queued or in-flight request with
    /// `result = -1`. Returns once the worker has exited, within one poll
    /// interval.
    pub fn stop(&mut self) {
        self.running.store(false, std::sync::atomic::Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        release_all(&self.queue);
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

fn release_all(queue: &Mutex<VecDeque<PendingRequest>>) {
    let mut guard = queue.lock();
    for request in guard.drain(..) {
        request.signal.complete(-1, Vec::new());
    }
}

fn run_worker<F>(
    mut stream: TcpStream,
    session_token: Vec<u8>,
    queue: Arc<Mutex<VecDeque<PendingRequest>>>,
    running: Arc<std::sync::atomic::AtomicBool>,
    on_broadcast: F,
) where
    F: Fn(u16, &[u8]) + Send + 'static,
{
    while running.load(std::sync::atomic::Ordering::SeqCst) {
        match try_receive(&mut stream) {
            Ok(Some((msg_type, payload))) => {
                if is_broadcast(msg_type) {
                    on_broadcast(msg_type, &payload);
                } else {
                    complete_oldest_sent(&queue, 0, payload);
                }
            },
            Ok(None) => {
                // Read timed out with nothing to receive; fall through to
                // the send phase below, matching spec's "select, then
                // send the next pending request" loop order.
            },
            Err(e) => {
                warn!(error = %e, "multiplexer read failed, stopping worker");
                running.store(false, std::sync::atomic::Ordering::SeqCst);
                break;
            },
        }

        if let Some((msg_type, payload, signal)) = pop_unsent(&queue) {
            match send_message(&mut stream, msg_type, &payload, &session_token) {
                Ok(_) => mark_sent(&queue, &signal),
                Err(e) => {
                    warn!(error = %e, "multiplexer send failed");
                    signal.complete(-1, Vec::new());
                },
            }
        }

        sweep_completed(&queue);
    }

    release_all(&queue);
    debug!("multiplexer worker exiting");
}

/// One receive attempt. `Ok(None)` means the read timed out (nothing
/// arrived within [`POLL_INTERVAL`]); any other failure is fatal.
fn try_receive(stream: &mut TcpStream) -> std::io::Result<Option<(u16, Vec<u8>)>> {
    match receive_message(stream, tap1_proto::MAX_PAYLOAD_LENGTH as usize) {
        Ok(frame) => Ok(Some((frame.header().message_type(), frame.payload().to_vec()))),
        Err(e) if e.is_read_timeout() => Ok(None),
        Err(e) => Err(std::io::Error::other(e)),
    }
}

fn complete_oldest_sent(queue: &Mutex<VecDeque<PendingRequest>>, result: i32, data: Vec<u8>) {
    let guard = queue.lock();
    let Some(request) = guard.iter().find(|r| matches!(r.state, State::Sent) && !r.signal.is_completed()) else {
        return;
    };
    request.signal.complete(result, data);
}

fn pop_unsent(queue: &Mutex<VecDeque<PendingRequest>>) -> Option<(u16, Vec<u8>, Arc<Signal>)> {
    let guard = queue.lock();
    guard
        .iter()
        .find(|r| matches!(r.state, State::Unsent))
        .map(|r| (r.msg_type, r.payload.clone(), Arc::clone(&r.signal)))
}

fn mark_sent(queue: &Mutex<VecDeque<PendingRequest>>, signal: &Arc<Signal>) {
    let mut guard = queue.lock();
    if let Some(request) = guard.iter_mut().find(|r| Arc::ptr_eq(&r.signal, signal)) {
        request.state = State::Sent;
    }
}

fn sweep_completed(queue: &Mutex<VecDeque<PendingRequest>>) {
    let mut guard = queue.lock();
    guard.retain(|r| !r.signal.is_completed());
}

impl Signal {
    fn is_completed(&self) -> bool {
        self.lock.lock().completed
    }
}

#[cfg(test)]
mod tests {
    use std::{net::TcpListener, sync::Mutex as StdMutex, time::Duration};

    use tap1_proto::message_type::auth;

    use super::*;

    fn loopback_echo_server() -> (TcpListener, std::net::SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[test]
    fn fifo_matches_responses_to_senders_in_order() {
        let (listener, addr) = loopback_echo_server();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            for _ in 0..4 {
                let frame = receive_message(&mut stream, 4096).unwrap();
                send_message(&mut stream, frame.header().message_type(), frame.payload(), b"").unwrap();
            }
        });

        let stream = TcpStream::connect(addr).unwrap();
        let multiplexer = Arc::new(Multiplexer::start(stream, Vec::new(), |_, _| {}));

        let results = Arc::new(StdMutex::new(Vec::new()));
        let handles: Vec<_> = (1..=4u8)
            .map(|i| {
                let mux = Arc::clone(&multiplexer);
                let results = Arc::clone(&results);
                thread::spawn(move || {
                    let payload = [b'0' + i];
                    let mut buf = [0u8; 8];
                    let len = mux.send_request(auth::REGISTER_REQ, &payload, &mut buf).unwrap();
                    results.lock().unwrap().push((i, buf[..len].to_vec()));
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        server.join().unwrap();

        for (i, data) in results.lock().unwrap().iter() {
            assert_eq!(data, &vec![b'0' + i]);
        }
    }

    #[test]
    fn stop_releases_a_blocked_caller_with_negative_result() {
        let (listener, addr) = loopback_echo_server();
        // Accept but never respond, so the request stays pending.
        let server = thread::spawn(move || {
            let _ = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(3));
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
            assert!(matches!(result, Err(MultiplexerError::QueueStopped)));
        });

        let _ = server;
    }

    #[test]
    fn send_request_timeout_returns_timeout_when_peer_never_responds() {
        let (listener, addr) = loopback_echo_server();
        let server = thread::spawn(move || {
            let _ = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(3));
        });

        let stream = TcpStream::connect(addr).unwrap();
        let multiplexer = Multiplexer::start(stream, Vec::new(), |_, _| {});

        let mut buf = [0u8; 8];
        let result = multiplexer.send_request_timeout(
            auth::REGISTER_REQ,
            b"x",
            &mut buf,
            Duration::from_millis(100),
        );
        assert!(matches!(result, Err(MultiplexerError::Timeout)));

        let _ = server;
    }
}

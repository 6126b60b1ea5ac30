//! Duplex session: one live stream, paired inbound/outbound threads.
//!
//! Lifecycle is `Connecting -> Active -> Killed`. Connecting is the peer
//! manager's connect/accept phase; [`Session::start`] returns an Active
//! session with both loops running; Killed is terminal - reconnecting always
//! builds a fresh session.
//!
//! # Termination
//!
//! Three triggers move a session to Killed: the inbound loop observing
//! end-of-stream, read timeout or an I/O failure; the outbound loop observing
//! a write failure; or an external [`Session::kill`]. The triggers race (both
//! loops can fail at nearly the same instant), so the kill path is guarded by
//! a compare-and-set flag: exactly one winner shuts down the socket, closes
//! the send queue and fires the one-shot termination callback. Every other
//! caller returns immediately.
//!
//! The inbound and outbound loops run on separate OS threads so a slow writer
//! can never stall frame reception, and vice versa.

use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::protocol::framing::{FrameReader, write_frame};
use crate::protocol::messages::Message;
use crate::session::dispatcher::Dispatcher;
use crate::session::send_queue::SendQueue;
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callback fired exactly once when the session terminates
pub type TerminationCallback = Box<dyn FnOnce() + Send>;

/// Per-session tuning, derived from [`LinkConfig`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Stream read timeout; a silent peer fails the inbound loop after this
    pub read_timeout: Duration,
    /// Droppable lane capacity for the send queue
    pub droppable_queue_limit: usize,
}

impl From<&LinkConfig> for SessionConfig {
    fn from(config: &LinkConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            droppable_queue_limit: config.delivery.droppable_queue_limit,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&LinkConfig::rover_defaults())
    }
}

/// One live connection with its paired inbound/outbound threads
pub struct Session {
    queue: Arc<SendQueue>,
    stream: TcpStream,
    peer: String,
    killed: AtomicBool,
    inbound: Mutex<Option<JoinHandle<()>>>,
    outbound: Mutex<Option<JoinHandle<()>>>,
    on_terminated: Mutex<Option<TerminationCallback>>,
}

impl Session {
    /// Take ownership of a connected stream and start both loops.
    ///
    /// The dispatcher must already carry every handler the embedder wants;
    /// handlers run on the inbound thread.
    pub fn start(
        stream: TcpStream,
        dispatcher: Arc<Dispatcher>,
        config: &SessionConfig,
        on_terminated: Option<TerminationCallback>,
    ) -> Result<Arc<Self>> {
        stream.set_read_timeout(Some(config.read_timeout))?;
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let session = Arc::new(Self {
            queue: Arc::new(SendQueue::new(config.droppable_queue_limit)),
            stream: stream.try_clone()?,
            peer: peer.clone(),
            killed: AtomicBool::new(false),
            inbound: Mutex::new(None),
            outbound: Mutex::new(None),
            on_terminated: Mutex::new(on_terminated),
        });

        let inbound_stream = stream.try_clone()?;
        let inbound_session = Arc::clone(&session);
        let inbound = thread::Builder::new()
            .name("link-inbound".to_string())
            .spawn(move || {
                if let Err(e) = run_inbound(inbound_stream, &dispatcher, &inbound_session) {
                    log::debug!("Inbound loop ended: {}", e);
                }
                inbound_session.kill();
            })?;

        let outbound_session = Arc::clone(&session);
        let outbound = match thread::Builder::new()
            .name("link-outbound".to_string())
            .spawn(move || {
                if let Err(e) = run_outbound(stream, &outbound_session) {
                    log::debug!("Outbound loop ended: {}", e);
                }
                outbound_session.kill();
            }) {
            Ok(handle) => handle,
            Err(e) => {
                // Inbound is already running; tear it down before reporting
                session.kill();
                return Err(e.into());
            }
        };

        *lock_ignore_poison(&session.inbound) = Some(inbound);
        *lock_ignore_poison(&session.outbound) = Some(outbound);

        log::info!("Session active with peer {}", peer);
        Ok(session)
    }

    /// Queue a message that must be delivered while the session lives
    pub fn enqueue_strict(&self, message: Message) {
        if self.is_killed() {
            log::debug!("Dropping strict message for killed session");
            return;
        }
        self.queue.enqueue_strict(message);
    }

    /// Queue a message that newer droppable messages may evict
    pub fn enqueue_droppable(&self, message: Message) {
        if self.is_killed() {
            log::debug!("Dropping droppable message for killed session");
            return;
        }
        self.queue.enqueue_droppable(message);
    }

    /// Terminate the session. Safe to call from any thread, any number of
    /// times, concurrently; only the first call has any effect.
    pub fn kill(&self) {
        if self
            .killed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        log::info!("Session with {} terminating", self.peer);
        let _ = self.stream.shutdown(Shutdown::Both);
        self.queue.close();

        let callback = lock_ignore_poison(&self.on_terminated).take();
        if let Some(notify) = callback {
            notify();
        }
    }

    /// Whether the session has reached the terminal Killed state
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Block until both loops have fully exited.
    ///
    /// For orderly teardown before the caller reuses resources. Must be called
    /// from a supervisor thread, never from a message handler (the inbound
    /// thread cannot join itself).
    pub fn await_termination(&self) {
        for slot in [&self.inbound, &self.outbound] {
            let handle = lock_ignore_poison(slot).take();
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    log::error!("Session thread panicked during shutdown");
                }
            }
        }
    }

    /// Peer address, for logging
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

fn lock_ignore_poison<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Inbound loop: frame, decode, dispatch until the stream dies.
fn run_inbound(stream: TcpStream, dispatcher: &Dispatcher, session: &Session) -> Result<()> {
    let mut input = BufReader::new(stream);
    let mut framer = FrameReader::new();

    while !session.is_killed() {
        let (tag, payload) = framer.read_frame(&mut input)?;
        match Message::decode_payload(tag, payload) {
            Ok(message) => dispatcher.dispatch(message),
            Err(Error::UnknownTag(tag)) => {
                log::warn!("Ignoring frame with unrecognized tag {:#04x}", tag);
            }
            Err(e) => log::warn!("Discarding undecodable frame: {}", e),
        }
    }
    Ok(())
}

/// Outbound loop: drain the queue batch-by-batch until it closes or a write
/// fails. Strict before droppable within each batch.
fn run_outbound(stream: TcpStream, session: &Session) -> Result<()> {
    let mut output = BufWriter::new(stream);

    while let Some((strict, droppable)) = session.queue.next_batch() {
        if let Some(message) = strict {
            write_frame(&mut output, &message)?;
        }
        if let Some(message) = droppable {
            write_frame(&mut output, &message)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{MotorState, TAG_MOTOR_STATE};
    use std::net::TcpListener;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            read_timeout: Duration::from_secs(30),
            droppable_queue_limit: 10,
        }
    }

    #[test]
    fn test_message_crosses_the_link() {
        let (client_stream, server_stream) = loopback_pair();

        let (tx, rx) = mpsc::channel();
        let server_dispatcher = Arc::new(Dispatcher::new().on(TAG_MOTOR_STATE, move |message| {
            tx.send(message).unwrap();
        }));

        let server =
            Session::start(server_stream, server_dispatcher, &test_config(), None).unwrap();
        let client = Session::start(
            client_stream,
            Arc::new(Dispatcher::new()),
            &test_config(),
            None,
        )
        .unwrap();

        let message = Message::Motor(MotorState {
            timestamp_ms: 1,
            left_forward: 200,
            left_backward: 0,
            right_forward: 200,
            right_backward: 0,
        });
        client.enqueue_strict(message.clone());

        let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(received, message);

        client.kill();
        server.kill();
        client.await_termination();
        server.await_termination();
    }

    #[test]
    fn test_peer_disconnect_terminates_session() {
        let (client_stream, server_stream) = loopback_pair();

        let (tx, rx) = mpsc::channel();
        let server = Session::start(
            server_stream,
            Arc::new(Dispatcher::new()),
            &test_config(),
            Some(Box::new(move || tx.send(()).unwrap())),
        )
        .unwrap();

        // Closing the peer's socket must end the server session on its own
        drop(client_stream);

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        server.await_termination();
        assert!(server.is_killed());
    }

    #[test]
    fn test_kill_notifies_exactly_once() {
        let (client_stream, server_stream) = loopback_pair();

        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notifications);
        let session = Session::start(
            server_stream,
            Arc::new(Dispatcher::new()),
            &test_config(),
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();

        // External kills from several threads race with the loop-failure kills
        // triggered by the socket shutdown itself
        let mut killers = Vec::new();
        for _ in 0..4 {
            let session = Arc::clone(&session);
            killers.push(thread::spawn(move || session.kill()));
        }
        for killer in killers {
            killer.join().unwrap();
        }

        session.await_termination();
        drop(client_stream);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_enqueue_after_kill_is_dropped() {
        let (_client_stream, server_stream) = loopback_pair();
        let session = Session::start(
            server_stream,
            Arc::new(Dispatcher::new()),
            &test_config(),
            None,
        )
        .unwrap();

        session.kill();
        session.enqueue_strict(Message::Motor(MotorState {
            timestamp_ms: 0,
            left_forward: 0,
            left_backward: 0,
            right_forward: 0,
            right_backward: 0,
        }));
        session.await_termination();
    }
}

//! Robot-role peer manager: accept one operator at a time.
//!
//! The acceptor thread serves exactly one peer per iteration: accept, build a
//! fresh session, immediately send the settings snapshot so the operator's
//! perceived copy starts synchronized to ground truth, then block until that
//! session terminates before accepting the next connection. There is no
//! fan-out - a second operator connecting while one is active waits in the
//! listen backlog.
//!
//! A failure of the listening socket itself (as opposed to a per-connection
//! failure) is terminal: the server sets its killed flag and stops rather than
//! retrying silently.

use crate::config::LinkConfig;
use crate::error::Result;
use crate::protocol::messages::{Message, SettingsUpdate, TAG_SETTINGS};
use crate::protocol::timestamp_ms;
use crate::session::dispatcher::Dispatcher;
use crate::session::duplex::{Session, SessionConfig};
use crate::settings::SharedSettings;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Poll interval for the non-blocking accept loop; keeps the kill flag
/// responsive without busy-waiting
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Lifecycle callbacks for the robot role
#[derive(Default)]
pub struct ServerEvents {
    pub on_client_connected: Option<Box<dyn Fn(SocketAddr) + Send + Sync>>,
    pub on_client_disconnected: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// Server-role peer manager
pub struct LinkServer {
    settings: Arc<SharedSettings>,
    session: Arc<Mutex<Option<Arc<Session>>>>,
    client_connected: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
    local_addr: SocketAddr,
}

impl LinkServer {
    /// Bind the listener and start the acceptor thread.
    ///
    /// The dispatcher is augmented so every received settings copy is applied
    /// to `settings` (ground truth) before the embedder's own handler runs.
    /// Binding failure is a hard error - there is no server without a port.
    pub fn start(
        config: &LinkConfig,
        mut dispatcher: Dispatcher,
        settings: Arc<SharedSettings>,
        events: ServerEvents,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&config.network.bind_address)?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        // The robot is the sole writer of settings ground truth; applying the
        // received copy here guarantees it happens before any handler and on
        // every connection, not just the ones the embedder wires up.
        let ground_truth = Arc::clone(&settings);
        dispatcher.intercept(TAG_SETTINGS, move |message| {
            if let Message::Settings(update) = message {
                ground_truth.apply(&update.settings);
                log::info!("Applied settings update: {:?}", update.settings);
            }
        });
        let dispatcher = Arc::new(dispatcher);

        let session_slot: Arc<Mutex<Option<Arc<Session>>>> = Arc::new(Mutex::new(None));
        let client_connected = Arc::new(AtomicBool::new(false));
        let killed = Arc::new(AtomicBool::new(false));

        let acceptor_settings = Arc::clone(&settings);
        let acceptor_slot = Arc::clone(&session_slot);
        let acceptor_connected = Arc::clone(&client_connected);
        let acceptor_killed = Arc::clone(&killed);
        let session_config = SessionConfig::from(config);
        let acceptor = thread::Builder::new()
            .name("link-acceptor".to_string())
            .spawn(move || {
                acceptor_loop(
                    listener,
                    dispatcher,
                    session_config,
                    acceptor_settings,
                    events,
                    acceptor_slot,
                    acceptor_connected,
                    acceptor_killed,
                );
            })
            .map_err(crate::error::Error::Io)?;

        log::info!("Link server listening on {}", local_addr);

        Ok(Self {
            settings,
            session: session_slot,
            client_connected,
            killed,
            acceptor: Mutex::new(Some(acceptor)),
            local_addr,
        })
    }

    /// Address the listener actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Server-authoritative settings ground truth
    pub fn settings(&self) -> Arc<SharedSettings> {
        Arc::clone(&self.settings)
    }

    /// Whether an operator session is currently active
    pub fn is_client_connected(&self) -> bool {
        self.client_connected.load(Ordering::Relaxed)
    }

    /// Whether the server has reached its terminal state
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Relaxed)
    }

    /// Currently live session, if any
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Forward to the live session's strict lane; dropped with no peer
    pub fn enqueue_strict(&self, message: Message) {
        match self.session() {
            Some(session) => session.enqueue_strict(message),
            None => log::debug!("No connected operator, dropping strict message"),
        }
    }

    /// Forward to the live session's droppable lane; dropped with no peer
    pub fn enqueue_droppable(&self, message: Message) {
        match self.session() {
            Some(session) => session.enqueue_droppable(message),
            None => log::debug!("No connected operator, dropping droppable message"),
        }
    }

    /// Broadcast the current settings ground truth to the connected operator.
    ///
    /// Call after a local (robot-side) settings change so the operator's
    /// perceived copy follows.
    pub fn publish_settings(&self) {
        self.enqueue_strict(Message::Settings(SettingsUpdate {
            timestamp_ms: timestamp_ms(),
            settings: self.settings.snapshot(),
        }));
    }

    /// Tear the server down: stop accepting and kill any live session
    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
        if let Some(session) = self.session() {
            session.kill();
        }
    }

    /// Block until the acceptor thread has exited (call after [`kill`])
    ///
    /// [`kill`]: LinkServer::kill
    pub fn await_termination(&self) {
        let handle = self
            .acceptor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Acceptor thread panicked");
            }
        }
    }
}

impl Drop for LinkServer {
    fn drop(&mut self) {
        self.kill();
    }
}

#[allow(clippy::too_many_arguments)]
fn acceptor_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    session_config: SessionConfig,
    settings: Arc<SharedSettings>,
    events: ServerEvents,
    slot: Arc<Mutex<Option<Arc<Session>>>>,
    client_connected: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
) {
    while !killed.load(Ordering::Relaxed) {
        client_connected.store(false, Ordering::Relaxed);

        let (stream, addr) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(e) => {
                // The listening socket itself failed; this is not a
                // per-connection condition, so the whole server goes down
                log::error!("Listener failed: {}", e);
                killed.store(true, Ordering::SeqCst);
                break;
            }
        };

        log::info!("Operator connected from {}", addr);
        if let Err(e) = stream.set_nonblocking(false) {
            log::error!("Failed to restore blocking mode for {}: {}", addr, e);
            continue;
        }

        let on_terminated: Option<super::duplex::TerminationCallback> = events
            .on_client_disconnected
            .clone()
            .map(|notify| Box::new(move || notify()) as super::duplex::TerminationCallback);

        let session = match Session::start(
            stream,
            Arc::clone(&dispatcher),
            &session_config,
            on_terminated,
        ) {
            Ok(session) => session,
            Err(e) => {
                log::error!("Failed to start session for {}: {}", addr, e);
                continue;
            }
        };

        *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&session));
        client_connected.store(true, Ordering::Relaxed);
        if let Some(ref connected) = events.on_client_connected {
            connected(addr);
        }

        // The new operator starts from our ground truth, not its stale
        // perceived copy
        session.enqueue_strict(Message::Settings(SettingsUpdate {
            timestamp_ms: timestamp_ms(),
            settings: settings.snapshot(),
        }));

        // One peer at a time: wait out this session before accepting again
        session.await_termination();
        *slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
        log::info!("Operator session with {} ended", addr);
    }

    // Make sure a live session does not outlive the server
    let session = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    if let Some(session) = session {
        session.kill();
        session.await_termination();
    }
    client_connected.store(false, Ordering::Relaxed);

    log::info!("Acceptor thread exiting");
}

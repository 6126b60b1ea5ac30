//! Operator-role peer manager: connect, run, back off, retry.
//!
//! One supervisory connector thread owns the whole client lifecycle: it
//! establishes a session, waits for that session to terminate, then sleeps the
//! reconnect backoff and tries again. Only one connection attempt is ever in
//! flight. Connection loss is a transient condition here, never fatal to the
//! hosting process - the operator console just shows "reconnecting".

use crate::config::LinkConfig;
use crate::error::Result;
use crate::protocol::messages::Message;
use crate::session::dispatcher::Dispatcher;
use crate::session::duplex::{Session, SessionConfig};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lifecycle callbacks for the operator role.
///
/// `on_disconnected` is wired through the session's one-shot termination
/// notification, so it fires exactly once per established session.
#[derive(Default)]
pub struct ClientEvents {
    pub on_connected: Option<Box<dyn Fn(&Arc<Session>) + Send + Sync>>,
    pub on_disconnected: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// Granularity of the backoff sleep, so shutdown is observed promptly
const BACKOFF_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Client-role peer manager
pub struct LinkClient {
    session: Arc<Mutex<Option<Arc<Session>>>>,
    shutdown: Arc<AtomicBool>,
    connector: Mutex<Option<JoinHandle<()>>>,
}

impl LinkClient {
    /// Start connecting to the robot described by `config`.
    ///
    /// Returns immediately; the connector thread keeps retrying until
    /// [`LinkClient::kill`] is called.
    pub fn connect(config: LinkConfig, dispatcher: Dispatcher, events: ClientEvents) -> Self {
        let session_slot: Arc<Mutex<Option<Arc<Session>>>> = Arc::new(Mutex::new(None));
        let shutdown = Arc::new(AtomicBool::new(false));

        let slot = Arc::clone(&session_slot);
        let running = Arc::clone(&shutdown);
        let dispatcher = Arc::new(dispatcher);
        let connector = thread::Builder::new()
            .name("link-connector".to_string())
            .spawn(move || connector_loop(&config, &dispatcher, &events, &slot, &running));

        let connector = match connector {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Failed to spawn connector thread: {}", e);
                None
            }
        };

        Self {
            session: session_slot,
            shutdown,
            connector: Mutex::new(connector),
        }
    }

    /// Currently live session, if any
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Forward to the live session's strict lane; dropped while disconnected
    pub fn enqueue_strict(&self, message: Message) {
        match self.session() {
            Some(session) => session.enqueue_strict(message),
            None => log::debug!("No live session, dropping strict message"),
        }
    }

    /// Forward to the live session's droppable lane; dropped while disconnected
    pub fn enqueue_droppable(&self, message: Message) {
        match self.session() {
            Some(session) => session.enqueue_droppable(message),
            None => log::debug!("No live session, dropping droppable message"),
        }
    }

    /// Stop reconnecting and kill any live session
    pub fn kill(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(session) = self.session() {
            session.kill();
        }
    }

    /// Block until the connector thread has exited (call after [`kill`])
    ///
    /// [`kill`]: LinkClient::kill
    pub fn await_termination(&self) {
        let handle = self
            .connector
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Connector thread panicked");
            }
        }
    }
}

impl Drop for LinkClient {
    fn drop(&mut self) {
        self.kill();
    }
}

fn connector_loop(
    config: &LinkConfig,
    dispatcher: &Arc<Dispatcher>,
    events: &ClientEvents,
    slot: &Arc<Mutex<Option<Arc<Session>>>>,
    shutdown: &Arc<AtomicBool>,
) {
    let session_config = SessionConfig::from(config);
    let address = config.network.server_address.clone();

    log::info!("Connector started, target {}", address);

    while !shutdown.load(Ordering::Relaxed) {
        match establish(&address, config.connect_timeout()) {
            Ok(stream) => {
                let on_terminated: Option<super::duplex::TerminationCallback> =
                    events.on_disconnected.clone().map(|notify| {
                        Box::new(move || notify()) as super::duplex::TerminationCallback
                    });

                match Session::start(
                    stream,
                    Arc::clone(dispatcher),
                    &session_config,
                    on_terminated,
                ) {
                    Ok(session) => {
                        *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&session));
                        if let Some(ref connected) = events.on_connected {
                            connected(&session);
                        }

                        // Supervise: nothing else to do until this session dies
                        session.await_termination();
                        *slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
                    }
                    Err(e) => log::warn!("Failed to start session: {}", e),
                }
            }
            Err(e) => log::warn!("Connection to {} failed: {}", address, e),
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        log::info!(
            "Retrying in {} second(s)",
            config.network.reconnect_backoff_secs
        );
        sleep_observing_shutdown(config.reconnect_backoff(), shutdown);
    }

    log::info!("Connector thread exiting");
}

/// Resolve and connect with a timeout, trying each resolved address in turn
fn establish(address: &str, timeout: Duration) -> Result<TcpStream> {
    let mut last_error = None;
    for addr in address.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error
        .map(crate::error::Error::Io)
        .unwrap_or_else(|| crate::error::Error::Other(format!("{} resolved to no addresses", address))))
}

/// Sleep in short slices so a shutdown request cuts the backoff short
fn sleep_observing_shutdown(total: Duration, shutdown: &AtomicBool) {
    let mut remaining = total;
    while !remaining.is_zero() && !shutdown.load(Ordering::Relaxed) {
        let slice = remaining.min(BACKOFF_POLL_INTERVAL);
        thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}

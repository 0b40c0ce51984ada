//! Connection monitor
//!
//! Owns at most one stream session at a time and is the sole authority
//! on whether the agent is connected: components query the monitor,
//! never a session directly. Reconnects under circuit-breaker control
//! with jittered backoff; a replaced session pointer is swapped
//! atomically under a short-held mutex.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::dispatch::CommandRegistry;
use crate::retry::{Backoff, CircuitBreaker};

use super::session::StreamSession;
use super::ControllerClient;

/// How long the loop parks while the circuit is open
const OPEN_CIRCUIT_WAIT: Duration = Duration::from_secs(60);

type HandlerSetup = Box<dyn FnOnce(&CommandRegistry) + Send>;

/// Reconnecting owner of the control stream
pub struct ConnectionMonitor {
    client: Arc<dyn ControllerClient>,
    registry: Arc<CommandRegistry>,
    breaker: CircuitBreaker,
    session: Mutex<Option<Arc<StreamSession>>>,
    handler_setup: Mutex<Option<HandlerSetup>>,
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMonitor")
            .field("connected", &self.is_connected())
            .field("breaker", &self.breaker.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionMonitor {
    /// Create a monitor with the default breaker
    pub fn new(client: Arc<dyn ControllerClient>, registry: Arc<CommandRegistry>) -> Self {
        Self::with_breaker(client, registry, CircuitBreaker::default())
    }

    /// Create a monitor with an explicit breaker
    pub fn with_breaker(
        client: Arc<dyn ControllerClient>,
        registry: Arc<CommandRegistry>,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            client,
            registry,
            breaker,
            session: Mutex::new(None),
            handler_setup: Mutex::new(None),
        }
    }

    /// Install the one-shot handler-registration entry point
    ///
    /// The monitor invokes it once, before the first dial, so the
    /// dispatch table is complete before any stream opens.
    pub fn set_handler_setup<F>(&self, setup: F)
    where
        F: FnOnce(&CommandRegistry) + Send + 'static,
    {
        *self.handler_setup.lock().unwrap() = Some(Box::new(setup));
    }

    /// The current session, if any
    ///
    /// Short critical section: callers copy the pointer and operate on
    /// the session without holding the lock.
    pub fn current_session(&self) -> Option<Arc<StreamSession>> {
        self.session.lock().unwrap().clone()
    }

    /// Whether the agent currently holds a live stream
    pub fn is_connected(&self) -> bool {
        self.current_session()
            .map(|s| s.is_active())
            .unwrap_or(false)
    }

    /// The circuit breaker guarding connection attempts
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Main loop: dial, own the session, reconnect on closure
    ///
    /// Runs until the shutdown broadcast fires. A stream that opened
    /// counts as a breaker success: opening requires a completed
    /// exchange with the controller.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if let Some(setup) = self.handler_setup.lock().unwrap().take() {
            setup(&self.registry);
            tracing::debug!(
                handlers = self.registry.len(),
                "command handlers registered"
            );
        }

        let mut backoff = Backoff::default();

        loop {
            if !self.breaker.allow() {
                tracing::debug!(
                    wait = ?OPEN_CIRCUIT_WAIT,
                    "circuit open, not dialing"
                );
                if sleep_or_shutdown(OPEN_CIRCUIT_WAIT, &mut shutdown).await {
                    break;
                }
                continue;
            }

            let pair = match self.client.open_stream().await {
                Ok(pair) => pair,
                Err(e) => {
                    self.breaker.record_failure();
                    let delay = backoff.next();
                    tracing::warn!(
                        error = %e,
                        attempt = backoff.attempts(),
                        delay = ?delay,
                        "control stream connect failed"
                    );
                    if sleep_or_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            self.breaker.record_success();
            backoff.reset();

            let session = StreamSession::open(pair, self.registry.clone());
            tracing::info!(session_id = %session.id(), "connected to controller");
            *self.session.lock().unwrap() = Some(session.clone());

            let interrupted = tokio::select! {
                _ = session.closed() => false,
                _ = shutdown.recv() => true,
            };

            session.shutdown().await;
            *self.session.lock().unwrap() = None;

            if interrupted {
                break;
            }

            tracing::info!(session_id = %session.id(), "session closed, will reconnect");
            let grace = backoff.base() * 2;
            if sleep_or_shutdown(grace, &mut shutdown).await {
                break;
            }
        }

        tracing::info!("connection monitor stopped");
    }
}

/// Sleep, returning `true` if shutdown fired first
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.recv() => true,
    }
}

//! Connection monitor reconnect and circuit-breaker behavior
//!
//! Uses a scripted controller client and a paused tokio clock, so the
//! backoff and breaker windows elapse virtually.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use rodent_core::dispatch::CommandRegistry;
use rodent_core::events::wire::EventBatch;
use rodent_core::retry::{CircuitBreaker, CircuitState};
use rodent_core::transport::{
    ConnectionMonitor, ControllerClient, Envelope, EventBatchAck, FrameSink, FrameSource,
    RegistrationOutcome, RegistrationRequest, StreamPair,
};
use rodent_core::{Error, Result};

struct ChannelSink {
    tx: mpsc::Sender<Envelope>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: Envelope) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| Error::Unavailable("stream dropped".into()))
    }
}

struct ChannelSource {
    rx: mpsc::Receiver<Envelope>,
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<Envelope>> {
        Ok(self.rx.recv().await)
    }
}

/// Controller ends of streams handed to the monitor; dropping an entry
/// closes that stream under the agent
type ControllerEnds = (mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>);

/// Scripted client: fails the first `fail_first` dials, then hands out
/// in-memory streams
#[derive(Debug)]
struct ScriptedClient {
    fail_first: u32,
    calls: AtomicU32,
    live_streams: Mutex<Vec<ControllerEnds>>,
}

impl ScriptedClient {
    fn new(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            fail_first,
            calls: AtomicU32::new(0),
            live_streams: Mutex::new(Vec::new()),
        })
    }

    fn dials(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Drop the controller end of every live stream
    fn drop_streams(&self) {
        self.live_streams.lock().unwrap().clear();
    }
}

#[async_trait]
impl ControllerClient for ScriptedClient {
    async fn register(&self, _request: RegistrationRequest) -> Result<RegistrationOutcome> {
        Ok(RegistrationOutcome::AlreadyRegistered)
    }

    async fn open_stream(&self) -> Result<StreamPair> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(Error::Unavailable("controller unreachable".into()));
        }

        let (to_agent, agent_rx) = mpsc::channel(32);
        let (agent_tx, from_agent) = mpsc::channel(32);
        self.live_streams
            .lock()
            .unwrap()
            .push((to_agent, from_agent));

        Ok(StreamPair {
            sink: Box::new(ChannelSink { tx: agent_tx }),
            source: Box::new(ChannelSource { rx: agent_rx }),
        })
    }

    async fn publish_events(&self, _batch: EventBatch) -> Result<EventBatchAck> {
        Ok(EventBatchAck {
            accepted: true,
            message: String::new(),
        })
    }
}

/// Poll a condition while the paused clock auto-advances
async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..5_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("condition not reached in time");
}

fn spawn_monitor(
    client: Arc<ScriptedClient>,
    breaker: CircuitBreaker,
) -> (Arc<ConnectionMonitor>, broadcast::Sender<()>) {
    let registry = Arc::new(CommandRegistry::new());
    let monitor = Arc::new(ConnectionMonitor::with_breaker(client, registry, breaker));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(monitor.clone().run(shutdown_rx));
    (monitor, shutdown_tx)
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_mid_stream_failure() {
    let client = ScriptedClient::new(0);
    let (monitor, shutdown) = spawn_monitor(client.clone(), CircuitBreaker::default());

    wait_until(|| monitor.is_connected()).await;
    assert_eq!(client.dials(), 1);
    let first_id = monitor.current_session().unwrap().id().to_string();

    // Controller drops the stream mid-flight
    client.drop_streams();

    wait_until(|| client.dials() >= 2 && monitor.is_connected()).await;
    let second_id = monitor.current_session().unwrap().id().to_string();
    assert_ne!(first_id, second_id, "reconnect must create a new session");
    assert_eq!(monitor.breaker().state(), CircuitState::Closed);

    let _ = shutdown.send(());
}

#[tokio::test(start_paused = true)]
async fn circuit_opens_after_five_consecutive_failures() {
    let client = ScriptedClient::new(u32::MAX);
    let breaker = CircuitBreaker::with_timeout(5, Duration::from_secs(600));
    let (monitor, shutdown) = spawn_monitor(client.clone(), breaker);

    wait_until(|| monitor.breaker().state() == CircuitState::Open).await;
    assert_eq!(client.dials(), 5);

    // While open, the monitor parks instead of dialing
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(client.dials(), 5, "no dial may happen while the circuit is open");

    // After the reset timeout one probe goes out and fails, re-opening
    wait_until(|| client.dials() >= 6).await;
    assert_eq!(monitor.breaker().state(), CircuitState::Open);

    let _ = shutdown.send(());
}

#[tokio::test(start_paused = true)]
async fn half_open_probe_success_closes_the_circuit() {
    let client = ScriptedClient::new(2);
    let breaker = CircuitBreaker::with_timeout(2, Duration::from_secs(100));
    let (monitor, shutdown) = spawn_monitor(client.clone(), breaker);

    wait_until(|| monitor.breaker().state() == CircuitState::Open).await;
    assert_eq!(client.dials(), 2);

    // The probe after the reset window succeeds and the circuit closes
    wait_until(|| monitor.is_connected()).await;
    assert_eq!(client.dials(), 3);
    assert_eq!(monitor.breaker().state(), CircuitState::Closed);

    let _ = shutdown.send(());
}

#[tokio::test(start_paused = true)]
async fn shutdown_retracts_the_session() {
    let client = ScriptedClient::new(0);
    let (monitor, shutdown) = spawn_monitor(client.clone(), CircuitBreaker::default());

    wait_until(|| monitor.is_connected()).await;

    let _ = shutdown.send(());
    wait_until(|| monitor.current_session().is_none()).await;
    assert!(!monitor.is_connected());
}

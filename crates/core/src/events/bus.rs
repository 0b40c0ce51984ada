//! Event bus: typed emission, filtering, batching
//!
//! Domain code calls the typed emitters unconditionally; emission is
//! best-effort and never blocks or fails the caller. Passing events
//! flow through a bounded channel into the buffer, from which two
//! background tasks drive delivery: the event processor sends a batch
//! opportunistically once `batch_size` events are buffered, and the
//! batch sender forces one on every `batch_timeout` tick. Batches that
//! cannot be delivered stay in the buffer; shutdown drains what it can
//! and spills the rest.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::config::EventPipelineSettings;

use super::buffer::EventBuffer;
use super::sender::EventSender;
use super::types::{
    AccessEvent, AccessOperation, Category, DatasetOperation, Event, EventPayload, IdentityEvent,
    IdentityOperation, Level, NetworkEvent, NetworkOperation, PoolOperation, SecurityEvent,
    SecurityOperation, ServiceEvent, ServiceOperation, SharingEvent, SharingOperation,
    SnapshotOperation, StorageEvent, SystemEvent, SystemOperation, TransferEvent,
    TransferOperation,
};

/// Level/category filter applied before an event enters the pipeline
#[derive(Debug, Clone)]
pub struct EventFilter {
    enabled_levels: HashSet<Level>,
    enabled_categories: HashSet<Category>,
}

impl EventFilter {
    /// Build a filter passing the given levels and every category
    pub fn for_levels(levels: HashSet<Level>) -> Self {
        Self {
            enabled_levels: levels,
            enabled_categories: Category::ALL.into(),
        }
    }

    /// Restrict the passing categories
    pub fn with_categories(mut self, categories: HashSet<Category>) -> Self {
        self.enabled_categories = categories;
        self
    }

    /// Whether an event passes
    pub fn passes(&self, event: &Event) -> bool {
        self.enabled_levels.contains(&event.level)
            && self.enabled_categories.contains(&event.category)
    }
}

/// The event bus
///
/// Cheap to clone the handle via `Arc`; one instance owns the
/// background tasks for the life of the process.
pub struct EventBus {
    tx: mpsc::Sender<Event>,
    buffer: Arc<EventBuffer>,
    filter: EventFilter,
    batch_size: usize,
    sender: Arc<EventSender>,
    /// Serializes batch sends between the processor and the ticker
    send_gate: AsyncMutex<()>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffered", &self.buffer.len())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Start the pipeline: buffer, filter, and both background tasks
    pub fn start(
        settings: &EventPipelineSettings,
        spill_dir: impl Into<PathBuf>,
        sender: Arc<EventSender>,
    ) -> Arc<Self> {
        let buffer = Arc::new(EventBuffer::new(
            settings.capacity,
            settings.high_water,
            spill_dir,
        ));
        let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);

        let bus = Arc::new(Self {
            tx,
            buffer,
            filter: EventFilter::for_levels(settings.enabled_levels.clone()),
            batch_size: settings.batch_size.max(1),
            sender,
            send_gate: AsyncMutex::new(()),
            shutdown_tx,
            tasks: std::sync::Mutex::new(Vec::new()),
        });

        let processor = tokio::spawn(Self::run_processor(
            bus.clone(),
            rx,
            bus.shutdown_tx.subscribe(),
        ));
        let ticker = tokio::spawn(Self::run_ticker(
            bus.clone(),
            settings.batch_timeout,
            bus.shutdown_tx.subscribe(),
        ));
        bus.tasks.lock().unwrap().extend([processor, ticker]);

        bus
    }

    /// Emit an event into the pipeline
    ///
    /// Filtered events are dropped silently; a full channel drops the
    /// event with a debug log; a stopped pipeline is a no-op. The
    /// caller never blocks and never sees an error.
    pub fn emit(&self, event: Event) {
        if !self.filter.passes(&event) {
            return;
        }
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::debug!(
                    category = %event.category,
                    source = %event.source,
                    "event channel full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("event pipeline stopped, dropping event");
            }
        }
    }

    /// Current buffer occupancy
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Event-processor task: moves events from the channel into the
    /// buffer and triggers an opportunistic send at `batch_size`
    async fn run_processor(
        bus: Arc<Self>,
        mut rx: mpsc::Receiver<Event>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                maybe = rx.recv() => match maybe {
                    Some(event) => {
                        bus.buffer.add(event);
                        if bus.buffer.len() >= bus.batch_size {
                            bus.try_send_batch().await;
                        }
                    }
                    None => break,
                },
            }
        }
        tracing::debug!("event processor stopped");
    }

    /// Batch-sender task: forces a send on every tick even when the
    /// buffer is under `batch_size`
    async fn run_ticker(
        bus: Arc<Self>,
        batch_timeout: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut interval = tokio::time::interval(batch_timeout);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = interval.tick() => bus.try_send_batch().await,
            }
        }
        tracing::debug!("event batch ticker stopped");
    }

    /// Send one batch if any events are buffered
    ///
    /// On delivery the events are discarded; on failure they remain for
    /// the next flush.
    async fn try_send_batch(&self) {
        let _gate = self.send_gate.lock().await;

        let batch = self.buffer.peek_batch(self.batch_size);
        if batch.is_empty() {
            return;
        }

        match self.sender.send_batch(&batch).await {
            Ok(()) => self.buffer.discard(batch.len()),
            Err(e) => {
                tracing::debug!(
                    events = batch.len(),
                    buffered = self.buffer.len(),
                    error = %e,
                    "batch undelivered, retaining in buffer"
                );
            }
        }
    }

    /// Drain the pipeline for shutdown
    ///
    /// Sends batches until the buffer is empty; at the first delivery
    /// failure the remainder is spilled to disk.
    pub async fn drain(&self) {
        let _gate = self.send_gate.lock().await;

        loop {
            let batch = self.buffer.peek_batch(self.batch_size);
            if batch.is_empty() {
                return;
            }
            match self.sender.send_batch(&batch).await {
                Ok(()) => self.buffer.discard(batch.len()),
                Err(e) => {
                    tracing::warn!(
                        remaining = self.buffer.len(),
                        error = %e,
                        "drain could not deliver, spilling remainder"
                    );
                    if let Err(e) = self.buffer.spill_now() {
                        tracing::error!(error = %e, "spill during drain failed");
                    }
                    return;
                }
            }
        }
    }

    /// Stop the background tasks and drain the buffer
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            let _ = task.await;
        }
        self.drain().await;
    }

    // ------------------------------------------------------------------
    // Typed emitters. One per category sub-variant; each constructs a
    // fully-populated event and funnels it through emit().
    // ------------------------------------------------------------------

    /// Process-level event
    pub fn system(&self, level: Level, operation: SystemOperation, message: impl Into<String>) {
        self.emit(Event::new(
            level,
            "agent",
            EventPayload::System(SystemEvent {
                operation,
                message: message.into(),
            }),
        ));
    }

    /// Pool lifecycle event
    pub fn pool(
        &self,
        level: Level,
        name: impl Into<String>,
        operation: PoolOperation,
        detail: impl Into<String>,
    ) {
        self.emit(Event::new(
            level,
            "zfs",
            EventPayload::Storage(StorageEvent::Pool {
                name: name.into(),
                operation,
                detail: detail.into(),
            }),
        ));
    }

    /// Dataset lifecycle event
    pub fn dataset(
        &self,
        level: Level,
        name: impl Into<String>,
        operation: DatasetOperation,
        detail: impl Into<String>,
    ) {
        self.emit(Event::new(
            level,
            "zfs",
            EventPayload::Storage(StorageEvent::Dataset {
                name: name.into(),
                operation,
                detail: detail.into(),
            }),
        ));
    }

    /// Snapshot lifecycle event
    pub fn snapshot(
        &self,
        level: Level,
        dataset: impl Into<String>,
        name: impl Into<String>,
        operation: SnapshotOperation,
    ) {
        self.emit(Event::new(
            level,
            "zfs",
            EventPayload::Storage(StorageEvent::Snapshot {
                dataset: dataset.into(),
                name: name.into(),
                operation,
            }),
        ));
    }

    /// Replication transfer event
    pub fn transfer(
        &self,
        level: Level,
        transfer_id: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
        operation: TransferOperation,
        bytes: u64,
    ) {
        self.emit(Event::new(
            level,
            "transfer",
            EventPayload::Transfer(TransferEvent {
                transfer_id: transfer_id.into(),
                source: source.into(),
                destination: destination.into(),
                operation,
                bytes,
            }),
        ));
    }

    /// Network state event
    pub fn network(
        &self,
        level: Level,
        interface: impl Into<String>,
        operation: NetworkOperation,
        detail: impl Into<String>,
    ) {
        self.emit(Event::new(
            level,
            "network",
            EventPayload::Network(NetworkEvent {
                interface: interface.into(),
                operation,
                detail: detail.into(),
            }),
        ));
    }

    /// Security event
    pub fn security(
        &self,
        level: Level,
        principal: impl Into<String>,
        operation: SecurityOperation,
        detail: impl Into<String>,
    ) {
        self.emit(Event::new(
            level,
            "security",
            EventPayload::Security(SecurityEvent {
                principal: principal.into(),
                operation,
                detail: detail.into(),
            }),
        ));
    }

    /// Managed-service event
    pub fn service(
        &self,
        level: Level,
        service: impl Into<String>,
        operation: ServiceOperation,
        message: impl Into<String>,
    ) {
        self.emit(Event::new(
            level,
            "service",
            EventPayload::Service(ServiceEvent {
                service: service.into(),
                operation,
                message: message.into(),
            }),
        ));
    }

    /// Identity event
    pub fn identity(
        &self,
        level: Level,
        principal: impl Into<String>,
        operation: IdentityOperation,
        detail: impl Into<String>,
    ) {
        self.emit(Event::new(
            level,
            "identity",
            EventPayload::Identity(IdentityEvent {
                principal: principal.into(),
                operation,
                detail: detail.into(),
            }),
        ));
    }

    /// Access-control event
    pub fn access(
        &self,
        level: Level,
        subject: impl Into<String>,
        principal: impl Into<String>,
        operation: AccessOperation,
    ) {
        self.emit(Event::new(
            level,
            "access",
            EventPayload::Access(AccessEvent {
                subject: subject.into(),
                principal: principal.into(),
                operation,
            }),
        ));
    }

    /// Share event
    pub fn share(
        &self,
        level: Level,
        share: impl Into<String>,
        protocol: impl Into<String>,
        operation: SharingOperation,
    ) {
        self.emit(Event::new(
            level,
            "sharing",
            EventPayload::Sharing(SharingEvent {
                share: share.into(),
                protocol: protocol.into(),
                operation,
            }),
        ));
    }
}

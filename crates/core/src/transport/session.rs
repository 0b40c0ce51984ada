//! One live control stream session
//!
//! A session owns an open bidirectional stream and three loops:
//!
//! 1. **Send loop** - drains the outbound queue, stamps the session id,
//!    writes to the stream; a write failure terminates the session.
//! 2. **Receive loop** - reads frames into the bounded inbound queue,
//!    dropping with a log when it is full; read failure or a clean
//!    close by the controller terminates the session.
//! 3. **Dispatch loop** - consumes the inbound queue and spawns one
//!    short-lived task per frame so a slow handler cannot starve
//!    dispatch of concurrent requests.
//!
//! Every inbound command yields exactly one response on the outbound
//! queue - on handler error, unregistered type, and handler panic
//! included - and the response always echoes the command's correlation
//! id.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::dispatch::{CommandContext, CommandRegistry};
use crate::{Error, Result};

use super::frame::{Acknowledgement, CommandResponse, Envelope, FramePayload};
use super::{FrameSink, FrameSource, StreamPair};

/// Capacity of the outbound and inbound frame queues
const QUEUE_CAPACITY: usize = 100;

/// Bounded wait for an outbound enqueue before it surfaces as a send
/// failure to the caller
const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// A single bidirectional stream instance
pub struct StreamSession {
    id: String,
    outbound_tx: mpsc::Sender<Envelope>,
    closed_rx: watch::Receiver<bool>,
    stop_tx: broadcast::Sender<()>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl StreamSession {
    /// Take ownership of an open stream and launch the three loops
    pub fn open(stream: StreamPair, registry: Arc<CommandRegistry>) -> Arc<Self> {
        let id = Uuid::new_v4().to_string();

        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (closed_tx, closed_rx) = watch::channel(false);
        let closed_tx = Arc::new(closed_tx);
        let (stop_tx, _) = broadcast::channel(1);

        let send_task = tokio::spawn(run_send_loop(
            id.clone(),
            stream.sink,
            outbound_rx,
            stop_tx.subscribe(),
            closed_tx.clone(),
        ));
        let recv_task = tokio::spawn(run_recv_loop(
            id.clone(),
            stream.source,
            inbound_tx,
            stop_tx.subscribe(),
            closed_tx.clone(),
        ));
        let dispatch_task = tokio::spawn(run_dispatch_loop(
            id.clone(),
            inbound_rx,
            registry,
            outbound_tx.clone(),
            stop_tx.subscribe(),
        ));

        let session = Arc::new(Self {
            id,
            outbound_tx,
            closed_rx,
            stop_tx,
            tasks: std::sync::Mutex::new(vec![send_task, recv_task, dispatch_task]),
        });

        tracing::info!(session_id = %session.id, "stream session opened");
        session
    }

    /// Unique session id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the stream is still live
    pub fn is_active(&self) -> bool {
        !*self.closed_rx.borrow()
    }

    /// Queue a frame for sending
    ///
    /// # Errors
    ///
    /// * `Error::QueueFull` - the outbound queue stayed full for the
    ///   bounded wait
    /// * `Error::Unavailable` - the session has terminated
    pub async fn enqueue(&self, frame: Envelope) -> Result<()> {
        match self.outbound_tx.send_timeout(frame, ENQUEUE_TIMEOUT).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => Err(Error::QueueFull(format!(
                "outbound queue full for {:?} on session {}",
                ENQUEUE_TIMEOUT, self.id
            ))),
            Err(mpsc::error::SendTimeoutError::Closed(_)) => Err(Error::Unavailable(format!(
                "session {} is closed",
                self.id
            ))),
        }
    }

    /// Wait until the session terminates (stream failure, controller
    /// close, or shutdown)
    pub async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Stop all loops and wait for them to exit
    pub async fn shutdown(&self) {
        let _ = self.stop_tx.send(());
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            let _ = task.await;
        }
        tracing::debug!(session_id = %self.id, "stream session shut down");
    }
}

/// Send loop: outbound queue -> stream
async fn run_send_loop(
    session_id: String,
    mut sink: Box<dyn FrameSink>,
    mut outbound_rx: mpsc::Receiver<Envelope>,
    mut stop: broadcast::Receiver<()>,
    closed_tx: Arc<watch::Sender<bool>>,
) {
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            maybe = outbound_rx.recv() => match maybe {
                Some(mut frame) => {
                    if frame.session_id.is_empty() {
                        frame.session_id = session_id.clone();
                    }
                    let kind = frame.kind();
                    if let Err(e) = sink.send(frame).await {
                        tracing::error!(
                            session_id = %session_id,
                            kind,
                            error = %e,
                            "stream write failed, terminating session"
                        );
                        break;
                    }
                }
                None => break,
            },
        }
    }
    let _ = closed_tx.send(true);
    tracing::debug!(session_id = %session_id, "send loop exited");
}

/// Receive loop: stream -> inbound queue
async fn run_recv_loop(
    session_id: String,
    mut source: Box<dyn FrameSource>,
    inbound_tx: mpsc::Sender<Envelope>,
    mut stop: broadcast::Receiver<()>,
    closed_tx: Arc<watch::Sender<bool>>,
) {
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            result = source.recv() => match result {
                Ok(Some(frame)) => {
                    match inbound_tx.try_send(frame) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(frame)) => {
                            tracing::warn!(
                                session_id = %session_id,
                                kind = frame.kind(),
                                "inbound queue full, dropping frame"
                            );
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
                Ok(None) => {
                    tracing::info!(session_id = %session_id, "controller closed the stream");
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %e,
                        "stream read failed, terminating session"
                    );
                    break;
                }
            },
        }
    }
    let _ = closed_tx.send(true);
    tracing::debug!(session_id = %session_id, "receive loop exited");
}

/// Dispatch loop: inbound queue -> one task per frame
async fn run_dispatch_loop(
    session_id: String,
    mut inbound_rx: mpsc::Receiver<Envelope>,
    registry: Arc<CommandRegistry>,
    outbound_tx: mpsc::Sender<Envelope>,
    mut stop: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = stop.recv() => break,
            maybe = inbound_rx.recv() => match maybe {
                Some(frame) => {
                    let registry = registry.clone();
                    let outbound_tx = outbound_tx.clone();
                    let session_id = session_id.clone();
                    tokio::spawn(async move {
                        handle_frame(frame, session_id, registry, outbound_tx).await;
                    });
                }
                None => break,
            },
        }
    }
    tracing::debug!(session_id = %session_id, "dispatch loop exited");
}

/// Handle one inbound frame
async fn handle_frame(
    frame: Envelope,
    session_id: String,
    registry: Arc<CommandRegistry>,
    outbound_tx: mpsc::Sender<Envelope>,
) {
    let kind = frame.kind();
    match frame.payload {
        FramePayload::Command(command) => {
            let correlation_id = command.correlation_id.clone();
            tracing::debug!(
                session_id = %session_id,
                correlation_id = %correlation_id,
                command_type = %command.command_type,
                "dispatching command"
            );

            let response = match registry.get(&command.command_type) {
                None => {
                    tracing::warn!(
                        session_id = %session_id,
                        command_type = %command.command_type,
                        "unsupported command"
                    );
                    CommandResponse::failure(
                        &command,
                        format!("unsupported command: {}", command.command_type),
                    )
                }
                Some(handler) => {
                    let ctx = CommandContext {
                        session_id: session_id.clone(),
                        received_at: Utc::now(),
                    };
                    // Run the handler in its own task so a panic is
                    // isolated into a join error instead of taking the
                    // dispatch task down without a response.
                    let outcome = tokio::spawn(handler(ctx, command.clone())).await;
                    match outcome {
                        Ok(Ok(reply)) => CommandResponse {
                            correlation_id: correlation_id.clone(),
                            success: true,
                            message: reply.message,
                            payload: reply.payload,
                        },
                        Ok(Err(e)) => {
                            tracing::warn!(
                                session_id = %session_id,
                                correlation_id = %correlation_id,
                                command_type = %command.command_type,
                                error = %e,
                                "command handler failed"
                            );
                            let structured =
                                serde_json::json!({ "error": e.to_string() }).to_string();
                            CommandResponse {
                                correlation_id: correlation_id.clone(),
                                success: false,
                                message: e.to_string(),
                                payload: structured.into_bytes(),
                            }
                        }
                        Err(join_err) => {
                            tracing::error!(
                                session_id = %session_id,
                                correlation_id = %correlation_id,
                                command_type = %command.command_type,
                                panicked = join_err.is_panic(),
                                "command handler aborted"
                            );
                            CommandResponse::failure(&command, "command handler panicked")
                        }
                    }
                }
            };

            send_outbound(
                &outbound_tx,
                &session_id,
                Envelope::new(FramePayload::Response(response)),
            )
            .await;
        }

        FramePayload::ConfigUpdate(update) => {
            // Applying the update belongs to the configuration-reload
            // machinery; the session only confirms receipt.
            tracing::info!(
                session_id = %session_id,
                correlation_id = %update.correlation_id,
                bytes = update.payload.len(),
                "configuration update received"
            );
            let ack = Acknowledgement {
                correlation_id: update.correlation_id,
                success: true,
                message: "configuration update received".to_string(),
            };
            send_outbound(
                &outbound_tx,
                &session_id,
                Envelope::new(FramePayload::Ack(ack)),
            )
            .await;
        }

        FramePayload::Ack(ack) => {
            // No per-request pending-ack state is kept today
            tracing::debug!(
                session_id = %session_id,
                correlation_id = %ack.correlation_id,
                success = ack.success,
                "acknowledgement received"
            );
        }

        FramePayload::Response(_) | FramePayload::Event(_) => {
            tracing::debug!(
                session_id = %session_id,
                kind,
                "ignoring unexpected inbound frame"
            );
        }
    }
}

/// Bounded-wait write into the outbound queue
async fn send_outbound(outbound_tx: &mpsc::Sender<Envelope>, session_id: &str, frame: Envelope) {
    let kind = frame.kind();
    match outbound_tx.send_timeout(frame, ENQUEUE_TIMEOUT).await {
        Ok(()) => {}
        Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
            tracing::error!(
                session_id = %session_id,
                kind,
                "outbound queue full, dropping frame after bounded wait"
            );
        }
        Err(mpsc::error::SendTimeoutError::Closed(_)) => {
            tracing::debug!(
                session_id = %session_id,
                kind,
                "session closed before frame could be queued"
            );
        }
    }
}

//! Event batch delivery
//!
//! Wraps a drained batch in its envelope and pushes it to the
//! controller with bounded retry. Each attempt runs under its own
//! deadline; only attempt-level errors cause a retry. A response with
//! `accepted = false` still counts as delivered - the controller
//! acknowledged receipt, downstream processing is its concern.

use std::sync::Arc;
use std::time::Duration;

use crate::transport::ControllerClient;
use crate::{Error, Result};

use super::types::Event;
use super::wire::EventBatch;

/// Delivers event batches over the controller transport
pub struct EventSender {
    client: Arc<dyn ControllerClient>,
    max_attempts: u32,
    base_backoff: Duration,
    attempt_timeout: Duration,
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("max_attempts", &self.max_attempts)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl EventSender {
    /// Create a sender with default policy: 3 attempts, 30s per
    /// attempt, exponential backoff from 1s between attempts
    pub fn new(client: Arc<dyn ControllerClient>) -> Self {
        Self::with_policy(
            client,
            3,
            Duration::from_secs(1),
            Duration::from_secs(30),
        )
    }

    /// Create a sender with an explicit retry policy
    pub fn with_policy(
        client: Arc<dyn ControllerClient>,
        max_attempts: u32,
        base_backoff: Duration,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            client,
            max_attempts: max_attempts.max(1),
            base_backoff,
            attempt_timeout,
        }
    }

    /// Deliver one batch of events
    ///
    /// # Errors
    ///
    /// * `Error::Unavailable` - every attempt failed; the caller keeps
    ///   the events buffered
    pub async fn send_batch(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let batch = EventBatch::from_events(events)?;
        let batch_id = batch.batch_id.clone();
        let mut last_error: Option<Error> = None;

        for attempt in 0..self.max_attempts {
            let call = self.client.publish_events(batch.clone());
            match tokio::time::timeout(self.attempt_timeout, call).await {
                Ok(Ok(ack)) => {
                    if !ack.accepted {
                        tracing::debug!(
                            batch_id = %batch_id,
                            message = %ack.message,
                            "controller declined batch processing, treating as delivered"
                        );
                    }
                    tracing::debug!(
                        batch_id = %batch_id,
                        events = events.len(),
                        attempt = attempt + 1,
                        "event batch delivered"
                    );
                    return Ok(());
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        batch_id = %batch_id,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "event batch send failed"
                    );
                    last_error = Some(e);
                }
                Err(_) => {
                    tracing::warn!(
                        batch_id = %batch_id,
                        attempt = attempt + 1,
                        timeout = ?self.attempt_timeout,
                        "event batch send timed out"
                    );
                    last_error = Some(Error::Timeout {
                        timeout_ms: self.attempt_timeout.as_millis() as u64,
                        context: format!("publish batch {}", batch_id),
                    });
                }
            }

            if attempt + 1 < self.max_attempts {
                let backoff = self.base_backoff * 2u32.pow(attempt);
                tokio::time::sleep(backoff).await;
            }
        }

        Err(Error::Unavailable(format!(
            "event batch {} undelivered after {} attempts: {}",
            batch_id,
            self.max_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{EventPayload, Level, SystemEvent, SystemOperation};
    use crate::transport::{
        EventBatchAck, RegistrationOutcome, RegistrationRequest, StreamPair,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted controller: fails the first `fail_first` publish calls
    #[derive(Debug)]
    struct ScriptedClient {
        fail_first: u32,
        accept: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ControllerClient for ScriptedClient {
        async fn register(&self, _request: RegistrationRequest) -> Result<RegistrationOutcome> {
            Ok(RegistrationOutcome::AlreadyRegistered)
        }

        async fn open_stream(&self) -> Result<StreamPair> {
            Err(Error::Unsupported("test client".into()))
        }

        async fn publish_events(&self, _batch: EventBatch) -> Result<EventBatchAck> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(Error::Unavailable("controller down".into()))
            } else {
                Ok(EventBatchAck {
                    accepted: self.accept,
                    message: String::new(),
                })
            }
        }
    }

    fn events(n: usize) -> Vec<Event> {
        (0..n)
            .map(|i| {
                Event::new(
                    Level::Info,
                    "test",
                    EventPayload::System(SystemEvent {
                        operation: SystemOperation::HealthChanged,
                        message: format!("e{}", i),
                    }),
                )
            })
            .collect()
    }

    fn sender(client: Arc<ScriptedClient>) -> EventSender {
        EventSender::with_policy(
            client,
            3,
            Duration::from_millis(5),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn delivers_on_first_attempt() {
        let client = Arc::new(ScriptedClient {
            fail_first: 0,
            accept: true,
            calls: AtomicU32::new(0),
        });
        sender(client.clone()).send_batch(&events(3)).await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let client = Arc::new(ScriptedClient {
            fail_first: 2,
            accept: true,
            calls: AtomicU32::new(0),
        });
        sender(client.clone()).send_batch(&events(1)).await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_unavailable() {
        let client = Arc::new(ScriptedClient {
            fail_first: u32::MAX,
            accept: true,
            calls: AtomicU32::new(0),
        });
        let err = sender(client.clone())
            .send_batch(&events(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn declined_ack_still_counts_as_delivered() {
        let client = Arc::new(ScriptedClient {
            fail_first: 0,
            accept: false,
            calls: AtomicU32::new(0),
        });
        sender(client.clone()).send_batch(&events(1)).await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let client = Arc::new(ScriptedClient {
            fail_first: 0,
            accept: true,
            calls: AtomicU32::new(0),
        });
        sender(client.clone()).send_batch(&[]).await.unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }
}

//! Transport abstractions for controller connectivity
//!
//! Two transport variants share one interface: a request/response
//! client for public nodes and a bidirectional streaming client for
//! private-network nodes. Selection is driven by the node token's
//! `prv` claim; the request/response variant cannot carry the control
//! stream and fails `open_stream` with `Unsupported`.
//!
//! The core crate only knows these traits; the tonic and reqwest
//! implementations live in their own transport crates.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::events::wire::EventBatch;
use crate::Result;

mod frame;
pub mod monitor;
pub mod session;

pub use frame::{Acknowledgement, Command, CommandResponse, ConfigUpdate, Envelope, FramePayload};
pub use monitor::ConnectionMonitor;
pub use session::StreamSession;

/// Fallback lifetime applied when a certificate expiration fails to
/// parse; registration must not abort over a bad timestamp
const FALLBACK_CERT_LIFETIME_DAYS: i64 = 15 * 365;

/// Basic system telemetry carried by the registration call
///
/// Placeholder readings are acceptable; the controller only needs a
/// rough picture at first contact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Node identifier from the token
    pub node_id: String,
    /// Organization subject from the token
    pub subject: String,
    /// Node hostname
    pub hostname: String,
    /// Agent version
    pub version: String,
    /// Logical CPU count
    pub cpu_count: u32,
    /// Total memory in bytes
    pub memory_bytes: u64,
    /// Total disk in bytes
    pub disk_bytes: u64,
}

/// Certificate material issued at registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateBundle {
    /// Domain name issued to this node
    pub domain: String,
    /// PEM-encoded certificate
    pub certificate_pem: String,
    /// PEM-encoded private key
    pub private_key_pem: String,
    /// Certificate expiration
    pub expires_on: DateTime<Utc>,
}

/// Outcome of the one-shot registration call
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    /// The controller already knows this node; no certificate material
    /// was returned
    AlreadyRegistered,
    /// Freshly issued certificate material; installation is the
    /// caller's responsibility
    Registered(Box<CertificateBundle>),
}

/// Parse an RFC 3339 expiration, falling back to a long default
///
/// Registration must succeed even when the controller sends an
/// unparseable timestamp.
pub fn parse_expiration(raw: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            tracing::warn!(
                raw,
                error = %e,
                "unparseable certificate expiration, assuming long-lived"
            );
            Utc::now() + ChronoDuration::days(FALLBACK_CERT_LIFETIME_DAYS)
        }
    }
}

/// Acknowledgement for a published event batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatchAck {
    /// Whether the controller accepted the batch for processing;
    /// receipt alone counts as delivery either way
    pub accepted: bool,
    /// Optional detail
    pub message: String,
}

/// Sending half of an open control stream
#[async_trait]
pub trait FrameSink: Send {
    /// Write one frame to the stream
    async fn send(&mut self, frame: Envelope) -> Result<()>;
}

/// Receiving half of an open control stream
#[async_trait]
pub trait FrameSource: Send {
    /// Read the next frame; `Ok(None)` means the controller closed the
    /// stream cleanly
    async fn recv(&mut self) -> Result<Option<Envelope>>;
}

/// An open bidirectional stream, split into its two halves so the
/// session can run independent send and receive loops
pub struct StreamPair {
    /// Sending half
    pub sink: Box<dyn FrameSink>,
    /// Receiving half
    pub source: Box<dyn FrameSource>,
}

impl std::fmt::Debug for StreamPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPair").finish_non_exhaustive()
    }
}

/// Client-side controller interface implemented by both transport
/// variants
///
/// # Thread safety
///
/// Implementations must be `Send + Sync`; the monitor, the event
/// sender, and the boot path all hold the same client.
#[async_trait]
pub trait ControllerClient: Send + Sync + std::fmt::Debug {
    /// Perform the one-shot registration call
    async fn register(&self, request: RegistrationRequest) -> Result<RegistrationOutcome>;

    /// Open a bidirectional control stream
    ///
    /// # Errors
    ///
    /// * `Error::Unsupported` - this is the request/response variant
    /// * `Error::Unavailable` - the controller is unreachable
    async fn open_stream(&self) -> Result<StreamPair>;

    /// Publish a batch of events
    async fn publish_events(&self, batch: EventBatch) -> Result<EventBatchAck>;
}

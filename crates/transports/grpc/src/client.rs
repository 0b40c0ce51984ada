//! Streaming gRPC controller client
//!
//! The transport for private-network tokens: a lazily-created channel
//! against the dedicated RPC endpoint with HTTP/2 keepalive, a raised
//! message-size ceiling, and the bearer token attached to every
//! request. `open_stream` wires the bidirectional `Channel` RPC into
//! the core's split sink/source halves.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use rodent_core::events::wire::EventBatch;
use rodent_core::transport::{
    ControllerClient, Envelope, EventBatchAck, FrameSink, FrameSource, RegistrationOutcome,
    RegistrationRequest, StreamPair,
};
use rodent_core::{Error, NodeToken, Result};

use crate::adapters;
use crate::generated as pb;
use crate::generated::node_control_client::NodeControlClient;

/// Ceiling for decoded and encoded messages
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// HTTP/2 keepalive ping interval; pings flow even without an active
/// stream so half-dead connections surface quickly
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// How long to wait for a keepalive ack
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(20);

/// TCP connect deadline
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the outbound request stream feeding the Channel RPC
const REQUEST_STREAM_CAPACITY: usize = 100;

/// Streaming transport against the controller's RPC endpoint
pub struct GrpcControllerClient {
    endpoint: String,
    auth: MetadataValue<Ascii>,
    insecure: bool,
    channel: tokio::sync::Mutex<Option<Channel>>,
}

impl std::fmt::Debug for GrpcControllerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcControllerClient")
            .field("endpoint", &self.endpoint)
            .field("insecure", &self.insecure)
            .finish_non_exhaustive()
    }
}

impl GrpcControllerClient {
    /// Create a client for `endpoint`, authenticating with the node
    /// token
    ///
    /// TLS is on unless `insecure` development mode is set. The
    /// channel itself is dialed lazily on first use.
    pub fn new(endpoint: impl Into<String>, token: &NodeToken, insecure: bool) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            return Err(Error::InvalidInput("rpc endpoint cannot be empty".into()));
        }

        let auth: MetadataValue<Ascii> = format!("Bearer {}", token.bearer())
            .parse()
            .map_err(|_| Error::InvalidInput("token is not valid metadata".into()))?;

        Ok(Self {
            endpoint,
            auth,
            insecure,
            channel: tokio::sync::Mutex::new(None),
        })
    }

    /// Get or create the shared channel
    async fn channel(&self) -> Result<Channel> {
        let mut guard = self.channel.lock().await;
        if let Some(ref channel) = *guard {
            return Ok(channel.clone());
        }

        let uri = if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.clone()
        } else if self.insecure {
            format!("http://{}", self.endpoint)
        } else {
            format!("https://{}", self.endpoint)
        };

        let mut endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| Error::InvalidInput(format!("invalid rpc endpoint '{}': {}", uri, e)))?
            .connect_timeout(CONNECT_TIMEOUT)
            .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
            .keep_alive_timeout(KEEPALIVE_TIMEOUT)
            .keep_alive_while_idle(true);

        if uri.starts_with("https://") {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| Error::InvalidInput(format!("tls configuration failed: {}", e)))?;
        } else if !self.insecure {
            return Err(Error::InvalidInput(
                "plaintext rpc endpoint requires insecure development mode".into(),
            ));
        }

        let channel = endpoint.connect().await.map_err(|e| {
            Error::Unavailable(format!("failed to connect to '{}': {}", self.endpoint, e))
        })?;

        tracing::debug!(endpoint = %self.endpoint, "rpc channel established");
        *guard = Some(channel.clone());
        Ok(channel)
    }

    async fn client(&self) -> Result<NodeControlClient<Channel>> {
        let channel = self.channel().await?;
        Ok(NodeControlClient::new(channel)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE))
    }

    /// Wrap a message with the bearer token in request metadata
    fn authorize<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request.metadata_mut().insert("authorization", self.auth.clone());
        request
    }
}

/// Map a transport status onto the core error taxonomy
fn status_to_error(status: tonic::Status) -> Error {
    match status.code() {
        tonic::Code::Unauthenticated | tonic::Code::PermissionDenied => {
            Error::Unauthenticated(status.message().to_string())
        }
        tonic::Code::Unimplemented => Error::Unsupported(status.message().to_string()),
        tonic::Code::DeadlineExceeded => Error::Timeout {
            timeout_ms: 0,
            context: status.message().to_string(),
        },
        tonic::Code::InvalidArgument => Error::InvalidInput(status.message().to_string()),
        _ => Error::Unavailable(format!("{}: {}", status.code(), status.message())),
    }
}

#[async_trait]
impl ControllerClient for GrpcControllerClient {
    async fn register(&self, request: RegistrationRequest) -> Result<RegistrationOutcome> {
        let mut client = self.client().await?;
        let response = client
            .register(self.authorize(adapters::registration_to_proto(request)))
            .await
            .map_err(status_to_error)?;

        Ok(adapters::registration_outcome(response.into_inner()))
    }

    async fn open_stream(&self) -> Result<StreamPair> {
        let mut client = self.client().await?;

        let (tx, rx) = mpsc::channel::<pb::ControlFrame>(REQUEST_STREAM_CAPACITY);
        let request = self.authorize(ReceiverStream::new(rx));

        let response = client.channel(request).await.map_err(status_to_error)?;
        let inbound = response.into_inner();

        Ok(StreamPair {
            sink: Box::new(GrpcFrameSink { tx }),
            source: Box::new(GrpcFrameSource { inbound }),
        })
    }

    async fn publish_events(&self, batch: EventBatch) -> Result<EventBatchAck> {
        let mut client = self.client().await?;
        let response = client
            .publish_events(self.authorize(batch))
            .await
            .map_err(status_to_error)?;

        let ack = response.into_inner();
        Ok(EventBatchAck {
            accepted: ack.accepted,
            message: ack.message,
        })
    }
}

/// Sending half: feeds the request stream of the Channel RPC
struct GrpcFrameSink {
    tx: mpsc::Sender<pb::ControlFrame>,
}

#[async_trait]
impl FrameSink for GrpcFrameSink {
    async fn send(&mut self, frame: Envelope) -> Result<()> {
        self.tx
            .send(adapters::envelope_to_frame(frame))
            .await
            .map_err(|_| Error::Unavailable("control stream closed by transport".into()))
    }
}

/// Receiving half: drains the response stream of the Channel RPC
struct GrpcFrameSource {
    inbound: tonic::codec::Streaming<pb::ControlFrame>,
}

#[async_trait]
impl FrameSource for GrpcFrameSource {
    async fn recv(&mut self) -> Result<Option<Envelope>> {
        loop {
            match self.inbound.message().await {
                Ok(Some(frame)) => match adapters::frame_to_envelope(frame) {
                    Some(envelope) => return Ok(Some(envelope)),
                    None => {
                        tracing::warn!("skipping control frame with no payload");
                        continue;
                    }
                },
                Ok(None) => return Ok(None),
                Err(status) => return Err(status_to_error(status)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> NodeToken {
        use base64::Engine as _;
        let claims = serde_json::json!({ "sub": "org-1", "rid": "node-1", "prv": true });
        let body = base64::engine::general_purpose::URL_SAFE.encode(claims.to_string());
        NodeToken::parse(format!("h.{}.s", body.trim_end_matches('='))).unwrap()
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        assert!(GrpcControllerClient::new("", &token(), false).is_err());
    }

    #[test]
    fn client_construction_is_lazy() {
        // No dialing happens at construction time
        let client = GrpcControllerClient::new("rpc.example.com:8443", &token(), false);
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn plaintext_without_insecure_mode_is_rejected() {
        let client = GrpcControllerClient::new("http://rpc.internal:50051", &token(), false).unwrap();
        let err = client.channel().await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}

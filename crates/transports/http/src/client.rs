//! Request/response controller client
//!
//! The transport for public tokens: plain HTTPS calls against the
//! controller's primary endpoint. Registration and event publishing
//! share semantics with the streaming variant; the control stream is
//! simply not available here, and `open_stream` says so instead of
//! faking one. The report endpoints are idempotent POSTs specific to
//! this variant.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rodent_core::events::wire::EventBatch;
use rodent_core::transport::{
    CertificateBundle, ControllerClient, EventBatchAck, RegistrationOutcome, RegistrationRequest,
    StreamPair,
};
use rodent_core::{Error, NodeToken, Result};

/// Per-request deadline
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request/response transport against the controller's primary
/// endpoint
pub struct RestControllerClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for RestControllerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestControllerClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Registration response body
#[derive(Debug, Default, Deserialize)]
struct RegisterReply {
    #[serde(default)]
    domain: String,
    #[serde(default)]
    certificate_pem: String,
    #[serde(default)]
    private_key_pem: String,
    #[serde(default)]
    expires_on: String,
}

/// Event publish response body
#[derive(Debug, Deserialize)]
struct PublishReply {
    #[serde(default = "default_accepted")]
    accepted: bool,
    #[serde(default)]
    message: String,
}

fn default_accepted() -> bool {
    true
}

/// Service-state report body
#[derive(Debug, Serialize)]
struct ServiceStateReport<'a> {
    service: &'a str,
    state: &'a str,
}

/// Configuration-change report body
#[derive(Debug, Serialize)]
struct ConfigChangeReport<'a> {
    component: &'a str,
    detail: &'a str,
}

impl RestControllerClient {
    /// Create a client for `base_url`, authenticating with the node
    /// token
    pub fn new(base_url: impl Into<String>, token: &NodeToken) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(Error::InvalidInput("controller endpoint cannot be empty".into()));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidInput(format!(
                "controller endpoint must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Unavailable(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.bearer().to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => Error::Unauthenticated(detail),
            400 | 404 | 409 | 422 => Error::InvalidInput(format!("{}: {}", status, detail)),
            _ => Error::Unavailable(format!("{}: {}", status, detail)),
        })
    }

    /// Report a managed service's state; safe to repeat
    pub async fn report_service_state(&self, service: &str, state: &str) -> Result<()> {
        self.post_json(
            "/api/v1/reports/service-state",
            &ServiceStateReport { service, state },
        )
        .await?;
        Ok(())
    }

    /// Report a local configuration change; safe to repeat
    pub async fn report_config_change(&self, component: &str, detail: &str) -> Result<()> {
        self.post_json(
            "/api/v1/reports/config-change",
            &ConfigChangeReport { component, detail },
        )
        .await?;
        Ok(())
    }
}

fn request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout {
            timeout_ms: REQUEST_TIMEOUT.as_millis() as u64,
            context: "controller request".to_string(),
        }
    } else {
        Error::Unavailable(format!("controller request failed: {}", e))
    }
}

/// Interpret the registration reply body
fn registration_outcome(reply: RegisterReply) -> RegistrationOutcome {
    if reply.certificate_pem.is_empty() || reply.private_key_pem.is_empty() {
        return RegistrationOutcome::AlreadyRegistered;
    }

    RegistrationOutcome::Registered(Box::new(CertificateBundle {
        domain: reply.domain,
        certificate_pem: reply.certificate_pem,
        private_key_pem: reply.private_key_pem,
        expires_on: rodent_core::transport::parse_expiration(&reply.expires_on),
    }))
}

/// JSON body for a batch publish
///
/// Records that fail to decode are dropped with a warning rather than
/// failing the whole batch.
fn batch_to_body(batch: &EventBatch) -> serde_json::Value {
    let events: Vec<serde_json::Value> = batch
        .events
        .iter()
        .filter_map(|record| match record.to_event() {
            Ok(event) => serde_json::to_value(event).ok(),
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable event record");
                None
            }
        })
        .collect();

    serde_json::json!({
        "batch_id": batch.batch_id,
        "created_at_ms": batch.created_at_ms,
        "events": events,
    })
}

#[async_trait]
impl ControllerClient for RestControllerClient {
    async fn register(&self, request: RegistrationRequest) -> Result<RegistrationOutcome> {
        let response = self.post_json("/api/v1/nodes/register", &request).await?;
        let reply: RegisterReply = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("bad registration reply: {}", e)))?;

        Ok(registration_outcome(reply))
    }

    async fn open_stream(&self) -> Result<StreamPair> {
        // The request/response variant cannot carry the control stream
        Err(Error::Unsupported(
            "request/response transport cannot open a control stream".into(),
        ))
    }

    async fn publish_events(&self, batch: EventBatch) -> Result<EventBatchAck> {
        let response = self
            .post_json("/api/v1/events", &batch_to_body(&batch))
            .await?;
        let reply: PublishReply = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("bad publish reply: {}", e)))?;

        Ok(EventBatchAck {
            accepted: reply.accepted,
            message: reply.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodent_core::events::{Event, EventPayload, Level, SystemEvent, SystemOperation};

    fn token() -> NodeToken {
        use base64::Engine as _;
        let claims = serde_json::json!({ "sub": "org-1", "rid": "node-1" });
        let body = base64::engine::general_purpose::URL_SAFE.encode(claims.to_string());
        NodeToken::parse(format!("h.{}.s", body.trim_end_matches('='))).unwrap()
    }

    #[test]
    fn rejects_bad_endpoints() {
        assert!(RestControllerClient::new("", &token()).is_err());
        assert!(RestControllerClient::new("controller.example.com", &token()).is_err());
        assert!(RestControllerClient::new("https://controller.example.com", &token()).is_ok());
    }

    #[test]
    fn trailing_slash_is_normalized() {
        let client = RestControllerClient::new("https://c.example.com/", &token()).unwrap();
        assert_eq!(
            client.url("/api/v1/events"),
            "https://c.example.com/api/v1/events"
        );
    }

    #[tokio::test]
    async fn open_stream_is_unsupported() {
        let client = RestControllerClient::new("https://c.example.com", &token()).unwrap();
        let err = client.open_stream().await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn empty_certificate_material_means_already_registered() {
        let outcome = registration_outcome(RegisterReply::default());
        assert_eq!(outcome, RegistrationOutcome::AlreadyRegistered);
    }

    #[test]
    fn issued_material_becomes_a_bundle() {
        let outcome = registration_outcome(RegisterReply {
            domain: "node-1.example".into(),
            certificate_pem: "cert".into(),
            private_key_pem: "key".into(),
            expires_on: "bogus".into(),
        });
        match outcome {
            RegistrationOutcome::Registered(bundle) => {
                assert_eq!(bundle.domain, "node-1.example");
                assert!(bundle.expires_on > chrono::Utc::now());
            }
            other => panic!("expected bundle, got {:?}", other),
        }
    }

    #[test]
    fn batch_body_carries_decoded_events() {
        let events = vec![Event::new(
            Level::Info,
            "agent",
            EventPayload::System(SystemEvent {
                operation: SystemOperation::Startup,
                message: "up".into(),
            }),
        )];
        let batch = EventBatch::from_events(&events).unwrap();

        let body = batch_to_body(&batch);
        assert_eq!(body["batch_id"], batch.batch_id);
        assert_eq!(body["events"].as_array().unwrap().len(), 1);
        assert_eq!(body["events"][0]["payload"]["kind"], "system");
    }
}

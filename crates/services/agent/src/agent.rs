//! Registration and boot
//!
//! Wires the subsystems together: parses the node token, selects the
//! transport variant, performs first contact with the controller,
//! starts the event pipeline and (for streaming-capable tokens) the
//! connection monitor, and attaches everything to the lifecycle
//! registry.

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use rodent_core::dispatch::CommandRegistry;
use rodent_core::events::{EventBus, EventSender, Level, SystemOperation};
use rodent_core::transport::{
    ConnectionMonitor, ControllerClient, RegistrationOutcome, RegistrationRequest,
};
use rodent_core::{AgentConfig, DataDirs, Error, Lifecycle, NodeToken, Result};

use rodent_grpc::GrpcControllerClient;
use rodent_http::RestControllerClient;

use crate::handlers;

/// Interval between registration attempts
const REGISTRATION_RETRY: Duration = Duration::from_secs(60);

/// The running agent
pub struct Agent {
    config: AgentConfig,
    token: NodeToken,
    dirs: DataDirs,
    client: Arc<dyn ControllerClient>,
    lifecycle: Arc<Lifecycle>,
}

impl Agent {
    /// Parse the token, prepare the state directories, and select the
    /// transport
    pub fn bootstrap(config: AgentConfig, lifecycle: Arc<Lifecycle>) -> Result<Self> {
        let token = NodeToken::parse(&config.controller.token)?;

        let dirs = DataDirs::new(&config.paths.data_dir);
        dirs.ensure()?;

        let client = select_transport(&token, &config)?;
        tracing::info!(
            node_id = %token.node_id(),
            subject = %token.subject(),
            streaming = token.is_private(),
            "transport selected"
        );

        Ok(Self {
            config,
            token,
            dirs,
            client,
            lifecycle,
        })
    }

    /// Run until shutdown completes
    pub async fn run(self) -> Result<()> {
        self.register_until_done().await?;
        if self.lifecycle.is_shutdown_requested() {
            return Ok(());
        }

        // Event pipeline first: its shutdown hook drains while the
        // transport is still up.
        let settings = self.config.events.resolve();
        let sender = Arc::new(EventSender::new(self.client.clone()));
        let bus = EventBus::start(&settings, self.dirs.events(), sender);
        {
            let bus = bus.clone();
            self.lifecycle
                .on_shutdown("event-pipeline", move || async move {
                    bus.shutdown().await;
                });
        }

        if self.token.is_private() {
            let registry = Arc::new(CommandRegistry::new());
            let monitor = Arc::new(ConnectionMonitor::new(self.client.clone(), registry));
            monitor.set_handler_setup(handlers::register_builtin);

            let task = tokio::spawn(
                monitor
                    .clone()
                    .run(self.lifecycle.subscribe_shutdown()),
            );
            self.lifecycle
                .on_shutdown("connection-monitor", move || async move {
                    let _ = task.await;
                });
        } else {
            tracing::info!("public token: running without a control stream");
        }

        bus.system(Level::Info, SystemOperation::Startup, "agent online");

        self.lifecycle.wait_for_shutdown().await;
        bus.system(Level::Info, SystemOperation::Shutdown, "agent stopping");
        self.lifecycle.shutdown().await;

        Ok(())
    }

    /// Retry registration at a fixed interval until it succeeds or
    /// shutdown is requested
    async fn register_until_done(&self) -> Result<()> {
        let request = collect_telemetry(&self.token);
        let mut shutdown = self.lifecycle.subscribe_shutdown();

        loop {
            if self.lifecycle.is_shutdown_requested() {
                return Ok(());
            }

            match self.client.register(request.clone()).await {
                Ok(RegistrationOutcome::AlreadyRegistered) => {
                    tracing::info!("node already registered with controller");
                    return Ok(());
                }
                Ok(RegistrationOutcome::Registered(bundle)) => {
                    tracing::info!(
                        domain = %bundle.domain,
                        expires_on = %bundle.expires_on.to_rfc3339(),
                        "registration complete, installing certificate material"
                    );
                    self.install_certificates(&bundle.certificate_pem, &bundle.private_key_pem)?;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_in = ?REGISTRATION_RETRY,
                        "registration failed"
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(REGISTRATION_RETRY) => {}
                _ = shutdown.recv() => {
                    tracing::info!("shutdown requested before registration completed");
                    return Ok(());
                }
            }
        }
    }

    /// Write issued certificate material into the keys directory
    fn install_certificates(&self, certificate_pem: &str, private_key_pem: &str) -> Result<()> {
        let keys = self.dirs.keys();
        std::fs::write(keys.join("certificate.pem"), certificate_pem)?;

        let key_path = keys.join("private-key.pem");
        std::fs::write(&key_path, private_key_pem)?;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;

        Ok(())
    }
}

/// Build the transport variant the token selects: streaming for
/// private-network tokens, request/response otherwise
pub fn select_transport(
    token: &NodeToken,
    config: &AgentConfig,
) -> Result<Arc<dyn ControllerClient>> {
    if token.is_private() {
        let client = GrpcControllerClient::new(
            &config.controller.rpc_endpoint,
            token,
            config.controller.insecure,
        )?;
        Ok(Arc::new(client))
    } else {
        let client = RestControllerClient::new(&config.controller.endpoint, token)?;
        Ok(Arc::new(client))
    }
}

/// Node hostname, best effort
pub(crate) fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Basic system telemetry for first contact; rough readings are fine
fn collect_telemetry(token: &NodeToken) -> RegistrationRequest {
    RegistrationRequest {
        node_id: token.node_id().to_string(),
        subject: token.subject().to_string(),
        hostname: hostname(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cpu_count: std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1),
        memory_bytes: total_memory_bytes().unwrap_or(0),
        disk_bytes: 0,
    }
}

/// MemTotal from /proc/meminfo, in bytes
fn total_memory_bytes() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

/// Map a bootstrap failure to the message printed before the non-zero
/// exit
pub fn startup_error_message(error: &Error) -> String {
    match error {
        Error::AlreadyRunning { pid } => {
            format!("another rodent agent is already running (pid {})", pid)
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    fn token(private: bool) -> NodeToken {
        let claims = serde_json::json!({ "sub": "org-1", "rid": "node-1", "prv": private });
        let body = base64::engine::general_purpose::URL_SAFE.encode(claims.to_string());
        NodeToken::parse(format!("h.{}.s", body.trim_end_matches('='))).unwrap()
    }

    fn config(dir: &std::path::Path) -> AgentConfig {
        let mut config = AgentConfig::default();
        config.paths.data_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn private_token_selects_the_streaming_transport() {
        let tmp = tempfile::tempdir().unwrap();
        let client = select_transport(&token(true), &config(tmp.path())).unwrap();
        // The streaming variant has a working open_stream; proving the
        // selection here only needs the concrete type.
        assert!(format!("{:?}", client).contains("GrpcControllerClient"));
    }

    #[test]
    fn public_token_selects_the_request_response_transport() {
        let tmp = tempfile::tempdir().unwrap();
        let client = select_transport(&token(false), &config(tmp.path())).unwrap();
        assert!(format!("{:?}", client).contains("RestControllerClient"));
    }

    #[tokio::test]
    async fn public_transport_has_no_stream() {
        let tmp = tempfile::tempdir().unwrap();
        let client = select_transport(&token(false), &config(tmp.path())).unwrap();
        assert!(matches!(
            client.open_stream().await,
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn telemetry_carries_token_identity() {
        let request = collect_telemetry(&token(true));
        assert_eq!(request.node_id, "node-1");
        assert_eq!(request.subject, "org-1");
        assert!(request.cpu_count >= 1);
        assert!(!request.version.is_empty());
    }

    #[test]
    fn bootstrap_rejects_a_malformed_token() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(tmp.path());
        config.controller.token = "not-a-token".to_string();

        let lifecycle = Arc::new(Lifecycle::new());
        assert!(matches!(
            Agent::bootstrap(config, lifecycle),
            Err(Error::InvalidInput(_))
        ));
    }
}

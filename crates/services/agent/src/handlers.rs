//! Built-in command handlers
//!
//! Only the agent's own introspection commands live here; storage,
//! sharing, and directory handlers register themselves through the
//! same entry point from their own modules.

use rodent_core::dispatch::{CommandRegistry, HandlerReply};

use crate::agent::hostname;

/// Register the built-in handlers; invoked once by the connection
/// monitor before the first stream opens
pub fn register_builtin(registry: &CommandRegistry) {
    registry.register("system.status", |_ctx, _cmd| async {
        let payload = serde_json::json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        Ok(HandlerReply::new("ok", payload.to_string().into_bytes()))
    });

    registry.register("system.info", |_ctx, _cmd| async {
        let payload = serde_json::json!({
            "hostname": hostname(),
            "version": env!("CARGO_PKG_VERSION"),
            "cpu_count": std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        });
        Ok(HandlerReply::new("ok", payload.to_string().into_bytes()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodent_core::dispatch::CommandContext;
    use rodent_core::transport::Command;

    fn invoke_args(ty: &str) -> (CommandContext, Command) {
        (
            CommandContext {
                session_id: "sess-test".to_string(),
                received_at: chrono::Utc::now(),
            },
            Command {
                correlation_id: "c-1".to_string(),
                command_type: ty.to_string(),
                target: String::new(),
                payload: Vec::new(),
            },
        )
    }

    #[tokio::test]
    async fn status_reports_healthy_with_a_timestamp() {
        let registry = CommandRegistry::new();
        register_builtin(&registry);

        let handler = registry.get("system.status").unwrap();
        let (ctx, cmd) = invoke_args("system.status");
        let reply = handler(ctx, cmd).await.unwrap();

        let body: serde_json::Value = serde_json::from_slice(&reply.payload).unwrap();
        assert_eq!(body["status"], "healthy");
        assert!(chrono::DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn info_reports_host_facts() {
        let registry = CommandRegistry::new();
        register_builtin(&registry);

        let handler = registry.get("system.info").unwrap();
        let (ctx, cmd) = invoke_args("system.info");
        let reply = handler(ctx, cmd).await.unwrap();

        let body: serde_json::Value = serde_json::from_slice(&reply.payload).unwrap();
        assert!(!body["hostname"].as_str().unwrap().is_empty());
        assert!(body["cpu_count"].as_u64().unwrap() >= 1);
    }

    #[test]
    fn both_builtins_are_registered() {
        let registry = CommandRegistry::new();
        register_builtin(&registry);
        assert_eq!(
            registry.registered_types(),
            vec!["system.info".to_string(), "system.status".to_string()]
        );
    }
}

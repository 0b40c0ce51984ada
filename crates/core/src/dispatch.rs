//! Command dispatch registry
//!
//! Maps a command-type string to an async handler. Registration is a
//! write-once-read-many discipline: the boot path registers every
//! handler before the first stream opens, and sessions only read from
//! the table afterwards. Handlers stay ignorant of the transport; they
//! see only the request context and the command.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::transport::Command;
use crate::Result;

/// Context of the inbound request a handler is serving
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Session the command arrived on
    pub session_id: String,
    /// When the dispatch loop picked the command up
    pub received_at: DateTime<Utc>,
}

/// What a handler produces on success
///
/// Failures travel as `Err`; the session turns either shape into
/// exactly one response.
#[derive(Debug, Clone, Default)]
pub struct HandlerReply {
    /// Human-readable outcome description
    pub message: String,
    /// Handler-defined response body
    pub payload: Vec<u8>,
}

impl HandlerReply {
    /// Reply with a message and a payload
    pub fn new(message: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            message: message.into(),
            payload,
        }
    }

    /// Reply with a message only
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: Vec::new(),
        }
    }
}

/// Boxed async command handler
pub type CommandHandler =
    Arc<dyn Fn(CommandContext, Command) -> BoxFuture<'static, Result<HandlerReply>> + Send + Sync>;

/// The dispatch table
#[derive(Default)]
pub struct CommandRegistry {
    handlers: RwLock<HashMap<String, CommandHandler>>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("registered", &self.len())
            .finish()
    }
}

impl CommandRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a command type
    ///
    /// Re-registering a type replaces the previous handler with a
    /// warning; that only happens in tests.
    pub fn register<F, Fut>(&self, command_type: impl Into<String>, handler: F)
    where
        F: Fn(CommandContext, Command) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<HandlerReply>> + Send + 'static,
    {
        let command_type = command_type.into();
        let boxed: CommandHandler = Arc::new(move |ctx, cmd| Box::pin(handler(ctx, cmd)));

        let mut handlers = self.handlers.write().unwrap();
        if handlers.insert(command_type.clone(), boxed).is_some() {
            tracing::warn!(command_type = %command_type, "command handler replaced");
        } else {
            tracing::debug!(command_type = %command_type, "command handler registered");
        }
    }

    /// Look up the handler for a command type
    pub fn get(&self, command_type: &str) -> Option<CommandHandler> {
        self.handlers.read().unwrap().get(command_type).cloned()
    }

    /// Registered command types, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().unwrap().keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.read().unwrap().len()
    }

    /// Whether no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

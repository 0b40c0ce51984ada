//! Error types for the rodent agent core

use thiserror::Error;

/// Result type alias for agent core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the agent core
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed token, empty path, unrecognized field
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transport unreachable, stream closed, sender out of retries
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Another agent instance holds the PID file with a live PID
    #[error("Agent already running with pid {pid}")]
    AlreadyRunning {
        /// PID of the live instance holding the lock
        pid: i32,
    },

    /// Command type not registered, or a request/response transport asked for a stream
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// An operation exceeded its deadline; retried per policy
    #[error("Operation timed out after {timeout_ms}ms: {context}")]
    Timeout {
        /// Deadline in milliseconds
        timeout_ms: u64,
        /// What was being attempted
        context: String,
    },

    /// A bounded enqueue could not complete within its wait; retried per policy
    #[error("Queue full: {0}")]
    QueueFull(String),

    /// Wire-level decode failure; aborts the operation
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The controller rejected our credentials; aborts the operation
    #[error("Authentication rejected: {0}")]
    Unauthenticated(String),

    /// Lifecycle failure outside the PID lock (hooks, signal setup)
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure is transient and worth retrying under policy.
    ///
    /// Deserialization failures and credential rejections are permanent;
    /// timeouts, full queues, and unreachable transports are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Unavailable(_) | Error::Timeout { .. } | Error::QueueFull(_) | Error::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::Unavailable("controller down".into()).is_retryable());
        assert!(Error::Timeout {
            timeout_ms: 30_000,
            context: "publish".into()
        }
        .is_retryable());
        assert!(Error::QueueFull("outbound".into()).is_retryable());

        assert!(!Error::InvalidInput("bad token".into()).is_retryable());
        assert!(!Error::Serialization("truncated frame".into()).is_retryable());
        assert!(!Error::Unauthenticated("expired".into()).is_retryable());
        assert!(!Error::AlreadyRunning { pid: 42 }.is_retryable());
    }
}

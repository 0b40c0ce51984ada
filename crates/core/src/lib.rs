//! Rodent agent core
//!
//! The transport-free core of the rodent storage agent. Three
//! subsystems live here:
//!
//! - **Control-plane connectivity**: the [`transport`] traits, the
//!   stream [`transport::StreamSession`], and the reconnecting
//!   [`transport::ConnectionMonitor`] with [`retry`] backoff and
//!   circuit breaking.
//! - **Event pipeline**: typed [`events`] with filtering, a bounded
//!   buffer with disk spillover, and batched delivery.
//! - **Process lifecycle**: single-instance lock, signal dispatch, and
//!   the ordered shutdown-hook registry in [`lifecycle`].
//!
//! Concrete transports (tonic, reqwest) implement the traits in their
//! own crates; this crate never opens a socket.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod identity;
pub mod lifecycle;
pub mod retry;
pub mod transport;

pub use config::{AgentConfig, DataDirs, EventPipelineSettings, Profile};
pub use dispatch::{CommandContext, CommandRegistry, HandlerReply};
pub use error::{Error, Result};
pub use identity::NodeToken;
pub use lifecycle::{Lifecycle, PidFile};
pub use retry::{Backoff, CircuitBreaker, CircuitState};

//! Request/response HTTP transport for the rodent agent
//!
//! Implements the core `ControllerClient` trait for public nodes:
//! registration, event publishing, and the idempotent report
//! endpoints. This variant cannot carry the bidirectional control
//! stream and says so rather than faking one.

pub mod client;

pub use client::RestControllerClient;

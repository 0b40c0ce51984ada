//! Streaming gRPC transport for the rodent agent
//!
//! Implements the core `ControllerClient` trait over the
//! `rodent.v1.NodeControl` service: one-shot registration, the
//! long-lived bidirectional control stream, and batched event
//! delivery. Selected when the node token carries `prv = true`.

pub mod adapters;
pub mod client;

/// Vendored protobuf/tonic codegen for `rodent.v1`
///
/// Schema source of truth: `proto/rodent/v1/control.proto`. Event wire
/// types are mapped onto `rodent_core::events::wire` via extern paths,
/// so spill files and the publish RPC share one encoding.
pub mod generated {
    include!("generated/rodent.v1.rs");
}

pub use client::GrpcControllerClient;

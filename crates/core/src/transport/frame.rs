//! Stream frame model
//!
//! Frames are the unit of exchange on the control stream. Each carries
//! the session id assigned by the monitor plus one payload variant. The
//! stream is symmetrical: either end may send any variant, but in
//! practice the agent sends responses, events, and acks while the
//! controller sends commands, configuration updates, and acks.

use crate::events::wire::EventRecord;

/// A request for the agent to perform an operation
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Opaque id tying the eventual response back to this command;
    /// unique per request within a session
    pub correlation_id: String,
    /// Dispatch key, e.g. `zfs.pool.create` or `system.status`
    pub command_type: String,
    /// Optional discriminator within a command type
    pub target: String,
    /// Handler-defined request body
    pub payload: Vec<u8>,
}

/// The single response produced for a command
///
/// `correlation_id` always equals the command's correlation id, on
/// error paths included; correlation breaks without it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResponse {
    /// Echo of the command's correlation id
    pub correlation_id: String,
    /// Whether the handler completed the operation
    pub success: bool,
    /// Human-readable outcome description
    pub message: String,
    /// Handler-defined response body
    pub payload: Vec<u8>,
}

impl CommandResponse {
    /// Build a success response for `command`
    pub fn ok(command: &Command, message: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            correlation_id: command.correlation_id.clone(),
            success: true,
            message: message.into(),
            payload,
        }
    }

    /// Build a failure response for `command`
    pub fn failure(command: &Command, message: impl Into<String>) -> Self {
        Self {
            correlation_id: command.correlation_id.clone(),
            success: false,
            message: message.into(),
            payload: Vec::new(),
        }
    }
}

/// A configuration update pushed by the controller
///
/// Application of the payload is delegated to the configuration-reload
/// machinery; the session only acknowledges receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigUpdate {
    /// Correlation id echoed in the acknowledgement
    pub correlation_id: String,
    /// Opaque configuration document
    pub payload: Vec<u8>,
}

/// Receipt acknowledgement for a frame that expects one
#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledgement {
    /// Correlation id of the frame being acknowledged
    pub correlation_id: String,
    /// Whether the frame was accepted
    pub success: bool,
    /// Optional detail
    pub message: String,
}

/// One frame payload variant
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    /// Controller asks the agent to perform an operation
    Command(Command),
    /// Agent answers a command
    Response(CommandResponse),
    /// Controller pushes new configuration
    ConfigUpdate(ConfigUpdate),
    /// A single event notification
    Event(EventRecord),
    /// Receipt acknowledgement
    Ack(Acknowledgement),
}

/// A frame on the control stream
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Session the frame belongs to; the send loop stamps it when empty
    pub session_id: String,
    /// The payload variant
    pub payload: FramePayload,
}

impl Envelope {
    /// Wrap a payload with no session id; the send loop stamps it
    pub fn new(payload: FramePayload) -> Self {
        Self {
            session_id: String::new(),
            payload,
        }
    }

    /// Short payload descriptor for logging
    pub fn kind(&self) -> &'static str {
        match self.payload {
            FramePayload::Command(_) => "command",
            FramePayload::Response(_) => "response",
            FramePayload::ConfigUpdate(_) => "config_update",
            FramePayload::Event(_) => "event",
            FramePayload::Ack(_) => "ack",
        }
    }
}

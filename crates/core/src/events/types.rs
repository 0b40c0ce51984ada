//! Typed domain events
//!
//! Events are immutable once emitted. Each carries a generated id, a
//! level, a category, a source, a millisecond timestamp, free-form
//! metadata, and a payload drawn from a per-category sum type; every
//! payload sub-record names the operation that happened.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
    Critical,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Info => write!(f, "info"),
            Level::Warn => write!(f, "warn"),
            Level::Error => write!(f, "error"),
            Level::Critical => write!(f, "critical"),
        }
    }
}

/// Event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    System,
    Storage,
    Network,
    Security,
    Service,
    Identity,
    Access,
    Sharing,
    DataTransfer,
}

impl Category {
    /// All categories, for building default filters
    pub const ALL: [Category; 9] = [
        Category::System,
        Category::Storage,
        Category::Network,
        Category::Security,
        Category::Service,
        Category::Identity,
        Category::Access,
        Category::Sharing,
        Category::DataTransfer,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Category::System => "system",
            Category::Storage => "storage",
            Category::Network => "network",
            Category::Security => "security",
            Category::Service => "service",
            Category::Identity => "identity",
            Category::Access => "access",
            Category::Sharing => "sharing",
            Category::DataTransfer => "data_transfer",
        };
        write!(f, "{}", name)
    }
}

/// Process-level happenings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemOperation {
    Startup,
    Shutdown,
    ConfigReloaded,
    HealthChanged,
}

/// System payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub operation: SystemOperation,
    pub message: String,
}

/// Pool lifecycle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolOperation {
    Created,
    Destroyed,
    Imported,
    Exported,
    ScrubStarted,
    ScrubCompleted,
    Degraded,
    Failed,
}

/// Dataset lifecycle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetOperation {
    Created,
    Destroyed,
    Modified,
    Mounted,
    Unmounted,
}

/// Snapshot lifecycle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOperation {
    Created,
    Destroyed,
    RolledBack,
}

/// Storage payload: one sub-record per object kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "object", rename_all = "snake_case")]
pub enum StorageEvent {
    Pool {
        name: String,
        operation: PoolOperation,
        detail: String,
    },
    Dataset {
        name: String,
        operation: DatasetOperation,
        detail: String,
    },
    Snapshot {
        dataset: String,
        name: String,
        operation: SnapshotOperation,
    },
}

/// Replication / send-receive transfer operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOperation {
    Started,
    Completed,
    Failed,
    Cancelled,
}

/// Data-transfer payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub transfer_id: String,
    pub source: String,
    pub destination: String,
    pub operation: TransferOperation,
    pub bytes: u64,
}

/// Network state operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkOperation {
    LinkUp,
    LinkDown,
    AddressChanged,
}

/// Network payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub interface: String,
    pub operation: NetworkOperation,
    pub detail: String,
}

/// Security operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityOperation {
    AuthSucceeded,
    AuthFailed,
    TokenRotated,
}

/// Security payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub principal: String,
    pub operation: SecurityOperation,
    pub detail: String,
}

/// Managed-service operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceOperation {
    Started,
    Stopped,
    Restarted,
    Failed,
}

/// Service payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEvent {
    pub service: String,
    pub operation: ServiceOperation,
    pub message: String,
}

/// Identity operations (local users and directory membership)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityOperation {
    UserCreated,
    UserDeleted,
    UserModified,
    DomainJoined,
    DomainLeft,
}

/// Identity payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityEvent {
    pub principal: String,
    pub operation: IdentityOperation,
    pub detail: String,
}

/// Access-control operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOperation {
    Granted,
    Revoked,
    Denied,
}

/// Access payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub subject: String,
    pub principal: String,
    pub operation: AccessOperation,
}

/// Share operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingOperation {
    Created,
    Removed,
    Modified,
    Enabled,
    Disabled,
}

/// Sharing payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharingEvent {
    pub share: String,
    pub protocol: String,
    pub operation: SharingOperation,
}

/// The tagged event payload; the variant fixes the category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    System(SystemEvent),
    Storage(StorageEvent),
    Network(NetworkEvent),
    Security(SecurityEvent),
    Service(ServiceEvent),
    Identity(IdentityEvent),
    Access(AccessEvent),
    Sharing(SharingEvent),
    Transfer(TransferEvent),
}

impl EventPayload {
    /// Category implied by the payload variant
    pub fn category(&self) -> Category {
        match self {
            EventPayload::System(_) => Category::System,
            EventPayload::Storage(_) => Category::Storage,
            EventPayload::Network(_) => Category::Network,
            EventPayload::Security(_) => Category::Security,
            EventPayload::Service(_) => Category::Service,
            EventPayload::Identity(_) => Category::Identity,
            EventPayload::Access(_) => Category::Access,
            EventPayload::Sharing(_) => Category::Sharing,
            EventPayload::Transfer(_) => Category::DataTransfer,
        }
    }
}

/// A structured event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Generated unique id (time-sortable)
    pub id: Uuid,
    /// Severity
    pub level: Level,
    /// Category, always consistent with the payload variant
    pub category: Category,
    /// Component that emitted the event
    pub source: String,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Free-form key/value annotations
    pub metadata: HashMap<String, String>,
    /// Typed payload
    pub payload: EventPayload,
}

impl Event {
    /// Construct a fully-populated event
    ///
    /// The id and timestamp are captured here; the category comes from
    /// the payload variant.
    pub fn new(level: Level, source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::now_v7(),
            level,
            category: payload.category(),
            source: source.into(),
            timestamp_ms: Utc::now().timestamp_millis() as u64,
            metadata: HashMap::new(),
            payload,
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_follows_payload() {
        let event = Event::new(
            Level::Info,
            "zfs",
            EventPayload::Storage(StorageEvent::Pool {
                name: "tank".into(),
                operation: PoolOperation::Created,
                detail: String::new(),
            }),
        );
        assert_eq!(event.category, Category::Storage);

        let event = Event::new(
            Level::Warn,
            "replication",
            EventPayload::Transfer(TransferEvent {
                transfer_id: "t-1".into(),
                source: "tank/data".into(),
                destination: "backup/data".into(),
                operation: TransferOperation::Failed,
                bytes: 0,
            }),
        );
        assert_eq!(event.category, Category::DataTransfer);
    }

    #[test]
    fn ids_are_unique_and_time_sortable() {
        let a = Event::new(
            Level::Info,
            "test",
            EventPayload::System(SystemEvent {
                operation: SystemOperation::Startup,
                message: "up".into(),
            }),
        );
        // Distinct milliseconds make the time-ordering observable
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = Event::new(
            Level::Info,
            "test",
            EventPayload::System(SystemEvent {
                operation: SystemOperation::Startup,
                message: "up".into(),
            }),
        );
        assert_ne!(a.id, b.id);
        assert!(a.id < b.id, "v7 ids sort by creation time");
    }

    #[test]
    fn payload_round_trips_through_json() {
        let payload = EventPayload::Storage(StorageEvent::Snapshot {
            dataset: "tank/home".into(),
            name: "nightly-2026-08-01".into(),
            operation: SnapshotOperation::Created,
        });

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"kind\":\"storage\""));
        assert!(json.contains("\"object\":\"snapshot\""));

        let back: EventPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn metadata_builder_appends() {
        let event = Event::new(
            Level::Error,
            "smb",
            EventPayload::Sharing(SharingEvent {
                share: "projects".into(),
                protocol: "smb".into(),
                operation: SharingOperation::Disabled,
            }),
        )
        .with_metadata("reason", "config error")
        .with_metadata("share_path", "/tank/projects");

        assert_eq!(event.metadata.len(), 2);
        assert_eq!(event.metadata["reason"], "config error");
    }
}

//! Wire encoding for event batches
//!
//! Batch records are prost messages so that spill files and the
//! publish RPC share one self-describing binary encoding. The message
//! shapes are hand-maintained here and mirrored by
//! `proto/rodent/v1/control.proto`; the payload travels as the JSON
//! encoding of [`EventPayload`](super::EventPayload) so a reader can
//! recover a batch without the Rust type definitions.

use std::collections::HashMap;

use chrono::Utc;
use prost::Message;
use uuid::Uuid;

use super::types::{Category, Event, EventPayload, Level};
use crate::{Error, Result};

/// Severity on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireLevel {
    Unspecified = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Critical = 4,
}

/// Category on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireCategory {
    Unspecified = 0,
    System = 1,
    Storage = 2,
    Network = 3,
    Security = 4,
    Service = 5,
    Identity = 6,
    Access = 7,
    Sharing = 8,
    DataTransfer = 9,
}

impl From<Level> for WireLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Info => WireLevel::Info,
            Level::Warn => WireLevel::Warn,
            Level::Error => WireLevel::Error,
            Level::Critical => WireLevel::Critical,
        }
    }
}

impl From<Category> for WireCategory {
    fn from(category: Category) -> Self {
        match category {
            Category::System => WireCategory::System,
            Category::Storage => WireCategory::Storage,
            Category::Network => WireCategory::Network,
            Category::Security => WireCategory::Security,
            Category::Service => WireCategory::Service,
            Category::Identity => WireCategory::Identity,
            Category::Access => WireCategory::Access,
            Category::Sharing => WireCategory::Sharing,
            Category::DataTransfer => WireCategory::DataTransfer,
        }
    }
}

impl TryFrom<WireLevel> for Level {
    type Error = Error;

    fn try_from(level: WireLevel) -> Result<Self> {
        match level {
            WireLevel::Info => Ok(Level::Info),
            WireLevel::Warn => Ok(Level::Warn),
            WireLevel::Error => Ok(Level::Error),
            WireLevel::Critical => Ok(Level::Critical),
            WireLevel::Unspecified => {
                Err(Error::Serialization("unspecified event level".to_string()))
            }
        }
    }
}

/// One event on the wire
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventRecord {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(enumeration = "WireLevel", tag = "2")]
    pub level: i32,
    #[prost(enumeration = "WireCategory", tag = "3")]
    pub category: i32,
    #[prost(string, tag = "4")]
    pub source: String,
    #[prost(uint64, tag = "5")]
    pub timestamp_ms: u64,
    #[prost(map = "string, string", tag = "6")]
    pub metadata: HashMap<String, String>,
    /// JSON encoding of the typed payload
    #[prost(bytes = "vec", tag = "7")]
    pub payload: Vec<u8>,
}

/// A batch of events on the wire (and on disk)
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventBatch {
    #[prost(string, tag = "1")]
    pub batch_id: String,
    #[prost(uint64, tag = "2")]
    pub created_at_ms: u64,
    #[prost(message, repeated, tag = "3")]
    pub events: Vec<EventRecord>,
}

impl EventRecord {
    /// Encode a domain event for the wire
    pub fn from_event(event: &Event) -> Result<Self> {
        Ok(Self {
            id: event.id.to_string(),
            level: WireLevel::from(event.level) as i32,
            category: WireCategory::from(event.category) as i32,
            source: event.source.clone(),
            timestamp_ms: event.timestamp_ms,
            metadata: event.metadata.clone(),
            payload: serde_json::to_vec(&event.payload)?,
        })
    }

    /// Decode back into a domain event
    pub fn to_event(&self) -> Result<Event> {
        let payload: EventPayload = serde_json::from_slice(&self.payload)?;
        let level = WireLevel::try_from(self.level)
            .map_err(|_| Error::Serialization(format!("unknown event level {}", self.level)))?;

        Ok(Event {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| Error::Serialization(format!("bad event id: {}", e)))?,
            level: Level::try_from(level)?,
            // The payload variant is authoritative for the category
            category: payload.category(),
            source: self.source.clone(),
            timestamp_ms: self.timestamp_ms,
            metadata: self.metadata.clone(),
            payload,
        })
    }
}

impl EventBatch {
    /// Wrap events in a batch envelope with a fresh time-sortable id
    pub fn from_events(events: &[Event]) -> Result<Self> {
        let records = events
            .iter()
            .map(EventRecord::from_event)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            batch_id: Uuid::now_v7().to_string(),
            created_at_ms: Utc::now().timestamp_millis() as u64,
            events: records,
        })
    }

    /// Binary encoding used for spill files
    pub fn encode(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Decode a spill file back into a batch
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self> {
        Message::decode(bytes).map_err(|e| Error::Serialization(format!("bad batch record: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{PoolOperation, StorageEvent, SystemEvent, SystemOperation};

    fn sample_event() -> Event {
        Event::new(
            Level::Warn,
            "zfs",
            EventPayload::Storage(StorageEvent::Pool {
                name: "tank".into(),
                operation: PoolOperation::Degraded,
                detail: "mirror-0 degraded".into(),
            }),
        )
        .with_metadata("pool_guid", "1234")
    }

    #[test]
    fn event_record_round_trip() {
        let event = sample_event();
        let record = EventRecord::from_event(&event).unwrap();
        let back = record.to_event().unwrap();

        assert_eq!(back.id, event.id);
        assert_eq!(back.level, event.level);
        assert_eq!(back.category, Category::Storage);
        assert_eq!(back.payload, event.payload);
        assert_eq!(back.metadata, event.metadata);
    }

    #[test]
    fn batch_encodes_and_decodes() {
        let events = vec![
            sample_event(),
            Event::new(
                Level::Info,
                "agent",
                EventPayload::System(SystemEvent {
                    operation: SystemOperation::Startup,
                    message: "agent online".into(),
                }),
            ),
        ];

        let batch = EventBatch::from_events(&events).unwrap();
        assert!(!batch.batch_id.is_empty());
        assert_eq!(batch.events.len(), 2);

        let bytes = batch.encode();
        let decoded = EventBatch::decode_bytes(&bytes).unwrap();
        assert_eq!(decoded, batch);
        assert_eq!(decoded.events[0].to_event().unwrap().source, "zfs");
    }

    #[test]
    fn truncated_batch_is_a_serialization_error() {
        let batch = EventBatch::from_events(&[sample_event()]).unwrap();
        let mut bytes = batch.encode();
        bytes.truncate(bytes.len() / 2);

        assert!(matches!(
            EventBatch::decode_bytes(&bytes),
            Err(Error::Serialization(_))
        ));
    }
}

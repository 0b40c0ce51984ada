//! Structured event pipeline
//!
//! Typed domain events flow from the emitters through the bus into a
//! bounded buffer, and from there over the controller transport in
//! batches, spilling to disk when the controller is unreachable.
//! Delivery is at-most-once effort: emission never fails the caller.

mod buffer;
mod bus;
mod sender;
mod types;
pub mod wire;

pub use buffer::EventBuffer;
pub use bus::{EventBus, EventFilter};
pub use sender::EventSender;
pub use types::{
    AccessEvent, AccessOperation, Category, DatasetOperation, Event, EventPayload, IdentityEvent,
    IdentityOperation, Level, NetworkEvent, NetworkOperation, PoolOperation, SecurityEvent,
    SecurityOperation, ServiceEvent, ServiceOperation, SharingEvent, SharingOperation,
    SnapshotOperation, StorageEvent, SystemEvent, SystemOperation, TransferEvent,
    TransferOperation,
};

//! Bounded in-memory event buffer with disk spillover
//!
//! The buffer keeps emitted events until a batch send drains them.
//! Crossing the high-water mark flushes the whole buffer to a spill
//! file before appending, so occupancy never exceeds capacity. The
//! high-water check and the flush happen under the same write lock;
//! emission is already best-effort, so holding the lock across the
//! (slow-path) file write is acceptable.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use uuid::Uuid;

use super::types::Event;
use super::wire::EventBatch;
use crate::Result;

/// Extension used for spilled batch files
const SPILL_EXTENSION: &str = "evb";

/// Bounded event buffer
#[derive(Debug)]
pub struct EventBuffer {
    events: RwLock<VecDeque<Event>>,
    capacity: usize,
    high_water: usize,
    spill_dir: PathBuf,
}

impl EventBuffer {
    /// Create a buffer spilling into `spill_dir`
    ///
    /// `high_water` is clamped below `capacity` so a flush always fires
    /// before the buffer can overfill.
    pub fn new(capacity: usize, high_water: usize, spill_dir: impl Into<PathBuf>) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            high_water: high_water.clamp(1, capacity),
            spill_dir: spill_dir.into(),
        }
    }

    /// Maximum number of buffered events
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Occupancy that triggers a spill
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Current number of buffered events
    pub fn len(&self) -> usize {
        self.events.read().unwrap().len()
    }

    /// Whether the buffer holds no events
    pub fn is_empty(&self) -> bool {
        self.events.read().unwrap().is_empty()
    }

    /// Append an event, spilling first if the high-water mark is reached
    ///
    /// The check and the flush run under one write lock to keep
    /// concurrent emitters from racing past capacity.
    pub fn add(&self, event: Event) {
        let mut events = self.events.write().unwrap();
        if events.len() >= self.high_water {
            if let Err(e) = spill_locked(&mut events, &self.spill_dir) {
                tracing::error!(error = %e, "event spill failed, dropping oldest");
                // Last resort: shed the oldest to honor the capacity bound
                while events.len() >= self.capacity {
                    events.pop_front();
                }
            }
        }
        events.push_back(event);
    }

    /// Copy up to `n` events from the front, oldest first
    ///
    /// The events stay buffered until [`EventBuffer::discard`] confirms
    /// delivery, so a failed send loses nothing.
    pub fn peek_batch(&self, n: usize) -> Vec<Event> {
        let events = self.events.read().unwrap();
        events.iter().take(n).cloned().collect()
    }

    /// Drop the first `n` events after a confirmed delivery
    pub fn discard(&self, n: usize) {
        let mut events = self.events.write().unwrap();
        let n = n.min(events.len());
        events.drain(..n);
    }

    /// Flush the entire buffer to a spill file now
    ///
    /// Returns the file path, or `None` when the buffer was empty.
    pub fn spill_now(&self) -> Result<Option<PathBuf>> {
        let mut events = self.events.write().unwrap();
        if events.is_empty() {
            return Ok(None);
        }
        spill_locked(&mut events, &self.spill_dir).map(Some)
    }
}

/// Write the buffered events as one batch file and truncate the buffer,
/// preserving its allocation. Files are named by a time-sortable id so
/// a directory listing replays batches in flush order.
fn spill_locked(events: &mut VecDeque<Event>, spill_dir: &Path) -> Result<PathBuf> {
    let drained: Vec<Event> = events.iter().cloned().collect();
    let batch = EventBatch::from_events(&drained)?;

    std::fs::create_dir_all(spill_dir)?;
    let path = spill_dir.join(format!("{}.{}", Uuid::now_v7(), SPILL_EXTENSION));
    std::fs::write(&path, batch.encode())?;

    tracing::info!(
        path = %path.display(),
        events = drained.len(),
        batch_id = %batch.batch_id,
        "event buffer spilled to disk"
    );

    events.clear();
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{EventPayload, Level, SystemEvent, SystemOperation};
    use std::time::Duration;

    fn event(n: usize) -> Event {
        Event::new(
            Level::Info,
            "test",
            EventPayload::System(SystemEvent {
                operation: SystemOperation::HealthChanged,
                message: format!("event {}", n),
            }),
        )
    }

    fn buffer(capacity: usize, high_water: usize) -> (EventBuffer, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let buf = EventBuffer::new(capacity, high_water, tmp.path().join("events"));
        (buf, tmp)
    }

    #[test]
    fn below_high_water_nothing_spills() {
        let (buf, tmp) = buffer(100, 10);

        // Exactly high_water - 1 events: no flush on the next add
        for n in 0..9 {
            buf.add(event(n));
        }
        assert_eq!(buf.len(), 9);

        let spill_dir = tmp.path().join("events");
        assert!(!spill_dir.exists() || std::fs::read_dir(&spill_dir).unwrap().next().is_none());
    }

    #[test]
    fn high_water_spills_before_append() {
        let (buf, tmp) = buffer(100, 10);

        for n in 0..10 {
            buf.add(event(n));
        }
        // The 11th add sees len == high_water, flushes, then appends
        buf.add(event(10));

        assert_eq!(buf.len(), 1);
        let files: Vec<_> = std::fs::read_dir(tmp.path().join("events"))
            .unwrap()
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn spilled_file_decodes_to_the_buffered_events() {
        let (buf, _tmp) = buffer(100, 5);

        for n in 0..5 {
            buf.add(event(n));
        }
        let path = buf.spill_now().unwrap().expect("buffer not empty");

        let bytes = std::fs::read(path).unwrap();
        let batch = EventBatch::decode_bytes(&bytes).unwrap();
        assert_eq!(batch.events.len(), 5);
        assert!(buf.is_empty());
    }

    #[test]
    fn occupancy_never_exceeds_capacity() {
        let (buf, _tmp) = buffer(50, 40);

        for n in 0..500 {
            buf.add(event(n));
            assert!(buf.len() <= buf.capacity());
        }
    }

    #[test]
    fn peek_preserves_until_discard() {
        let (buf, _tmp) = buffer(100, 90);
        for n in 0..10 {
            buf.add(event(n));
        }

        let batch = buf.peek_batch(4);
        assert_eq!(batch.len(), 4);
        assert_eq!(buf.len(), 10, "peek must not consume");

        buf.discard(4);
        assert_eq!(buf.len(), 6);

        // FIFO: the next peek starts at the 5th event
        let next = buf.peek_batch(1);
        if let EventPayload::System(sys) = &next[0].payload {
            assert_eq!(sys.message, "event 4");
        } else {
            panic!("unexpected payload");
        }
    }

    #[test]
    fn spill_now_on_empty_buffer_is_a_noop() {
        let (buf, _tmp) = buffer(10, 5);
        assert!(buf.spill_now().unwrap().is_none());
    }

    #[test]
    fn spill_files_sort_by_flush_order() {
        let (buf, tmp) = buffer(100, 90);

        let mut flushed = Vec::new();
        for round in 0..3 {
            buf.add(event(round));
            flushed.push(buf.spill_now().unwrap().unwrap());
            // Distinct milliseconds keep the v7 file names ordered
            std::thread::sleep(Duration::from_millis(2));
        }

        let mut names: Vec<String> = std::fs::read_dir(tmp.path().join("events"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();

        let flushed_names: Vec<String> = flushed
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, flushed_names, "lexicographic order equals flush order");
    }
}

//! Cache entries and the per-entry producer/consumer monitor.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::lineage::LineageRef;
use crate::runtime::Value;

/// Sentinel for "not linked into the LRU list".
pub(crate) const UNLINKED: usize = usize::MAX;

/// Lifecycle state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Placeholder awaiting its producer; occupies an index slot at zero
    /// size.
    Empty,
    /// Valued and resident.
    Cached,
    /// Valued after rehydration from disk.
    Reloaded,
    /// Under active function-scope execution or mid-rehydration; never
    /// evicted.
    Pinned,
}

/// Mutable slot guarded by the entry monitor.
#[derive(Debug)]
struct EntrySlot {
    value: Option<Value>,
    status: EntryStatus,
    exec_time_ns: u64,
    orig_key: Option<LineageRef>,
    /// Set when the placeholder was removed without ever being valued;
    /// wakes waiters so they fall back to computing.
    abandoned: bool,
}

/// One cache record.
///
/// The engine's coarse lock guards membership (index, LRU position,
/// resident bytes); the entry's own monitor guards the value so a producer
/// can compute without serializing the whole cache behind it.
#[derive(Debug)]
pub struct CacheEntry {
    key: LineageRef,
    slot: Mutex<EntrySlot>,
    filled: Condvar,
    /// LRU arena slot; mutated only under the engine lock.
    lru_pos: AtomicUsize,
}

impl CacheEntry {
    /// Creates a value-less placeholder in the given status.
    #[must_use]
    pub fn placeholder(key: LineageRef, status: EntryStatus) -> Arc<Self> {
        Arc::new(Self {
            key,
            slot: Mutex::new(EntrySlot {
                value: None,
                status,
                exec_time_ns: 0,
                orig_key: None,
                abandoned: false,
            }),
            filled: Condvar::new(),
            lru_pos: AtomicUsize::new(UNLINKED),
        })
    }

    /// Creates a valued entry.
    #[must_use]
    pub fn with_value(
        key: LineageRef,
        value: Value,
        exec_time_ns: u64,
        status: EntryStatus,
    ) -> Arc<Self> {
        Arc::new(Self {
            key,
            slot: Mutex::new(EntrySlot {
                value: Some(value),
                status,
                exec_time_ns,
                orig_key: None,
                abandoned: false,
            }),
            filled: Condvar::new(),
            lru_pos: AtomicUsize::new(UNLINKED),
        })
    }

    /// The lineage key.
    #[must_use]
    pub fn key(&self) -> &LineageRef {
        &self.key
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> EntryStatus {
        self.slot.lock().status
    }

    /// Updates the status.
    pub fn set_status(&self, status: EntryStatus) {
        self.slot.lock().status = status;
    }

    /// Measured or estimated wall time to produce the value, nanoseconds.
    #[must_use]
    pub fn exec_time_ns(&self) -> u64 {
        self.slot.lock().exec_time_ns
    }

    /// Execution time in milliseconds, for eviction scoring.
    #[must_use]
    pub fn exec_time_ms(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let ms = self.exec_time_ns() as f64 / 1e6;
        ms
    }

    /// Non-blocking peek at the value.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.slot.lock().value.clone()
    }

    /// Blocks until the producer publishes the value, then returns it.
    ///
    /// Returns `None` when the placeholder was abandoned instead of valued;
    /// the caller falls back to computing. Must be called without the
    /// engine lock held.
    #[must_use]
    pub fn wait_value(&self) -> Option<Value> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(value) = &slot.value {
                return Some(value.clone());
            }
            if slot.abandoned {
                return None;
            }
            self.filled.wait(&mut slot);
        }
    }

    /// Publishes the value and wakes every waiting consumer.
    pub fn set_value(&self, value: Value, exec_time_ns: u64, status: EntryStatus) {
        let mut slot = self.slot.lock();
        slot.value = Some(value);
        slot.exec_time_ns = exec_time_ns;
        slot.status = status;
        drop(slot);
        self.filled.notify_all();
    }

    /// Marks a removed placeholder so blocked consumers stop waiting.
    pub(crate) fn abandon(&self) {
        let mut slot = self.slot.lock();
        slot.abandoned = true;
        drop(slot);
        self.filled.notify_all();
    }

    /// The upstream key this entry was cloned from during multi-level reuse.
    #[must_use]
    pub fn orig_key(&self) -> Option<LineageRef> {
        self.slot.lock().orig_key.clone()
    }

    /// Records the upstream key for multi-level lineage rewriting.
    pub fn set_orig_key(&self, orig: LineageRef) {
        self.slot.lock().orig_key = Some(orig);
    }

    /// Resident size contribution in bytes; placeholders contribute zero.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.slot
            .lock()
            .value
            .as_ref()
            .map_or(0, Value::in_memory_size)
    }

    /// True when the value is a matrix blob.
    #[must_use]
    pub fn is_matrix(&self) -> bool {
        self.slot
            .lock()
            .value
            .as_ref()
            .is_some_and(Value::is_matrix)
    }

    pub(crate) fn lru_pos(&self) -> usize {
        self.lru_pos.load(Ordering::Relaxed)
    }

    pub(crate) fn set_lru_pos(&self, pos: usize) {
        self.lru_pos.store(pos, Ordering::Relaxed);
    }
}

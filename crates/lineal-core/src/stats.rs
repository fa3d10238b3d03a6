//! Observable cache counters for tests and diagnostics.
//!
//! All counters are atomic for lock-free reads; the engine updates them
//! outside its coarse lock wherever possible.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Atomic counters maintained by the cache engine.
#[derive(Debug, Default)]
pub struct CacheStatistics {
    /// Instruction-level reuse hits (a `reuse` call that bound an output).
    inst_hits: AtomicU64,
    /// Hits served from resident memory.
    mem_hits: AtomicU64,
    /// Hits served by rehydrating a spilled entry from disk.
    disk_hits: AtomicU64,
    /// Probes of a key that was previously evicted outright.
    del_hits: AtomicU64,
    /// Values written into resident memory.
    mem_writes: AtomicU64,
    /// Entries dropped from resident memory by eviction.
    mem_deletes: AtomicU64,
    /// Spill files read back.
    fs_reads: AtomicU64,
    /// Spill files written.
    fs_writes: AtomicU64,
    /// Nanoseconds spent reading spill files.
    fs_read_ns: AtomicU64,
    /// Nanoseconds spent writing spill files.
    fs_write_ns: AtomicU64,
    /// Nanoseconds spent in the cost model during eviction.
    costing_ns: AtomicU64,
}

impl CacheStatistics {
    /// Creates a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_inst_hit(&self) {
        self.inst_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_mem_hit(&self) {
        self.mem_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_del_hit(&self) {
        self.del_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_mem_write(&self) {
        self.mem_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_mem_delete(&self) {
        self.mem_deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fs_read(&self, elapsed: Duration) {
        self.fs_reads.fetch_add(1, Ordering::Relaxed);
        self.fs_read_ns
            .fetch_add(duration_ns(elapsed), Ordering::Relaxed);
    }

    pub(crate) fn record_fs_write(&self, elapsed: Duration) {
        self.fs_writes.fetch_add(1, Ordering::Relaxed);
        self.fs_write_ns
            .fetch_add(duration_ns(elapsed), Ordering::Relaxed);
    }

    pub(crate) fn record_costing(&self, elapsed: Duration) {
        self.costing_ns
            .fetch_add(duration_ns(elapsed), Ordering::Relaxed);
    }

    /// Takes a consistent-enough snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            inst_hits: self.inst_hits.load(Ordering::Relaxed),
            mem_hits: self.mem_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            del_hits: self.del_hits.load(Ordering::Relaxed),
            mem_writes: self.mem_writes.load(Ordering::Relaxed),
            mem_deletes: self.mem_deletes.load(Ordering::Relaxed),
            fs_reads: self.fs_reads.load(Ordering::Relaxed),
            fs_writes: self.fs_writes.load(Ordering::Relaxed),
            fs_read_ns: self.fs_read_ns.load(Ordering::Relaxed),
            fs_write_ns: self.fs_write_ns.load(Ordering::Relaxed),
            costing_ns: self.costing_ns.load(Ordering::Relaxed),
        }
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        self.inst_hits.store(0, Ordering::Relaxed);
        self.mem_hits.store(0, Ordering::Relaxed);
        self.disk_hits.store(0, Ordering::Relaxed);
        self.del_hits.store(0, Ordering::Relaxed);
        self.mem_writes.store(0, Ordering::Relaxed);
        self.mem_deletes.store(0, Ordering::Relaxed);
        self.fs_reads.store(0, Ordering::Relaxed);
        self.fs_writes.store(0, Ordering::Relaxed);
        self.fs_read_ns.store(0, Ordering::Relaxed);
        self.fs_write_ns.store(0, Ordering::Relaxed);
        self.costing_ns.store(0, Ordering::Relaxed);
    }
}

fn duration_ns(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Instruction-level reuse hits.
    pub inst_hits: u64,
    /// Hits served from resident memory.
    pub mem_hits: u64,
    /// Hits served from disk.
    pub disk_hits: u64,
    /// Probes of previously evicted keys.
    pub del_hits: u64,
    /// Values written into resident memory.
    pub mem_writes: u64,
    /// Entries dropped by eviction.
    pub mem_deletes: u64,
    /// Spill files read.
    pub fs_reads: u64,
    /// Spill files written.
    pub fs_writes: u64,
    /// Time spent reading spill files, in nanoseconds.
    pub fs_read_ns: u64,
    /// Time spent writing spill files, in nanoseconds.
    pub fs_write_ns: u64,
    /// Time spent in the cost model, in nanoseconds.
    pub costing_ns: u64,
}

impl StatsSnapshot {
    /// Total hits across memory and disk.
    #[must_use]
    pub fn total_hits(&self) -> u64 {
        self.mem_hits + self.disk_hits
    }
}

impl std::fmt::Display for StatsSnapshot {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hits(inst/mem/disk/del): {}/{}/{}/{}, writes: {}, deletes: {}, \
             fs(r/w): {}/{} in {:.2}/{:.2} ms",
            self.inst_hits,
            self.mem_hits,
            self.disk_hits,
            self.del_hits,
            self.mem_writes,
            self.mem_deletes,
            self.fs_reads,
            self.fs_writes,
            self.fs_read_ns as f64 / 1e6,
            self.fs_write_ns as f64 / 1e6,
        )
    }
}

//! The coarse-locked cache engine.
//!
//! One mutex guards the keyed index, the LRU list, the spill index, and the
//! resident byte count. Entry values live behind per-entry monitors so a
//! producer computes without serializing the whole cache behind its key;
//! consumers that race the producer block on the entry, not the engine.
//!
//! The cache is best-effort: internal failures during `reuse` or `put`
//! degrade to cache-absent behavior and are logged, never surfaced to the
//! host computation.

use indexmap::IndexMap;
use parking_lot::Mutex;
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use std::time::Instant;

use tracing::{debug, warn};

use super::entry::{CacheEntry, EntryStatus, UNLINKED};
use super::eviction;
use super::lru::LruList;
use super::oracle::ReuseOracle;
use super::spill::{SpillRecord, SpillStore};
use crate::config::CacheConfig;
use crate::cost::CostEstimator;
use crate::error::Result;
use crate::lineage::LineageRef;
use crate::runtime::{ExecContext, Instruction, Value};
use crate::stats::CacheStatistics;

use std::sync::Arc;

/// External rewrite engine consulted for partial reuse.
///
/// A successful rewrite binds the instruction's output itself and counts as
/// a cache hit.
pub trait RewriteHook: Send + Sync {
    /// Attempts to satisfy the instruction by rewriting over cached
    /// lineage; returns true when the output was bound.
    fn try_rewrite(&self, inst: &Instruction, ctx: &mut ExecContext) -> bool;
}

/// Resident state guarded by the engine lock.
pub(crate) struct CacheInner {
    pub(crate) index: FxHashMap<LineageRef, Arc<CacheEntry>>,
    pub(crate) lru: LruList,
    /// Spilled keys in spill order, so reset cleanup and diagnostics walk
    /// files deterministically.
    pub(crate) spill_index: IndexMap<LineageRef, SpillRecord, FxBuildHasher>,
    pub(crate) removed: FxHashSet<LineageRef>,
    pub(crate) bytes_resident: u64,
    pub(crate) store: SpillStore,
}

/// Lineage-keyed computation reuse cache.
///
/// Shared process-wide by the runtime; all methods take `&self`.
pub struct LineageCache {
    config: CacheConfig,
    oracle: ReuseOracle,
    cost: CostEstimator,
    limit_bytes: u64,
    stats: CacheStatistics,
    rewrite_hook: Option<Box<dyn RewriteHook>>,
    inner: Mutex<CacheInner>,
}

impl LineageCache {
    /// Creates an engine from validated configuration.
    ///
    /// The byte budget is fixed here: the configured fraction of local max
    /// memory.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for invalid configuration.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_cost(config, CostEstimator::default())
    }

    /// Creates an engine with explicit cost factors.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for invalid configuration.
    pub fn with_cost(config: CacheConfig, cost: CostEstimator) -> Result<Self> {
        config.validate()?;
        let oracle = ReuseOracle::from_config(&config)?;
        let limit_bytes = config.cache_limit_bytes();
        let store = SpillStore::new(config.workdir.clone());
        Ok(Self {
            config,
            oracle,
            cost,
            limit_bytes,
            stats: CacheStatistics::new(),
            rewrite_hook: None,
            inner: Mutex::new(CacheInner {
                index: FxHashMap::default(),
                lru: LruList::new(),
                spill_index: IndexMap::default(),
                removed: FxHashSet::default(),
                bytes_resident: 0,
                store,
            }),
        })
    }

    /// Registers the external rewrite engine for partial reuse.
    pub fn set_rewrite_hook(&mut self, hook: Box<dyn RewriteHook>) {
        self.rewrite_hook = Some(hook);
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The observable counters.
    #[must_use]
    pub fn stats(&self) -> &CacheStatistics {
        &self.stats
    }

    /// The fixed resident byte budget.
    #[must_use]
    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    /// Current resident bytes.
    #[must_use]
    pub fn bytes_resident(&self) -> u64 {
        self.inner.lock().bytes_resident
    }

    /// Number of resident index entries (placeholders included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    /// True when no entry is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of spilled entries.
    #[must_use]
    pub fn spill_len(&self) -> usize {
        self.inner.lock().spill_index.len()
    }

    /// True when the key is resident or spilled. Never installs a
    /// placeholder and never touches recency.
    #[must_use]
    pub fn contains(&self, li: &LineageRef) -> bool {
        let inner = self.inner.lock();
        inner.index.contains_key(li) || inner.spill_index.contains_key(li)
    }

    /// Instruction-level reuse probe.
    ///
    /// On a hit the cached value is bound to the instruction's output
    /// variable (waiting out an in-flight producer if necessary) and true is
    /// returned. On a miss, a placeholder is installed when the instruction
    /// is marked for caching, then the partial-reuse hook is consulted.
    pub fn reuse(&self, inst: &Instruction, ctx: &mut ExecContext) -> bool {
        if self.config.is_disabled() || !self.oracle.is_reusable(inst, ctx) {
            return false;
        }
        let li = match inst.trace_output(ctx) {
            Ok(li) => li,
            Err(err) => {
                debug!(opcode = inst.opcode(), %err, "lineage tracing failed, skipping reuse");
                return false;
            }
        };
        if self.config.full_reuse() {
            if let Some(entry) = self.probe_or_install(&li, inst, EntryStatus::Empty) {
                if let Some(value) = entry.wait_value() {
                    let output = inst.output().name().to_string();
                    ctx.set_variable(output.clone(), value);
                    ctx.set_lineage(output, li.clone());
                    self.stats.record_inst_hit();
                    return true;
                }
                // The producer backed out; fall through and recompute.
            }
        }
        if self.config.partial_reuse() {
            if let Some(hook) = &self.rewrite_hook {
                if hook.try_rewrite(inst, ctx) {
                    self.stats.record_inst_hit();
                    return true;
                }
            }
        }
        false
    }

    /// Lower-level probe used by multi-level reuse.
    ///
    /// On a miss a `PINNED` placeholder is installed: function outputs under
    /// active execution must not be evicted.
    #[must_use]
    pub fn reuse_entry(&self, li: &LineageRef) -> Option<Arc<CacheEntry>> {
        let mut inner = self.inner.lock();
        match self.lookup_touch(&mut inner, li) {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => {
                Self::install_placeholder(&mut inner, li, EntryStatus::Pinned);
                None
            }
            Err(err) => {
                warn!(%err, "cache probe degraded to miss");
                None
            }
        }
    }

    /// Inserts a completed result under the instruction's output lineage.
    ///
    /// Fills an existing placeholder or creates a fresh entry; oversize
    /// values are dropped and never become resident.
    pub fn put(&self, inst: &Instruction, ctx: &ExecContext, exec_time_ns: u64) {
        if self.config.is_disabled()
            || !self.oracle.is_reusable(inst, ctx)
            || !self.oracle.is_marked_for_caching(inst)
        {
            return;
        }
        let Ok(li) = inst.trace_output(ctx) else {
            return;
        };
        let Some(value) = ctx.get_variable(inst.output().name()).cloned() else {
            return;
        };
        let exec_time_ns = self.effective_exec_time(inst, ctx, exec_time_ns);
        if let Err(err) = self.fill_or_insert(&li, value, exec_time_ns, None, true) {
            warn!(opcode = inst.opcode(), %err, "cache insert failed, proceeding uncached");
        }
    }

    /// Fills the placeholder installed at probe-miss time and wakes every
    /// consumer blocked on it.
    ///
    /// A no-op when no placeholder exists for the key.
    pub fn put_value(&self, inst: &Instruction, ctx: &ExecContext, exec_time_ns: u64) {
        if self.config.is_disabled() {
            return;
        }
        let Ok(li) = inst.trace_output(ctx) else {
            return;
        };
        let Some(value) = ctx.get_variable(inst.output().name()).cloned() else {
            return;
        };
        let exec_time_ns = self.effective_exec_time(inst, ctx, exec_time_ns);
        if let Err(err) = self.fill_or_insert(&li, value, exec_time_ns, None, false) {
            warn!(opcode = inst.opcode(), %err, "placeholder fill failed, proceeding uncached");
        }
    }

    /// Fills (or inserts) a value for a key; used by the multi-level
    /// protocol with `orig` carrying the upstream producing lineage.
    ///
    /// Returns false when the value failed admission.
    pub(crate) fn fill(
        &self,
        li: &LineageRef,
        value: Value,
        exec_time_ns: u64,
        orig: Option<LineageRef>,
    ) -> Result<bool> {
        self.fill_or_insert(li, value, exec_time_ns, orig, false)
    }

    /// Removes every entry for the given keys under one lock acquisition.
    ///
    /// The all-or-nothing backout of the multi-level protocol.
    pub(crate) fn remove_all(&self, lis: &[LineageRef]) {
        let mut inner = self.inner.lock();
        for li in lis {
            Self::remove_resident(&mut inner, li, false, &self.stats);
        }
    }

    /// Clears the index, the LRU list, the spill index, and resident bytes.
    ///
    /// Must not be called while producers hold placeholders; a consumer
    /// blocked on a cleared placeholder is never woken.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let CacheInner {
            index,
            lru,
            spill_index,
            removed,
            bytes_resident,
            store,
        } = &mut *inner;
        for record in spill_index.values() {
            store.discard(record);
        }
        index.clear();
        lru.clear();
        spill_index.clear();
        removed.clear();
        *bytes_resident = 0;
    }

    /// Backfills an unknown execution time from the flop model so eviction
    /// scoring still has a cost to work with; categories the model cannot
    /// score count as free.
    fn effective_exec_time(&self, inst: &Instruction, ctx: &ExecContext, exec_time_ns: u64) -> u64 {
        if exec_time_ns > 0 {
            return exec_time_ns;
        }
        let started = Instant::now();
        let estimate_ms = self.cost.recompute_time_ms(inst, ctx).unwrap_or(0.0);
        self.stats.record_costing(started.elapsed());
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let estimate_ns = (estimate_ms * 1e6) as u64;
        estimate_ns
    }

    fn probe_or_install(
        &self,
        li: &LineageRef,
        inst: &Instruction,
        miss_status: EntryStatus,
    ) -> Option<Arc<CacheEntry>> {
        let mut inner = self.inner.lock();
        match self.lookup_touch(&mut inner, li) {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => {
                if self.oracle.is_marked_for_caching(inst) {
                    Self::install_placeholder(&mut inner, li, miss_status);
                }
                None
            }
            Err(err) => {
                warn!(%err, "cache probe degraded to miss");
                None
            }
        }
    }

    /// Resident or spilled lookup with LRU touch; misses report delete-hits
    /// for previously evicted keys.
    fn lookup_touch(
        &self,
        inner: &mut CacheInner,
        li: &LineageRef,
    ) -> Result<Option<Arc<CacheEntry>>> {
        if let Some(entry) = inner.index.get(li).cloned() {
            let pos = entry.lru_pos();
            if pos != UNLINKED {
                inner.lru.touch(pos);
            }
            self.stats.record_mem_hit();
            return Ok(Some(entry));
        }
        if inner.spill_index.contains_key(li) {
            return self.rehydrate(inner, li).map(Some);
        }
        if inner.removed.contains(li) {
            self.stats.record_del_hit();
        }
        Ok(None)
    }

    /// Reads a spilled blob back and re-admits it.
    ///
    /// The fresh entry goes through the normal admission path pinned, so the
    /// eviction it may trigger cannot throw out the value being loaded.
    fn rehydrate(&self, inner: &mut CacheInner, li: &LineageRef) -> Result<Arc<CacheEntry>> {
        let record = match inner.spill_index.get(li) {
            Some(record) => record.clone(),
            None => {
                return Err(crate::error::Error::Internal(
                    "rehydrate called without a spill record".into(),
                ))
            }
        };
        let started = Instant::now();
        let block = match inner.store.read(&record) {
            Ok(block) => block,
            Err(err) => {
                // The blob is unrecoverable; forget it so later probes miss.
                inner.spill_index.swap_remove(li);
                inner.removed.insert(li.clone());
                return Err(err);
            }
        };
        self.stats.record_fs_read(started.elapsed());
        inner.spill_index.swap_remove(li);

        let value = Value::matrix(block);
        let size = value.in_memory_size();
        let entry = CacheEntry::with_value(
            li.clone(),
            value,
            record.exec_time_ns,
            EntryStatus::Pinned,
        );
        let admitted = eviction::make_space(
            self.config.spill_enabled,
            &self.cost,
            &self.stats,
            self.limit_bytes,
            inner,
            size,
        )?;
        if !admitted {
            // Nothing evictable was left; hand the value to the caller
            // without keeping it resident.
            entry.set_status(EntryStatus::Reloaded);
            self.stats.record_disk_hit();
            return Ok(entry);
        }
        inner.index.insert(li.clone(), entry.clone());
        self.link_entry(inner, entry.clone());
        inner.bytes_resident += size;
        entry.set_status(EntryStatus::Reloaded);
        self.stats.record_disk_hit();
        Ok(entry)
    }

    fn install_placeholder(
        inner: &mut CacheInner,
        li: &LineageRef,
        status: EntryStatus,
    ) -> Arc<CacheEntry> {
        let entry = CacheEntry::placeholder(li.clone(), status);
        inner.index.insert(li.clone(), entry.clone());
        inner.lru.push_head(entry.clone());
        entry
    }

    /// Links a valued entry at its policy position: recency order for `lru`,
    /// scored position otherwise.
    fn link_entry(&self, inner: &mut CacheInner, entry: Arc<CacheEntry>) {
        let policy = self.config.policy;
        if policy == crate::config::EvictionPolicy::Lru {
            inner.lru.push_head(entry);
            return;
        }
        let score = eviction::insertion_score(policy, &entry);
        inner
            .lru
            .push_scored(entry, score, |e| eviction::insertion_score(policy, e));
    }

    #[allow(clippy::needless_pass_by_value)]
    fn fill_or_insert(
        &self,
        li: &LineageRef,
        value: Value,
        exec_time_ns: u64,
        orig: Option<LineageRef>,
        insert_if_absent: bool,
    ) -> Result<bool> {
        let size = value.in_memory_size();
        let mut inner = self.inner.lock();

        // Oversize values never become resident, but a waiting consumer
        // still receives the producer's value through the entry monitor.
        if size > self.limit_bytes {
            if let Some(existing) = inner.index.remove(li) {
                let pos = existing.lru_pos();
                if pos != UNLINKED {
                    inner.lru.unlink(pos);
                }
                existing.set_value(value, exec_time_ns, EntryStatus::Cached);
            }
            debug!(size, limit = self.limit_bytes, "oversize value rejected");
            return Ok(false);
        }

        if let Some(existing) = inner.index.get(li).cloned() {
            if existing.value().is_some() {
                // Already valued; at-most-one-producer makes this a no-op.
                return Ok(true);
            }
            let admitted = eviction::make_space(
                self.config.spill_enabled,
                &self.cost,
                &self.stats,
                self.limit_bytes,
                &mut inner,
                size,
            )?;
            if !admitted {
                let pos = existing.lru_pos();
                if pos != UNLINKED {
                    inner.lru.unlink(pos);
                }
                inner.index.remove(li);
                existing.set_value(value, exec_time_ns, EntryStatus::Cached);
                return Ok(false);
            }
            existing.set_value(value, exec_time_ns, EntryStatus::Cached);
            if let Some(orig) = orig {
                existing.set_orig_key(orig);
            }
            inner.bytes_resident += size;
            // Reposition now that the size and time are known.
            let pos = existing.lru_pos();
            if pos != UNLINKED {
                inner.lru.unlink(pos);
            }
            self.link_entry(&mut inner, existing);
            self.stats.record_mem_write();
            return Ok(true);
        }

        if !insert_if_absent {
            return Ok(true);
        }

        let admitted = eviction::make_space(
            self.config.spill_enabled,
            &self.cost,
            &self.stats,
            self.limit_bytes,
            &mut inner,
            size,
        )?;
        if !admitted {
            return Ok(false);
        }
        let entry = CacheEntry::with_value(li.clone(), value, exec_time_ns, EntryStatus::Cached);
        if let Some(orig) = orig {
            entry.set_orig_key(orig);
        }
        inner.index.insert(li.clone(), entry.clone());
        self.link_entry(&mut inner, entry);
        inner.bytes_resident += size;
        self.stats.record_mem_write();
        Ok(true)
    }

    /// Drops a resident entry; optionally remembers the key for delete-hit
    /// accounting.
    pub(crate) fn remove_resident(
        inner: &mut CacheInner,
        li: &LineageRef,
        track_removed: bool,
        stats: &CacheStatistics,
    ) {
        if let Some(entry) = inner.index.remove(li) {
            let pos = entry.lru_pos();
            if pos != UNLINKED {
                inner.lru.unlink(pos);
            }
            inner.bytes_resident = inner.bytes_resident.saturating_sub(entry.size_bytes());
            if entry.value().is_none() {
                entry.abandon();
            }
            if track_removed {
                inner.removed.insert(li.clone());
                stats.record_mem_delete();
            }
        }
    }
}

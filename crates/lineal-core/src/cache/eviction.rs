//! Cost-based eviction.
//!
//! `make_space` walks the LRU list strictly tail-to-head. Policy differences
//! never change the visitation order; they change where new entries are
//! linked (scored insertion, low score near the tail) and which entries the
//! per-entry predicate skips, spills, or drops.

use std::time::Instant;

use tracing::{debug, trace};

use super::engine::{CacheInner, LineageCache};
use super::entry::{CacheEntry, EntryStatus};
use crate::config::EvictionPolicy;
use crate::cost::CostEstimator;
use crate::error::Result;
use crate::runtime::Value;
use crate::stats::CacheStatistics;

/// Knee of the spill/drop decision table, in milliseconds.
const TIME_KNEE_MS: f64 = 100.0;

/// Relative weight of the cost-per-size term in the hybrid score.
const HYBRID_COST_WEIGHT: f64 = 0.5;

/// Frees room for `need` bytes; returns false when the walk exhausted the
/// list without reaching the budget.
///
/// # Errors
///
/// Propagates spill-write failures; the affected entry stays resident.
pub(crate) fn make_space(
    spill_enabled: bool,
    cost: &CostEstimator,
    stats: &CacheStatistics,
    limit: u64,
    inner: &mut CacheInner,
    need: u64,
) -> Result<bool> {
    let mut cursor = inner.lru.tail();
    while inner.bytes_resident + need > limit {
        let Some(slot) = cursor else {
            break;
        };
        let entry = inner.lru.entry(slot).clone();
        cursor = inner.lru.toward_head(slot);

        match entry.status() {
            // Placeholders under production and pinned function outputs
            // are never evicted.
            EntryStatus::Empty | EntryStatus::Pinned => continue,
            EntryStatus::Cached | EntryStatus::Reloaded => {}
        }
        let Some(value) = entry.value() else {
            continue;
        };

        if !spill_enabled {
            drop_entry(inner, &entry, stats);
            continue;
        }

        match &value {
            Value::Scalar(_) => {
                // Scalars cannot be spilled; cheap ones are dropped,
                // expensive ones stay for multi-level reuse.
                if entry.exec_time_ms() < TIME_KNEE_MS {
                    drop_entry(inner, &entry, stats);
                }
            }
            Value::Matrix(block) => {
                let costing = Instant::now();
                let spill_ms = cost.spill_time_ms(block);
                stats.record_costing(costing.elapsed());
                let exec_ms = entry.exec_time_ms();
                let spill = if spill_ms < TIME_KNEE_MS {
                    exec_ms >= TIME_KNEE_MS
                } else {
                    exec_ms > spill_ms
                };
                if spill {
                    spill_entry(inner, &entry, stats)?;
                } else {
                    drop_entry(inner, &entry, stats);
                }
            }
        }
    }
    Ok(inner.bytes_resident + need <= limit)
}

/// Score placing an entry along the LRU list at insertion time.
///
/// Smaller scores sit closer to the tail and are considered for eviction
/// first; `lru` pins every insertion to the head so recency alone orders
/// the list.
pub(crate) fn insertion_score(policy: EvictionPolicy, entry: &CacheEntry) -> f64 {
    match policy {
        EvictionPolicy::Lru => f64::INFINITY,
        EvictionPolicy::CostNSize => cost_per_size(entry),
        EvictionPolicy::DagHeight => f64::from(entry.key().dag_height()),
        EvictionPolicy::Hybrid => {
            HYBRID_COST_WEIGHT * cost_per_size(entry)
                + (1.0 - HYBRID_COST_WEIGHT) * f64::from(entry.key().dag_height())
        }
    }
}

/// Execution time per megabyte of resident size.
fn cost_per_size(entry: &CacheEntry) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let size_mb = entry.size_bytes().max(1) as f64 / (1024.0 * 1024.0);
    entry.exec_time_ms() / size_mb
}

fn drop_entry(inner: &mut CacheInner, entry: &CacheEntry, stats: &CacheStatistics) {
    trace!(key = entry.key().id(), "evicting entry");
    let key = entry.key().clone();
    LineageCache::remove_resident(inner, &key, true, stats);
}

fn spill_entry(inner: &mut CacheInner, entry: &CacheEntry, stats: &CacheStatistics) -> Result<()> {
    let value = entry.value();
    let block = super::spill::spillable_block(value.as_ref())?;
    let key = entry.key().clone();
    let started = Instant::now();
    let record = inner.store.write(&key, block, entry.exec_time_ns())?;
    stats.record_fs_write(started.elapsed());
    debug!(key = key.id(), path = %record.path.display(), "spilled entry");
    inner.spill_index.insert(key.clone(), record);
    LineageCache::remove_resident(inner, &key, false, stats);
    Ok(())
}

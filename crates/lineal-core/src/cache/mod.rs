//! The cache engine and its supporting structures.
//!
//! - `entry`: cache entries with per-entry producer/consumer monitors
//! - `lru`: arena-based intrusive LRU list
//! - `oracle`: admission and reusability predicates
//! - `engine`: the coarse-locked engine (`reuse`, `put`, `put_value`, `reset`)
//! - `eviction`: tail-to-head eviction walk with policy scoring
//! - `spill`: spill store (serialize evicted blobs, rehydrate on demand)
//! - `multilevel`: all-or-nothing function-scope reuse protocol

mod engine;
mod entry;
mod eviction;
mod lru;
mod multilevel;
mod oracle;
mod spill;

#[cfg(test)]
mod engine_tests;
#[cfg(test)]
mod lru_tests;
#[cfg(test)]
mod oracle_tests;

pub use engine::{LineageCache, RewriteHook};
pub use entry::{CacheEntry, EntryStatus};
pub use multilevel::{FunctionOutput, MultiLevelReuse};
pub use oracle::{ReuseOracle, DEFAULT_REUSABLE_OPCODES};
pub use spill::SpillRecord;

//! # Lineal Core
//!
//! Lineage-driven computation reuse cache for matrix runtimes.
//!
//! Before executing an instruction, the runtime asks the cache whether a
//! result with the exact same lineage already exists. On a hit the cached
//! artifact is rebound to the output variable and execution is skipped; on
//! a miss the computation proceeds and its result is inserted, subject to
//! admission and cost-based eviction with optional spill-to-disk.
//!
//! ## Features
//!
//! - **Lineage DAG keys**: memoized structural hashing, equality that sees
//!   through dedup patches and placeholders, cycle-safe traversal
//! - **Placeholder coordination**: at most one concurrent computation per
//!   lineage key; racing consumers block on the producer's entry
//! - **Cost-based eviction**: `lru`, `costnsize`, `dagheight`, and `hybrid`
//!   policies over one recency list, with a spill/drop decision table
//! - **Function-scope reuse**: all-or-nothing caching of a call's outputs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lineal_core::{CacheConfig, LineageCache};
//!
//! let cache = LineageCache::new(CacheConfig::default())?;
//!
//! // Probe before executing; a hit binds the output variable in ctx.
//! if !cache.reuse(&inst, &mut ctx) {
//!     execute(&inst, &mut ctx);
//!     cache.put_value(&inst, &ctx, elapsed_ns);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod cost;
pub mod error;
pub mod lineage;
pub mod runtime;
pub mod stats;


pub use cache::{
    CacheEntry, EntryStatus, FunctionOutput, LineageCache, MultiLevelReuse, RewriteHook,
};
pub use config::{CacheConfig, CacheType, EvictionPolicy};
pub use error::{Error, Result};
pub use lineage::{LineageItem, LineageKind, LineageRef};
pub use runtime::{ExecContext, Instruction, MatrixBlock, Operand, ScalarValue, Value};
pub use stats::{CacheStatistics, StatsSnapshot};

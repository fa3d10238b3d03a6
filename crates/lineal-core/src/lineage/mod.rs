//! Lineage DAG nodes used as cache keys.
//!
//! A lineage item records one computation step: an opcode, a data literal,
//! and ordered edges to the items that produced its operands. Structural
//! hashing is memoized at construction; equality is an iterative, cycle-safe
//! DFS that sees through dedup patches and placeholder nodes.

mod item;

pub use item::{
    LineageItem, LineageKind, LineageRef, DEDUP_OPCODE_PREFIX, PLACEHOLDER_OPCODE_PREFIX,
};

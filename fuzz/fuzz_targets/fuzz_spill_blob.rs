//! Fuzz target for spill blob decoding.
//!
//! Rehydration reads binary blobs back from the spill directory and makes
//! allocations based on the decoded dimensions. A corrupted or truncated
//! blob must surface a serialization error, never a panic or an unbounded
//! allocation.

#![no_main]

use libfuzzer_sys::fuzz_target;
use lineal_core::MatrixBlock;

/// Maximum decoded payload accepted during fuzzing (16MB).
const MAX_BLOB_SIZE: usize = 16 * 1024 * 1024;

fuzz_target!(|data: &[u8]| {
    if data.len() > MAX_BLOB_SIZE {
        return;
    }
    // Any input must decode cleanly or fail with an error.
    if let Ok(block) = bincode::deserialize::<MatrixBlock>(data) {
        // Decoded blocks must be internally consistent.
        let cells = block.num_rows().saturating_mul(block.num_cols());
        let _ = block.num_nnz() <= cells;
        let _ = block.in_memory_size();
    }
});

//! Engine tests: probe, placeholder fill, admission, reset.

use super::engine::LineageCache;
use super::entry::EntryStatus;
use crate::config::{CacheConfig, EvictionPolicy};
use crate::lineage::LineageItem;
use crate::runtime::{ExecContext, Instruction, MatrixBlock, Operand, ScalarValue, Value};

/// Engine with an exact byte budget.
fn cache_with_limit(limit: u64, policy: EvictionPolicy, spill: bool) -> LineageCache {
    let config = CacheConfig {
        memory_limit_bytes: Some(limit),
        cache_fraction: 1.0,
        policy,
        spill_enabled: spill,
        ..CacheConfig::default()
    };
    LineageCache::new(config).expect("valid config")
}

fn block(rows: u64, cols: u64) -> MatrixBlock {
    MatrixBlock::filled(rows, cols, 1.0).expect("block")
}

fn unary(opcode: &str, input: &str, output: &str) -> Instruction {
    Instruction::new(opcode, vec![Operand::matrix(input)], Operand::matrix(output))
}

/// Seeds `name` with a matrix and a creation lineage so instructions over it
/// trace deterministically.
fn seed(ctx: &mut ExecContext, name: &str, rows: u64, cols: u64) {
    ctx.set_matrix_output(name, block(rows, cols));
    ctx.set_lineage(name, LineageItem::creation("rand", name));
}

/// Runs one instruction through the reuse protocol, computing `value` on a
/// miss. Returns true on a hit.
fn execute(
    cache: &LineageCache,
    ctx: &mut ExecContext,
    inst: &Instruction,
    value: Value,
    exec_time_ns: u64,
) -> bool {
    if cache.reuse(inst, ctx) {
        return true;
    }
    let li = inst.trace_output(ctx).expect("trace");
    ctx.set_variable(inst.output().name().to_string(), value);
    ctx.set_lineage(inst.output().name().to_string(), li);
    cache.put_value(inst, ctx, exec_time_ns);
    false
}

#[test]
fn test_miss_then_hit() {
    let cache = cache_with_limit(1 << 20, EvictionPolicy::Lru, false);
    let mut ctx = ExecContext::new();
    seed(&mut ctx, "X", 16, 16);

    let inst = unary("tsmm", "X", "Y");
    assert!(!execute(&cache, &mut ctx, &inst, Value::matrix(block(16, 16)), 1_000_000));
    assert!(execute(&cache, &mut ctx, &inst, Value::matrix(block(16, 16)), 1_000_000));

    let snap = cache.stats().snapshot();
    assert_eq!(snap.inst_hits, 1);
    assert_eq!(snap.mem_writes, 1);
}

#[test]
fn test_hit_binds_output_variable() {
    let cache = cache_with_limit(1 << 20, EvictionPolicy::Lru, false);
    let mut ctx = ExecContext::new();
    seed(&mut ctx, "X", 16, 16);

    let inst = unary("tsmm", "X", "Y");
    let produced = Value::matrix(MatrixBlock::filled(16, 16, 7.0).expect("block"));
    execute(&cache, &mut ctx, &inst, produced.clone(), 1_000_000);

    // Fresh context with the same input lineage: the hit rebinds Y.
    let mut ctx2 = ExecContext::new();
    seed(&mut ctx2, "X", 16, 16);
    let rebound = unary("tsmm", "X", "Y2");
    assert!(cache.reuse(&rebound, &mut ctx2));
    assert_eq!(ctx2.get_variable("Y2"), Some(&produced));
    assert!(ctx2.get_lineage("Y2").is_some());
}

#[test]
fn test_disabled_cache_never_hits() {
    let cache = LineageCache::new(CacheConfig::disabled()).expect("valid config");
    let mut ctx = ExecContext::new();
    seed(&mut ctx, "X", 8, 8);

    let inst = unary("tsmm", "X", "Y");
    assert!(!execute(&cache, &mut ctx, &inst, Value::matrix(block(8, 8)), 0));
    assert!(!execute(&cache, &mut ctx, &inst, Value::matrix(block(8, 8)), 0));
    assert_eq!(cache.len(), 0);
}

#[test]
fn test_non_reusable_opcode_not_probed() {
    let cache = cache_with_limit(1 << 20, EvictionPolicy::Lru, false);
    let mut ctx = ExecContext::new();
    seed(&mut ctx, "X", 8, 8);

    let inst = unary("print", "X", "Y");
    assert!(!cache.reuse(&inst, &mut ctx));
    assert_eq!(cache.len(), 0);
}

#[test]
fn test_placeholder_occupies_slot_at_zero_size() {
    let cache = cache_with_limit(1 << 20, EvictionPolicy::Lru, false);
    let mut ctx = ExecContext::new();
    seed(&mut ctx, "X", 8, 8);

    assert!(!cache.reuse(&unary("tsmm", "X", "Y"), &mut ctx));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.bytes_resident(), 0);
}

#[test]
fn test_put_inserts_without_prior_probe() {
    let cache = cache_with_limit(1 << 20, EvictionPolicy::Lru, false);
    let mut ctx = ExecContext::new();
    seed(&mut ctx, "X", 16, 16);

    let inst = unary("tsmm", "X", "Y");
    let li = inst.trace_output(&ctx).expect("trace");
    ctx.set_matrix_output("Y", block(16, 16));
    ctx.set_lineage("Y", li);
    cache.put(&inst, &ctx, 5_000_000);

    assert_eq!(cache.len(), 1);
    assert!(cache.bytes_resident() > 0);

    let mut ctx2 = ExecContext::new();
    seed(&mut ctx2, "X", 16, 16);
    assert!(cache.reuse(&unary("tsmm", "X", "Z"), &mut ctx2));
}

#[test]
fn test_put_value_without_placeholder_is_noop() {
    let cache = cache_with_limit(1 << 20, EvictionPolicy::Lru, false);
    let mut ctx = ExecContext::new();
    seed(&mut ctx, "X", 8, 8);

    let inst = unary("tsmm", "X", "Y");
    ctx.set_matrix_output("Y", block(8, 8));
    cache.put_value(&inst, &ctx, 0);
    assert_eq!(cache.len(), 0);
}

#[test]
fn test_oversize_value_never_becomes_resident() {
    // Budget far below one 64x64 block.
    let cache = cache_with_limit(1000, EvictionPolicy::Lru, false);
    let mut ctx = ExecContext::new();
    seed(&mut ctx, "X", 64, 64);

    let inst = unary("tsmm", "X", "Y");
    assert!(!execute(&cache, &mut ctx, &inst, Value::matrix(block(64, 64)), 1_000_000));

    assert_eq!(cache.bytes_resident(), 0);
    assert_eq!(cache.len(), 0);

    // The subsequent probe is a miss.
    let mut ctx2 = ExecContext::new();
    seed(&mut ctx2, "X", 64, 64);
    assert!(!cache.reuse(&unary("tsmm", "X", "Z"), &mut ctx2));
    assert_eq!(cache.stats().snapshot().inst_hits, 0);
}

#[test]
fn test_oversize_fill_still_wakes_waiters() {
    let cache = std::sync::Arc::new(cache_with_limit(1000, EvictionPolicy::Lru, false));
    let li = LineageItem::creation("rand", "X");

    // Producer path: placeholder, then an oversize fill.
    assert!(cache.reuse_entry(&li).is_none());
    let producer = {
        let cache = std::sync::Arc::clone(&cache);
        let li = li.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            let ok = cache
                .fill(&li, Value::matrix(block(64, 64)), 0, None)
                .expect("fill");
            assert!(!ok, "oversize fill must be rejected");
        })
    };
    let probed = cache.reuse_entry(&li).expect("placeholder hit");
    let value = probed.wait_value().expect("producer value");
    assert!(value.is_matrix());
    producer.join().expect("join");

    assert_eq!(cache.bytes_resident(), 0);
}

#[test]
fn test_bytes_resident_tracks_sum_of_entries() {
    let cache = cache_with_limit(1 << 20, EvictionPolicy::Lru, false);
    let mut expected = 0;
    for (i, dim) in [8u64, 16, 24].iter().enumerate() {
        let input = format!("X{i}");
        let mut ctx = ExecContext::new();
        seed(&mut ctx, &input, *dim, *dim);
        let inst = unary("tsmm", &input, &format!("Y{i}"));
        let value = Value::matrix(block(*dim, *dim));
        expected += value.in_memory_size();
        execute(&cache, &mut ctx, &inst, value, 1_000_000);
    }
    assert_eq!(cache.bytes_resident(), expected);
    assert!(cache.bytes_resident() <= cache.limit_bytes());
}

#[test]
fn test_delete_hit_counted_on_probe_of_evicted_key() {
    // Room for one 32x32 block only; spill disabled drops outright.
    let size = block(32, 32).in_memory_size();
    let cache = cache_with_limit(size + 100, EvictionPolicy::Lru, false);

    let mut ctx = ExecContext::new();
    seed(&mut ctx, "A", 32, 32);
    seed(&mut ctx, "B", 32, 32);

    let inst_a = unary("tsmm", "A", "Y");
    let inst_b = unary("tsmm", "B", "Z");
    execute(&cache, &mut ctx, &inst_a, Value::matrix(block(32, 32)), 1_000);
    execute(&cache, &mut ctx, &inst_b, Value::matrix(block(32, 32)), 1_000);

    // A was evicted to make room for B.
    assert_eq!(cache.stats().snapshot().mem_deletes, 1);
    assert!(!cache.reuse(&unary("tsmm", "A", "Y2"), &mut ctx));
    assert_eq!(cache.stats().snapshot().del_hits, 1);
}

#[test]
fn test_reset_clears_everything() {
    let cache = cache_with_limit(1 << 20, EvictionPolicy::Lru, false);
    let mut ctx = ExecContext::new();
    seed(&mut ctx, "X", 16, 16);
    execute(
        &cache,
        &mut ctx,
        &unary("tsmm", "X", "Y"),
        Value::matrix(block(16, 16)),
        1_000_000,
    );
    assert!(!cache.is_empty());

    cache.reset();
    assert!(cache.is_empty());
    assert_eq!(cache.bytes_resident(), 0);
    assert_eq!(cache.spill_len(), 0);
}

#[test]
fn test_scalar_values_are_cacheable() {
    let cache = cache_with_limit(1 << 20, EvictionPolicy::Lru, false);
    let mut ctx = ExecContext::new();
    seed(&mut ctx, "X", 16, 16);

    let inst = Instruction::new("nrow", vec![Operand::matrix("X")], Operand::scalar("n"));
    assert!(!cache.reuse(&inst, &mut ctx));
    ctx.set_scalar_output("n", ScalarValue::I64(16));
    ctx.set_lineage("n", inst.trace_output(&ctx).expect("trace"));
    cache.put_value(&inst, &ctx, 1_000);

    let mut ctx2 = ExecContext::new();
    seed(&mut ctx2, "X", 16, 16);
    let probe = Instruction::new("nrow", vec![Operand::matrix("X")], Operand::scalar("n2"));
    assert!(cache.reuse(&probe, &mut ctx2));
    assert_eq!(
        ctx2.get_variable("n2"),
        Some(&Value::Scalar(ScalarValue::I64(16)))
    );
}

#[test]
fn test_unknown_exec_time_backfilled_from_cost_model() {
    let cache = cache_with_limit(1 << 20, EvictionPolicy::Lru, false);
    let mut ctx = ExecContext::new();
    seed(&mut ctx, "X", 512, 512);

    // Report no measured time; the flop model supplies the estimate.
    let inst = unary("tsmm", "X", "Y");
    execute(&cache, &mut ctx, &inst, Value::matrix(block(16, 16)), 0);

    let li = inst.trace_output(&ctx).expect("trace");
    let entry = cache.reuse_entry(&li).expect("resident");
    assert!(entry.exec_time_ns() > 0);
}

#[test]
fn test_entry_status_transitions() {
    let cache = cache_with_limit(1 << 20, EvictionPolicy::Lru, false);
    let li = LineageItem::creation("rand", "X");

    assert!(cache.reuse_entry(&li).is_none());
    let entry = cache.reuse_entry(&li).expect("placeholder probe hits");
    assert_eq!(entry.status(), EntryStatus::Pinned);

    cache
        .fill(&li, Value::matrix(block(8, 8)), 500, None)
        .expect("fill");
    assert_eq!(entry.status(), EntryStatus::Cached);
    assert!(entry.value().is_some());
}

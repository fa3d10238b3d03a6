//! Concurrency tests for placeholder coordination.
//!
//! Uses finite operations per thread; every scenario asserts the
//! at-most-one-producer guarantee rather than timing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lineal_core::{
    CacheConfig, EvictionPolicy, ExecContext, Instruction, LineageCache, LineageItem, MatrixBlock,
    Operand, Value,
};

fn cache() -> Arc<LineageCache> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let config = CacheConfig {
        memory_limit_bytes: Some(1 << 22),
        cache_fraction: 1.0,
        policy: EvictionPolicy::Lru,
        spill_enabled: false,
        ..CacheConfig::default()
    };
    Arc::new(LineageCache::new(config).expect("valid config"))
}

fn seeded_ctx(input: &str) -> ExecContext {
    let mut ctx = ExecContext::new();
    ctx.set_matrix_output(input, MatrixBlock::filled(16, 16, 1.0).expect("block"));
    ctx.set_lineage(input, LineageItem::creation("read", input));
    ctx
}

fn tsmm(input: &str, output: &str) -> Instruction {
    Instruction::new("tsmm", vec![Operand::matrix(input)], Operand::matrix(output))
}

/// Two threads race on the same key: exactly one computes, the other
/// receives the producer's value.
#[test]
fn test_two_threads_one_producer() {
    let cache = cache();
    let computes = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    for t in 0..2 {
        let cache = Arc::clone(&cache);
        let computes = Arc::clone(&computes);
        handles.push(thread::spawn(move || {
            let mut ctx = seeded_ctx("X");
            let inst = tsmm("X", &format!("Y{t}"));
            if cache.reuse(&inst, &mut ctx) {
                ctx.get_variable(&format!("Y{t}")).cloned().expect("bound")
            } else {
                computes.fetch_add(1, Ordering::Relaxed);
                // Simulated computation long enough for the peer to block.
                thread::sleep(Duration::from_millis(50));
                let produced = Value::matrix(MatrixBlock::filled(16, 16, 9.0).expect("block"));
                ctx.set_variable(format!("Y{t}"), produced.clone());
                ctx.set_lineage(
                    format!("Y{t}"),
                    inst.trace_output(&ctx).expect("trace"),
                );
                cache.put_value(&inst, &ctx, 1_000_000);
                produced
            }
        }));
    }

    let results: Vec<Value> = handles
        .into_iter()
        .map(|h| h.join().expect("thread join"))
        .collect();

    assert_eq!(computes.load(Ordering::Relaxed), 1, "exactly one producer");
    assert_eq!(results[0], results[1]);
    // The index holds exactly one entry for the key.
    assert_eq!(cache.len(), 1);
}

/// Many threads, many keys: per key there is exactly one producer and every
/// consumer observes that producer's value.
#[test]
fn test_stress_many_threads_per_key() {
    let cache = cache();
    let num_keys: usize = 4;
    let threads_per_key: usize = 6;
    let computes: Arc<Vec<AtomicU64>> =
        Arc::new((0..num_keys).map(|_| AtomicU64::new(0)).collect());

    let mut handles = Vec::new();
    for k in 0..num_keys {
        for t in 0..threads_per_key {
            let cache = Arc::clone(&cache);
            let computes = Arc::clone(&computes);
            handles.push(thread::spawn(move || {
                let input = format!("X{k}");
                let mut ctx = seeded_ctx(&input);
                let out = format!("Y{k}_{t}");
                let inst = tsmm(&input, &out);
                if cache.reuse(&inst, &mut ctx) {
                    ctx.get_variable(&out).cloned().expect("bound")
                } else {
                    computes[k].fetch_add(1, Ordering::Relaxed);
                    thread::sleep(Duration::from_millis(10));
                    #[allow(clippy::cast_precision_loss)]
                    let produced =
                        Value::matrix(MatrixBlock::filled(16, 16, k as f64).expect("block"));
                    ctx.set_variable(out.clone(), produced.clone());
                    ctx.set_lineage(out.clone(), inst.trace_output(&ctx).expect("trace"));
                    cache.put_value(&inst, &ctx, 1_000_000);
                    produced
                }
            }));
        }
    }

    let results: Vec<Value> = handles
        .into_iter()
        .map(|h| h.join().expect("thread join"))
        .collect();

    for k in 0..num_keys {
        assert_eq!(
            computes[k].load(Ordering::Relaxed),
            1,
            "exactly one producer for key {k}"
        );
        #[allow(clippy::cast_precision_loss)]
        let expected = Value::matrix(MatrixBlock::filled(16, 16, k as f64).expect("block"));
        for t in 0..threads_per_key {
            assert_eq!(results[k * threads_per_key + t], expected);
        }
    }
    assert_eq!(cache.len(), num_keys);
}

/// Readers that arrive after the producer finished hit without blocking.
#[test]
fn test_late_readers_hit_resident_value() {
    let cache = cache();
    let mut ctx = seeded_ctx("X");
    let inst = tsmm("X", "Y");
    assert!(!cache.reuse(&inst, &mut ctx));
    ctx.set_matrix_output("Y", MatrixBlock::filled(16, 16, 3.0).expect("block"));
    ctx.set_lineage("Y", inst.trace_output(&ctx).expect("trace"));
    cache.put_value(&inst, &ctx, 1_000_000);

    let mut handles = Vec::new();
    for t in 0..4 {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            let mut ctx = seeded_ctx("X");
            let inst = tsmm("X", &format!("Z{t}"));
            assert!(cache.reuse(&inst, &mut ctx));
        }));
    }
    for h in handles {
        h.join().expect("thread join");
    }
    assert_eq!(cache.stats().snapshot().inst_hits, 4);
}

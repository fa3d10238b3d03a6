//! Probe and insert throughput over shared lineage DAGs.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lineal_core::{
    CacheConfig, EvictionPolicy, ExecContext, Instruction, LineageCache, LineageItem, LineageRef,
    MatrixBlock, Operand, Value,
};

fn deep_chain(depth: usize) -> LineageRef {
    let mut li = LineageItem::creation("read", "X");
    for _ in 0..depth {
        li = LineageItem::instruction("r'", "", vec![li]).expect("valid instruction");
    }
    li
}

fn bench_structural_hash(c: &mut Criterion) {
    let li = deep_chain(256);
    c.bench_function("structural_hash_memoized", |b| {
        b.iter(|| black_box(li.structural_hash()));
    });
}

fn bench_equality(c: &mut Criterion) {
    let a = deep_chain(256);
    let b_item = deep_chain(256);
    c.bench_function("equality_deep_chain", |b| {
        b.iter(|| black_box(a.as_ref() == b_item.as_ref()));
    });
}

fn bench_probe_hit(c: &mut Criterion) {
    let config = CacheConfig {
        memory_limit_bytes: Some(1 << 26),
        cache_fraction: 1.0,
        policy: EvictionPolicy::CostNSize,
        spill_enabled: false,
        ..CacheConfig::default()
    };
    let cache = LineageCache::new(config).expect("valid config");

    let mut ctx = ExecContext::new();
    let instructions: Vec<Instruction> = (0..1024)
        .map(|i| {
            let input = format!("X{i}");
            ctx.set_matrix_output(&input, MatrixBlock::filled(8, 8, 1.0).expect("block"));
            ctx.set_lineage(&input, LineageItem::creation("read", &input));
            Instruction::new(
                "tsmm",
                vec![Operand::matrix(&input)],
                Operand::matrix(format!("Y{i}")),
            )
        })
        .collect();
    for inst in &instructions {
        assert!(!cache.reuse(inst, &mut ctx));
        let li = inst.trace_output(&ctx).expect("trace");
        let output = inst.output().name().to_string();
        ctx.set_variable(
            output.clone(),
            Value::matrix(MatrixBlock::filled(8, 8, 1.0).expect("block")),
        );
        ctx.set_lineage(output, li);
        cache.put_value(inst, &ctx, 1_000_000);
    }

    let mut i = 0;
    c.bench_function("probe_resident_hit", |b| {
        b.iter(|| {
            i = (i + 1) % instructions.len();
            black_box(cache.reuse(&instructions[i], &mut ctx));
        });
    });
}

criterion_group!(
    benches,
    bench_structural_hash,
    bench_equality,
    bench_probe_hit
);
criterion_main!(benches);

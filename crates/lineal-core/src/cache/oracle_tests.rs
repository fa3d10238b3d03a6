//! Reusability and admission predicate tests.

use super::oracle::ReuseOracle;
use crate::config::CacheConfig;
use crate::runtime::{ExecContext, Instruction, MatrixBlock, Operand};

fn oracle(config: &CacheConfig) -> ReuseOracle {
    ReuseOracle::from_config(config).expect("valid config")
}

fn unary(opcode: &str) -> Instruction {
    Instruction::new(opcode, vec![Operand::matrix("X")], Operand::matrix("Y"))
}

#[test]
fn test_allow_list_membership() {
    let oracle = oracle(&CacheConfig::default());
    let ctx = ExecContext::new();
    assert!(oracle.is_reusable(&unary("tsmm"), &ctx));
    assert!(oracle.is_reusable(&unary("ba+*"), &ctx));
    assert!(oracle.is_reusable(&unary("solve"), &ctx));
    assert!(!oracle.is_reusable(&unary("ctable"), &ctx));
    assert!(!oracle.is_reusable(&unary("print"), &ctx));
}

#[test]
fn test_spoof_substring_is_always_reusable() {
    let oracle = oracle(&CacheConfig::default());
    let ctx = ExecContext::new();
    assert!(oracle.is_reusable(&unary("spoofCellwise_f7"), &ctx));
}

#[test]
fn test_append_requires_vector_operand() {
    let oracle = oracle(&CacheConfig::default());

    let inst = Instruction::new(
        "append",
        vec![Operand::matrix("A"), Operand::matrix("v")],
        Operand::matrix("B"),
    );

    let mut ctx = ExecContext::new();
    ctx.set_matrix_output("A", MatrixBlock::filled(10, 10, 1.0).expect("block"));
    ctx.set_matrix_output("v", MatrixBlock::filled(10, 10, 1.0).expect("block"));
    assert!(!oracle.is_reusable(&inst, &ctx));

    ctx.set_matrix_output("v", MatrixBlock::filled(10, 1, 1.0).expect("block"));
    assert!(oracle.is_reusable(&inst, &ctx));
}

#[test]
fn test_opcode_override_replaces_allow_list() {
    let config = CacheConfig {
        reusable_opcodes: Some(vec!["ctable".into()]),
        ..CacheConfig::default()
    };
    let oracle = oracle(&config);
    let ctx = ExecContext::new();
    assert!(oracle.is_reusable(&unary("ctable"), &ctx));
    assert!(!oracle.is_reusable(&unary("tsmm"), &ctx));
}

#[test]
fn test_marking_defaults_to_everything() {
    let oracle = oracle(&CacheConfig::default());
    assert!(oracle.is_marked_for_caching(&unary("tsmm")));
}

#[test]
fn test_compiler_assisted_gates_matrix_outputs() {
    let config = CacheConfig {
        comp_assisted_rw: true,
        ..CacheConfig::default()
    };
    let oracle = oracle(&config);

    // Unmarked matrix output stays out of the cache.
    assert!(!oracle.is_marked_for_caching(&unary("tsmm")));
    assert!(oracle.is_marked_for_caching(&unary("tsmm").with_cache_mark()));

    // Scalar outputs are always admitted.
    let scalar_out = Instruction::new("nrow", vec![Operand::matrix("X")], Operand::scalar("n"));
    assert!(oracle.is_marked_for_caching(&scalar_out));
}

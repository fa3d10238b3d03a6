//! Admission and reusability predicates.

use rustc_hash::FxHashSet;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::runtime::{ExecContext, Instruction, OperandKind};

/// Default allow-list of opcodes whose results are worth probing for.
pub const DEFAULT_REUSABLE_OPCODES: &[&str] = &[
    "tsmm",
    "ba+*",
    "*",
    "/",
    "+",
    "nrow",
    "ncol",
    "rightIndex",
    "leftIndex",
    "groupedagg",
    "r'",
    "solve",
    "append",
];

/// Stateless predicates deciding which instructions are cacheable and which
/// outputs are admissible.
#[derive(Debug)]
pub struct ReuseOracle {
    opcodes: FxHashSet<String>,
    comp_assisted_rw: bool,
}

impl ReuseOracle {
    /// Builds the oracle from configuration, applying the allow-list
    /// override when present.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid override (validated by
    /// [`CacheConfig::validate`]).
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let opcodes = match &config.reusable_opcodes {
            Some(ops) => ops.iter().cloned().collect(),
            None => DEFAULT_REUSABLE_OPCODES
                .iter()
                .map(|op| (*op).to_string())
                .collect(),
        };
        Ok(Self {
            opcodes,
            comp_assisted_rw: config.comp_assisted_rw,
        })
    }

    /// True when the instruction's results are candidates for reuse.
    ///
    /// Opcodes containing `spoof` (fused operators) are always candidates;
    /// `append` only when one operand is a row or column vector, since
    /// appends to growing matrices never repeat.
    #[must_use]
    pub fn is_reusable(&self, inst: &Instruction, ctx: &ExecContext) -> bool {
        let opcode = inst.opcode();
        if opcode.contains("spoof") {
            return true;
        }
        if !self.opcodes.contains(opcode) {
            return false;
        }
        if opcode == "append" {
            return has_vector_operand(inst, ctx);
        }
        true
    }

    /// True when the instruction's output should be admitted on a miss.
    ///
    /// With compiler-assisted rewrites off, everything reusable is admitted.
    /// With them on, matrix outputs need the optimizer's mark; loop-carried
    /// values that partial reuse already covers stay out of the cache.
    #[must_use]
    pub fn is_marked_for_caching(&self, inst: &Instruction) -> bool {
        if !self.comp_assisted_rw {
            return true;
        }
        inst.output().kind() != OperandKind::Matrix || inst.is_cache_marked()
    }

}

fn has_vector_operand(inst: &Instruction, ctx: &ExecContext) -> bool {
    inst.inputs()
        .iter()
        .filter(|op| op.kind() == OperandKind::Matrix)
        .filter_map(|op| ctx.get_matrix(op.name()))
        .any(|m| m.num_rows() == 1 || m.num_cols() == 1)
}

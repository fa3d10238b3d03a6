//! Instruction surface the cache introspects.

use super::context::ExecContext;
use crate::error::Result;
use crate::lineage::{LineageItem, LineageRef};

/// Declared type of an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// Matrix-typed operand.
    Matrix,
    /// Scalar-typed operand; literals carry their textual value as name.
    Scalar,
}

/// A named, typed operand.
#[derive(Debug, Clone)]
pub struct Operand {
    name: String,
    kind: OperandKind,
    literal: bool,
}

impl Operand {
    /// A matrix variable operand.
    #[must_use]
    pub fn matrix(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperandKind::Matrix,
            literal: false,
        }
    }

    /// A scalar variable operand.
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperandKind::Scalar,
            literal: false,
        }
    }

    /// A scalar literal operand (the name is the literal text).
    #[must_use]
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            name: text.into(),
            kind: OperandKind::Scalar,
            literal: true,
        }
    }

    /// Operand name, or literal text for literals.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared operand type.
    #[must_use]
    pub fn kind(&self) -> OperandKind {
        self.kind
    }

    /// True for literal operands.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.literal
    }
}

/// One runtime instruction: opcode, ordered inputs, one output.
#[derive(Debug, Clone)]
pub struct Instruction {
    opcode: String,
    inputs: Vec<Operand>,
    output: Operand,
    cache_marked: bool,
}

impl Instruction {
    /// Creates an instruction.
    #[must_use]
    pub fn new(opcode: impl Into<String>, inputs: Vec<Operand>, output: Operand) -> Self {
        Self {
            opcode: opcode.into(),
            inputs,
            output,
            cache_marked: false,
        }
    }

    /// Marks the output as cache-worthy per the optimizer.
    #[must_use]
    pub fn with_cache_mark(mut self) -> Self {
        self.cache_marked = true;
        self
    }

    /// The opcode.
    #[must_use]
    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    /// Ordered input operands.
    #[must_use]
    pub fn inputs(&self) -> &[Operand] {
        &self.inputs
    }

    /// The output operand.
    #[must_use]
    pub fn output(&self) -> &Operand {
        &self.output
    }

    /// True when the optimizer marked this output for caching.
    #[must_use]
    pub fn is_cache_marked(&self) -> bool {
        self.cache_marked
    }

    /// Lineage of each input, in operand order.
    ///
    /// A variable without a traced lineage and every literal becomes a
    /// literal leaf.
    #[must_use]
    pub fn lineage_items(&self, ctx: &ExecContext) -> Vec<LineageRef> {
        self.inputs
            .iter()
            .map(|op| {
                if op.is_literal() {
                    LineageItem::literal(op.name())
                } else {
                    ctx.get_lineage(op.name())
                        .cloned()
                        .unwrap_or_else(|| LineageItem::literal(op.name()))
                }
            })
            .collect()
    }

    /// Builds the lineage item of this instruction's output.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LineageInvariant`] when the opcode is empty
    /// but inputs are present.
    pub fn trace_output(&self, ctx: &ExecContext) -> Result<LineageRef> {
        LineageItem::instruction(self.opcode.clone(), String::new(), self.lineage_items(ctx))
    }
}

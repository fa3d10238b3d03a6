//! Recompute and spill cost model.
//!
//! Estimates how long an entry takes to recompute (flop model over input
//! dimensions and sparsity) and how long it takes to spill and reload
//! (bandwidth model over the serialized size). Factors are calibrated
//! defaults that can be tuned to actual hardware.

use crate::error::{Error, Result};
use crate::runtime::{ExecContext, Instruction, MatrixBlock};

const MIB: f64 = 1024.0 * 1024.0;
const GIGA_FLOPS: f64 = (1u64 << 30) as f64;

/// Calibrated hardware factors.
#[derive(Debug, Clone)]
pub struct CostFactors {
    /// Sustained compute rate, in GFLOP/s.
    pub gflops: f64,
    /// Sequential disk read bandwidth, in MiB/s.
    pub disk_read_mbs: f64,
    /// Sequential disk write bandwidth, in MiB/s.
    pub disk_write_mbs: f64,
}

impl Default for CostFactors {
    fn default() -> Self {
        Self {
            gflops: 48.0,
            disk_read_mbs: 1000.0,
            disk_write_mbs: 500.0,
        }
    }
}

/// Cost estimator over instruction categories and blob shapes.
#[derive(Debug, Clone, Default)]
pub struct CostEstimator {
    factors: CostFactors,
}

impl CostEstimator {
    /// Creates an estimator with the given factors.
    #[must_use]
    pub fn new(factors: CostFactors) -> Self {
        Self { factors }
    }

    /// Serialized-size estimate in MiB for a block shape.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn disk_size_mb(&self, rows: u64, cols: u64, nnz: u64) -> f64 {
        MatrixBlock::estimate_on_disk_size(rows, cols, nnz) as f64 / MIB
    }

    /// Time to write a block shape to disk, in milliseconds.
    #[must_use]
    pub fn fs_write_time_ms(&self, rows: u64, cols: u64, nnz: u64) -> f64 {
        self.disk_size_mb(rows, cols, nnz) / self.factors.disk_write_mbs * 1000.0
    }

    /// Time to read a block shape back from disk, in milliseconds.
    #[must_use]
    pub fn fs_read_time_ms(&self, rows: u64, cols: u64, nnz: u64) -> f64 {
        self.disk_size_mb(rows, cols, nnz) / self.factors.disk_read_mbs * 1000.0
    }

    /// Round-trip spill estimate: write now plus the eventual reload.
    #[must_use]
    pub fn spill_time_ms(&self, block: &MatrixBlock) -> f64 {
        let (r, c, n) = (block.num_rows(), block.num_cols(), block.num_nnz());
        self.fs_write_time_ms(r, c, n) + self.fs_read_time_ms(r, c, n)
    }

    /// Estimated wall time to recompute an instruction, in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for instruction categories the model
    /// cannot score.
    pub fn recompute_time_ms(&self, inst: &Instruction, ctx: &ExecContext) -> Result<f64> {
        let flops = self.recompute_flops(inst, ctx)?;
        Ok(flops / GIGA_FLOPS / self.factors.gflops * 1000.0)
    }

    /// Closed-form flop count per instruction category.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for categories outside the model.
    #[allow(clippy::cast_precision_loss)]
    pub fn recompute_flops(&self, inst: &Instruction, ctx: &ExecContext) -> Result<f64> {
        let opcode = inst.opcode();
        let shapes = input_shapes(inst, ctx);

        if opcode.contains("spoof") {
            let (r, c, s) = shapes.first().copied().unwrap_or((1, 1, 1.0));
            return Ok(4.0 * r as f64 * c as f64 * s.max(1e-6));
        }

        match opcode {
            // Transpose-self matrix multiply, left variant.
            "tsmm" => {
                let (r, c, s) = first_shape(opcode, &shapes)?;
                let (r, c) = (r as f64, c as f64);
                if s < 0.4 {
                    Ok(r * c * c * s * s / 2.0)
                } else {
                    Ok(r * c * c * s / 2.0)
                }
            }
            // Binary aggregate matrix multiply.
            "ba+*" => {
                if shapes.len() < 2 {
                    return Err(Error::Unsupported(opcode.to_string()));
                }
                let (r1, c1, s1) = shapes[0];
                let (_, c2, s2) = shapes[1];
                Ok(2.0 * r1 as f64 * c1 as f64 * c2 as f64 * s1.max(1.0) * s2.max(1.0) / 2.0)
            }
            // Elementwise binary ops over the larger operand.
            "*" | "/" | "+" | "-" | "^" | "min" | "max" => {
                let (r, c, s) = widest_shape(&shapes);
                Ok(r as f64 * c as f64 * s.max(1e-6))
            }
            // Metadata lookups.
            "nrow" | "ncol" | "length" => Ok(16.0),
            // Indexed reads/writes move the affected slice.
            "rightIndex" | "leftIndex" => {
                let (r, c, s) = first_shape(opcode, &shapes)?;
                Ok(r as f64 * c as f64 * s.max(1e-6))
            }
            // Transpose.
            "r'" => {
                let (r, c, _) = first_shape(opcode, &shapes)?;
                Ok(r as f64 * c as f64)
            }
            // Dense LU-backed solve.
            "solve" => {
                let (r, c, _) = first_shape(opcode, &shapes)?;
                let (r, c) = (r as f64, c as f64);
                Ok(c * c * c + r * c * c)
            }
            // Grouped aggregate: one pass plus group accumulation.
            "groupedagg" => {
                let (r, c, _) = first_shape(opcode, &shapes)?;
                Ok(2.0 * r as f64 * c as f64)
            }
            "append" => {
                let (r, c, _) = widest_shape(&shapes);
                Ok(r as f64 * c as f64)
            }
            _ => Err(Error::Unsupported(opcode.to_string())),
        }
    }
}

type Shape = (u64, u64, f64);

fn input_shapes(inst: &Instruction, ctx: &ExecContext) -> Vec<Shape> {
    inst.inputs()
        .iter()
        .filter_map(|op| ctx.get_matrix(op.name()))
        .map(|m| (m.num_rows(), m.num_cols(), m.sparsity()))
        .collect()
}

fn first_shape(opcode: &str, shapes: &[Shape]) -> Result<Shape> {
    shapes
        .first()
        .copied()
        .ok_or_else(|| Error::Unsupported(opcode.to_string()))
}

fn widest_shape(shapes: &[Shape]) -> Shape {
    shapes
        .iter()
        .copied()
        .max_by_key(|(r, c, _)| r * c)
        .unwrap_or((1, 1, 1.0))
}

//! Cacheable values: matrix blobs and scalars.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Density threshold below which a block is considered sparse.
const SPARSE_THRESHOLD: f64 = 0.4;

/// Per-block header bytes in the in-memory and serialized estimates.
const BLOCK_HEADER_BYTES: u64 = 32;

/// Dense row-major matrix block.
///
/// The cache treats this as an opaque sized blob; only dimensions, sparsity,
/// and the two size estimates are consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixBlock {
    rows: u64,
    cols: u64,
    nnz: u64,
    sparse: bool,
    data: Vec<f64>,
}

impl MatrixBlock {
    /// Creates a block from row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] when `data.len() != rows * cols`.
    pub fn new(rows: u64, cols: u64, data: Vec<f64>) -> Result<Self> {
        let cells = rows
            .checked_mul(cols)
            .ok_or_else(|| Error::Internal("matrix dimension overflow".into()))?;
        if data.len() as u64 != cells {
            return Err(Error::Internal(format!(
                "matrix data length {} does not match {rows}x{cols}",
                data.len()
            )));
        }
        let nnz = data.iter().filter(|v| **v != 0.0).count() as u64;
        #[allow(clippy::cast_precision_loss)]
        let sparse = cells > 0 && (nnz as f64) / (cells as f64) < SPARSE_THRESHOLD;
        Ok(Self {
            rows,
            cols,
            nnz,
            sparse,
            data,
        })
    }

    /// Creates a block filled with a constant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] on dimension overflow.
    pub fn filled(rows: u64, cols: u64, value: f64) -> Result<Self> {
        let cells = rows
            .checked_mul(cols)
            .ok_or_else(|| Error::Internal("matrix dimension overflow".into()))?;
        let len = usize::try_from(cells)
            .map_err(|_| Error::Internal("matrix too large for address space".into()))?;
        Self::new(rows, cols, vec![value; len])
    }

    /// Number of rows.
    #[must_use]
    pub fn num_rows(&self) -> u64 {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub fn num_cols(&self) -> u64 {
        self.cols
    }

    /// Number of non-zero cells.
    #[must_use]
    pub fn num_nnz(&self) -> u64 {
        self.nnz
    }

    /// Fraction of non-zero cells, in `[0, 1]`.
    #[must_use]
    pub fn sparsity(&self) -> f64 {
        let cells = self.rows * self.cols;
        if cells == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let s = self.nnz as f64 / cells as f64;
        s
    }

    /// True when the block is held in a sparse-leaning format.
    #[must_use]
    pub fn is_in_sparse_format(&self) -> bool {
        self.sparse
    }

    /// Cell accessor (row-major).
    #[must_use]
    pub fn get(&self, row: u64, col: u64) -> f64 {
        let idx = usize::try_from(row * self.cols + col).unwrap_or(usize::MAX);
        self.data[idx]
    }

    /// Raw row-major payload.
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Bytes occupied while resident in memory.
    #[must_use]
    pub fn in_memory_size(&self) -> u64 {
        self.data.len() as u64 * 8 + BLOCK_HEADER_BYTES
    }

    /// Serialized-size estimate for the given shape.
    ///
    /// Sparse blocks serialize as (index, value) pairs, dense blocks as the
    /// full cell payload.
    #[must_use]
    pub fn estimate_on_disk_size(rows: u64, cols: u64, nnz: u64) -> u64 {
        let cells = rows.saturating_mul(cols);
        #[allow(clippy::cast_precision_loss)]
        let sparse = cells > 0 && (nnz as f64) / (cells as f64) < SPARSE_THRESHOLD;
        if sparse {
            nnz * 12 + BLOCK_HEADER_BYTES
        } else {
            cells * 8 + BLOCK_HEADER_BYTES
        }
    }
}

/// Scalar runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    /// 64-bit float.
    F64(f64),
    /// 64-bit integer.
    I64(i64),
    /// Boolean.
    Bool(bool),
    /// String.
    Str(String),
}

impl ScalarValue {
    /// Bytes occupied while resident in memory.
    #[must_use]
    pub fn in_memory_size(&self) -> u64 {
        match self {
            Self::F64(_) | Self::I64(_) => 8,
            Self::Bool(_) => 1,
            Self::Str(s) => s.len() as u64,
        }
    }
}

/// A value bound to a variable: a matrix blob or a scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Shared matrix blob.
    Matrix(Arc<MatrixBlock>),
    /// Scalar.
    Scalar(ScalarValue),
}

impl Value {
    /// Wraps a matrix block.
    #[must_use]
    pub fn matrix(block: MatrixBlock) -> Self {
        Self::Matrix(Arc::new(block))
    }

    /// True for matrix values.
    #[must_use]
    pub fn is_matrix(&self) -> bool {
        matches!(self, Self::Matrix(_))
    }

    /// The matrix blob, if any.
    #[must_use]
    pub fn as_matrix(&self) -> Option<&Arc<MatrixBlock>> {
        match self {
            Self::Matrix(m) => Some(m),
            Self::Scalar(_) => None,
        }
    }

    /// The scalar, if any.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::Matrix(_) => None,
        }
    }

    /// Bytes occupied while resident in memory.
    #[must_use]
    pub fn in_memory_size(&self) -> u64 {
        match self {
            Self::Matrix(m) => m.in_memory_size(),
            Self::Scalar(s) => s.in_memory_size(),
        }
    }
}

impl From<ScalarValue> for Value {
    fn from(s: ScalarValue) -> Self {
        Self::Scalar(s)
    }
}

impl From<MatrixBlock> for Value {
    fn from(m: MatrixBlock) -> Self {
        Self::matrix(m)
    }
}

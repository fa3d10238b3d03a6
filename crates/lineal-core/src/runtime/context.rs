//! Execution context: symbol table plus lineage bindings.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::value::{MatrixBlock, ScalarValue, Value};
use crate::lineage::LineageRef;

/// Per-execution symbol table with the lineage trace of each live variable.
///
/// One context belongs to one executing thread; the cache engine is the
/// shared structure, not the context.
#[derive(Debug, Default)]
pub struct ExecContext {
    vars: FxHashMap<String, Value>,
    lineage: FxHashMap<String, LineageRef>,
}

impl ExecContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a variable.
    #[must_use]
    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Binds a variable, replacing any previous value.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Removes a variable and its lineage binding.
    pub fn remove_variable(&mut self, name: &str) -> Option<Value> {
        self.lineage.remove(name);
        self.vars.remove(name)
    }

    /// Looks up a variable as a matrix blob.
    #[must_use]
    pub fn get_matrix(&self, name: &str) -> Option<&Arc<MatrixBlock>> {
        self.vars.get(name).and_then(Value::as_matrix)
    }

    /// Binds a matrix output.
    pub fn set_matrix_output(&mut self, name: impl Into<String>, block: MatrixBlock) {
        self.set_variable(name, Value::matrix(block));
    }

    /// Binds a scalar output.
    pub fn set_scalar_output(&mut self, name: impl Into<String>, scalar: ScalarValue) {
        self.set_variable(name, Value::Scalar(scalar));
    }

    /// Looks up the lineage traced for a variable.
    #[must_use]
    pub fn get_lineage(&self, name: &str) -> Option<&LineageRef> {
        self.lineage.get(name)
    }

    /// Records the lineage of a variable.
    pub fn set_lineage(&mut self, name: impl Into<String>, item: LineageRef) {
        self.lineage.insert(name.into(), item);
    }

    /// Number of bound variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True when no variable is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

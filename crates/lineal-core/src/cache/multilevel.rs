//! All-or-nothing function-scope reuse.
//!
//! A function call produces `n` named outputs that are semantically linked:
//! caching some but not others would break later reuse that assumes the
//! whole return set is retrievable. The protocol probes one synthetic
//! lineage item per output and either binds all of them or caches all of
//! them, never a mixed state.

use std::sync::Arc;

use tracing::debug;

use super::engine::LineageCache;
use super::entry::CacheEntry;
use crate::lineage::{LineageItem, LineageRef};
use crate::runtime::ExecContext;

/// Opcodes whose results are non-deterministic; lineages containing them
/// must never be reused across executions.
const NONDETERMINISTIC_OPCODES: &[&str] = &["rand", "sample"];

/// One named function output at a call site.
#[derive(Debug, Clone)]
pub struct FunctionOutput {
    /// Output name inside the function body.
    pub name: String,
    /// Variable the output is bound to in the calling scope.
    pub bound_name: String,
    /// Wall time spent producing the output during normal execution.
    pub exec_time_ns: u64,
}

impl FunctionOutput {
    /// Creates an output descriptor.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        bound_name: impl Into<String>,
        exec_time_ns: u64,
    ) -> Self {
        Self {
            name: name.into(),
            bound_name: bound_name.into(),
            exec_time_ns,
        }
    }
}

/// Function-scope reuse protocol over the cache engine.
pub struct MultiLevelReuse<'a> {
    cache: &'a LineageCache,
}

impl<'a> MultiLevelReuse<'a> {
    /// Wraps the engine.
    #[must_use]
    pub fn new(cache: &'a LineageCache) -> Self {
        Self { cache }
    }

    /// One synthetic lineage item per output: `opcode = name + ordinal`,
    /// `data = output name`, inputs shared across the set.
    fn synthetic_outputs(
        func_name: &str,
        inputs: &[LineageRef],
        outputs: &[FunctionOutput],
    ) -> crate::error::Result<Vec<LineageRef>> {
        outputs
            .iter()
            .enumerate()
            .map(|(i, out)| {
                LineageItem::instruction(
                    format!("{func_name}{}", i + 1),
                    out.name.clone(),
                    inputs.to_vec(),
                )
            })
            .collect()
    }

    /// Attempts to satisfy a whole call from the cache.
    ///
    /// Returns true only when every output hits; the cached values are then
    /// bound in the calling scope and each lineage binding is rewritten to
    /// the original producing item (chased via the entry's upstream key).
    /// On any miss, placeholders remain installed for every output so the
    /// post-execution insertion is coordinated.
    pub fn reuse_outputs(
        &self,
        func_name: &str,
        inputs: &[LineageRef],
        outputs: &[FunctionOutput],
        ctx: &mut ExecContext,
    ) -> bool {
        if !self.cache.config().multilevel_reuse() {
            return false;
        }
        let Ok(lis) = Self::synthetic_outputs(func_name, inputs, outputs) else {
            return false;
        };

        let mut staged: Vec<Option<Arc<CacheEntry>>> = Vec::with_capacity(lis.len());
        let mut all_hit = true;
        for li in &lis {
            let probed = self.cache.reuse_entry(li);
            all_hit &= probed.is_some();
            staged.push(probed);
        }
        if !all_hit {
            debug!(func = func_name, "function-scope probe missed");
            return false;
        }

        for ((li, entry), out) in lis.iter().zip(staged).zip(outputs) {
            let entry = match entry {
                Some(entry) => entry,
                None => return false,
            };
            let Some(value) = entry.wait_value() else {
                // A sibling producer backed the set out while we probed.
                return false;
            };
            ctx.set_variable(out.bound_name.clone(), value);
            let orig = entry.orig_key().unwrap_or_else(|| li.clone());
            ctx.set_lineage(out.bound_name.clone(), orig);
        }
        self.cache.stats().record_inst_hit();
        true
    }

    /// Caches the outputs of a call that executed normally.
    ///
    /// Each output is admissible only when the lineage its body execution
    /// traced is itself a cache hit and free of non-deterministic nodes. If
    /// any output is inadmissible or fails admission, every placeholder in
    /// the set is removed: the call caches all or none.
    pub fn cache_outputs(
        &self,
        func_name: &str,
        inputs: &[LineageRef],
        outputs: &[FunctionOutput],
        ctx: &ExecContext,
    ) {
        if !self.cache.config().multilevel_reuse() {
            return;
        }
        let Ok(lis) = Self::synthetic_outputs(func_name, inputs, outputs) else {
            return;
        };

        let mut staged = Vec::with_capacity(lis.len());
        for (li, out) in lis.iter().zip(outputs) {
            let Some(body_li) = ctx.get_lineage(&out.bound_name) else {
                self.abort(func_name, &lis);
                return;
            };
            if !self.cache.contains(body_li) {
                self.abort(func_name, &lis);
                return;
            }
            if body_li.contains_any_opcode(NONDETERMINISTIC_OPCODES) {
                self.abort(func_name, &lis);
                return;
            }
            let Some(value) = ctx.get_variable(&out.bound_name).cloned() else {
                self.abort(func_name, &lis);
                return;
            };
            staged.push((li, value, out.exec_time_ns, body_li.clone()));
        }

        for (li, value, exec_time_ns, orig) in staged {
            match self.cache.fill(li, value, exec_time_ns, Some(orig)) {
                Ok(true) => {}
                Ok(false) | Err(_) => {
                    // One output failed admission; back the whole set out.
                    self.abort(func_name, &lis);
                    return;
                }
            }
        }
    }

    fn abort(&self, func_name: &str, lis: &[LineageRef]) {
        debug!(func = func_name, "function-scope caching aborted");
        self.cache.remove_all(lis);
    }
}

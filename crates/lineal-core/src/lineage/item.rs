//! Immutable lineage DAG node.

use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Opcode prefix marking dedup nodes.
pub const DEDUP_OPCODE_PREFIX: &str = "dedup";

/// Opcode prefix marking placeholder nodes inside dedup patch DAGs.
pub const PLACEHOLDER_OPCODE_PREFIX: &str = "ph_";

/// Shared reference to a lineage item.
pub type LineageRef = Arc<LineageItem>;

/// Process-unique id source. Ids are for diagnostics and spill file naming
/// only; they never participate in equality.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Derived category of a lineage item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineageKind {
    /// Leaf with no opcode: a literal value.
    Literal,
    /// Leaf with an opcode: a data-generating operation.
    Creation,
    /// Non-leaf with an opcode: an instruction over other items.
    Instruction,
    /// Node whose opcode carries the dedup prefix; hashed and compared
    /// through its patch DAG.
    Dedup,
}

/// One node of the lineage DAG.
///
/// Items are immutable once constructed and shared through [`LineageRef`].
/// The structural hash is memoized at construction, which keeps repeated
/// probes over shared subgraphs O(1) per node instead of O(nodes).
#[derive(Debug)]
pub struct LineageItem {
    id: u64,
    opcode: String,
    data: String,
    inputs: Vec<LineageRef>,
    dedup_patch: Option<LineageRef>,
    hash: u64,
}

impl LineageItem {
    /// Constructs a literal leaf (empty opcode).
    #[must_use]
    pub fn literal(data: impl Into<String>) -> LineageRef {
        Arc::new(Self::build(String::new(), data.into(), Vec::new(), None))
    }

    /// Constructs a creation leaf (opcode, no inputs).
    #[must_use]
    pub fn creation(opcode: impl Into<String>, data: impl Into<String>) -> LineageRef {
        Arc::new(Self::build(opcode.into(), data.into(), Vec::new(), None))
    }

    /// Constructs an instruction node over ordered inputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineageInvariant`] for a non-leaf with an empty
    /// opcode.
    pub fn instruction(
        opcode: impl Into<String>,
        data: impl Into<String>,
        inputs: Vec<LineageRef>,
    ) -> Result<LineageRef> {
        Self::new(opcode.into(), data.into(), inputs, None)
    }

    /// Constructs a dedup node with its canonical patch DAG.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineageInvariant`] when `opcode` lacks the dedup
    /// prefix.
    pub fn dedup(
        opcode: impl Into<String>,
        data: impl Into<String>,
        inputs: Vec<LineageRef>,
        patch: LineageRef,
    ) -> Result<LineageRef> {
        let opcode = opcode.into();
        if !opcode.starts_with(DEDUP_OPCODE_PREFIX) {
            return Err(Error::LineageInvariant(format!(
                "dedup node opcode '{opcode}' lacks the '{DEDUP_OPCODE_PREFIX}' prefix"
            )));
        }
        Self::new(opcode, data.into(), inputs, Some(patch))
    }

    /// Constructs a placeholder node forwarding to `inner`.
    ///
    /// Placeholders mark patch points inside dedup DAGs; they are
    /// transparent for hashing and equality.
    #[must_use]
    pub fn placeholder(data: impl Into<String>, inner: LineageRef) -> LineageRef {
        Arc::new(Self::build(
            PLACEHOLDER_OPCODE_PREFIX.to_string(),
            data.into(),
            vec![inner],
            None,
        ))
    }

    /// General constructor; validates the node invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineageInvariant`] for a non-leaf with an empty
    /// opcode, or a placeholder without exactly one input.
    pub fn new(
        opcode: String,
        data: String,
        inputs: Vec<LineageRef>,
        dedup_patch: Option<LineageRef>,
    ) -> Result<LineageRef> {
        if opcode.is_empty() && !inputs.is_empty() {
            return Err(Error::LineageInvariant(
                "inner lineage node with empty opcode".into(),
            ));
        }
        if opcode.starts_with(PLACEHOLDER_OPCODE_PREFIX) && inputs.len() != 1 {
            return Err(Error::LineageInvariant(format!(
                "placeholder node must have exactly one input, got {}",
                inputs.len()
            )));
        }
        if dedup_patch.is_some() && !opcode.starts_with(DEDUP_OPCODE_PREFIX) {
            return Err(Error::LineageInvariant(format!(
                "patch attached to non-dedup opcode '{opcode}'"
            )));
        }
        Ok(Arc::new(Self::build(opcode, data, inputs, dedup_patch)))
    }

    fn build(
        opcode: String,
        data: String,
        inputs: Vec<LineageRef>,
        dedup_patch: Option<LineageRef>,
    ) -> Self {
        let hash = structural_hash(&opcode, &data, &inputs, dedup_patch.as_ref());
        Self {
            id: next_id(),
            opcode,
            data,
            inputs,
            dedup_patch,
            hash,
        }
    }

    /// Process-unique id (diagnostics and spill file naming only).
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The opcode; empty for literal leaves.
    #[must_use]
    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    /// The data literal carried by this node.
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Ordered input edges.
    #[must_use]
    pub fn inputs(&self) -> &[LineageRef] {
        &self.inputs
    }

    /// The canonical patch DAG of a dedup node.
    #[must_use]
    pub fn dedup_patch(&self) -> Option<&LineageRef> {
        self.dedup_patch.as_ref()
    }

    /// Memoized structural hash.
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        self.hash
    }

    /// Derived category of this node.
    #[must_use]
    pub fn kind(&self) -> LineageKind {
        if self.opcode.starts_with(DEDUP_OPCODE_PREFIX) {
            LineageKind::Dedup
        } else if self.inputs.is_empty() {
            if self.opcode.is_empty() {
                LineageKind::Literal
            } else {
                LineageKind::Creation
            }
        } else {
            LineageKind::Instruction
        }
    }

    /// True for placeholder nodes.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.opcode.starts_with(PLACEHOLDER_OPCODE_PREFIX)
    }

    /// True for dedup nodes.
    #[must_use]
    pub fn is_dedup(&self) -> bool {
        self.opcode.starts_with(DEDUP_OPCODE_PREFIX)
    }

    /// True for leaves (no inputs).
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Longest path from this node down to a leaf, following dedup patches.
    ///
    /// Iterative so DAG depth is not bounded by the native stack.
    #[must_use]
    pub fn dag_height(&self) -> u32 {
        let mut heights: FxHashMap<u64, u32> = FxHashMap::default();
        let mut stack: Vec<&LineageItem> = vec![self];
        while let Some(node) = stack.last().copied() {
            if heights.contains_key(&node.id) {
                stack.pop();
                continue;
            }
            let children = node.children();
            let pending: Vec<&LineageItem> = children
                .iter()
                .copied()
                .filter(|c| !heights.contains_key(&c.id))
                .collect();
            if pending.is_empty() {
                let height = children
                    .iter()
                    .map(|c| heights[&c.id] + 1)
                    .max()
                    .unwrap_or(0);
                heights.insert(node.id, height);
                stack.pop();
            } else {
                stack.extend(pending);
            }
        }
        heights[&self.id]
    }

    /// True when any reachable node (through dedup patches too) carries one
    /// of the given opcodes.
    #[must_use]
    pub fn contains_any_opcode(&self, opcodes: &[&str]) -> bool {
        let mut seen: FxHashSet<u64> = FxHashSet::default();
        let mut stack: Vec<&LineageItem> = vec![self];
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id) {
                continue;
            }
            if opcodes.contains(&node.opcode.as_str()) {
                return true;
            }
            stack.extend(node.children());
        }
        false
    }

    /// Clones the DAG bottom-up, assigning a fresh id to every node.
    ///
    /// Sharing is preserved: a node reachable along several paths is copied
    /// once.
    #[must_use]
    pub fn deep_copy(&self) -> LineageRef {
        let mut copies: FxHashMap<u64, LineageRef> = FxHashMap::default();
        let mut stack: Vec<&LineageItem> = vec![self];
        while let Some(node) = stack.last().copied() {
            if copies.contains_key(&node.id) {
                stack.pop();
                continue;
            }
            let pending: Vec<&LineageItem> = node
                .children()
                .into_iter()
                .filter(|c| !copies.contains_key(&c.id))
                .collect();
            if pending.is_empty() {
                let inputs = node.inputs.iter().map(|i| copies[&i.id].clone()).collect();
                let patch = node.dedup_patch.as_ref().map(|p| copies[&p.id].clone());
                copies.insert(
                    node.id,
                    Arc::new(Self::build(
                        node.opcode.clone(),
                        node.data.clone(),
                        inputs,
                        patch,
                    )),
                );
                stack.pop();
            } else {
                stack.extend(pending);
            }
        }
        copies[&self.id].clone()
    }

    fn children(&self) -> Vec<&LineageItem> {
        let mut out: Vec<&LineageItem> = self.inputs.iter().map(AsRef::as_ref).collect();
        if let Some(patch) = &self.dedup_patch {
            out.push(patch.as_ref());
        }
        out
    }
}

/// Hash combiner: placeholders hash to their inner input, dedup nodes to
/// their patch root, everything else to an order-sensitive fold of opcode,
/// data, and input hashes.
fn structural_hash(
    opcode: &str,
    data: &str,
    inputs: &[LineageRef],
    dedup_patch: Option<&LineageRef>,
) -> u64 {
    if opcode.starts_with(PLACEHOLDER_OPCODE_PREFIX) {
        if let Some(inner) = inputs.first() {
            return inner.hash;
        }
    }
    if opcode.starts_with(DEDUP_OPCODE_PREFIX) {
        if let Some(patch) = dedup_patch {
            return patch.hash;
        }
    }
    let mut hasher = FxHasher::default();
    opcode.hash(&mut hasher);
    data.hash(&mut hasher);
    for input in inputs {
        hasher.write_u64(input.hash);
    }
    hasher.finish()
}

/// Follows dedup patches and placeholder forwarding to the node that
/// actually participates in comparison.
fn resolve(mut node: &LineageItem) -> &LineageItem {
    loop {
        if node.is_dedup() {
            if let Some(patch) = &node.dedup_patch {
                node = patch.as_ref();
                continue;
            }
        }
        if node.is_placeholder() {
            if let Some(inner) = node.inputs.first() {
                node = inner.as_ref();
                continue;
            }
        }
        return node;
    }
}

/// Iterative structural equality.
///
/// The visited set is per-comparison state keyed by resolved node-id pairs:
/// shared sub-DAGs are expanded once, reentry through dedup patches
/// terminates, and nothing leaks into later comparisons.
fn structural_eq(a: &LineageItem, b: &LineageItem) -> bool {
    let mut visited: FxHashSet<(u64, u64)> = FxHashSet::default();
    let mut work: Vec<(&LineageItem, &LineageItem)> = vec![(a, b)];
    while let Some((x, y)) = work.pop() {
        let x = resolve(x);
        let y = resolve(y);
        if x.id == y.id {
            continue;
        }
        if x.hash != y.hash {
            return false;
        }
        if !visited.insert((x.id, y.id)) {
            continue;
        }
        if x.opcode != y.opcode || x.data != y.data || x.inputs.len() != y.inputs.len() {
            return false;
        }
        for (xi, yi) in x.inputs.iter().zip(y.inputs.iter()) {
            work.push((xi.as_ref(), yi.as_ref()));
        }
    }
    true
}

impl PartialEq for LineageItem {
    fn eq(&self, other: &Self) -> bool {
        structural_eq(self, other)
    }
}

impl Eq for LineageItem {}

impl Hash for LineageItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

//! Backward dataflow liveness analysis.
//!
//! Computes, for every node of a [`Code`], which variables and values are
//! live immediately before (`live-in`) and after (`live-out`) it. Slot
//! allocation consumes this to decide which slots are occupied at each
//! definition.
//!
//! # Algorithm
//!
//! 1. **gen/kill per block** (forward scan): `gen(B)` holds entities used
//!    before any definition in `B`; `kill(B)` holds entities defined in `B`.
//! 2. **Worklist fixpoint** at block granularity, seeded with every block
//!    in postorder:
//!    - `live_out(B) = ∪ live_in(S)` for each successor `S`
//!    - `live_in(B) = gen(B) ∪ (live_out(B) − kill(B))`
//!
//!    When `live_in(B)` changes, the predecessors of `B` are re-queued.
//!    Loop back-edges are why a single pass is not enough.
//! 3. **Per-node entries**: each block is walked backward from its
//!    `live_out`, applying the same equation node by node.
//!
//! Variables and values are tracked as two separate lattices: a `Var` can
//! be redefined along a path, SSA values cannot. Multi-value groups are not
//! tracked.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use luma_ir::graph::{postorder, predecessors};
use luma_ir::{BasicBlock, Code, Label, Node, NodeId, Terminator, ValueId, Var};

/// Live variables and live values at one program point.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LiveSets {
    pub vars: FxHashSet<Var>,
    pub vals: FxHashSet<ValueId>,
}

impl LiveSets {
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.vals.is_empty()
    }

    fn union_with(&mut self, other: &LiveSets) {
        self.vars.extend(other.vars.iter().copied());
        self.vals.extend(other.vals.iter().copied());
    }
}

/// Liveness facts for a single node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Entry {
    pub live_in: LiveSets,
    pub live_out: LiveSets,
}

/// Per-node liveness of one function. Immutable once computed.
#[derive(Clone, Debug, Default)]
pub struct LivenessInfo {
    entries: FxHashMap<NodeId, Entry>,
}

impl LivenessInfo {
    /// Liveness facts for `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` was not part of the analyzed code. That is a
    /// compiler bug: every consumer walks the same `Code` the analysis ran
    /// on.
    pub fn entry(&self, node: NodeId) -> &Entry {
        match self.entries.get(&node) {
            Some(entry) => entry,
            None => panic!("no liveness information for node {node}"),
        }
    }

    /// Liveness facts for `node`, or `None` if it was not analyzed.
    pub fn try_entry(&self, node: NodeId) -> Option<&Entry> {
        self.entries.get(&node)
    }

    /// Entities live at the entry of the block at `label`.
    pub fn block_live_in(&self, label: Label) -> Option<&LiveSets> {
        self.entries
            .get(&NodeId::new(label, 0))
            .map(|entry| &entry.live_in)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Per-node def/use ────────────────────────────────────────────────

struct DefUse {
    used_vars: SmallVec<[Var; 2]>,
    used_vals: SmallVec<[ValueId; 4]>,
    def_var: Option<Var>,
    def_val: Option<ValueId>,
}

fn node_def_use(node: &Node) -> DefUse {
    DefUse {
        used_vars: node.used_vars(),
        used_vals: node.used_values(),
        def_var: node.defined_var(),
        def_val: node.defined_value(),
    }
}

fn terminator_def_use(term: &Terminator) -> DefUse {
    DefUse {
        used_vars: SmallVec::new(),
        used_vals: term.used_values(),
        def_var: None,
        def_val: None,
    }
}

/// `live_in = uses ∪ (live_out − defs)`
fn transfer(du: &DefUse, live_out: &LiveSets) -> LiveSets {
    let mut live_in = live_out.clone();
    if let Some(var) = du.def_var {
        live_in.vars.remove(&var);
    }
    if let Some(val) = du.def_val {
        live_in.vals.remove(&val);
    }
    live_in.vars.extend(du.used_vars.iter().copied());
    live_in.vals.extend(du.used_vals.iter().copied());
    live_in
}

fn block_def_uses(block: &BasicBlock) -> impl DoubleEndedIterator<Item = DefUse> + '_ {
    block
        .body
        .iter()
        .map(node_def_use)
        .chain(std::iter::once(terminator_def_use(&block.terminator)))
}

/// Precompute gen and kill sets for a single block.
fn gen_kill(block: &BasicBlock) -> (LiveSets, LiveSets) {
    let mut gen = LiveSets::default();
    let mut kill = LiveSets::default();

    for du in block_def_uses(block) {
        for var in &du.used_vars {
            if !kill.vars.contains(var) {
                gen.vars.insert(*var);
            }
        }
        for val in &du.used_vals {
            if !kill.vals.contains(val) {
                gen.vals.insert(*val);
            }
        }
        if let Some(var) = du.def_var {
            kill.vars.insert(var);
        }
        if let Some(val) = du.def_val {
            kill.vals.insert(val);
        }
    }

    (gen, kill)
}

// ── Analysis ────────────────────────────────────────────────────────

/// Compute per-node liveness for every block of `code`.
///
/// Unreachable blocks are analyzed too, so any node of `code` can be
/// queried afterwards.
pub fn compute_liveness(code: &Code) -> LivenessInfo {
    let num_blocks = code.len();
    tracing::debug!(num_blocks, "computing liveness");

    let gen_kill: FxHashMap<Label, (LiveSets, LiveSets)> = code
        .blocks()
        .iter()
        .map(|b| (b.label, gen_kill(b)))
        .collect();
    let preds = predecessors(code);

    let mut live_in: FxHashMap<Label, LiveSets> = FxHashMap::default();
    let mut live_out: FxHashMap<Label, LiveSets> = FxHashMap::default();

    // Postorder processes successors before predecessors; unreachable
    // blocks go last.
    let mut worklist: VecDeque<Label> = postorder(code).into();
    let mut queued: FxHashSet<Label> = worklist.iter().copied().collect();
    for label in code.labels() {
        if queued.insert(label) {
            worklist.push_back(label);
        }
    }

    let mut iterations = 0usize;
    while let Some(label) = worklist.pop_front() {
        queued.remove(&label);
        iterations += 1;

        let mut out = LiveSets::default();
        for succ in luma_ir::graph::successors(code, label) {
            if let Some(succ_in) = live_in.get(&succ) {
                out.union_with(succ_in);
            }
        }

        let (gen, kill) = &gen_kill[&label];
        let mut new_in = gen.clone();
        new_in
            .vars
            .extend(out.vars.iter().filter(|v| !kill.vars.contains(v)).copied());
        new_in
            .vals
            .extend(out.vals.iter().filter(|v| !kill.vals.contains(v)).copied());

        let changed = live_in.get(&label) != Some(&new_in);
        live_out.insert(label, out);
        if changed {
            live_in.insert(label, new_in);
            if let Some(ps) = preds.get(&label) {
                for &pred in ps {
                    if queued.insert(pred) {
                        worklist.push_back(pred);
                    }
                }
            }
        }
    }

    tracing::debug!(iterations, "liveness converged");

    let mut entries = FxHashMap::default();
    for block in code.blocks() {
        let mut out = live_out.remove(&block.label).unwrap_or_default();
        let def_uses: Vec<DefUse> = block_def_uses(block).collect();
        for (idx, du) in def_uses.iter().enumerate().rev() {
            let live_in = transfer(du, &out);
            let id = block.node_id(idx);
            entries.insert(
                id,
                Entry {
                    live_in: live_in.clone(),
                    live_out: out,
                },
            );
            out = live_in;
        }
    }

    LivenessInfo { entries }
}

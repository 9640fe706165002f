//! Shared CFG traversal utilities.
//!
//! The analyses in `luma_analysis` all walk the same graph shapes; these
//! helpers live next to [`Code`] so every pass uses one traversal order.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::code::Code;
use crate::ids::Label;

/// Successor labels of the block at `label` (empty for unknown labels).
pub fn successors(code: &Code, label: Label) -> SmallVec<[Label; 2]> {
    code.block(label)
        .map(|b| b.terminator.successors())
        .unwrap_or_default()
}

/// Deduplicated predecessor lists for every block.
pub fn predecessors(code: &Code) -> FxHashMap<Label, SmallVec<[Label; 2]>> {
    let mut preds: FxHashMap<Label, SmallVec<[Label; 2]>> =
        code.labels().map(|l| (l, SmallVec::new())).collect();
    for block in code.blocks() {
        for succ in block.terminator.successors() {
            if let Some(list) = preds.get_mut(&succ) {
                if !list.contains(&block.label) {
                    list.push(block.label);
                }
            }
        }
    }
    preds
}

/// Postorder over the blocks reachable from the entry.
///
/// Uses an iterative DFS with an explicit stack so deeply nested loops do
/// not recurse.
pub fn postorder(code: &Code) -> Vec<Label> {
    let mut visited = vec![false; code.len()];
    let mut order = Vec::with_capacity(code.len());

    // (block, children pushed)
    let mut stack: Vec<(Label, bool)> = vec![(code.entry_label(), false)];

    while let Some(&mut (label, ref mut expanded)) = stack.last_mut() {
        if *expanded {
            order.push(label);
            stack.pop();
            continue;
        }
        *expanded = true;

        let Some(idx) = code.block_index(label) else {
            stack.pop();
            continue;
        };
        if visited[idx] {
            stack.pop();
            continue;
        }
        visited[idx] = true;

        // Reverse so the jump target ends up first in reverse postorder.
        for succ in code.blocks()[idx].terminator.successors().into_iter().rev() {
            if let Some(succ_idx) = code.block_index(succ) {
                if !visited[succ_idx] {
                    stack.push((succ, false));
                }
            }
        }
    }

    order
}

/// Reverse postorder: every block appears after all of its forward-edge
/// predecessors. The natural order for forward analyses.
pub fn reverse_postorder(code: &Code) -> Vec<Label> {
    let mut order = postorder(code);
    order.reverse();
    order
}

/// Labels of all blocks reachable from the entry.
pub fn reachable(code: &Code) -> FxHashSet<Label> {
    postorder(code).into_iter().collect()
}

#[cfg(test)]
mod tests;

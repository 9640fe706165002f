//! Nested-function dependencies.
//!
//! Records which functions a function instantiates with closure nodes, so
//! a backend can prepare them before the parent runs.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use luma_ir::{FunctionId, IrFunction, Node};

/// Functions instantiated by closure nodes of one function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyInfo {
    /// Referenced function → distinct capture counts over its closure
    /// sites, ascending.
    nested: FxHashMap<FunctionId, SmallVec<[usize; 1]>>,
}

impl DependencyInfo {
    pub fn contains(&self, id: FunctionId) -> bool {
        self.nested.contains_key(&id)
    }

    /// Referenced functions in ascending id order.
    pub fn functions(&self) -> Vec<FunctionId> {
        let mut ids: Vec<FunctionId> = self.nested.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Every number of values captured where `id` is instantiated. More
    /// than one entry means the closure sites disagree.
    pub fn capture_counts(&self, id: FunctionId) -> &[usize] {
        self.nested.get(&id).map_or(&[][..], SmallVec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.nested.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nested.is_empty()
    }
}

/// Collect the functions referenced by closure nodes of `function`.
///
/// Unreachable blocks are included: their closures still name functions
/// that must exist in the module.
pub fn collect_dependencies(function: &IrFunction) -> DependencyInfo {
    let mut nested: FxHashMap<FunctionId, SmallVec<[usize; 1]>> = FxHashMap::default();
    for node in function.code.blocks().iter().flat_map(|b| &b.body) {
        if let Node::Closure {
            function: id,
            captures,
            ..
        } = node
        {
            let counts = nested.entry(*id).or_default();
            if let Err(pos) = counts.binary_search(&captures.len()) {
                counts.insert(pos, captures.len());
            }
        }
    }
    DependencyInfo { nested }
}

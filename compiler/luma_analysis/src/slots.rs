//! Frame slot allocation.
//!
//! Assigns every local variable, SSA value and phi value a register index
//! in the function's frame so that no two entities that are live at the
//! same time share a slot. The allocator is greedy: each entity takes the
//! lowest slot not held by an entity it interferes with, that is, one live
//! after any of its definitions or defined while it is live.
//!
//! Parameters occupy slots `0..params.len()` in declaration order. Phi
//! values are defined once per incoming edge and must land in the same
//! slot each time; multi-value groups are never given slots.
//!
//! Any failure here means the IR or the liveness facts are inconsistent,
//! so errors are reported rather than worked around.

use std::collections::VecDeque;
use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use luma_ir::{IrFunction, Label, Node, NodeId, ValueId, Var};

use crate::liveness::{LiveSets, LivenessInfo};

/// An entity that can occupy a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Entity {
    Value(ValueId),
    Var(Var),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Value(v) => write!(f, "{v}"),
            Entity::Var(v) => write!(f, "{v}"),
        }
    }
}

/// Inconsistent IR detected during allocation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SlotAllocError {
    #[error("{entity} needs slot {slot} at {node}, but a live entity already holds it")]
    Collision {
        entity: Entity,
        slot: u32,
        node: NodeId,
    },
    #[error("value {value} is assigned twice (again at {node})")]
    DoubleAssignment { value: ValueId, node: NodeId },
    #[error("{entity} is used at {node} before it has a slot")]
    Unallocated { entity: Entity, node: NodeId },
}

/// Slot assignment of one function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotAllocInfo {
    values: FxHashMap<ValueId, u32>,
    vars: FxHashMap<Var, u32>,
    slot_count: u32,
}

impl SlotAllocInfo {
    pub fn value_slot(&self, value: impl Into<ValueId>) -> Option<u32> {
        self.values.get(&value.into()).copied()
    }

    pub fn var_slot(&self, var: Var) -> Option<u32> {
        self.vars.get(&var).copied()
    }

    pub fn slot(&self, entity: Entity) -> Option<u32> {
        match entity {
            Entity::Value(v) => self.value_slot(v),
            Entity::Var(v) => self.var_slot(v),
        }
    }

    /// Number of slots the frame needs: one more than the highest slot
    /// index, or zero when nothing was allocated.
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }
}

struct Allocator<'a> {
    liveness: &'a LivenessInfo,
    /// Entities live after any definition of the key, in both directions.
    interference: FxHashMap<Entity, FxHashSet<Entity>>,
    info: SlotAllocInfo,
}

fn defined_entities(node: &Node) -> impl Iterator<Item = Entity> {
    let value = node.defined_value().map(Entity::Value);
    let var = node.defined_var().map(Entity::Var);
    value.into_iter().chain(var)
}

/// Pair every defined entity with everything live after each of its
/// definition sites. A phi value written on several edges interferes with
/// whatever is live at any of those writes, not only the first one visited.
fn interference(
    function: &IrFunction,
    liveness: &LivenessInfo,
) -> FxHashMap<Entity, FxHashSet<Entity>> {
    let mut graph: FxHashMap<Entity, FxHashSet<Entity>> = FxHashMap::default();
    for block in function.code.blocks() {
        for (idx, node) in block.body.iter().enumerate() {
            let Some(entry) = liveness.try_entry(block.node_id(idx)) else {
                continue;
            };
            let live = &entry.live_out;
            let live = live
                .vars
                .iter()
                .map(|&v| Entity::Var(v))
                .chain(live.vals.iter().map(|&v| Entity::Value(v)));
            let defined: Vec<Entity> = defined_entities(node).collect();
            for other in live {
                for &def in defined.iter().filter(|&&def| def != other) {
                    graph.entry(def).or_default().insert(other);
                    graph.entry(other).or_default().insert(def);
                }
            }
        }
    }
    graph
}

impl Allocator<'_> {
    fn occupied(&self, live: &LiveSets, except: Entity) -> FxHashSet<u32> {
        let vars = live
            .vars
            .iter()
            .filter(|&&v| Entity::Var(v) != except)
            .filter_map(|v| self.info.vars.get(v));
        let vals = live
            .vals
            .iter()
            .filter(|&&v| Entity::Value(v) != except)
            .filter_map(|v| self.info.values.get(v));
        vars.chain(vals).copied().collect()
    }

    fn check_used(&self, entity: Entity, node: NodeId) -> Result<(), SlotAllocError> {
        if self.info.slot(entity).is_some() {
            Ok(())
        } else {
            Err(SlotAllocError::Unallocated { entity, node })
        }
    }

    fn assign(&mut self, entity: Entity, slot: u32) {
        match entity {
            Entity::Value(v) => {
                self.info.values.insert(v, slot);
            }
            Entity::Var(v) => {
                self.info.vars.insert(v, slot);
            }
        }
        self.info.slot_count = self.info.slot_count.max(slot + 1);
    }

    fn define(&mut self, entity: Entity, node: NodeId) -> Result<(), SlotAllocError> {
        if let Some(slot) = self.info.slot(entity) {
            let occupied = self.occupied(&self.liveness.entry(node).live_out, entity);
            return match entity {
                Entity::Value(value @ ValueId::Val(_)) => {
                    Err(SlotAllocError::DoubleAssignment { value, node })
                }
                _ if occupied.contains(&slot) => Err(SlotAllocError::Collision {
                    entity,
                    slot,
                    node,
                }),
                _ => Ok(()),
            };
        }

        let occupied: FxHashSet<u32> = self
            .interference
            .get(&entity)
            .into_iter()
            .flatten()
            .filter_map(|&other| self.info.slot(other))
            .collect();
        let slot = (0u32..)
            .find(|s| !occupied.contains(s))
            .unwrap_or(self.info.slot_count);
        tracing::trace!(%entity, slot, %node, "slot assigned");
        self.assign(entity, slot);
        Ok(())
    }

    fn visit_node(&mut self, id: NodeId, node: &Node) -> Result<(), SlotAllocError> {
        for used in node.used_values() {
            self.check_used(Entity::Value(used), id)?;
        }
        for used in node.used_vars() {
            self.check_used(Entity::Var(used), id)?;
        }
        for entity in defined_entities(node) {
            self.define(entity, id)?;
        }
        Ok(())
    }
}

/// Assign slots to every entity of `function`, using `liveness` to decide
/// which slots are free at each definition.
///
/// Blocks are visited breadth-first from the entry, each once; blocks not
/// reachable from the entry are skipped.
pub fn allocate_slots(
    function: &IrFunction,
    liveness: &LivenessInfo,
) -> Result<SlotAllocInfo, SlotAllocError> {
    let code = &function.code;
    let mut alloc = Allocator {
        liveness,
        interference: interference(function, liveness),
        info: SlotAllocInfo::default(),
    };

    for (slot, &param) in (0u32..).zip(&function.params) {
        alloc.assign(Entity::Var(param), slot);
    }

    let entry = code.entry_label();
    let mut seen: FxHashSet<Label> = FxHashSet::from_iter([entry]);
    let mut worklist: VecDeque<Label> = VecDeque::from([entry]);

    while let Some(label) = worklist.pop_front() {
        let Some(block) = code.block(label) else {
            continue;
        };
        for (idx, node) in block.body.iter().enumerate() {
            alloc.visit_node(block.node_id(idx), node)?;
        }
        let term = block.terminator_id();
        for used in block.terminator.used_values() {
            alloc.check_used(Entity::Value(used), term)?;
        }
        for succ in block.terminator.successors() {
            if seen.insert(succ) {
                worklist.push_back(succ);
            }
        }
    }

    tracing::debug!(
        function = %function.id,
        slot_count = alloc.info.slot_count,
        "slots allocated"
    );
    Ok(alloc.info)
}

#[cfg(test)]
mod tests;

#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rustc_hash::FxHashSet;

use luma_ir::{
    BinOp, BranchCondition, FunctionBuilder, FunctionId, IrFunction, Label, Node, NodeId,
    Terminator, Val, ValueId,
};

use super::{allocate_slots, Entity, SlotAllocError, SlotAllocInfo};
use crate::liveness::{compute_liveness, LiveSets};
use crate::test_helpers::{binop, counting_loop, int, load, lower_program, program_strategy, ret};

fn allocate(f: &IrFunction) -> Result<SlotAllocInfo, SlotAllocError> {
    allocate_slots(f, &compute_liveness(&f.code))
}

#[test]
fn empty_function_needs_no_slots() {
    let mut fb = FunctionBuilder::new(FunctionId::new(0), "f");
    ret(&mut fb, vec![]);
    let info = allocate(&fb.finish().unwrap()).unwrap();
    assert_eq!(info.slot_count(), 0);
}

#[test]
fn parameters_take_leading_slots() {
    let mut fb = FunctionBuilder::new(FunctionId::new(0), "f");
    let a = fb.param();
    let b = fb.param();
    let c = fb.param();
    let bv = load(&mut fb, b);
    ret(&mut fb, vec![bv]);
    let info = allocate(&fb.finish().unwrap()).unwrap();

    assert_eq!(info.var_slot(a), Some(0));
    assert_eq!(info.var_slot(b), Some(1));
    assert_eq!(info.var_slot(c), Some(2));
    assert_eq!(info.slot_count(), 3);
}

#[test]
fn dead_values_release_their_slots() {
    let mut fb = FunctionBuilder::new(FunctionId::new(0), "f");
    let a = int(&mut fb, 1);
    let b = int(&mut fb, 2);
    let sum = binop(&mut fb, BinOp::Add, a, b);
    let twice = binop(&mut fb, BinOp::Add, sum, sum);
    ret(&mut fb, vec![twice]);
    let info = allocate(&fb.finish().unwrap()).unwrap();

    assert_eq!(info.value_slot(a), Some(0));
    assert_eq!(info.value_slot(b), Some(1));
    assert_eq!(info.value_slot(sum), Some(0));
    assert_eq!(info.value_slot(twice), Some(0));
    assert_eq!(info.slot_count(), 2);
}

#[test]
fn loop_counter_and_bound_never_share() {
    let f = counting_loop();
    let info = allocate(&f).unwrap();
    let x = f.params[0];
    let i = luma_ir::Var::new(1);
    assert_eq!(info.var_slot(x), Some(0));
    assert_eq!(info.var_slot(i), Some(1));
}

/// `return c and 1 or 2`, through a phi.
fn select_function() -> (IrFunction, luma_ir::PhiVal) {
    let mut fb = FunctionBuilder::new(FunctionId::new(0), "f");
    let p = fb.param();
    let phi = fb.phi();
    let other = fb.label();
    let join = fb.label();
    let c = load(&mut fb, p);
    fb.branch(
        BranchCondition::Bool {
            value: c,
            expected: false,
        },
        other,
    );
    let a = int(&mut fb, 1);
    fb.add(Node::PhiStore { dest: phi, src: a });
    fb.terminate(Terminator::Jmp { target: join });
    fb.add_label(other);
    let b = int(&mut fb, 2);
    fb.add(Node::PhiStore { dest: phi, src: b });
    fb.add_label(join);
    let merged = fb.val();
    fb.add(Node::PhiLoad {
        dest: merged,
        src: phi,
    });
    ret(&mut fb, vec![merged]);
    (fb.finish().unwrap(), phi)
}

#[test]
fn phi_keeps_one_slot_across_edges() {
    let (f, phi) = select_function();
    let info = allocate(&f).unwrap();
    let slot = info.value_slot(phi).unwrap();
    // Both incoming edges write the same register the merge block reads.
    let liveness = compute_liveness(&f.code);
    for block in f.code.blocks() {
        for (idx, node) in block.body.iter().enumerate() {
            if let Node::PhiStore { dest, .. } = node {
                assert_eq!(*dest, phi);
                let live = &liveness.entry(block.node_id(idx)).live_out;
                assert!(live.vals.contains(&ValueId::Phi(phi)));
                assert_eq!(info.value_slot(*dest), Some(slot));
            }
        }
    }
}

#[test]
fn second_definition_of_a_value_is_rejected() {
    let mut fb = FunctionBuilder::new(FunctionId::new(0), "f");
    let v = int(&mut fb, 1);
    fb.add(Node::LoadConst {
        dest: v,
        value: luma_ir::Constant::Int(2),
    });
    ret(&mut fb, vec![v]);
    let err = allocate(&fb.finish().unwrap()).unwrap_err();
    assert_eq!(
        err,
        SlotAllocError::DoubleAssignment {
            value: ValueId::Val(v),
            node: NodeId::new(Label::new(0), 1),
        }
    );
}

#[test]
fn use_without_definition_is_rejected() {
    let mut fb = FunctionBuilder::new(FunctionId::new(0), "f");
    ret(&mut fb, vec![Val::new(5)]);
    let err = allocate(&fb.finish().unwrap()).unwrap_err();
    assert_eq!(
        err,
        SlotAllocError::Unallocated {
            entity: Entity::Value(ValueId::Val(Val::new(5))),
            node: NodeId::new(Label::new(0), 0),
        }
    );
    assert_eq!(err.to_string(), "$5 is used at L0#0 before it has a slot");
}

#[test]
fn variable_live_across_a_later_phi_store_avoids_the_phi_slot() {
    // The first visited edge puts the phi in slot 0. On the second edge a
    // variable is defined before the phi store and stays live across it,
    // so it must not take slot 0.
    let mut fb = FunctionBuilder::new(FunctionId::new(0), "f");
    let p = fb.param();
    let w = fb.var();
    let phi = fb.phi();
    let first = fb.label();
    let join = fb.label();
    let c = load(&mut fb, p);
    fb.branch(
        BranchCondition::Bool {
            value: c,
            expected: true,
        },
        first,
    );
    // Second edge (visited after `first`).
    let zero = int(&mut fb, 0);
    fb.add(Node::VarInit {
        var: w,
        value: zero,
    });
    let b = int(&mut fb, 2);
    fb.add(Node::PhiStore { dest: phi, src: b });
    fb.terminate(Terminator::Jmp { target: join });
    // First edge.
    fb.add_label(first);
    let a = int(&mut fb, 1);
    fb.add(Node::PhiStore { dest: phi, src: a });
    fb.add_label(join);
    let merged = fb.val();
    fb.add(Node::PhiLoad {
        dest: merged,
        src: phi,
    });
    let wv = load(&mut fb, w);
    ret(&mut fb, vec![merged, wv]);
    let f = fb.finish().unwrap();

    let info = allocate(&f).unwrap();
    assert_ne!(info.var_slot(w), info.value_slot(phi));
    assert_no_live_clash(&f, &info);
}

/// `local a, b = 1, 2; while a < b do a, b = b, a end; return a, b`
/// with `a` and `b` carried around the loop as phi values.
fn swap_loop() -> (IrFunction, [luma_ir::PhiVal; 2], [Val; 2]) {
    let mut fb = FunctionBuilder::new(FunctionId::new(0), "swap");
    let p = fb.phi();
    let q = fb.phi();
    let one = int(&mut fb, 1);
    let two = int(&mut fb, 2);
    fb.add(Node::PhiStore { dest: p, src: one });
    fb.add(Node::PhiStore { dest: q, src: two });

    let head = fb.label();
    let exit = fb.label();
    fb.add_label(head);
    let pv = fb.val();
    fb.add(Node::PhiLoad { dest: pv, src: p });
    let qv = fb.val();
    fb.add(Node::PhiLoad { dest: qv, src: q });
    let lt = binop(&mut fb, BinOp::Lt, pv, qv);
    fb.branch(
        BranchCondition::Bool {
            value: lt,
            expected: false,
        },
        exit,
    );
    fb.add(Node::PhiStore { dest: p, src: qv });
    fb.add(Node::PhiStore { dest: q, src: pv });
    fb.terminate(Terminator::Jmp { target: head });

    fb.add_label(exit);
    ret(&mut fb, vec![pv, qv]);
    (fb.finish().unwrap(), [p, q], [pv, qv])
}

#[test]
fn parallel_loop_phis_keep_live_values_apart() {
    let (f, [p, q], [pv, qv]) = swap_loop();
    let info = allocate(&f).unwrap();

    // `pv` is still live while the back edge writes `p`.
    assert_ne!(info.value_slot(pv), info.value_slot(p));
    assert_ne!(info.value_slot(p), info.value_slot(q));
    assert_ne!(info.value_slot(pv), info.value_slot(qv));
    assert_no_live_clash(&f, &info);
}

// ── Cross-check against liveness ────────────────────────────────────

fn live_slots(info: &SlotAllocInfo, live: &LiveSets) -> Vec<u32> {
    let vars = live.vars.iter().map(|&v| info.var_slot(v).unwrap());
    let vals = live.vals.iter().map(|&v| info.value_slot(v).unwrap());
    vars.chain(vals).collect()
}

fn all_distinct(slots: &[u32]) -> bool {
    let unique: FxHashSet<u32> = slots.iter().copied().collect();
    unique.len() == slots.len()
}

fn assert_no_live_clash(f: &IrFunction, info: &SlotAllocInfo) {
    let liveness = compute_liveness(&f.code);
    for block in f.code.blocks() {
        for idx in 0..block.node_count() {
            let entry = liveness.entry(block.node_id(idx));
            assert!(all_distinct(&live_slots(info, &entry.live_in)));
            assert!(all_distinct(&live_slots(info, &entry.live_out)));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// At every program point, the entities live there hold pairwise
    /// distinct slots, and the frame is exactly large enough.
    #[test]
    fn live_entities_never_share_a_slot(program in program_strategy()) {
        let f = lower_program(&program);
        let liveness = compute_liveness(&f.code);
        let info = allocate_slots(&f, &liveness).unwrap();

        for block in f.code.blocks() {
            for idx in 0..block.node_count() {
                let id = block.node_id(idx);
                let entry = liveness.entry(id);
                let before = live_slots(&info, &entry.live_in);
                let after = live_slots(&info, &entry.live_out);
                prop_assert!(all_distinct(&before), "slot clash before {id}: {before:?}");
                prop_assert!(all_distinct(&after), "slot clash after {id}: {after:?}");
            }
        }

        let max = info.values.values().chain(info.vars.values()).copied().max();
        prop_assert_eq!(info.slot_count(), max.map_or(0, |m| m + 1));
    }
}

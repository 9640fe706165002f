#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use pretty_assertions::assert_eq;

use crate::graph::{postorder, predecessors, reachable, reverse_postorder};
use crate::{BranchCondition, Code, CodeBuilder, Label, Terminator, VList, Val};

/// L0 -> {L1, L2} -> L3, plus an unreachable L4.
fn diamond() -> (Code, [Label; 5]) {
    let mut b = CodeBuilder::new();
    let l0 = b.current_label().unwrap();
    let l1 = b.new_label();
    let l2 = b.new_label();
    let l3 = b.new_label();
    let l4 = b.new_label();
    b.add_terminator(Terminator::Branch {
        condition: BranchCondition::Nil(Val::new(0)),
        jump: l1,
        next: l2,
    });
    b.add_label(l1);
    b.add_terminator(Terminator::Jmp { target: l3 });
    b.add_label(l2);
    b.add_label(l3); // fallthrough from l2
    b.add_terminator(Terminator::Ret {
        values: VList::default(),
    });
    b.add_label(l4);
    b.add_terminator(Terminator::Jmp { target: l3 });
    (b.build().unwrap(), [l0, l1, l2, l3, l4])
}

#[test]
fn postorder_visits_reachable_blocks_once() {
    let (code, [l0, _, _, l3, l4]) = diamond();
    let order = postorder(&code);
    assert_eq!(order.len(), 4);
    assert_eq!(order.first(), Some(&l3));
    assert_eq!(order.last(), Some(&l0));
    assert!(!order.contains(&l4));
}

#[test]
fn reverse_postorder_puts_entry_first() {
    let (code, [l0, l1, l2, l3, _]) = diamond();
    let rpo = reverse_postorder(&code);
    assert_eq!(rpo[0], l0);
    let pos = |l: Label| rpo.iter().position(|&x| x == l).unwrap();
    assert!(pos(l1) < pos(l3));
    assert!(pos(l2) < pos(l3));
}

#[test]
fn predecessors_include_unreachable_edges() {
    let (code, [l0, l1, l2, l3, l4]) = diamond();
    let preds = predecessors(&code);
    assert_eq!(preds[&l0].to_vec(), Vec::<Label>::new());
    assert_eq!(preds[&l1].to_vec(), vec![l0]);
    assert_eq!(preds[&l3].to_vec(), vec![l1, l2, l4]);
}

#[test]
fn reachable_excludes_orphans() {
    let (code, [_, _, _, _, l4]) = diamond();
    let set = reachable(&code);
    assert_eq!(set.len(), 4);
    assert!(!set.contains(&l4));
}

#[test]
fn loop_back_edge_terminates() {
    let mut b = CodeBuilder::new();
    let head = b.new_label();
    let exit = b.new_label();
    b.add_label(head);
    b.add_branch(BranchCondition::Nil(Val::new(0)), exit);
    b.add_terminator(Terminator::Jmp { target: head });
    b.add_label(exit);
    b.add_terminator(Terminator::Ret {
        values: VList::default(),
    });
    let code = b.build().unwrap();
    assert_eq!(postorder(&code).len(), 4);
}

//! Shared test utilities for the analysis passes.
//!
//! Provides small hand-built CFG fixtures plus a generator of random
//! structured programs (assignments, `if`, `while`, phi-merging selects,
//! parallel phi copies, calls) used by the property tests. Only compiled in test builds.

#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use proptest::prelude::*;

use luma_ir::{
    BinOp, BranchCondition, Constant, FunctionBuilder, FunctionId, IrFunction, Node, PhiVal,
    Terminator, VList, Val, Var,
};

/// Shorthand for a `Constant::Int` load.
pub(crate) fn int(fb: &mut FunctionBuilder, value: i64) -> Val {
    let dest = fb.val();
    fb.add(Node::LoadConst {
        dest,
        value: Constant::Int(value),
    });
    dest
}

/// Shorthand for a binary operation.
pub(crate) fn binop(fb: &mut FunctionBuilder, op: BinOp, left: Val, right: Val) -> Val {
    let dest = fb.val();
    fb.add(Node::BinOp {
        dest,
        op,
        left,
        right,
    });
    dest
}

/// Shorthand for a variable load.
pub(crate) fn load(fb: &mut FunctionBuilder, var: Var) -> Val {
    let dest = fb.val();
    fb.add(Node::VarLoad { dest, var });
    dest
}

pub(crate) fn ret(fb: &mut FunctionBuilder, values: Vec<Val>) {
    fb.terminate(Terminator::Ret {
        values: VList::new(values),
    });
}

/// `function(x) local i = 0; while i < x do i = i + 1 end; return i end`
pub(crate) fn counting_loop() -> IrFunction {
    let mut fb = FunctionBuilder::new(FunctionId::new(0), "count");
    let x = fb.param();
    let i = fb.var();
    let zero = int(&mut fb, 0);
    fb.add(Node::VarInit { var: i, value: zero });

    let head = fb.label();
    let exit = fb.label();
    fb.add_label(head);
    let iv = load(&mut fb, i);
    let xv = load(&mut fb, x);
    let lt = binop(&mut fb, BinOp::Lt, iv, xv);
    fb.branch(
        BranchCondition::Bool {
            value: lt,
            expected: false,
        },
        exit,
    );
    let iv2 = load(&mut fb, i);
    let one = int(&mut fb, 1);
    let sum = binop(&mut fb, BinOp::Add, iv2, one);
    fb.add(Node::VarStore { var: i, value: sum });
    fb.add(Node::CpuWithdraw { cost: 1 });
    fb.terminate(Terminator::Jmp { target: head });

    fb.add_label(exit);
    let result = load(&mut fb, i);
    ret(&mut fb, vec![result]);
    fb.finish().unwrap()
}

// ── Random structured programs ──────────────────────────────────────

#[derive(Clone, Debug)]
pub(crate) enum Expr {
    Const(i64),
    Copy(usize),
    Add(usize, usize),
    Div(usize, usize),
}

#[derive(Clone, Debug)]
pub(crate) enum Stmt {
    Assign { target: usize, expr: Expr },
    If { cond: usize, then: Vec<Stmt>, els: Vec<Stmt> },
    While { cond: usize, body: Vec<Stmt> },
    /// `target = cond and a or b`, lowered through a phi value.
    Select { target: usize, cond: usize, a: usize, b: usize },
    /// `target = callee(arg)`
    Call { target: usize, callee: usize, arg: usize },
    /// `if cond then x[i] = x[perm[i]] for all i at once end`: one phi per
    /// variable at the join, written in a different order on each edge.
    Permute {
        cond: usize,
        perm: Vec<usize>,
        then_order: Vec<usize>,
        else_order: Vec<usize>,
    },
    /// `while cond do x[i] = x[perm[i]] for all i at once end`, with every
    /// variable carried around the loop as a phi value.
    Rotate {
        cond: usize,
        perm: Vec<usize>,
        entry_order: Vec<usize>,
        back_order: Vec<usize>,
    },
}

pub(crate) const GEN_VARS: usize = 4;

fn var_index() -> impl Strategy<Value = usize> {
    0..GEN_VARS
}

fn permutation() -> impl Strategy<Value = Vec<usize>> {
    Just((0..GEN_VARS).collect::<Vec<_>>()).prop_shuffle()
}

fn expr_strategy() -> impl Strategy<Value = Expr> {
    prop_oneof![
        (-5i64..5).prop_map(Expr::Const),
        var_index().prop_map(Expr::Copy),
        (var_index(), var_index()).prop_map(|(a, b)| Expr::Add(a, b)),
        (var_index(), var_index()).prop_map(|(a, b)| Expr::Div(a, b)),
    ]
}

fn stmt_strategy() -> impl Strategy<Value = Stmt> {
    let leaf = prop_oneof![
        (var_index(), expr_strategy()).prop_map(|(target, expr)| Stmt::Assign { target, expr }),
        (var_index(), var_index(), var_index(), var_index())
            .prop_map(|(target, cond, a, b)| Stmt::Select { target, cond, a, b }),
        (var_index(), var_index(), var_index())
            .prop_map(|(target, callee, arg)| Stmt::Call { target, callee, arg }),
        (var_index(), permutation(), permutation(), permutation()).prop_map(
            |(cond, perm, then_order, else_order)| Stmt::Permute {
                cond,
                perm,
                then_order,
                else_order,
            }
        ),
        (var_index(), permutation(), permutation(), permutation()).prop_map(
            |(cond, perm, entry_order, back_order)| Stmt::Rotate {
                cond,
                perm,
                entry_order,
                back_order,
            }
        ),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            (
                var_index(),
                prop::collection::vec(inner.clone(), 0..4),
                prop::collection::vec(inner.clone(), 0..4)
            )
                .prop_map(|(cond, then, els)| Stmt::If { cond, then, els }),
            (var_index(), prop::collection::vec(inner, 0..4))
                .prop_map(|(cond, body)| Stmt::While { cond, body }),
        ]
    })
}

/// Random program: two parameters, `GEN_VARS` locals, a statement list.
pub(crate) fn program_strategy() -> impl Strategy<Value = Vec<Stmt>> {
    prop::collection::vec(stmt_strategy(), 0..8)
}

/// Lower a generated program to IR.
pub(crate) fn lower_program(stmts: &[Stmt]) -> IrFunction {
    let mut fb = FunctionBuilder::new(FunctionId::new(0), "generated");
    let p0 = fb.param();
    let p1 = fb.param();
    let mut vars = Vec::with_capacity(GEN_VARS);
    for i in 0..GEN_VARS {
        let var = fb.var();
        let init = match i {
            0 => load(&mut fb, p0),
            1 => load(&mut fb, p1),
            _ => int(&mut fb, i64::try_from(i).unwrap()),
        };
        fb.add(Node::VarInit { var, value: init });
        vars.push(var);
    }

    for stmt in stmts {
        lower_stmt(&mut fb, &vars, stmt);
    }

    let results: Vec<Val> = vars.iter().map(|&v| load(&mut fb, v)).collect();
    ret(&mut fb, results);
    fb.finish().unwrap()
}

fn lower_expr(fb: &mut FunctionBuilder, vars: &[Var], expr: &Expr) -> Val {
    match expr {
        Expr::Const(c) => int(fb, *c),
        Expr::Copy(v) => load(fb, vars[*v]),
        Expr::Add(a, b) => {
            let l = load(fb, vars[*a]);
            let r = load(fb, vars[*b]);
            binop(fb, BinOp::Add, l, r)
        }
        Expr::Div(a, b) => {
            let l = load(fb, vars[*a]);
            let r = load(fb, vars[*b]);
            binop(fb, BinOp::Div, l, r)
        }
    }
}

fn lower_stmt(fb: &mut FunctionBuilder, vars: &[Var], stmt: &Stmt) {
    match stmt {
        Stmt::Assign { target, expr } => {
            let value = lower_expr(fb, vars, expr);
            fb.add(Node::VarStore {
                var: vars[*target],
                value,
            });
        }
        Stmt::If { cond, then, els } => {
            let else_label = fb.label();
            let end = fb.label();
            let c = load(fb, vars[*cond]);
            fb.branch(
                BranchCondition::Bool {
                    value: c,
                    expected: false,
                },
                else_label,
            );
            for s in then {
                lower_stmt(fb, vars, s);
            }
            fb.terminate(Terminator::Jmp { target: end });
            fb.add_label(else_label);
            for s in els {
                lower_stmt(fb, vars, s);
            }
            fb.add_label(end);
        }
        Stmt::While { cond, body } => {
            let head = fb.label();
            let exit = fb.label();
            fb.add_label(head);
            let c = load(fb, vars[*cond]);
            fb.branch(
                BranchCondition::Bool {
                    value: c,
                    expected: false,
                },
                exit,
            );
            for s in body {
                lower_stmt(fb, vars, s);
            }
            fb.add(Node::CpuWithdraw { cost: 1 });
            fb.terminate(Terminator::Jmp { target: head });
            fb.add_label(exit);
        }
        Stmt::Select { target, cond, a, b } => {
            let phi = fb.phi();
            let else_label = fb.label();
            let join = fb.label();
            let c = load(fb, vars[*cond]);
            let av = load(fb, vars[*a]);
            let bv = load(fb, vars[*b]);
            fb.branch(
                BranchCondition::Bool {
                    value: c,
                    expected: false,
                },
                else_label,
            );
            fb.add(Node::PhiStore { dest: phi, src: av });
            fb.terminate(Terminator::Jmp { target: join });
            fb.add_label(else_label);
            fb.add(Node::PhiStore { dest: phi, src: bv });
            fb.add_label(join);
            let merged = fb.val();
            fb.add(Node::PhiLoad {
                dest: merged,
                src: phi,
            });
            fb.add(Node::VarStore {
                var: vars[*target],
                value: merged,
            });
        }
        Stmt::Call {
            target,
            callee,
            arg,
        } => {
            let f = load(fb, vars[*callee]);
            let x = load(fb, vars[*arg]);
            let results = fb.multi();
            fb.add(Node::Call {
                dest: results,
                target: f,
                args: VList::new(vec![x]),
            });
            let first = fb.val();
            fb.add(Node::MultiGet {
                dest: first,
                src: results,
                index: 0,
            });
            fb.add(Node::VarStore {
                var: vars[*target],
                value: first,
            });
        }
        Stmt::Permute {
            cond,
            perm,
            then_order,
            else_order,
        } => lower_permute(fb, vars, *cond, perm, then_order, else_order),
        Stmt::Rotate {
            cond,
            perm,
            entry_order,
            back_order,
        } => lower_rotate(fb, vars, *cond, perm, entry_order, back_order),
    }
}

fn lower_permute(
    fb: &mut FunctionBuilder,
    vars: &[Var],
    cond: usize,
    perm: &[usize],
    then_order: &[usize],
    else_order: &[usize],
) {
    let phis: Vec<PhiVal> = vars.iter().map(|_| fb.phi()).collect();
    let else_label = fb.label();
    let join = fb.label();
    let values: Vec<Val> = vars.iter().map(|&v| load(fb, v)).collect();
    fb.branch(
        BranchCondition::Bool {
            value: values[cond],
            expected: false,
        },
        else_label,
    );
    for &i in then_order {
        fb.add(Node::PhiStore {
            dest: phis[i],
            src: values[perm[i]],
        });
    }
    fb.terminate(Terminator::Jmp { target: join });
    fb.add_label(else_label);
    for &i in else_order {
        fb.add(Node::PhiStore {
            dest: phis[i],
            src: values[i],
        });
    }
    fb.add_label(join);
    store_phis(fb, vars, &phis);
}

fn lower_rotate(
    fb: &mut FunctionBuilder,
    vars: &[Var],
    cond: usize,
    perm: &[usize],
    entry_order: &[usize],
    back_order: &[usize],
) {
    let phis: Vec<PhiVal> = vars.iter().map(|_| fb.phi()).collect();
    for &i in entry_order {
        let value = load(fb, vars[i]);
        fb.add(Node::PhiStore {
            dest: phis[i],
            src: value,
        });
    }
    let head = fb.label();
    let exit = fb.label();
    fb.add_label(head);
    let current: Vec<Val> = phis
        .iter()
        .map(|&phi| {
            let dest = fb.val();
            fb.add(Node::PhiLoad { dest, src: phi });
            dest
        })
        .collect();
    fb.branch(
        BranchCondition::Bool {
            value: current[cond],
            expected: false,
        },
        exit,
    );
    for &i in back_order {
        fb.add(Node::PhiStore {
            dest: phis[i],
            src: current[perm[i]],
        });
    }
    fb.add(Node::CpuWithdraw { cost: 1 });
    fb.terminate(Terminator::Jmp { target: head });
    fb.add_label(exit);
    for (&var, &value) in vars.iter().zip(&current) {
        fb.add(Node::VarStore { var, value });
    }
}

fn store_phis(fb: &mut FunctionBuilder, vars: &[Var], phis: &[PhiVal]) {
    for (&var, &phi) in vars.iter().zip(phis) {
        let merged = fb.val();
        fb.add(Node::PhiLoad {
            dest: merged,
            src: phi,
        });
        fb.add(Node::VarStore { var, value: merged });
    }
}

//! IR nodes: the non-branching body nodes of a basic block and the
//! terminators that end it.
//!
//! Both are closed enums so every analysis pass matches exhaustively;
//! adding a node kind is a compile error in every pass until handled.
//!
//! Operands are always [`Val`]s. Phi values are written with
//! [`Node::PhiStore`] at the end of each incoming edge and read back into a
//! `Val` with [`Node::PhiLoad`] in the merge block.

use smallvec::{smallvec, SmallVec};

use crate::ids::{Capture, FunctionId, Label, MultiVal, PhiVal, UpVar, Val, ValueId, Var};

// ── Constants ───────────────────────────────────────────────────────

/// A literal constant loaded by [`Node::LoadConst`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Box<str>),
}

// ── Operators ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Neq,
    Lt,
    Le,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn as_symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "^",
            BinOp::Concat => "..",
            BinOp::Eq => "==",
            BinOp::Neq => "~=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::BAnd => "&",
            BinOp::BOr => "|",
            BinOp::BXor => "~",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }

    /// Whether the operator is one of the arithmetic or bitwise operators
    /// whose result type follows a numeric policy.
    pub fn is_numeric(self) -> bool {
        !matches!(
            self,
            BinOp::Concat | BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Le
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum UnOp {
    /// Arithmetic negation.
    Unm,
    Not,
    Len,
    BNot,
}

impl UnOp {
    pub fn as_symbol(self) -> &'static str {
        match self {
            UnOp::Unm => "-",
            UnOp::Not => "not ",
            UnOp::Len => "#",
            UnOp::BNot => "~",
        }
    }
}

/// Table access flavor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Access {
    /// Bypasses metamethods (`rawget`/`rawset`, constructors).
    Raw,
    /// May dispatch to `__index`/`__newindex`.
    Dispatch,
}

/// Argument or return-value list: fixed values plus an optional
/// multi-value tail (`f(a, b, g())`, `return ...`).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct VList {
    pub fixed: Vec<Val>,
    pub tail: Option<MultiVal>,
}

impl VList {
    pub fn new(fixed: Vec<Val>) -> Self {
        Self { fixed, tail: None }
    }

    pub fn with_tail(fixed: Vec<Val>, tail: MultiVal) -> Self {
        Self {
            fixed,
            tail: Some(tail),
        }
    }
}

// ── Body nodes ──────────────────────────────────────────────────────

/// A non-branching node of a basic block body.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Node {
    /// `dest = constant`
    LoadConst { dest: Val, value: Constant },

    /// `dest = left op right`
    BinOp {
        dest: Val,
        op: BinOp,
        left: Val,
        right: Val,
    },

    /// `dest = op operand`
    UnOp { dest: Val, op: UnOp, operand: Val },

    /// `dest = {}` with size hints.
    TabNew {
        dest: Val,
        array_size: u32,
        hash_size: u32,
    },

    /// `dest = table[key]`
    TabGet {
        dest: Val,
        table: Val,
        key: Val,
        access: Access,
    },

    /// `table[key] = value`
    TabSet {
        table: Val,
        key: Val,
        value: Val,
        access: Access,
    },

    /// Raw-append a multi-value group at integer keys
    /// `first_index, first_index + 1, ...` (constructor tail `{a, f()}`).
    TabAppend {
        table: Val,
        first_index: u32,
        values: MultiVal,
    },

    /// Declare a local and give it its initial value.
    VarInit { var: Var, value: Val },

    /// `dest = var`
    VarLoad { dest: Val, var: Var },

    /// `var = value`
    VarStore { var: Var, value: Val },

    /// `dest = upvalue`
    UpLoad { dest: Val, upvar: UpVar },

    /// `upvalue = value`
    UpStore { upvar: UpVar, value: Val },

    /// Define the phi value on this incoming edge.
    PhiStore { dest: PhiVal, src: Val },

    /// Read the merged phi value.
    PhiLoad { dest: Val, src: PhiVal },

    /// `dest = values[index]` (nil past the end).
    MultiGet {
        dest: Val,
        src: MultiVal,
        index: u32,
    },

    /// `dest... = target(args)`
    Call {
        dest: MultiVal,
        target: Val,
        args: VList,
    },

    /// Instantiate a nested function, capturing variables by reference.
    ///
    /// Capture `i` becomes upvalue `@i` of the nested function.
    Closure {
        dest: Val,
        function: FunctionId,
        captures: Vec<Capture>,
    },

    /// `dest... = ...`
    Vararg { dest: MultiVal },

    /// `dest = tonumber(src)`; raises a guest error when `src` is not
    /// convertible (numeric `for` preparation).
    ToNumber { dest: Val, src: Val },

    /// Cost accounting hook: consume `cost` scheduling ticks and offer the
    /// scheduler a chance to preempt.
    CpuWithdraw { cost: u32 },
}

impl Node {
    /// The scalar value defined (written) by this node, if any.
    pub fn defined_value(&self) -> Option<ValueId> {
        match self {
            Node::LoadConst { dest, .. }
            | Node::BinOp { dest, .. }
            | Node::UnOp { dest, .. }
            | Node::TabNew { dest, .. }
            | Node::TabGet { dest, .. }
            | Node::VarLoad { dest, .. }
            | Node::UpLoad { dest, .. }
            | Node::PhiLoad { dest, .. }
            | Node::MultiGet { dest, .. }
            | Node::Closure { dest, .. }
            | Node::ToNumber { dest, .. } => Some(ValueId::Val(*dest)),

            Node::PhiStore { dest, .. } => Some(ValueId::Phi(*dest)),

            Node::TabSet { .. }
            | Node::TabAppend { .. }
            | Node::VarInit { .. }
            | Node::VarStore { .. }
            | Node::UpStore { .. }
            | Node::Call { .. }
            | Node::Vararg { .. }
            | Node::CpuWithdraw { .. } => None,
        }
    }

    /// The variable declared by this node, if any.
    ///
    /// Only `VarInit` defines a variable. `VarStore` writes into storage
    /// that already exists and counts as a use.
    pub fn defined_var(&self) -> Option<Var> {
        match self {
            Node::VarInit { var, .. } => Some(*var),
            _ => None,
        }
    }

    /// The multi-value group defined by this node, if any.
    pub fn defined_multi(&self) -> Option<MultiVal> {
        match self {
            Node::Call { dest, .. } | Node::Vararg { dest } => Some(*dest),
            _ => None,
        }
    }

    /// All scalar values read by this node.
    pub fn used_values(&self) -> SmallVec<[ValueId; 4]> {
        let v = |v: &Val| ValueId::Val(*v);
        match self {
            Node::LoadConst { .. }
            | Node::TabNew { .. }
            | Node::VarLoad { .. }
            | Node::UpLoad { .. }
            | Node::MultiGet { .. }
            | Node::Closure { .. }
            | Node::Vararg { .. }
            | Node::CpuWithdraw { .. } => SmallVec::new(),

            Node::BinOp { left, right, .. } => smallvec![v(left), v(right)],
            Node::UnOp { operand, .. } => smallvec![v(operand)],
            Node::TabGet { table, key, .. } => smallvec![v(table), v(key)],
            Node::TabSet {
                table, key, value, ..
            } => smallvec![v(table), v(key), v(value)],
            Node::TabAppend { table, .. } => smallvec![v(table)],
            Node::VarInit { value, .. }
            | Node::VarStore { value, .. }
            | Node::UpStore { value, .. }
            | Node::PhiStore { src: value, .. }
            | Node::ToNumber { src: value, .. } => smallvec![v(value)],
            Node::PhiLoad { src, .. } => smallvec![ValueId::Phi(*src)],
            Node::Call { target, args, .. } => {
                let mut used = SmallVec::with_capacity(1 + args.fixed.len());
                used.push(v(target));
                used.extend(args.fixed.iter().map(v));
                used
            }
        }
    }

    /// All local variables read by this node.
    pub fn used_vars(&self) -> SmallVec<[Var; 2]> {
        match self {
            Node::VarLoad { var, .. } | Node::VarStore { var, .. } => smallvec![*var],
            Node::Closure { captures, .. } => captures
                .iter()
                .filter_map(|c| match c {
                    Capture::Var(var) => Some(*var),
                    Capture::UpVar(_) => None,
                })
                .collect(),
            _ => SmallVec::new(),
        }
    }

    /// All multi-value groups read by this node.
    pub fn used_multis(&self) -> Option<MultiVal> {
        match self {
            Node::TabAppend { values, .. } => Some(*values),
            Node::MultiGet { src, .. } => Some(*src),
            Node::Call { args, .. } => args.tail,
            _ => None,
        }
    }
}

// ── Terminators ─────────────────────────────────────────────────────

/// Condition tested by [`Terminator::Branch`]. The branch jumps when the
/// condition holds and falls through to `next` otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum BranchCondition {
    /// Holds when the value is `nil`.
    Nil(Val),
    /// Holds when the truthiness of `value` equals `expected`.
    Bool { value: Val, expected: bool },
    /// Holds when a numeric `for` loop has run past its limit:
    /// `step > 0 and var > limit` or `step <= 0 and var < limit`.
    NumLoopEnd { var: Val, limit: Val, step: Val },
}

impl BranchCondition {
    pub fn used_values(&self) -> SmallVec<[ValueId; 4]> {
        match self {
            BranchCondition::Nil(value) | BranchCondition::Bool { value, .. } => {
                smallvec![ValueId::Val(*value)]
            }
            BranchCondition::NumLoopEnd { var, limit, step } => smallvec![
                ValueId::Val(*var),
                ValueId::Val(*limit),
                ValueId::Val(*step)
            ],
        }
    }
}

/// How control leaves a basic block.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Terminator {
    /// Fallthrough into the next block, inserted by the builder when a new
    /// label opens while the current block is still open.
    ToNext { label: Label },
    /// Unconditional jump.
    Jmp { target: Label },
    /// Conditional jump.
    Branch {
        condition: BranchCondition,
        jump: Label,
        next: Label,
    },
    /// Return from the function.
    Ret { values: VList },
    /// Tail call: the callee's results become this function's results.
    TCall { target: Val, args: VList },
}

impl Terminator {
    /// Successor labels in jump-then-fallthrough order.
    pub fn successors(&self) -> SmallVec<[Label; 2]> {
        match self {
            Terminator::ToNext { label } | Terminator::Jmp { target: label } => smallvec![*label],
            Terminator::Branch { jump, next, .. } => smallvec![*jump, *next],
            Terminator::Ret { .. } | Terminator::TCall { .. } => SmallVec::new(),
        }
    }

    /// All scalar values read by this terminator.
    pub fn used_values(&self) -> SmallVec<[ValueId; 4]> {
        match self {
            Terminator::ToNext { .. } | Terminator::Jmp { .. } => SmallVec::new(),
            Terminator::Branch { condition, .. } => condition.used_values(),
            Terminator::Ret { values } => values.fixed.iter().map(|v| ValueId::Val(*v)).collect(),
            Terminator::TCall { target, args } => {
                let mut used = SmallVec::with_capacity(1 + args.fixed.len());
                used.push(ValueId::Val(*target));
                used.extend(args.fixed.iter().map(|v| ValueId::Val(*v)));
                used
            }
        }
    }

    /// The multi-value tail read by this terminator, if any.
    pub fn used_multis(&self) -> Option<MultiVal> {
        match self {
            Terminator::Ret { values } => values.tail,
            Terminator::TCall { args, .. } => args.tail,
            _ => None,
        }
    }
}

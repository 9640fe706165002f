//! Forward type inference over the IR lattice.
//!
//! Each label carries a `Var → Type` environment at its entry; SSA values
//! and phi values carry one global type each (joined when a phi is written
//! along several edges), multi-value groups carry a [`TypeSeq`]. The
//! analysis runs to a fixpoint with a label worklist.
//!
//! A variable captured by any closure is *reified*: it lives in a shared
//! cell the closure can write at any time, so loads of it are always
//! `Any`.
//!
//! Besides types, every node gets a set of [`Effects`]: when the outcome
//! of a node is not statically known it may call into arbitrary guest code
//! (a metamethod, a callee), which can observe the frame and upvalues.

use std::collections::VecDeque;

use bitflags::bitflags;
use rustc_hash::{FxHashMap, FxHashSet};

use luma_ir::{
    BinOp, Capture, Constant, IrFunction, Label, MultiVal, Node, NodeId, PhiVal, Terminator, Type,
    TypeSeq, UnOp, Val, ValueId, Var,
};

bitflags! {
    /// What a node may observe of the running function when it executes.
    ///
    /// Backends must keep the frame (or the upvalues) materialized before
    /// executing a node with the matching flag.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct Effects: u8 {
        /// Guest code may run and inspect the current stack.
        const OBSERVES_STACK = 1 << 0;
        /// Guest code may run and read or write upvalues.
        const OBSERVES_UPVALUES = 1 << 1;
    }
}

impl Effects {
    /// Both flags: the node may run arbitrary guest code.
    pub const ARBITRARY: Effects = Effects::OBSERVES_STACK.union(Effects::OBSERVES_UPVALUES);
}

// ── Numeric policies ────────────────────────────────────────────────

/// How an arithmetic or bitwise operator types its result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumericPolicy {
    /// Integer when both operands are integers, float when a float is
    /// involved (`+ - * % //`, unary minus).
    MayBeInteger,
    /// Always float (`/ ^`).
    MustBeFloat,
    /// Always integer (`& | ~ << >>`, bitwise not).
    MustBeInteger,
}

impl NumericPolicy {
    pub fn for_binop(op: BinOp) -> Option<NumericPolicy> {
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Mod | BinOp::IDiv => {
                Some(NumericPolicy::MayBeInteger)
            }
            BinOp::Div | BinOp::Pow => Some(NumericPolicy::MustBeFloat),
            BinOp::BAnd | BinOp::BOr | BinOp::BXor | BinOp::Shl | BinOp::Shr => {
                Some(NumericPolicy::MustBeInteger)
            }
            BinOp::Concat | BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Le => None,
        }
    }

    pub fn for_unop(op: UnOp) -> Option<NumericPolicy> {
        match op {
            UnOp::Unm => Some(NumericPolicy::MayBeInteger),
            UnOp::BNot => Some(NumericPolicy::MustBeInteger),
            UnOp::Not | UnOp::Len => None,
        }
    }

    /// Result type for the given operand types. Unary operators pass the
    /// same type twice.
    pub fn apply(self, left: Type, right: Type) -> Type {
        if !left.is_numeric() || !right.is_numeric() {
            return Type::Any;
        }
        match self {
            NumericPolicy::MustBeFloat => Type::Float,
            NumericPolicy::MustBeInteger => Type::Integer,
            NumericPolicy::MayBeInteger => match (left, right) {
                (Type::Integer, Type::Integer) => Type::Integer,
                (Type::Float, _) | (_, Type::Float) => Type::Float,
                _ => Type::Number,
            },
        }
    }
}

fn constant_type(value: &Constant) -> Type {
    match value {
        Constant::Nil => Type::Nil,
        Constant::Bool(_) => Type::Boolean,
        Constant::Int(_) => Type::Integer,
        Constant::Float(_) => Type::Float,
        Constant::Str(_) => Type::String,
    }
}

/// Result type and effects of a binary operator.
pub fn binop_type(op: BinOp, left: Type, right: Type) -> (Type, Effects) {
    let ty = match op {
        BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Le => {
            let primitive = (left.is_numeric() && right.is_numeric())
                || (left == Type::String && right == Type::String);
            let effects = if primitive {
                Effects::empty()
            } else {
                Effects::ARBITRARY
            };
            return (Type::Boolean, effects);
        }
        BinOp::Concat => {
            let stringish = |t: Type| t == Type::String || t.is_numeric();
            if stringish(left) && stringish(right) {
                Type::String
            } else {
                Type::Any
            }
        }
        _ => match NumericPolicy::for_binop(op) {
            Some(policy) => policy.apply(left, right),
            None => Type::Any,
        },
    };
    (ty, effects_of(ty))
}

/// Result type and effects of a unary operator.
pub fn unop_type(op: UnOp, operand: Type) -> (Type, Effects) {
    let ty = match op {
        UnOp::Not => Type::Boolean,
        UnOp::Len if operand == Type::String => Type::Integer,
        UnOp::Len => Type::Any,
        UnOp::Unm | UnOp::BNot => match NumericPolicy::for_unop(op) {
            Some(policy) => policy.apply(operand, operand),
            None => Type::Any,
        },
    };
    (ty, effects_of(ty))
}

fn effects_of(ty: Type) -> Effects {
    if ty == Type::Any {
        Effects::ARBITRARY
    } else {
        Effects::empty()
    }
}

// ── Results ─────────────────────────────────────────────────────────

/// Inferred types and effects of one function.
#[derive(Clone, Debug, Default)]
pub struct TypeInfo {
    values: FxHashMap<ValueId, Type>,
    multis: FxHashMap<MultiVal, TypeSeq>,
    reified: FxHashSet<Var>,
    effects: FxHashMap<NodeId, Effects>,
    var_types: FxHashMap<Label, FxHashMap<Var, Type>>,
}

impl TypeInfo {
    /// Type of an SSA or phi value; `None` if it is never defined on a
    /// reachable path.
    pub fn value_type(&self, value: impl Into<ValueId>) -> Option<Type> {
        self.values.get(&value.into()).copied()
    }

    pub fn val_type(&self, val: Val) -> Option<Type> {
        self.value_type(val)
    }

    pub fn phi_type(&self, phi: PhiVal) -> Option<Type> {
        self.value_type(phi)
    }

    pub fn multi_type(&self, multi: MultiVal) -> Option<&TypeSeq> {
        self.multis.get(&multi)
    }

    /// Whether `var` is captured by a closure and lives in a shared cell.
    pub fn is_reified(&self, var: Var) -> bool {
        self.reified.contains(&var)
    }

    pub fn reified_vars(&self) -> impl Iterator<Item = Var> + '_ {
        self.reified.iter().copied()
    }

    /// Effects of `node`; empty for nodes that observe nothing.
    pub fn effects(&self, node: NodeId) -> Effects {
        self.effects.get(&node).copied().unwrap_or_default()
    }

    /// Type of `var` at the entry of the block at `label`.
    pub fn var_type_at(&self, label: Label, var: Var) -> Option<Type> {
        self.var_types.get(&label)?.get(&var).copied()
    }
}

// ── Inference ───────────────────────────────────────────────────────

type Env = FxHashMap<Var, Type>;

struct Inference {
    info: TypeInfo,
    /// Set when any global value or multi type grows during a block.
    globals_changed: bool,
}

impl Inference {
    fn set_value(&mut self, id: ValueId, ty: Type) {
        let joined = match self.info.values.get(&id) {
            Some(&old) => old.join(ty),
            None => ty,
        };
        if self.info.values.insert(id, joined) != Some(joined) {
            tracing::trace!(value = %id, ty = %joined, "value type changed");
            self.globals_changed = true;
        }
    }

    fn set_multi(&mut self, id: MultiVal, seq: TypeSeq) {
        let joined = match self.info.multis.get(&id) {
            Some(old) => old.join(&seq),
            None => seq,
        };
        if self.info.multis.get(&id) != Some(&joined) {
            self.info.multis.insert(id, joined);
            self.globals_changed = true;
        }
    }

    fn val(&self, val: Val) -> Option<Type> {
        self.info.values.get(&ValueId::Val(val)).copied()
    }

    fn add_effects(&mut self, node: NodeId, effects: Effects) {
        if !effects.is_empty() {
            *self.info.effects.entry(node).or_default() |= effects;
        }
    }

    /// Write a variable's current type into `env`, or drop it while its
    /// source is still unknown.
    fn assign_var(&self, env: &mut Env, var: Var, value: Val) {
        let ty = if self.info.reified.contains(&var) {
            Some(Type::Any)
        } else {
            self.val(value)
        };
        match ty {
            Some(ty) => {
                env.insert(var, ty);
            }
            None => {
                env.remove(&var);
            }
        }
    }

    fn transfer(&mut self, id: NodeId, node: &Node, env: &mut Env) {
        match node {
            Node::LoadConst { dest, value } => {
                self.set_value(ValueId::Val(*dest), constant_type(value));
            }
            Node::BinOp {
                dest,
                op,
                left,
                right,
            } => {
                if let (Some(l), Some(r)) = (self.val(*left), self.val(*right)) {
                    let (ty, effects) = binop_type(*op, l, r);
                    self.set_value(ValueId::Val(*dest), ty);
                    self.add_effects(id, effects);
                }
            }
            Node::UnOp { dest, op, operand } => {
                if let Some(t) = self.val(*operand) {
                    let (ty, effects) = unop_type(*op, t);
                    self.set_value(ValueId::Val(*dest), ty);
                    self.add_effects(id, effects);
                }
            }
            Node::TabNew { dest, .. } => {
                self.set_value(ValueId::Val(*dest), Type::Table);
                self.add_effects(id, Effects::ARBITRARY);
            }
            Node::TabGet { dest, .. } => {
                self.set_value(ValueId::Val(*dest), Type::Any);
                self.add_effects(id, Effects::ARBITRARY);
            }
            Node::TabSet { .. } | Node::TabAppend { .. } => {
                self.add_effects(id, Effects::ARBITRARY);
            }
            Node::VarInit { var, value } | Node::VarStore { var, value } => {
                self.assign_var(env, *var, *value);
            }
            Node::VarLoad { dest, var } => {
                let ty = if self.info.reified.contains(var) {
                    Some(Type::Any)
                } else {
                    env.get(var).copied()
                };
                if let Some(ty) = ty {
                    self.set_value(ValueId::Val(*dest), ty);
                }
            }
            Node::UpLoad { dest, .. } => self.set_value(ValueId::Val(*dest), Type::Any),
            Node::UpStore { .. } | Node::CpuWithdraw { .. } => {}
            Node::PhiStore { dest, src } => {
                if let Some(ty) = self.val(*src) {
                    self.set_value(ValueId::Phi(*dest), ty);
                }
            }
            Node::PhiLoad { dest, src } => {
                if let Some(&ty) = self.info.values.get(&ValueId::Phi(*src)) {
                    self.set_value(ValueId::Val(*dest), ty);
                }
            }
            Node::MultiGet { dest, src, index } => {
                let ty = self.info.multis.get(src).map(|seq| seq.get(*index as usize));
                if let Some(ty) = ty {
                    self.set_value(ValueId::Val(*dest), ty);
                }
            }
            Node::Call { dest, .. } => {
                self.set_multi(*dest, TypeSeq::vararg());
                self.add_effects(id, Effects::ARBITRARY);
            }
            Node::Vararg { dest } => self.set_multi(*dest, TypeSeq::vararg()),
            Node::Closure { dest, .. } => self.set_value(ValueId::Val(*dest), Type::Function),
            Node::ToNumber { dest, src } => {
                if let Some(t) = self.val(*src) {
                    let ty = if t.is_numeric() { t } else { Type::Number };
                    self.set_value(ValueId::Val(*dest), ty);
                }
            }
        }
    }
}

fn reified_vars(function: &IrFunction) -> FxHashSet<Var> {
    function
        .code
        .blocks()
        .iter()
        .flat_map(|b| b.body.iter())
        .filter_map(|node| match node {
            Node::Closure { captures, .. } => Some(captures),
            _ => None,
        })
        .flatten()
        .filter_map(|capture| match capture {
            Capture::Var(var) => Some(*var),
            Capture::UpVar(_) => None,
        })
        .collect()
}

/// Join `incoming` into `target`; returns whether `target` grew.
fn join_env(target: &mut Env, incoming: &Env) -> bool {
    let mut changed = false;
    for (&var, &ty) in incoming {
        match target.get_mut(&var) {
            Some(old) => {
                let joined = old.join(ty);
                if joined != *old {
                    *old = joined;
                    changed = true;
                }
            }
            None => {
                target.insert(var, ty);
                changed = true;
            }
        }
    }
    changed
}

/// Infer value types and node effects for `function`.
///
/// Only blocks reachable from the entry are analyzed; values defined only
/// in unreachable blocks have no type.
pub fn infer_types(function: &IrFunction) -> TypeInfo {
    let code = &function.code;
    tracing::debug!(function = %function.id, num_blocks = code.len(), "inferring types");

    let mut inference = Inference {
        info: TypeInfo {
            reified: reified_vars(function),
            ..TypeInfo::default()
        },
        globals_changed: false,
    };

    let entry = code.entry_label();
    let entry_env: Env = function.params.iter().map(|&p| (p, Type::Any)).collect();
    inference.info.var_types.insert(entry, entry_env);

    let mut worklist: VecDeque<Label> = VecDeque::from([entry]);
    let mut queued: FxHashSet<Label> = FxHashSet::from_iter([entry]);
    let mut visited: Vec<Label> = Vec::new();
    let mut iterations = 0usize;

    while let Some(label) = worklist.pop_front() {
        queued.remove(&label);
        iterations += 1;
        let Some(block) = code.block(label) else {
            continue;
        };
        if !visited.contains(&label) {
            visited.push(label);
        }

        let mut env = inference
            .info
            .var_types
            .get(&label)
            .cloned()
            .unwrap_or_default();
        inference.globals_changed = false;

        for (idx, node) in block.body.iter().enumerate() {
            let id = block.node_id(idx);
            inference.transfer(id, node, &mut env);
        }
        if matches!(block.terminator, Terminator::TCall { .. }) {
            inference.add_effects(block.terminator_id(), Effects::ARBITRARY);
        }

        for succ in block.terminator.successors() {
            let target = inference.info.var_types.entry(succ).or_default();
            let grew = join_env(target, &env);
            let first_visit = !visited.contains(&succ);
            if (grew || first_visit) && queued.insert(succ) {
                worklist.push_back(succ);
            }
        }

        // A value's type feeds uses in other blocks; revisit everything
        // reached so far.
        if inference.globals_changed {
            for &seen in &visited {
                if queued.insert(seen) {
                    worklist.push_back(seen);
                }
            }
        }
    }

    tracing::debug!(
        iterations,
        num_values = inference.info.values.len(),
        "type inference converged"
    );
    inference.info
}

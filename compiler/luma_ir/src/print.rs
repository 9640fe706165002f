//! Textual rendering of IR, one node per line.
//!
//! ```text
//! L0:
//!   $0 = const 1
//!   $1 = $0 + $0
//!   ret ($1)
//! ```

use std::fmt;

use crate::code::{BasicBlock, Code};
use crate::function::IrFunction;
use crate::node::{Access, BranchCondition, Constant, Node, Terminator, VList};

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Nil => f.write_str("nil"),
            Constant::Bool(b) => write!(f, "{b}"),
            Constant::Int(i) => write!(f, "{i}"),
            Constant::Float(x) => write!(f, "{x:?}"),
            Constant::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl fmt::Display for VList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.fixed.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        if let Some(tail) = self.tail {
            if !self.fixed.is_empty() {
                f.write_str(", ")?;
            }
            write!(f, "{tail}...")?;
        }
        f.write_str(")")
    }
}

fn access_suffix(access: Access) -> &'static str {
    match access {
        Access::Raw => "raw",
        Access::Dispatch => "",
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::LoadConst { dest, value } => write!(f, "{dest} = const {value}"),
            Node::BinOp {
                dest,
                op,
                left,
                right,
            } => write!(f, "{dest} = {left} {} {right}", op.as_symbol()),
            Node::UnOp { dest, op, operand } => write!(f, "{dest} = {}{operand}", op.as_symbol()),
            Node::TabNew {
                dest,
                array_size,
                hash_size,
            } => write!(f, "{dest} = {{}} [{array_size}, {hash_size}]"),
            Node::TabGet {
                dest,
                table,
                key,
                access,
            } => write!(f, "{dest} = {table}[{key}]{}", access_suffix(*access)),
            Node::TabSet {
                table,
                key,
                value,
                access,
            } => write!(f, "{table}[{key}]{} = {value}", access_suffix(*access)),
            Node::TabAppend {
                table,
                first_index,
                values,
            } => write!(f, "{table}[{first_index}...] = {values}..."),
            Node::VarInit { var, value } => write!(f, "local {var} = {value}"),
            Node::VarLoad { dest, var } => write!(f, "{dest} = {var}"),
            Node::VarStore { var, value } => write!(f, "{var} = {value}"),
            Node::UpLoad { dest, upvar } => write!(f, "{dest} = {upvar}"),
            Node::UpStore { upvar, value } => write!(f, "{upvar} = {value}"),
            Node::PhiStore { dest, src } => write!(f, "{dest} := {src}"),
            Node::PhiLoad { dest, src } => write!(f, "{dest} = {src}"),
            Node::MultiGet { dest, src, index } => write!(f, "{dest} = {src}[{index}]"),
            Node::Call { dest, target, args } => write!(f, "{dest}... = call {target}{args}"),
            Node::Closure {
                dest,
                function,
                captures,
            } => {
                write!(f, "{dest} = closure {function} [")?;
                for (i, c) in captures.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("]")
            }
            Node::Vararg { dest } => write!(f, "{dest}... = ..."),
            Node::ToNumber { dest, src } => write!(f, "{dest} = tonumber {src}"),
            Node::CpuWithdraw { cost } => write!(f, "cpu {cost}"),
        }
    }
}

impl fmt::Display for BranchCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchCondition::Nil(v) => write!(f, "nil {v}"),
            BranchCondition::Bool { value, expected } => write!(f, "{value} is {expected}"),
            BranchCondition::NumLoopEnd { var, limit, step } => {
                write!(f, "loopend {var} {limit} {step}")
            }
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::ToNext { label } => write!(f, "next {label}"),
            Terminator::Jmp { target } => write!(f, "jmp {target}"),
            Terminator::Branch {
                condition,
                jump,
                next,
            } => write!(f, "if {condition} jmp {jump} else {next}"),
            Terminator::Ret { values } => write!(f, "ret {values}"),
            Terminator::TCall { target, args } => write!(f, "tailcall {target}{args}"),
        }
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for node in &self.body {
            writeln!(f, "  {node}")?;
        }
        writeln!(f, "  {}", self.terminator)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in self.blocks() {
            write!(f, "{block}")?;
        }
        Ok(())
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {} {} (", self.id, self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        if self.is_vararg {
            f.write_str(if self.params.is_empty() { "..." } else { ", ..." })?;
        }
        writeln!(f, ")")?;
        write!(f, "{}", self.code)
    }
}

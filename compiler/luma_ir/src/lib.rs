//! Luma IR: the vocabulary and control-flow graph shared by the Luma
//! analyses and backends.
//!
//! - **Entities** ([`Val`], [`PhiVal`], [`MultiVal`], [`Var`], [`UpVar`],
//!   [`Label`]) are dense per-function indices.
//! - **Nodes** ([`Node`], [`Terminator`]) form a closed sum type; passes
//!   match exhaustively instead of overriding visitor callbacks.
//! - **[`Code`]** is a validated, immutable graph of [`BasicBlock`]s,
//!   produced by a [`CodeBuilder`] (or the [`FunctionBuilder`] wrapper).
//! - **Types** ([`Type`], [`TypeSeq`]) are the lattice elements computed by
//!   type inference.
//!
//! The crate contains no analysis logic; see `luma_analysis`.

mod code;
mod function;
pub mod graph;
mod ids;
mod node;
mod print;
mod types;

pub use code::{BasicBlock, CfgError, Code, CodeBuilder};
pub use function::{FunctionBuilder, IrFunction, IrModule, ModuleError};
pub use ids::{Capture, FunctionId, Label, MultiVal, NodeId, PhiVal, UpVar, Val, ValueId, Var};
pub use node::{Access, BinOp, BranchCondition, Constant, Node, Terminator, UnOp, VList};
pub use types::{Type, TypeSeq};

//! IR shorthands for the interpreter tests. Only compiled in test builds.

#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use luma_exec::{Completion, DirectExecutor, Value};
use luma_ir::{
    BinOp, Constant, FunctionBuilder, FunctionId, IrFunction, IrModule, MultiVal, Node,
    Terminator, UpVar, VList, Val, Var,
};

use crate::{Program, RunError};

pub(crate) fn constant(fb: &mut FunctionBuilder, value: Constant) -> Val {
    let dest = fb.val();
    fb.add(Node::LoadConst { dest, value });
    dest
}

pub(crate) fn int(fb: &mut FunctionBuilder, value: i64) -> Val {
    constant(fb, Constant::Int(value))
}

pub(crate) fn string(fb: &mut FunctionBuilder, value: &str) -> Val {
    constant(fb, Constant::Str(value.into()))
}

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

pub(crate) fn load(fb: &mut FunctionBuilder, var: Var) -> Val {
    let dest = fb.val();
    fb.add(Node::VarLoad { dest, var });
    dest
}

/// `_ENV[name]`, with `_ENV` as upvalue 0.
pub(crate) fn global(fb: &mut FunctionBuilder, name: &str) -> Val {
    let env = fb.val();
    fb.add(Node::UpLoad {
        dest: env,
        upvar: UpVar::new(0),
    });
    let key = string(fb, name);
    let dest = fb.val();
    fb.add(Node::TabGet {
        dest,
        table: env,
        key,
        access: luma_ir::Access::Raw,
    });
    dest
}

/// `library[name]`
#[allow(dead_code)]
pub(crate) fn field(fb: &mut FunctionBuilder, table: Val, name: &str) -> Val {
    let key = string(fb, name);
    let dest = fb.val();
    fb.add(Node::TabGet {
        dest,
        table,
        key,
        access: luma_ir::Access::Dispatch,
    });
    dest
}

pub(crate) fn call(fb: &mut FunctionBuilder, target: Val, args: Vec<Val>) -> MultiVal {
    let dest = fb.multi();
    fb.add(Node::Call {
        dest,
        target,
        args: VList::new(args),
    });
    dest
}

pub(crate) fn nth(fb: &mut FunctionBuilder, src: MultiVal, index: u32) -> Val {
    let dest = fb.val();
    fb.add(Node::MultiGet { dest, src, index });
    dest
}

pub(crate) fn ret(fb: &mut FunctionBuilder, values: Vec<Val>) {
    fb.terminate(Terminator::Ret {
        values: VList::new(values),
    });
}

/// A main function with `_ENV` as its only upvalue.
pub(crate) fn main_builder() -> FunctionBuilder {
    let mut fb = FunctionBuilder::new(FunctionId::new(0), "main chunk");
    fb.set_vararg(true).set_upvalue_count(1);
    fb
}

/// Module whose main function is the first of `functions`.
pub(crate) fn module(functions: Vec<IrFunction>) -> IrModule {
    let main = functions[0].id;
    IrModule::new(main, functions).unwrap()
}

pub(crate) fn run(functions: Vec<IrFunction>) -> Result<Completion, RunError> {
    let program = Program::load(&module(functions)).unwrap();
    program.run(&DirectExecutor::default(), Vec::new())
}

pub(crate) fn run_values(functions: Vec<IrFunction>) -> Vec<Value> {
    run(functions).unwrap().values
}

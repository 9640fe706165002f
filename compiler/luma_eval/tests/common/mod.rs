//! IR building shorthands shared by the integration tests.

#![allow(clippy::unwrap_used, reason = "Tests can panic")]
#![allow(dead_code, reason = "Not every test file uses every helper")]

use luma_eval::Program;
use luma_ir::{
    Access, BinOp, Capture, Constant, FunctionBuilder, FunctionId, IrFunction, IrModule, MultiVal,
    Node, Terminator, UpVar, VList, Val, Var,
};

pub fn constant(fb: &mut FunctionBuilder, value: Constant) -> Val {
    let dest = fb.val();
    fb.add(Node::LoadConst { dest, value });
    dest
}

pub fn int(fb: &mut FunctionBuilder, value: i64) -> Val {
    constant(fb, Constant::Int(value))
}

pub fn string(fb: &mut FunctionBuilder, value: &str) -> Val {
    constant(fb, Constant::Str(value.into()))
}

pub fn binop(fb: &mut FunctionBuilder, op: BinOp, left: Val, right: Val) -> Val {
    let dest = fb.val();
    fb.add(Node::BinOp {
        dest,
        op,
        left,
        right,
    });
    dest
}

pub fn load(fb: &mut FunctionBuilder, var: Var) -> Val {
    let dest = fb.val();
    fb.add(Node::VarLoad { dest, var });
    dest
}

pub fn upvalue(fb: &mut FunctionBuilder, index: u32) -> Val {
    let dest = fb.val();
    fb.add(Node::UpLoad {
        dest,
        upvar: UpVar::new(index),
    });
    dest
}

/// `_ENV.name`, with `_ENV` as upvalue 0.
pub fn global(fb: &mut FunctionBuilder, name: &str) -> Val {
    let env = upvalue(fb, 0);
    field(fb, env, name)
}

pub fn field(fb: &mut FunctionBuilder, table: Val, name: &str) -> Val {
    let key = string(fb, name);
    let dest = fb.val();
    fb.add(Node::TabGet {
        dest,
        table,
        key,
        access: Access::Dispatch,
    });
    dest
}

/// `coroutine.name`
pub fn coroutine_fn(fb: &mut FunctionBuilder, name: &str) -> Val {
    let lib = global(fb, "coroutine");
    field(fb, lib, name)
}

pub fn closure(fb: &mut FunctionBuilder, id: u32, captures: Vec<Capture>) -> Val {
    let dest = fb.val();
    fb.add(Node::Closure {
        dest,
        function: FunctionId::new(id),
        captures,
    });
    dest
}

pub fn call(fb: &mut FunctionBuilder, target: Val, args: Vec<Val>) -> MultiVal {
    let dest = fb.multi();
    fb.add(Node::Call {
        dest,
        target,
        args: VList::new(args),
    });
    dest
}

pub fn nth(fb: &mut FunctionBuilder, src: MultiVal, index: u32) -> Val {
    let dest = fb.val();
    fb.add(Node::MultiGet { dest, src, index });
    dest
}

/// The first `count` results of `target(args...)`.
pub fn call_n(fb: &mut FunctionBuilder, target: Val, args: Vec<Val>, count: u32) -> Vec<Val> {
    let results = call(fb, target, args);
    (0..count).map(|i| nth(fb, results, i)).collect()
}

pub fn ret(fb: &mut FunctionBuilder, values: Vec<Val>) {
    fb.terminate(Terminator::Ret {
        values: VList::new(values),
    });
}

pub fn ret_all(fb: &mut FunctionBuilder, values: MultiVal) {
    fb.terminate(Terminator::Ret {
        values: VList::with_tail(Vec::new(), values),
    });
}

/// A main chunk with `_ENV` as its only upvalue.
pub fn main_builder() -> FunctionBuilder {
    let mut fb = FunctionBuilder::new(FunctionId::new(0), "main chunk");
    fb.set_vararg(true).set_upvalue_count(1);
    fb
}

/// A nested function that sees `_ENV` as upvalue 0 plus `extra` upvalues.
pub fn nested_builder(id: u32, name: &str, extra: u32) -> FunctionBuilder {
    let mut fb = FunctionBuilder::new(FunctionId::new(id), name);
    fb.set_upvalue_count(1 + extra);
    fb
}

pub fn load_program(functions: Vec<IrFunction>) -> Program {
    luma_eval::init_tracing();
    let main = functions[0].id;
    Program::load(&IrModule::new(main, functions).unwrap()).unwrap()
}

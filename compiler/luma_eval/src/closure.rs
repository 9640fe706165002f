//! Interpreted closures.
//!
//! A [`LuaClosure`] executes its prototype's blocks over a register frame
//! sized by slot allocation. The frame is a plain value: when a signal
//! passes through, the closure moves its frame into the signal as saved
//! state, and [`Resumable::resume`] picks it up again at the saved
//! resumption point.
//!
//! Variables that type inference marks as reified (captured by a nested
//! closure) live in shared cells instead of registers. Every `VarInit`
//! creates a fresh cell, so closures created in different loop iterations
//! capture different variables.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use luma_exec::{
    ControlSignal, ExecutionContext, Interrupt, LuaError, LuaFunction, Resumable, SuspendedState,
    TableRef, UnitResult, Value,
};
use luma_ir::{
    BranchCondition, Capture, Constant, MultiVal, Node, NodeId, Terminator, UpVar, VList, Val,
    ValueId, Var,
};

use crate::errors;
use crate::operators::{evaluate_binary, loop_ended, to_number};
use crate::program::{ProgramShared, Prototype};
use crate::stack::with_call_stack;
use crate::unary_operators::evaluate_unary;

/// Shared storage of a captured variable.
pub(crate) type Cell = Arc<Mutex<Value>>;

pub(crate) fn new_cell(value: Value) -> Cell {
    Arc::new(Mutex::new(value))
}

/// An instantiated function: prototype plus captured upvalue cells.
pub struct LuaClosure {
    program: Arc<ProgramShared>,
    proto: Arc<Prototype>,
    upvalues: Box<[Cell]>,
}

impl fmt::Debug for LuaClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaClosure")
            .field("function", &self.proto.function.id)
            .field("name", &self.proto.function.name)
            .field("upvalues", &self.upvalues.len())
            .finish()
    }
}

/// How a frame finished executing.
enum Exit {
    Returned,
    TailCall(Value, Vec<Value>),
}

/// Saved execution state of one activation.
#[derive(Debug)]
struct Frame {
    registers: Vec<Value>,
    cells: FxHashMap<Var, Cell>,
    multis: FxHashMap<MultiVal, Vec<Value>>,
    varargs: Vec<Value>,
    /// Resumption point: block position in `Code::blocks` and node index.
    block: usize,
    node: usize,
    /// Set while a call is in flight; its results arrive in the return
    /// buffer when the frame is resumed.
    pending_call: Option<MultiVal>,
}

impl LuaClosure {
    pub(crate) fn new(
        program: Arc<ProgramShared>,
        proto: Arc<Prototype>,
        upvalues: Box<[Cell]>,
    ) -> Self {
        Self {
            program,
            proto,
            upvalues,
        }
    }

    fn new_frame(&self, args: &[Value]) -> Result<Frame, LuaError> {
        let function = &self.proto.function;
        let slot_count = self.proto.analysis.slots.slot_count() as usize;
        let mut frame = Frame {
            registers: vec![Value::Nil; slot_count],
            cells: FxHashMap::default(),
            multis: FxHashMap::default(),
            varargs: Vec::new(),
            block: 0,
            node: 0,
            pending_call: None,
        };
        let entry = function.code.entry_block().node_id(0);
        for (i, &param) in function.params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or_default();
            self.write_var(&mut frame, entry, param, value, true)?;
        }
        if function.is_vararg && args.len() > function.params.len() {
            frame.varargs = args[function.params.len()..].to_vec();
        }
        Ok(frame)
    }

    /// Run `frame` on the Rust stack, bounded by the call-depth limit.
    fn run(self: &Arc<Self>, cx: &mut ExecutionContext<'_>, frame: Frame) -> UnitResult {
        cx.enter(self.program.config.max_call_depth)?;
        let exit = with_call_stack(|| self.execute(cx, frame));
        cx.leave();
        match exit? {
            Exit::Returned => Ok(()),
            // The caller is gone: the callee does not count against its depth
            // and signals from it carry no frame of ours.
            Exit::TailCall(function, args) => {
                with_call_stack(|| cx.call(&function, &args))
            }
        }
    }

    fn execute(
        self: &Arc<Self>,
        cx: &mut ExecutionContext<'_>,
        mut frame: Frame,
    ) -> Result<Exit, Interrupt> {
        let code = &self.proto.function.code;
        loop {
            let Some(block) = code.blocks().get(frame.block) else {
                return Err(LuaError::message("internal error: resumed outside the code").into());
            };
            while let Some(node) = block.body.get(frame.node) {
                let id = block.node_id(frame.node);
                frame.node += 1;
                if let Err(interrupt) = self.step(cx, &mut frame, id, node) {
                    return Err(self.interrupted(interrupt, frame));
                }
            }

            let id = block.terminator_id();
            let target = match &block.terminator {
                Terminator::ToNext { label } | Terminator::Jmp { target: label } => *label,
                Terminator::Branch {
                    condition,
                    jump,
                    next,
                } => match self.test(&frame, id, condition) {
                    Ok(true) => *jump,
                    Ok(false) => *next,
                    Err(error) => return Err(self.interrupted(error.into(), frame)),
                },
                Terminator::Ret { values } => {
                    return match self.collect(&frame, id, values) {
                        Ok(values) => {
                            cx.set_returns(values);
                            Ok(Exit::Returned)
                        }
                        Err(error) => Err(self.interrupted(error.into(), frame)),
                    };
                }
                Terminator::TCall { target, args } => {
                    let call = self.read(&frame, id, *target).and_then(|function| {
                        self.collect(&frame, id, args).map(|args| (function, args))
                    });
                    return match call {
                        Ok((function, args)) => Ok(Exit::TailCall(function, args)),
                        Err(error) => Err(self.interrupted(error.into(), frame)),
                    };
                }
            };
            let Some(position) = code.block_index(target) else {
                let error = LuaError::message(format_args!("internal error: no block {target}"));
                return Err(error.into());
            };
            frame.block = position;
            frame.node = 0;
        }
    }

    /// Attach the frame to a passing signal, or record this function in
    /// the traceback of an error.
    fn interrupted(self: &Arc<Self>, interrupt: Interrupt, frame: Frame) -> Interrupt {
        match interrupt {
            Interrupt::Signal(mut signal) => {
                let unit: Arc<dyn Resumable> = Arc::clone(self) as Arc<dyn Resumable>;
                signal.push_frame(unit, frame);
                Interrupt::Signal(signal)
            }
            Interrupt::Error(mut error) => {
                error.push_frame(self.proto.function.name.as_str());
                Interrupt::Error(error)
            }
        }
    }

    fn step(
        &self,
        cx: &mut ExecutionContext<'_>,
        frame: &mut Frame,
        id: NodeId,
        node: &Node,
    ) -> UnitResult {
        match node {
            Node::LoadConst { dest, value } => {
                self.write(frame, id, *dest, constant(value))?;
            }
            Node::BinOp {
                dest,
                op,
                left,
                right,
            } => {
                let l = self.read(frame, id, *left)?;
                let r = self.read(frame, id, *right)?;
                self.write(frame, id, *dest, evaluate_binary(*op, &l, &r)?)?;
            }
            Node::UnOp { dest, op, operand } => {
                let v = self.read(frame, id, *operand)?;
                self.write(frame, id, *dest, evaluate_unary(*op, &v)?)?;
            }
            Node::TabNew {
                dest,
                array_size,
                hash_size,
            } => {
                let table = TableRef::with_capacity(*array_size as usize, *hash_size as usize);
                self.write(frame, id, *dest, Value::Table(table))?;
            }
            // Without metatables, dispatching access is raw access.
            Node::TabGet {
                dest, table, key, ..
            } => {
                let table = self.table(frame, id, *table)?;
                let key = self.read(frame, id, *key)?;
                self.write(frame, id, *dest, table.get(&key))?;
            }
            Node::TabSet {
                table, key, value, ..
            } => {
                let table = self.table(frame, id, *table)?;
                let key = self.read(frame, id, *key)?;
                let value = self.read(frame, id, *value)?;
                table.set(&key, value)?;
            }
            Node::TabAppend {
                table,
                first_index,
                values,
            } => {
                let table = self.table(frame, id, *table)?;
                let values = frame.multis.get(values).cloned().unwrap_or_default();
                for (key, value) in (i64::from(*first_index)..).zip(values) {
                    table.set(&Value::Integer(key), value)?;
                }
            }
            Node::VarInit { var, value } => {
                let value = self.read(frame, id, *value)?;
                self.write_var(frame, id, *var, value, true)?;
            }
            Node::VarLoad { dest, var } => {
                let value = self.read_var(frame, id, *var)?;
                self.write(frame, id, *dest, value)?;
            }
            Node::VarStore { var, value } => {
                let value = self.read(frame, id, *value)?;
                self.write_var(frame, id, *var, value, false)?;
            }
            Node::UpLoad { dest, upvar } => {
                let value = self.upvalue(*upvar)?.lock().clone();
                self.write(frame, id, *dest, value)?;
            }
            Node::UpStore { upvar, value } => {
                let value = self.read(frame, id, *value)?;
                *self.upvalue(*upvar)?.lock() = value;
            }
            Node::PhiStore { dest, src } => {
                let value = self.read(frame, id, *src)?;
                self.write(frame, id, *dest, value)?;
            }
            Node::PhiLoad { dest, src } => {
                let value = self.read(frame, id, *src)?;
                self.write(frame, id, *dest, value)?;
            }
            Node::MultiGet { dest, src, index } => {
                let value = frame
                    .multis
                    .get(src)
                    .and_then(|values| values.get(*index as usize))
                    .cloned()
                    .unwrap_or_default();
                self.write(frame, id, *dest, value)?;
            }
            Node::Call { dest, target, args } => {
                let function = self.read(frame, id, *target)?;
                let args = self.collect(frame, id, args)?;
                trace!(function = %self.proto.function.id, node = %id, "call");
                frame.pending_call = Some(*dest);
                cx.call(&function, &args)?;
                frame.pending_call = None;
                frame.multis.insert(*dest, cx.take_returns());
            }
            Node::Closure {
                dest,
                function,
                captures,
            } => {
                let Some(proto) = self.program.prototype(*function) else {
                    return Err(LuaError::message(format_args!(
                        "internal error: unknown function {function}"
                    ))
                    .into());
                };
                let mut upvalues = Vec::with_capacity(captures.len());
                for capture in captures {
                    upvalues.push(match capture {
                        Capture::Var(var) => self.capture_var(frame, id, *var)?,
                        Capture::UpVar(upvar) => Arc::clone(self.upvalue(*upvar)?),
                    });
                }
                let closure = LuaClosure::new(
                    Arc::clone(&self.program),
                    proto,
                    upvalues.into_boxed_slice(),
                );
                self.write(frame, id, *dest, Value::function(closure))?;
            }
            Node::Vararg { dest } => {
                let values = frame.varargs.clone();
                frame.multis.insert(*dest, values);
            }
            Node::ToNumber { dest, src } => {
                let value = self.read(frame, id, *src)?;
                let number =
                    to_number(&value).ok_or_else(|| errors::for_value_not_number("initial value"))?;
                self.write(frame, id, *dest, number)?;
            }
            Node::CpuWithdraw { cost } => {
                cx.register_ticks(u64::from(*cost));
                if cx.should_yield() {
                    trace!(function = %self.proto.function.id, node = %id, "preempted");
                    return Err(ControlSignal::preempted().into());
                }
            }
        }
        Ok(())
    }

    fn test(
        &self,
        frame: &Frame,
        id: NodeId,
        condition: &BranchCondition,
    ) -> Result<bool, LuaError> {
        match condition {
            BranchCondition::Nil(value) => Ok(self.read(frame, id, *value)?.is_nil()),
            BranchCondition::Bool { value, expected } => {
                Ok(self.read(frame, id, *value)?.is_truthy() == *expected)
            }
            BranchCondition::NumLoopEnd { var, limit, step } => loop_ended(
                &self.read(frame, id, *var)?,
                &self.read(frame, id, *limit)?,
                &self.read(frame, id, *step)?,
            ),
        }
    }

    // ── Storage ─────────────────────────────────────────────────────

    fn slot(&self, id: NodeId, value: ValueId) -> Result<usize, LuaError> {
        self.proto
            .analysis
            .slots
            .value_slot(value)
            .map(|slot| slot as usize)
            .ok_or_else(|| errors::missing_slot(id, value))
    }

    fn read(
        &self,
        frame: &Frame,
        id: NodeId,
        value: impl Into<ValueId>,
    ) -> Result<Value, LuaError> {
        let value = value.into();
        let slot = self.slot(id, value)?;
        frame
            .registers
            .get(slot)
            .cloned()
            .ok_or_else(|| errors::missing_slot(id, value))
    }

    fn write(
        &self,
        frame: &mut Frame,
        id: NodeId,
        dest: impl Into<ValueId>,
        value: Value,
    ) -> Result<(), LuaError> {
        let dest = dest.into();
        let slot = self.slot(id, dest)?;
        let register = frame
            .registers
            .get_mut(slot)
            .ok_or_else(|| errors::missing_slot(id, dest))?;
        *register = value;
        Ok(())
    }

    fn var_register<'f>(
        &self,
        frame: &'f mut Frame,
        id: NodeId,
        var: Var,
    ) -> Result<&'f mut Value, LuaError> {
        self.proto
            .analysis
            .slots
            .var_slot(var)
            .and_then(|slot| frame.registers.get_mut(slot as usize))
            .ok_or_else(|| errors::missing_slot(id, var))
    }

    fn read_var(&self, frame: &mut Frame, id: NodeId, var: Var) -> Result<Value, LuaError> {
        if let Some(cell) = frame.cells.get(&var) {
            return Ok(cell.lock().clone());
        }
        Ok(self.var_register(frame, id, var)?.clone())
    }

    /// `init` declares a new instance of the variable (`VarInit`).
    fn write_var(
        &self,
        frame: &mut Frame,
        id: NodeId,
        var: Var,
        value: Value,
        init: bool,
    ) -> Result<(), LuaError> {
        if init {
            if self.proto.analysis.types.is_reified(var) {
                frame.cells.insert(var, new_cell(value));
                return Ok(());
            }
            frame.cells.remove(&var);
        } else if let Some(cell) = frame.cells.get(&var) {
            *cell.lock() = value;
            return Ok(());
        }
        *self.var_register(frame, id, var)? = value;
        Ok(())
    }

    /// The cell of `var`, moving it out of its register if needed.
    fn capture_var(&self, frame: &mut Frame, id: NodeId, var: Var) -> Result<Cell, LuaError> {
        if let Some(cell) = frame.cells.get(&var) {
            return Ok(Arc::clone(cell));
        }
        let cell = new_cell(std::mem::take(self.var_register(frame, id, var)?));
        frame.cells.insert(var, Arc::clone(&cell));
        Ok(cell)
    }

    fn upvalue(&self, upvar: UpVar) -> Result<&Cell, LuaError> {
        self.upvalues.get(upvar.index()).ok_or_else(|| {
            LuaError::message(format_args!("internal error: no upvalue {upvar}"))
        })
    }

    fn table(&self, frame: &Frame, id: NodeId, value: Val) -> Result<TableRef, LuaError> {
        match self.read(frame, id, value)? {
            Value::Table(table) => Ok(table),
            other => Err(errors::index_non_table(&other)),
        }
    }

    fn collect(&self, frame: &Frame, id: NodeId, list: &VList) -> Result<Vec<Value>, LuaError> {
        let tail = list.tail.and_then(|m| frame.multis.get(&m));
        let mut values = Vec::with_capacity(list.fixed.len() + tail.map_or(0, Vec::len));
        for &v in &list.fixed {
            values.push(self.read(frame, id, v)?);
        }
        if let Some(tail) = tail {
            values.extend(tail.iter().cloned());
        }
        Ok(values)
    }
}

fn constant(value: &Constant) -> Value {
    match value {
        Constant::Nil => Value::Nil,
        Constant::Bool(b) => Value::Boolean(*b),
        Constant::Int(i) => Value::Integer(*i),
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => Value::string(&**s),
    }
}

impl Resumable for LuaClosure {
    fn resume(self: Arc<Self>, cx: &mut ExecutionContext<'_>, state: SuspendedState) -> UnitResult {
        let Ok(frame) = state.downcast::<Frame>() else {
            return Err(errors::foreign_state(self.name()).into());
        };
        let mut frame = *frame;
        if let Some(dest) = frame.pending_call.take() {
            frame.multis.insert(dest, cx.take_returns());
        }
        self.run(cx, frame)
    }

    fn name(&self) -> &str {
        &self.proto.function.name
    }
}

impl LuaFunction for LuaClosure {
    fn invoke(self: Arc<Self>, cx: &mut ExecutionContext<'_>, args: &[Value]) -> UnitResult {
        let frame = self.new_frame(args)?;
        self.run(cx, frame)
    }
}

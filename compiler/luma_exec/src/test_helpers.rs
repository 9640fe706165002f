//! Scripted units for engine tests.

use std::sync::Arc;

use crate::call::{AsyncTask, Call, CallEvent, CompletionCallback};
use crate::coroutine::Coroutine;
use crate::errors::{CallError, LuaError};
use crate::scheduling::Unbounded;
use crate::native::{NativeFn, NativeFunction};
use crate::signal::{ControlSignal, Interrupt, SuspendedState, UnitResult};
use crate::unit::{ExecutionContext, LuaFunction, Resumable};
use crate::value::{FunctionRef, Value};

/// One step of a [`Script`].
#[derive(Clone, Debug)]
pub(crate) enum Step {
    Preempt,
    Yield(Vec<Value>),
    Resume(Coroutine, Vec<Value>),
    /// Wait on a task that completes immediately with this result.
    Async(Result<Vec<Value>, LuaError>),
    Fail(&'static str),
    /// Call a function directly and log its results.
    Call(Value, Vec<Value>),
}

/// A unit that performs its steps in order, attaching its frame to every
/// signal. It logs its arguments and every value it is resumed with, and
/// returns the log.
#[derive(Debug)]
pub(crate) struct Script {
    name: &'static str,
    steps: Vec<Step>,
}

struct ScriptState {
    pc: usize,
    log: Vec<Value>,
}

impl Script {
    pub(crate) fn new(name: &'static str, steps: Vec<Step>) -> FunctionRef {
        Arc::new(Script { name, steps })
    }

    fn run(self: Arc<Self>, cx: &mut ExecutionContext<'_>, mut st: ScriptState) -> UnitResult {
        while let Some(step) = self.steps.get(st.pc) {
            st.pc += 1;
            let signal = match step {
                Step::Preempt => ControlSignal::preempted(),
                Step::Yield(values) => ControlSignal::yield_values(values.clone()),
                Step::Resume(co, args) => ControlSignal::resume(co.clone(), args.clone()),
                Step::Async(result) => ControlSignal::async_task(Ready(result.clone())),
                Step::Fail(msg) => return Err(LuaError::message(msg).into()),
                Step::Call(function, args) => match cx.call(function, args) {
                    Ok(()) => {
                        st.log.extend(cx.take_returns());
                        continue;
                    }
                    Err(Interrupt::Signal(signal)) => signal,
                    Err(error) => return Err(error),
                },
            };
            let unit: Arc<dyn Resumable> = self.clone();
            return Err(signal.with_frame(unit, st).into());
        }
        cx.set_returns(st.log);
        Ok(())
    }
}

impl Resumable for Script {
    fn resume(self: Arc<Self>, cx: &mut ExecutionContext<'_>, state: SuspendedState) -> UnitResult {
        let Ok(st) = state.downcast::<ScriptState>() else {
            return Err(LuaError::message("foreign state").into());
        };
        let mut st = *st;
        st.log.extend(cx.take_returns());
        self.run(cx, st)
    }

    fn name(&self) -> &str {
        self.name
    }
}

impl LuaFunction for Script {
    fn invoke(self: Arc<Self>, cx: &mut ExecutionContext<'_>, args: &[Value]) -> UnitResult {
        self.run(
            cx,
            ScriptState {
                pc: 0,
                log: args.to_vec(),
            },
        )
    }
}

struct Ready(Result<Vec<Value>, LuaError>);

impl AsyncTask for Ready {
    fn start(self: Box<Self>, callback: CompletionCallback) {
        callback.complete(self.0);
    }
}

pub(crate) fn native(name: &'static str, func: NativeFn) -> FunctionRef {
    Arc::new(NativeFunction::new(name, func))
}

pub(crate) fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Integer).collect()
}

/// Run a call to completion, resuming through preemptions.
pub(crate) fn run_to_end(function: FunctionRef, args: Vec<Value>) -> Result<Vec<Value>, CallError> {
    let (_call, mut continuation) = Call::new(function, args);
    loop {
        match continuation.resume(&mut Unbounded) {
            Ok(CallEvent::Returned(values)) => return Ok(values),
            Ok(CallEvent::Failed(error)) => return Err(error),
            Ok(CallEvent::Paused(next)) => continuation = next,
            Ok(CallEvent::Async(_)) => return Err(CallError::Internal("unexpected async wait".into())),
            Err(stale) => return Err(CallError::Internal(stale.to_string())),
        }
    }
}

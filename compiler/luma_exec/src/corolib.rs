//! The `coroutine` library.
//!
//! These natives are the guest surface of the control signals: `resume`
//! raises a resume signal, `yield` a yield signal. `coroutine.resume` is
//! protected, so errors raised in the target (or a failed transition) come
//! back as `false, message`; `coroutine.wrap` is not.

use std::sync::Arc;

use crate::coroutine::Coroutine;
use crate::errors::{self, LuaError};
use crate::native::NativeFunction;
use crate::signal::{ControlSignal, Interrupt, SuspendedState, UnitResult};
use crate::table::TableRef;
use crate::unit::{ExecutionContext, LuaFunction, Resumable};
use crate::value::{FunctionRef, Value};

/// Build the `coroutine` table.
pub fn coroutine_library() -> TableRef {
    let natives = [
        NativeFunction::new("create", coroutine_create),
        NativeFunction::new("resume", coroutine_resume),
        NativeFunction::new("yield", coroutine_yield),
        NativeFunction::new("status", coroutine_status),
        NativeFunction::new("running", coroutine_running),
        NativeFunction::new("isyieldable", coroutine_isyieldable),
        NativeFunction::new("wrap", coroutine_wrap),
    ];
    let table = TableRef::with_capacity(0, natives.len());
    for native in natives {
        table.set_field(native.name(), native.into_value());
    }
    table
}

fn function_arg<'a>(args: &'a [Value], fname: &str) -> Result<&'a FunctionRef, LuaError> {
    args.first()
        .and_then(Value::as_function)
        .ok_or_else(|| errors::bad_argument(1, fname, "function expected"))
}

fn coroutine_arg<'a>(args: &'a [Value], fname: &str) -> Result<&'a Coroutine, LuaError> {
    args.first()
        .and_then(Value::as_coroutine)
        .ok_or_else(|| errors::bad_argument(1, fname, "coroutine expected"))
}

/// `coroutine.create(f)`
pub fn coroutine_create(
    _cx: &mut ExecutionContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, Interrupt> {
    let body = function_arg(args, "create")?;
    Ok(vec![Value::Coroutine(Coroutine::new(Arc::clone(body)))])
}

/// `coroutine.resume(co, ...)`
pub fn coroutine_resume(
    _cx: &mut ExecutionContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, Interrupt> {
    let co = coroutine_arg(args, "resume")?;
    let unit: Arc<dyn Resumable> = Arc::new(ProtectedResume);
    Err(ControlSignal::resume(co.clone(), args[1..].to_vec())
        .with_frame(unit, ())
        .into())
}

/// `coroutine.yield(...)`: the values of the next resume become the
/// results, so no frame is needed.
pub fn coroutine_yield(
    _cx: &mut ExecutionContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, Interrupt> {
    Err(ControlSignal::yield_values(args.to_vec()).into())
}

/// `coroutine.status(co)`
pub fn coroutine_status(
    _cx: &mut ExecutionContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, Interrupt> {
    let co = coroutine_arg(args, "status")?;
    Ok(vec![Value::string(co.status().as_str())])
}

/// `coroutine.running()`: the running coroutine and whether it is the
/// main one.
pub fn coroutine_running(
    cx: &mut ExecutionContext<'_>,
    _args: &[Value],
) -> Result<Vec<Value>, Interrupt> {
    Ok(vec![
        Value::Coroutine(cx.current_coroutine().clone()),
        Value::Boolean(cx.is_main()),
    ])
}

/// `coroutine.isyieldable()`
pub fn coroutine_isyieldable(
    cx: &mut ExecutionContext<'_>,
    _args: &[Value],
) -> Result<Vec<Value>, Interrupt> {
    Ok(vec![Value::Boolean(!cx.is_main())])
}

/// `coroutine.wrap(f)`
pub fn coroutine_wrap(
    _cx: &mut ExecutionContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, Interrupt> {
    let body = function_arg(args, "wrap")?;
    let co = Coroutine::new(Arc::clone(body));
    Ok(vec![Value::function(Wrapped { co })])
}

/// Frame left by `coroutine.resume` in the resumer.
#[derive(Debug)]
struct ProtectedResume;

impl Resumable for ProtectedResume {
    fn resume(self: Arc<Self>, cx: &mut ExecutionContext<'_>, _state: SuspendedState) -> UnitResult {
        let values = cx.take_returns();
        let mut results = Vec::with_capacity(values.len() + 1);
        results.push(Value::Boolean(true));
        results.extend(values);
        cx.set_returns(results);
        Ok(())
    }

    fn is_protected(&self) -> bool {
        true
    }

    fn resume_error(
        self: Arc<Self>,
        cx: &mut ExecutionContext<'_>,
        _state: SuspendedState,
        error: LuaError,
    ) -> UnitResult {
        cx.set_returns(vec![Value::Boolean(false), error.into_value()]);
        Ok(())
    }

    fn name(&self) -> &str {
        "resume"
    }
}

/// The function returned by `coroutine.wrap`.
#[derive(Debug)]
struct Wrapped {
    co: Coroutine,
}

impl Resumable for Wrapped {
    fn resume(self: Arc<Self>, _cx: &mut ExecutionContext<'_>, _state: SuspendedState) -> UnitResult {
        Err(errors::not_resumable("wrap").into())
    }

    fn name(&self) -> &str {
        "wrap"
    }
}

impl LuaFunction for Wrapped {
    fn invoke(self: Arc<Self>, _cx: &mut ExecutionContext<'_>, args: &[Value]) -> UnitResult {
        Err(ControlSignal::resume(self.co.clone(), args.to_vec()).into())
    }
}

//! The default global environment.
//!
//! A small base library: enough for guest code to raise and catch errors,
//! inspect values, and drive coroutines.

use std::sync::Arc;

use luma_exec::errors::bad_argument;
use luma_exec::{
    coroutine_library, ExecutionContext, Interrupt, LuaError, NativeFunction, Resumable,
    SuspendedState, TableRef, UnitResult, Value,
};

use crate::operators::{str_to_number, to_integer, Number};

/// Build a fresh environment table.
pub fn default_env() -> TableRef {
    let natives = [
        NativeFunction::new("error", base_error),
        NativeFunction::new("pcall", base_pcall),
        NativeFunction::new("select", base_select),
        NativeFunction::new("tonumber", base_tonumber),
        NativeFunction::new("tostring", base_tostring),
        NativeFunction::new("type", base_type),
    ];
    let env = TableRef::with_capacity(0, natives.len() + 1);
    for native in natives {
        env.set_field(native.name(), native.into_value());
    }
    env.set_field("coroutine", Value::Table(coroutine_library()));
    env
}

fn value_arg<'a>(args: &'a [Value], fname: &str) -> Result<&'a Value, LuaError> {
    args.first()
        .ok_or_else(|| bad_argument(1, fname, "value expected"))
}

/// `error(v)`: raise `v` as is.
pub fn base_error(
    _cx: &mut ExecutionContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, Interrupt> {
    Err(LuaError::new(args.first().cloned().unwrap_or_default()).into())
}

/// `pcall(f, ...)`
pub fn base_pcall(
    cx: &mut ExecutionContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, Interrupt> {
    let function = value_arg(args, "pcall")?;
    match cx.call(function, &args[1..]) {
        Ok(()) => Ok(succeeded(cx.take_returns())),
        Err(Interrupt::Error(error)) => Ok(vec![Value::Boolean(false), error.into_value()]),
        Err(Interrupt::Signal(signal)) => {
            let unit: Arc<dyn Resumable> = Arc::new(ProtectedCall);
            Err(signal.with_frame(unit, ()).into())
        }
    }
}

fn succeeded(values: Vec<Value>) -> Vec<Value> {
    let mut results = Vec::with_capacity(values.len() + 1);
    results.push(Value::Boolean(true));
    results.extend(values);
    results
}

/// `select(n, ...)` and `select('#', ...)`
pub fn base_select(
    _cx: &mut ExecutionContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, Interrupt> {
    let selector = value_arg(args, "select")?;
    let rest = &args[1..];
    let len = i64::try_from(rest.len()).unwrap_or(i64::MAX);
    if selector.as_str() == Some("#") {
        return Ok(vec![Value::Integer(len)]);
    }
    let n = to_integer(selector).map_err(|_| bad_argument(1, "select", "number expected"))?;
    let start = if n > 0 {
        (n - 1).min(len)
    } else if n < 0 && n.checked_neg().is_some_and(|back| back <= len) {
        len + n
    } else {
        return Err(bad_argument(1, "select", "index out of range").into());
    };
    let start = usize::try_from(start).unwrap_or(rest.len());
    Ok(rest[start..].to_vec())
}

/// `tonumber(v)`: numbers and numeric strings, otherwise nil.
pub fn base_tonumber(
    _cx: &mut ExecutionContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, Interrupt> {
    let value = value_arg(args, "tonumber")?;
    let number = match value {
        Value::Integer(_) | Value::Float(_) => value.clone(),
        Value::String(s) => str_to_number(s).map_or(Value::Nil, Number::into_value),
        _ => Value::Nil,
    };
    Ok(vec![number])
}

/// `tostring(v)`
pub fn base_tostring(
    _cx: &mut ExecutionContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, Interrupt> {
    let value = value_arg(args, "tostring")?;
    Ok(vec![Value::string(value.to_string())])
}

/// `type(v)`
pub fn base_type(
    _cx: &mut ExecutionContext<'_>,
    args: &[Value],
) -> Result<Vec<Value>, Interrupt> {
    let value = value_arg(args, "type")?;
    Ok(vec![Value::string(value.type_name())])
}

/// Frame left by `pcall` when a signal passes through it.
#[derive(Debug)]
struct ProtectedCall;

impl Resumable for ProtectedCall {
    fn resume(
        self: Arc<Self>,
        cx: &mut ExecutionContext<'_>,
        _state: SuspendedState,
    ) -> UnitResult {
        let values = cx.take_returns();
        cx.set_returns(succeeded(values));
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
        "pcall"
    }
}

//! Host functions.

use std::fmt;
use std::sync::Arc;

use crate::errors;
use crate::signal::{Interrupt, SuspendedState, UnitResult};
use crate::unit::{ExecutionContext, LuaFunction, Resumable};
use crate::value::Value;

/// Signature of a host function. Returning a signal without a frame means
/// the caller receives whatever is in the return buffer when control comes
/// back (for `coroutine.yield`, the values of the next resume).
pub type NativeFn = fn(&mut ExecutionContext<'_>, &[Value]) -> Result<Vec<Value>, Interrupt>;

/// A host function exposed to guest code.
#[derive(Clone, Copy)]
pub struct NativeFunction {
    name: &'static str,
    func: NativeFn,
}

impl NativeFunction {
    pub const fn new(name: &'static str, func: NativeFn) -> Self {
        Self { name, func }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn into_value(self) -> Value {
        Value::function(self)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

impl Resumable for NativeFunction {
    /// Natives never attach frames of their own.
    fn resume(self: Arc<Self>, _cx: &mut ExecutionContext<'_>, _state: SuspendedState) -> UnitResult {
        Err(errors::not_resumable(self.name).into())
    }

    fn name(&self) -> &str {
        self.name
    }
}

impl LuaFunction for NativeFunction {
    fn invoke(self: Arc<Self>, cx: &mut ExecutionContext<'_>, args: &[Value]) -> UnitResult {
        let values = (self.func)(cx, args)?;
        cx.set_returns(values);
        Ok(())
    }
}

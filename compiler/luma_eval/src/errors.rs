//! Load-time errors and the guest errors raised by the interpreter.
//!
//! Guest errors are [`LuaError`]s built by the `#[cold]` constructors
//! below, so message wording lives in one place.

use luma_analysis::AnalysisError;
use luma_exec::{ExecError, LuaError, Value};
use luma_ir::{FunctionId, NodeId};

/// Why a module could not be turned into a [`Program`](crate::Program).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("function {0} is not part of the program")]
    UnknownFunction(FunctionId),
    #[error("{function} expects {expected} upvalues, got {got}")]
    UpvalueCount {
        function: FunctionId,
        expected: u32,
        got: usize,
    },
}

/// Failure of [`Program::run`](crate::Program::run).
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

// ── Arithmetic ──────────────────────────────────────────────────────

#[cold]
pub fn arith_on(value: &Value) -> LuaError {
    LuaError::message(format_args!(
        "attempt to perform arithmetic on a {} value",
        value.type_name()
    ))
}

#[cold]
pub fn bitwise_on(value: &Value) -> LuaError {
    LuaError::message(format_args!(
        "attempt to perform bitwise operation on a {} value",
        value.type_name()
    ))
}

#[cold]
pub fn no_integer_representation() -> LuaError {
    LuaError::message("number has no integer representation")
}

#[cold]
pub fn integer_division_by_zero() -> LuaError {
    LuaError::message("attempt to perform 'n//0'")
}

#[cold]
pub fn integer_modulo_by_zero() -> LuaError {
    LuaError::message("attempt to perform 'n%0'")
}

#[cold]
pub fn concat_on(value: &Value) -> LuaError {
    LuaError::message(format_args!(
        "attempt to concatenate a {} value",
        value.type_name()
    ))
}

#[cold]
pub fn compare(left: &Value, right: &Value) -> LuaError {
    let (l, r) = (left.type_name(), right.type_name());
    if l == r {
        LuaError::message(format_args!("attempt to compare two {l} values"))
    } else {
        LuaError::message(format_args!("attempt to compare {l} with {r}"))
    }
}

#[cold]
pub fn length_of(value: &Value) -> LuaError {
    LuaError::message(format_args!(
        "attempt to get length of a {} value",
        value.type_name()
    ))
}

// ── Tables and loops ────────────────────────────────────────────────

#[cold]
pub fn index_non_table(value: &Value) -> LuaError {
    LuaError::message(format_args!(
        "attempt to index a {} value",
        value.type_name()
    ))
}

/// `what` is `"initial value"`, `"limit"` or `"step"`.
#[cold]
pub fn for_value_not_number(what: &str) -> LuaError {
    LuaError::message(format_args!("'for' {what} must be a number"))
}

// ── Engine ──────────────────────────────────────────────────────────

/// The analyses guarantee this never happens for reachable code.
#[cold]
pub fn missing_slot(node: NodeId, entity: impl std::fmt::Display) -> LuaError {
    LuaError::message(format_args!("internal error: {entity} has no slot at {node}"))
}

#[cold]
pub fn foreign_state(unit: &str) -> LuaError {
    LuaError::message(format_args!(
        "internal error: '{unit}' was resumed with a state it did not save"
    ))
}

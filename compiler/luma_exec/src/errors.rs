//! Error types of the execution engine, plus constructors for the guest
//! errors it raises itself.
//!
//! - [`LuaError`]: a guest error. Carries the error value (usually a
//!   string) and the names of the frames it unwound through. Routed
//!   through protected frames.
//! - [`CallError`]: why a [`Call`](crate::Call) terminated without
//!   returning.
//! - [`StaleContinuation`]: a continuation was resumed after its pause had
//!   already been consumed.
//! - [`CoroutineError`]: an illegal coroutine status transition.

use std::fmt;

use crate::coroutine::CoroutineStatus;
use crate::value::Value;

/// A guest-visible error: an arbitrary Lua value plus a traceback.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{}", describe(.value))]
pub struct LuaError {
    value: Value,
    traceback: Vec<String>,
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_string(),
        Value::Integer(_) | Value::Float(_) => value.to_string(),
        other => format!("(error object is a {} value)", other.type_name()),
    }
}

impl LuaError {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            traceback: Vec::new(),
        }
    }

    /// A string error.
    pub fn message(msg: impl fmt::Display) -> Self {
        Self::new(Value::string(msg.to_string()))
    }

    /// The error value as raised by `error()`.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Frames unwound so far, innermost first.
    pub fn traceback(&self) -> &[String] {
        &self.traceback
    }

    /// Record that the error unwound through `frame`.
    pub fn push_frame(&mut self, frame: impl Into<String>) {
        self.traceback.push(frame.into());
    }
}

/// Terminal failure of a [`Call`](crate::Call).
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CallError {
    /// A guest error reached the bottom of the main coroutine.
    #[error(transparent)]
    Guest(LuaError),
    /// The main coroutine tried to yield. Not catchable by guest code.
    #[error("attempt to yield from outside a coroutine")]
    YieldFromMain,
    /// An engine invariant was violated.
    #[error("internal engine error: {0}")]
    Internal(String),
}

/// Resuming a continuation whose pause was already consumed, or whose
/// call has terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("stale continuation: the call was already resumed or has terminated")]
pub struct StaleContinuation;

/// Illegal coroutine status transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CoroutineError {
    #[error("cannot resume dead coroutine")]
    Dead,
    #[error("cannot resume non-suspended coroutine")]
    NotSuspended,
    #[error("invalid coroutine transition (resumer is {resumer}, target is {target})")]
    InvalidTransition {
        resumer: CoroutineStatus,
        target: CoroutineStatus,
    },
}

impl From<CoroutineError> for LuaError {
    fn from(err: CoroutineError) -> Self {
        LuaError::message(err)
    }
}

// ── Guest error constructors ────────────────────────────────────────

#[cold]
pub fn table_index_is_nil() -> LuaError {
    LuaError::message("table index is nil")
}

#[cold]
pub fn table_index_is_nan() -> LuaError {
    LuaError::message("table index is NaN")
}

/// `bad argument #n to 'fname' (expected)`
#[cold]
pub fn bad_argument(position: usize, function: &str, expected: &str) -> LuaError {
    LuaError::message(format_args!(
        "bad argument #{position} to '{function}' ({expected})"
    ))
}

#[cold]
pub fn not_callable(value: &Value) -> LuaError {
    LuaError::message(format_args!(
        "attempt to call a {} value",
        value.type_name()
    ))
}

#[cold]
pub fn not_resumable(unit: &str) -> LuaError {
    LuaError::message(format_args!("'{unit}' cannot be resumed"))
}

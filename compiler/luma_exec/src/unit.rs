//! The unit contract between the engine and backends, and the context a
//! running unit sees.

use std::fmt;
use std::sync::Arc;

use crate::coroutine::Coroutine;
use crate::errors::{self, LuaError};
use crate::scheduling::SchedulingContext;
use crate::signal::{Interrupt, SuspendedState, UnitResult};
use crate::value::{FunctionRef, Value};

/// Something the engine can resume from a saved frame.
pub trait Resumable: Send + Sync + fmt::Debug {
    /// Continue from `state`, which this unit saved when it attached its
    /// frame to a signal.
    fn resume(self: Arc<Self>, cx: &mut ExecutionContext<'_>, state: SuspendedState)
        -> UnitResult;

    /// Protected units receive errors unwinding through their frame via
    /// [`resume_error`](Self::resume_error).
    fn is_protected(&self) -> bool {
        false
    }

    /// Handle an error that unwound to this frame. Only called when
    /// [`is_protected`](Self::is_protected) returns true.
    fn resume_error(
        self: Arc<Self>,
        _cx: &mut ExecutionContext<'_>,
        _state: SuspendedState,
        error: LuaError,
    ) -> UnitResult {
        Err(Interrupt::Error(error))
    }

    /// Name used in tracebacks.
    fn name(&self) -> &str {
        "?"
    }
}

/// A callable unit: a compiled Lua function or a native.
pub trait LuaFunction: Resumable {
    /// Run from the beginning with `args`.
    fn invoke(self: Arc<Self>, cx: &mut ExecutionContext<'_>, args: &[Value]) -> UnitResult;
}

/// Per-resume view of the engine handed to every unit.
pub struct ExecutionContext<'a> {
    returns: Vec<Value>,
    scheduler: &'a mut dyn SchedulingContext,
    current: Coroutine,
    is_main: bool,
    depth: usize,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        scheduler: &'a mut dyn SchedulingContext,
        current: Coroutine,
        is_main: bool,
        returns: Vec<Value>,
    ) -> Self {
        Self {
            returns,
            scheduler,
            current,
            is_main,
            depth: 0,
        }
    }

    // ── Return buffer ───────────────────────────────────────────────

    pub fn set_returns(&mut self, values: Vec<Value>) {
        self.returns = values;
    }

    pub fn take_returns(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.returns)
    }

    pub fn returns(&self) -> &[Value] {
        &self.returns
    }

    // ── Scheduling ──────────────────────────────────────────────────

    pub fn register_ticks(&mut self, ticks: u64) {
        self.scheduler.register_ticks(ticks);
    }

    pub fn should_yield(&self) -> bool {
        self.scheduler.should_yield()
    }

    // ── Coroutines ──────────────────────────────────────────────────

    /// The running coroutine.
    pub fn current_coroutine(&self) -> &Coroutine {
        &self.current
    }

    /// Whether the running coroutine is the main coroutine of the call.
    pub fn is_main(&self) -> bool {
        self.is_main
    }

    pub(crate) fn switch_to(&mut self, coroutine: Coroutine, is_main: bool) {
        self.current = coroutine;
        self.is_main = is_main;
    }

    // ── Native stack depth ──────────────────────────────────────────

    /// Depth of nested direct calls on the Rust stack.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Enter a nested direct call, failing once `limit` is reached.
    pub fn enter(&mut self, limit: usize) -> Result<(), LuaError> {
        if self.depth >= limit {
            return Err(LuaError::message("stack overflow"));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Call `function` directly on the Rust stack; its results are left
    /// in the return buffer.
    pub fn call(&mut self, function: &Value, args: &[Value]) -> UnitResult {
        match function {
            Value::Function(f) => FunctionRef::clone(f).invoke(self, args),
            other => Err(errors::not_callable(other).into()),
        }
    }
}

impl fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("returns", &self.returns)
            .field("current", &self.current)
            .field("is_main", &self.is_main)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

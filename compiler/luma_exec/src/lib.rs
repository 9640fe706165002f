//! Resumable execution core for Luma.
//!
//! Backends (see `luma_eval`) implement the unit contract in [`unit`]:
//! a unit is invoked or resumed with an [`ExecutionContext`] and either
//! completes, raises a [`LuaError`], or interrupts with a
//! [`ControlSignal`]. Signals travel outwards through ordinary `Result`
//! returns; every unit that wants to continue attaches a [`ResumeInfo`].
//! The engine in [`call`] turns those frames into coroutine stacks, so a
//! call can be paused, moved to another thread and resumed exactly once
//! through its [`Continuation`].
//!
//! - [`value`], [`table`]: host values and raw tables.
//! - [`coroutine`]: the coroutine status machine.
//! - [`scheduling`]: cooperative preemption hooks.
//! - [`corolib`]: the `coroutine` library.
//! - [`executor`]: a direct, single-call host loop.

pub mod call;
pub mod corolib;
pub mod coroutine;
pub mod errors;
pub mod executor;
pub mod native;
pub mod scheduling;
pub mod signal;
pub mod table;
pub mod unit;
pub mod value;

#[cfg(test)]
mod test_helpers;

pub use call::{AsyncTask, AsyncWait, Call, CallEvent, CompletionCallback, Continuation};
pub use corolib::coroutine_library;
pub use coroutine::{Coroutine, CoroutineStatus};
pub use errors::{CallError, CoroutineError, LuaError, StaleContinuation};
pub use executor::{Completion, DirectExecutor, ExecError};
pub use native::{NativeFn, NativeFunction};
pub use scheduling::{SchedulingContext, SchedulingPolicy, TickBudget, Unbounded};
pub use signal::{ControlSignal, Interrupt, ResumeInfo, SignalKind, SuspendedState, UnitResult};
pub use table::{Table, TableRef};
pub use unit::{ExecutionContext, LuaFunction, Resumable};
pub use value::{FunctionRef, Value};

//! Control signals: how a unit interrupts normal execution.
//!
//! A unit returns `Ok(())` when it finished (results in the return
//! buffer), `Err(Interrupt::Error)` for a guest error, or
//! `Err(Interrupt::Signal)` when control has to leave the Rust stack:
//! preemption, yield, coroutine resume, or an async wait.
//!
//! While a signal travels outwards through nested calls, every unit that
//! wants to continue afterwards attaches a [`ResumeInfo`] with its saved
//! state. Frames are collected innermost first; the engine pushes them so
//! the innermost ends on top of the coroutine stack.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::call::AsyncTask;
use crate::coroutine::Coroutine;
use crate::errors::LuaError;
use crate::unit::Resumable;
use crate::value::Value;

/// Opaque state a unit saves to continue later.
pub type SuspendedState = Box<dyn Any + Send>;

/// A saved frame: the unit to resume and its state.
pub struct ResumeInfo {
    pub unit: Arc<dyn Resumable>,
    pub state: SuspendedState,
}

impl ResumeInfo {
    pub fn new(unit: Arc<dyn Resumable>, state: impl Any + Send) -> Self {
        Self {
            unit,
            state: Box::new(state),
        }
    }
}

impl fmt::Debug for ResumeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeInfo")
            .field("unit", &self.unit.name())
            .finish_non_exhaustive()
    }
}

/// What a [`ControlSignal`] asks the engine to do.
pub enum SignalKind {
    /// The scheduling budget is exhausted; pause the call.
    Preempted,
    /// Return `values` to the resumer of the running coroutine.
    Yield(Vec<Value>),
    /// Transfer control into `target`, passing `args`.
    Resume { target: Coroutine, args: Vec<Value> },
    /// Pause the call until `task` completes.
    Async(Box<dyn AsyncTask>),
}

impl fmt::Debug for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Preempted => f.write_str("Preempted"),
            SignalKind::Yield(values) => f.debug_tuple("Yield").field(values).finish(),
            SignalKind::Resume { target, args } => f
                .debug_struct("Resume")
                .field("target", target)
                .field("args", args)
                .finish(),
            SignalKind::Async(_) => f.write_str("Async"),
        }
    }
}

/// A signal in flight, with the frames attached so far.
#[derive(Debug)]
pub struct ControlSignal {
    kind: SignalKind,
    frames: Vec<ResumeInfo>,
}

impl ControlSignal {
    pub fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            frames: Vec::new(),
        }
    }

    pub fn preempted() -> Self {
        Self::new(SignalKind::Preempted)
    }

    pub fn yield_values(values: Vec<Value>) -> Self {
        Self::new(SignalKind::Yield(values))
    }

    pub fn resume(target: Coroutine, args: Vec<Value>) -> Self {
        Self::new(SignalKind::Resume { target, args })
    }

    pub fn async_task(task: impl AsyncTask + 'static) -> Self {
        Self::new(SignalKind::Async(Box::new(task)))
    }

    pub fn kind(&self) -> &SignalKind {
        &self.kind
    }

    /// Attach the frame of a unit the signal is passing through. Called
    /// innermost first.
    pub fn push_frame(&mut self, unit: Arc<dyn Resumable>, state: impl Any + Send) {
        self.frames.push(ResumeInfo::new(unit, state));
    }

    /// Builder form of [`push_frame`](Self::push_frame).
    #[must_use]
    pub fn with_frame(mut self, unit: Arc<dyn Resumable>, state: impl Any + Send) -> Self {
        self.push_frame(unit, state);
        self
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn into_parts(self) -> (SignalKind, Vec<ResumeInfo>) {
        (self.kind, self.frames)
    }
}

/// Why a unit did not complete normally.
#[derive(Debug)]
pub enum Interrupt {
    Signal(ControlSignal),
    Error(LuaError),
}

impl From<ControlSignal> for Interrupt {
    fn from(signal: ControlSignal) -> Self {
        Interrupt::Signal(signal)
    }
}

impl From<LuaError> for Interrupt {
    fn from(error: LuaError) -> Self {
        Interrupt::Error(error)
    }
}

/// Result of running a unit. Return values travel in the
/// [`ExecutionContext`](crate::ExecutionContext) return buffer.
pub type UnitResult = Result<(), Interrupt>;

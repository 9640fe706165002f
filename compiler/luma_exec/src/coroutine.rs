//! Coroutines: a status machine plus a LIFO stack of saved frames.
//!
//! ```text
//!                resume                  yield
//!   SUSPENDED ─────────────▶ RUNNING ─────────────▶ SUSPENDED
//!                              │  ▲
//!                resume other  │  │ other yields / returns
//!                              ▼  │
//!                             NORMAL
//!
//!   RUNNING ── returns or errors ──▶ DEAD
//! ```
//!
//! Every transition involves two coroutines, the resumer and the target,
//! and locks them in that order. Resuming oneself is rejected before any
//! lock is taken.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::CoroutineError;
use crate::signal::{ResumeInfo, SuspendedState, UnitResult};
use crate::unit::{ExecutionContext, Resumable};
use crate::value::FunctionRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoroutineStatus {
    Suspended,
    Running,
    /// Active but not running: it resumed another coroutine.
    Normal,
    Dead,
}

impl CoroutineStatus {
    /// Name returned by `coroutine.status`.
    pub fn as_str(self) -> &'static str {
        match self {
            CoroutineStatus::Suspended => "suspended",
            CoroutineStatus::Running => "running",
            CoroutineStatus::Normal => "normal",
            CoroutineStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for CoroutineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct CoroutineState {
    status: CoroutineStatus,
    stack: Vec<ResumeInfo>,
    /// Set while the coroutine runs on behalf of a resumer.
    resumer: Option<Coroutine>,
}

struct CoroutineInner {
    id: u64,
    state: Mutex<CoroutineState>,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Shared handle to a coroutine. Identity is the allocation.
#[derive(Clone)]
pub struct Coroutine(Arc<CoroutineInner>);

impl Coroutine {
    /// A suspended coroutine that will run `body` on its first resume.
    pub fn new(body: FunctionRef) -> Self {
        Self::with_status(body, CoroutineStatus::Suspended)
    }

    /// The main coroutine of a call: already running.
    pub(crate) fn main(body: FunctionRef) -> Self {
        Self::with_status(body, CoroutineStatus::Running)
    }

    fn with_status(body: FunctionRef, status: CoroutineStatus) -> Self {
        let start: Arc<dyn Resumable> = Arc::new(CoroutineStart { body });
        let state = CoroutineState {
            status,
            stack: vec![ResumeInfo::new(start, ())],
            resumer: None,
        };
        Coroutine(Arc::new(CoroutineInner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(state),
        }))
    }

    pub fn status(&self) -> CoroutineStatus {
        self.0.state.lock().status
    }

    pub fn ptr_eq(&self, other: &Coroutine) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    #[allow(dead_code)]
    pub(crate) fn push_frame(&self, frame: ResumeInfo) {
        self.0.state.lock().stack.push(frame);
    }

    /// Push signal frames (innermost first) so the innermost ends on top.
    pub(crate) fn push_frames(&self, frames: Vec<ResumeInfo>) {
        let mut state = self.0.state.lock();
        state.stack.extend(frames.into_iter().rev());
    }

    pub(crate) fn pop_frame(&self) -> Option<ResumeInfo> {
        self.0.state.lock().stack.pop()
    }

    pub fn stack_depth(&self) -> usize {
        self.0.state.lock().stack.len()
    }

    pub(crate) fn resumer(&self) -> Option<Coroutine> {
        self.0.state.lock().resumer.clone()
    }

    /// Drop all saved frames (the coroutine died).
    fn clear_stack(state: &mut CoroutineState) {
        state.stack.clear();
    }

    /// `resumer` (RUNNING) resumes `target` (SUSPENDED):
    /// resumer becomes NORMAL, target becomes RUNNING.
    pub fn transition_resume(resumer: &Coroutine, target: &Coroutine) -> Result<(), CoroutineError> {
        if resumer.ptr_eq(target) {
            return Err(CoroutineError::NotSuspended);
        }
        let mut r = resumer.0.state.lock();
        let mut t = target.0.state.lock();
        match t.status {
            CoroutineStatus::Suspended => {}
            CoroutineStatus::Dead => return Err(CoroutineError::Dead),
            CoroutineStatus::Running | CoroutineStatus::Normal => {
                return Err(CoroutineError::NotSuspended)
            }
        }
        if r.status != CoroutineStatus::Running {
            return Err(CoroutineError::InvalidTransition {
                resumer: r.status,
                target: t.status,
            });
        }
        r.status = CoroutineStatus::Normal;
        t.status = CoroutineStatus::Running;
        t.resumer = Some(resumer.clone());
        Ok(())
    }

    /// `target` (RUNNING) hands control back to `resumer` (NORMAL):
    /// resumer becomes RUNNING, target becomes SUSPENDED, or DEAD when
    /// `finished`.
    pub fn transition_return(
        resumer: &Coroutine,
        target: &Coroutine,
        finished: bool,
    ) -> Result<(), CoroutineError> {
        if resumer.ptr_eq(target) {
            return Err(CoroutineError::InvalidTransition {
                resumer: CoroutineStatus::Running,
                target: CoroutineStatus::Running,
            });
        }
        let mut r = resumer.0.state.lock();
        let mut t = target.0.state.lock();
        if r.status != CoroutineStatus::Normal || t.status != CoroutineStatus::Running {
            return Err(CoroutineError::InvalidTransition {
                resumer: r.status,
                target: t.status,
            });
        }
        r.status = CoroutineStatus::Running;
        t.resumer = None;
        if finished {
            t.status = CoroutineStatus::Dead;
            Self::clear_stack(&mut t);
        } else {
            t.status = CoroutineStatus::Suspended;
        }
        Ok(())
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "coroutine#{}({})", self.0.id, self.status())
    }
}

/// Bottom frame of every coroutine: invokes the body with the values in
/// the return buffer (the resume arguments).
#[derive(Debug)]
struct CoroutineStart {
    body: FunctionRef,
}

impl Resumable for CoroutineStart {
    fn resume(self: Arc<Self>, cx: &mut ExecutionContext<'_>, _state: SuspendedState) -> UnitResult {
        let args = cx.take_returns();
        FunctionRef::clone(&self.body).invoke(cx, &args)
    }

    fn name(&self) -> &str {
        self.body.name()
    }
}

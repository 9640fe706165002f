//! Calls and continuations.
//!
//! A [`Call`] is one top-level invocation of a function. It owns the main
//! coroutine, the return buffer and a version word:
//!
//! ```text
//!   PAUSED(token) ──resume──▶ RUNNING ──▶ TERMINATED
//!         ▲                      │
//!         └──── PAUSED(new) ◀────┘
//! ```
//!
//! `RUNNING` and `TERMINATED` are fixed sentinels. Every pause mints a fresh
//! token, and a [`Continuation`] may only resume the pause it was created
//! for: resuming is a compare-and-swap from its token to `RUNNING`, so a
//! second resume of the same continuation fails with [`StaleContinuation`]
//! instead of running the call twice.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::coroutine::Coroutine;
use crate::errors::{CallError, LuaError, StaleContinuation};
use crate::scheduling::SchedulingContext;
use crate::signal::{Interrupt, SignalKind, UnitResult};
use crate::unit::ExecutionContext;
use crate::value::{FunctionRef, Value};

const RUNNING: u64 = 0;
const TERMINATED: u64 = 1;

// ── Async tasks ─────────────────────────────────────────────────────

/// Work the call waits on outside the engine.
pub trait AsyncTask: Send {
    /// Start the task. It must call [`CompletionCallback::complete`] exactly
    /// once, from any thread, when it is done.
    fn start(self: Box<Self>, callback: CompletionCallback);
}

/// The only way back into a call paused on an async task.
pub struct CompletionCallback {
    continuation: Continuation,
    notify: Box<dyn FnOnce(Continuation) + Send>,
}

impl CompletionCallback {
    /// Store the task's result in the call and hand the continuation to the
    /// host. An `Err` is raised in the call when it is resumed.
    pub fn complete(self, result: Result<Vec<Value>, LuaError>) {
        {
            let mut state = self.continuation.shared.state.lock();
            match result {
                Ok(values) => state.returns = values,
                Err(error) => state.pending_error = Some(error),
            }
        }
        debug!(token = self.continuation.token, "async task completed");
        (self.notify)(self.continuation);
    }
}

impl fmt::Debug for CompletionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionCallback")
            .field("continuation", &self.continuation)
            .finish_non_exhaustive()
    }
}

/// A call paused on an async task, waiting for the host to start it.
pub struct AsyncWait {
    task: Box<dyn AsyncTask>,
    continuation: Continuation,
}

impl AsyncWait {
    /// Start the task; `notify` receives the continuation once the task has
    /// completed. Dropping the wait (or a task that never completes)
    /// abandons the call.
    pub fn start(self, notify: impl FnOnce(Continuation) + Send + 'static) {
        let callback = CompletionCallback {
            continuation: self.continuation,
            notify: Box::new(notify),
        };
        self.task.start(callback);
    }
}

impl fmt::Debug for AsyncWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncWait")
            .field("continuation", &self.continuation)
            .finish_non_exhaustive()
    }
}

// ── Call ────────────────────────────────────────────────────────────

/// What a resume of a [`Continuation`] ended with.
#[derive(Debug)]
pub enum CallEvent {
    /// The main coroutine returned. The call is terminated.
    Returned(Vec<Value>),
    /// The call terminated with an error.
    Failed(CallError),
    /// The call was preempted; resume the new continuation to go on.
    Paused(Continuation),
    /// The call waits on an async task.
    Async(AsyncWait),
}

struct CallState {
    main: Coroutine,
    current: Coroutine,
    returns: Vec<Value>,
    /// Raised on the next resume (an async task failed).
    pending_error: Option<LuaError>,
}

struct CallShared {
    version: AtomicU64,
    seed: u64,
    counter: AtomicU64,
    state: Mutex<CallState>,
}

impl CallShared {
    /// A token no earlier pause of this call has used. The mix is a
    /// bijection, so distinct counter values give distinct tokens.
    fn next_token(&self) -> u64 {
        loop {
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            let token = mix64(self.seed.wrapping_add(n));
            if token != RUNNING && token != TERMINATED {
                return token;
            }
        }
    }

    fn pause(self: &Arc<Self>) -> Continuation {
        let token = self.next_token();
        self.version.store(token, Ordering::Release);
        Continuation {
            shared: Arc::clone(self),
            token,
        }
    }

    fn terminate(&self) {
        self.version.store(TERMINATED, Ordering::Release);
    }
}

/// splitmix64 finalizer.
fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Handle to a top-level invocation.
#[derive(Clone)]
pub struct Call {
    shared: Arc<CallShared>,
}

impl Call {
    /// Create a call of `function` with `args`, paused before its first
    /// instruction.
    pub fn new(function: FunctionRef, args: Vec<Value>) -> (Call, Continuation) {
        let main = Coroutine::main(function);
        let state = CallState {
            current: main.clone(),
            main,
            returns: args,
            pending_error: None,
        };
        let shared = Arc::new(CallShared {
            version: AtomicU64::new(RUNNING),
            seed: RandomState::new().hash_one(SystemTime::now()),
            counter: AtomicU64::new(0),
            state: Mutex::new(state),
        });
        let continuation = shared.pause();
        (Call { shared }, continuation)
    }

    pub fn is_running(&self) -> bool {
        self.shared.version.load(Ordering::Acquire) == RUNNING
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.version.load(Ordering::Acquire) == TERMINATED
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.shared.version.load(Ordering::Acquire) {
            RUNNING => "running",
            TERMINATED => "terminated",
            _ => "paused",
        };
        f.debug_struct("Call").field("state", &state).finish()
    }
}

/// Permission to resume one particular pause of a [`Call`].
#[derive(Clone)]
pub struct Continuation {
    shared: Arc<CallShared>,
    token: u64,
}

impl Continuation {
    /// Run the call until it returns, fails or pauses again.
    pub fn resume(
        &self,
        scheduler: &mut dyn SchedulingContext,
    ) -> Result<CallEvent, StaleContinuation> {
        self.shared
            .version
            .compare_exchange(self.token, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StaleContinuation)?;
        debug!(token = self.token, "call resumed");

        let outcome = {
            let mut state = self.shared.state.lock();
            run(&mut state, scheduler)
        };

        Ok(match outcome {
            Outcome::Returned(values) => {
                self.shared.terminate();
                debug!(count = values.len(), "call returned");
                CallEvent::Returned(values)
            }
            Outcome::Failed(error) => {
                self.shared.terminate();
                debug!(%error, "call failed");
                CallEvent::Failed(error)
            }
            Outcome::Paused => {
                let next = self.shared.pause();
                debug!(token = next.token, "call paused");
                CallEvent::Paused(next)
            }
            Outcome::Async(task) => {
                let continuation = self.shared.pause();
                debug!(token = continuation.token, "call waiting on async task");
                CallEvent::Async(AsyncWait { task, continuation })
            }
        })
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Continuation({:#018x})", self.token)
    }
}

// ── Engine loop ─────────────────────────────────────────────────────

enum Outcome {
    Returned(Vec<Value>),
    Failed(CallError),
    Paused,
    Async(Box<dyn AsyncTask>),
}

enum Next {
    Resume,
    Unwind(LuaError),
}

fn run(state: &mut CallState, scheduler: &mut dyn SchedulingContext) -> Outcome {
    let main = state.main.clone();
    let is_main = state.current.ptr_eq(&main);
    let mut cx = ExecutionContext::new(
        scheduler,
        state.current.clone(),
        is_main,
        std::mem::take(&mut state.returns),
    );
    let mut next = match state.pending_error.take() {
        Some(error) => Next::Unwind(error),
        None => Next::Resume,
    };

    loop {
        let result: UnitResult = match next {
            Next::Resume => match cx.current_coroutine().pop_frame() {
                Some(frame) => {
                    trace!(unit = frame.unit.name(), "resume frame");
                    frame.unit.resume(&mut cx, frame.state)
                }
                None if cx.is_main() => return Outcome::Returned(cx.take_returns()),
                None => {
                    if let Err(error) = hand_back(&mut cx, &main, true) {
                        return Outcome::Failed(error);
                    }
                    Ok(())
                }
            },
            Next::Unwind(mut error) => match cx.current_coroutine().pop_frame() {
                Some(frame) if frame.unit.is_protected() => {
                    trace!(unit = frame.unit.name(), %error, "error caught");
                    frame.unit.resume_error(&mut cx, frame.state, error)
                }
                Some(frame) => {
                    error.push_frame(frame.unit.name());
                    Err(Interrupt::Error(error))
                }
                None if cx.is_main() => return Outcome::Failed(CallError::Guest(error)),
                None => {
                    if let Err(failure) = hand_back(&mut cx, &main, true) {
                        return Outcome::Failed(failure);
                    }
                    Err(Interrupt::Error(error))
                }
            },
        };

        next = match result {
            Ok(()) => Next::Resume,
            Err(Interrupt::Error(error)) => Next::Unwind(error),
            Err(Interrupt::Signal(signal)) => {
                let (kind, frames) = signal.into_parts();
                cx.current_coroutine().push_frames(frames);
                match kind {
                    SignalKind::Preempted => {
                        save(state, &mut cx);
                        return Outcome::Paused;
                    }
                    SignalKind::Async(task) => {
                        save(state, &mut cx);
                        return Outcome::Async(task);
                    }
                    SignalKind::Yield(_) if cx.is_main() => {
                        return Outcome::Failed(CallError::YieldFromMain);
                    }
                    SignalKind::Yield(values) => {
                        cx.set_returns(values);
                        if let Err(error) = hand_back(&mut cx, &main, false) {
                            return Outcome::Failed(error);
                        }
                        Next::Resume
                    }
                    SignalKind::Resume { target, args } => {
                        let resumer = cx.current_coroutine().clone();
                        match Coroutine::transition_resume(&resumer, &target) {
                            Ok(()) => {
                                debug!(?target, "coroutine resumed");
                                cx.switch_to(target, false);
                                cx.set_returns(args);
                                Next::Resume
                            }
                            Err(error) => Next::Unwind(error.into()),
                        }
                    }
                }
            }
        };
    }
}

/// Persist the running coroutine and return buffer across a pause.
fn save(state: &mut CallState, cx: &mut ExecutionContext<'_>) {
    state.current = cx.current_coroutine().clone();
    state.returns = cx.take_returns();
}

/// Return control from the running coroutine to its resumer. The return
/// buffer carries over.
fn hand_back(
    cx: &mut ExecutionContext<'_>,
    main: &Coroutine,
    finished: bool,
) -> Result<(), CallError> {
    let target = cx.current_coroutine().clone();
    let Some(resumer) = target.resumer() else {
        return Err(CallError::Internal(format!("{target:?} has no resumer")));
    };
    Coroutine::transition_return(&resumer, &target, finished)
        .map_err(|error| CallError::Internal(error.to_string()))?;
    debug!(?target, finished, "coroutine returned control");
    let is_main = resumer.ptr_eq(main);
    cx.switch_to(resumer, is_main);
    Ok(())
}

#[cfg(test)]
mod tests;

//! A simple host loop that drives one call to completion on the current
//! thread.
//!
//! Preempted calls are resumed right away with a fresh scheduling context.
//! Async tasks run on the rayon pool; the driving thread blocks on a
//! crossbeam channel until the completion callback hands the continuation
//! back.

use crossbeam::channel;
use tracing::debug;

use crate::call::{AsyncWait, Call, CallEvent, Continuation};
use crate::errors::{CallError, StaleContinuation};
use crate::scheduling::SchedulingPolicy;
use crate::value::{FunctionRef, Value};

/// Why [`DirectExecutor`] could not produce results.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    Stale(#[from] StaleContinuation),
    /// An async task dropped its completion callback without completing.
    #[error("async task was abandoned before completing")]
    AsyncAbandoned,
}

/// Results of a finished call, with scheduling statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub values: Vec<Value>,
    /// Times the call was preempted.
    pub pauses: usize,
    /// Async tasks the call waited on.
    pub async_tasks: usize,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DirectExecutor {
    policy: SchedulingPolicy,
}

impl DirectExecutor {
    pub fn new(policy: SchedulingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    /// Call `function` with `args` and drive it to completion.
    pub fn run(&self, function: FunctionRef, args: Vec<Value>) -> Result<Completion, ExecError> {
        let (_call, continuation) = Call::new(function, args);
        self.drive(continuation)
    }

    /// Drive an existing continuation to completion.
    pub fn drive(&self, mut continuation: Continuation) -> Result<Completion, ExecError> {
        let mut pauses = 0;
        let mut async_tasks = 0;
        loop {
            let mut scheduler = self.policy.context();
            match continuation.resume(scheduler.as_mut())? {
                CallEvent::Returned(values) => {
                    debug!(pauses, async_tasks, "call completed");
                    return Ok(Completion {
                        values,
                        pauses,
                        async_tasks,
                    });
                }
                CallEvent::Failed(error) => return Err(error.into()),
                CallEvent::Paused(next) => {
                    pauses += 1;
                    continuation = next;
                }
                CallEvent::Async(wait) => {
                    async_tasks += 1;
                    continuation = wait_for(wait)?;
                }
            }
        }
    }
}

fn wait_for(wait: AsyncWait) -> Result<Continuation, ExecError> {
    let (tx, rx) = channel::bounded(1);
    rayon::spawn(move || {
        wait.start(move |continuation| {
            // The receiver only goes away once the executor gave up.
            let _ = tx.send(continuation);
        });
    });
    rx.recv().map_err(|_| ExecError::AsyncAbandoned)
}

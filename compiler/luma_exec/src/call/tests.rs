#![allow(clippy::unwrap_used, reason = "Tests can panic")]

use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::{Call, CallEvent, Continuation};
use crate::coroutine::{Coroutine, CoroutineStatus};
use crate::errors::{CallError, LuaError, StaleContinuation};
use crate::scheduling::Unbounded;
use crate::test_helpers::{ints, Script, Step};
use crate::value::Value;

fn resume(continuation: &Continuation) -> CallEvent {
    continuation.resume(&mut Unbounded).unwrap()
}

fn returned(event: CallEvent) -> Vec<Value> {
    match event {
        CallEvent::Returned(values) => values,
        other => panic!("expected a return, got {other:?}"),
    }
}

fn paused(event: CallEvent) -> Continuation {
    match event {
        CallEvent::Paused(next) => next,
        other => panic!("expected a pause, got {other:?}"),
    }
}

fn failed(event: CallEvent) -> CallError {
    match event {
        CallEvent::Failed(error) => error,
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[test]
fn returns_arguments() {
    let (call, start) = Call::new(Script::new("f", vec![]), ints(&[1, 2]));
    assert!(!call.is_running());
    assert_eq!(returned(resume(&start)), ints(&[1, 2]));
    assert!(call.is_terminated());
}

#[test]
fn continuation_is_single_use() {
    let (_call, start) = Call::new(Script::new("f", vec![Step::Preempt]), vec![]);
    let next = paused(resume(&start));
    assert_eq!(start.resume(&mut Unbounded).unwrap_err(), StaleContinuation);
    let copy = next.clone();
    assert!(returned(resume(&next)).is_empty());
    assert_eq!(copy.resume(&mut Unbounded).unwrap_err(), StaleContinuation);
}

#[test]
fn preemption_yields_fresh_tokens() {
    let f = Script::new("f", vec![Step::Preempt, Step::Preempt]);
    let (_call, start) = Call::new(f, ints(&[5]));
    let first = paused(resume(&start));
    let second = paused(resume(&first));
    assert_ne!(format!("{first:?}"), format!("{second:?}"));
    assert_ne!(format!("{start:?}"), format!("{first:?}"));
    assert_eq!(returned(resume(&second)), ints(&[5]));
}

#[test]
fn yield_from_main_is_fatal() {
    let f = Script::new("f", vec![Step::Yield(ints(&[1]))]);
    let (call, start) = Call::new(f, vec![]);
    assert_eq!(failed(resume(&start)), CallError::YieldFromMain);
    assert!(call.is_terminated());
}

#[test]
fn guest_error_terminates_call() {
    let f = Script::new("f", vec![Step::Fail("boom")]);
    let (_call, start) = Call::new(f, vec![]);
    assert_eq!(
        failed(resume(&start)),
        CallError::Guest(LuaError::message("boom"))
    );
}

#[test]
fn coroutine_round_trip() {
    let co = Coroutine::new(Script::new(
        "co",
        vec![Step::Yield(ints(&[10])), Step::Yield(ints(&[20]))],
    ));
    let main = Script::new(
        "main",
        vec![
            Step::Resume(co.clone(), ints(&[1])),
            Step::Resume(co.clone(), ints(&[2])),
            Step::Resume(co.clone(), ints(&[3])),
        ],
    );
    let (_call, start) = Call::new(main, vec![]);
    assert_eq!(returned(resume(&start)), ints(&[10, 20, 1, 2, 3]));
    assert_eq!(co.status(), CoroutineStatus::Dead);
}

#[test]
fn resuming_dead_coroutine_raises_in_resumer() {
    let co = Coroutine::new(Script::new("co", vec![]));
    let main = Script::new(
        "main",
        vec![
            Step::Resume(co.clone(), vec![]),
            Step::Resume(co.clone(), vec![]),
        ],
    );
    let (_call, start) = Call::new(main, vec![]);
    let CallError::Guest(error) = failed(resume(&start)) else {
        panic!("expected a guest error");
    };
    assert_eq!(error.to_string(), "cannot resume dead coroutine");
    assert_eq!(error.traceback(), ["main"]);
}

#[test]
fn coroutine_error_kills_it_and_unwinds_resumer() {
    let co = Coroutine::new(Script::new("co", vec![Step::Preempt, Step::Fail("bad")]));
    let main = Script::new("main", vec![Step::Resume(co.clone(), vec![])]);
    let (_call, start) = Call::new(main, vec![]);

    let next = paused(resume(&start));
    assert_eq!(co.status(), CoroutineStatus::Running);

    let CallError::Guest(error) = failed(resume(&next)) else {
        panic!("expected a guest error");
    };
    assert_eq!(error.value(), &Value::from("bad"));
    assert_eq!(error.traceback(), ["main"]);
    assert_eq!(co.status(), CoroutineStatus::Dead);
}

#[test]
fn async_task_result_is_delivered() {
    let f = Script::new("f", vec![Step::Async(Ok(ints(&[7])))]);
    let (_call, start) = Call::new(f, ints(&[1]));
    let CallEvent::Async(wait) = resume(&start) else {
        panic!("expected an async wait");
    };
    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    wait.start(move |continuation| *sink.lock() = Some(continuation));
    let continuation = slot.lock().take().unwrap();
    assert_eq!(returned(resume(&continuation)), ints(&[1, 7]));
}

#[test]
fn async_task_error_is_raised() {
    let f = Script::new("f", vec![Step::Async(Err(LuaError::message("io")))]);
    let (_call, start) = Call::new(f, vec![]);
    let CallEvent::Async(wait) = resume(&start) else {
        panic!("expected an async wait");
    };
    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    wait.start(move |continuation| *sink.lock() = Some(continuation));
    let continuation = slot.lock().take().unwrap();
    let CallError::Guest(error) = failed(resume(&continuation)) else {
        panic!("expected a guest error");
    };
    assert_eq!(error.to_string(), "io");
    assert_eq!(error.traceback(), ["f"]);
}

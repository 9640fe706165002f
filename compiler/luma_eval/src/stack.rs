//! Native stack growth for interpreted calls.
//!
//! A Lua call made directly from a running closure recurses on the Rust
//! stack: one `execute` frame per active Lua frame. The call-depth limit in
//! [`EvalConfig`](crate::EvalConfig) caps how many there can be, and each
//! nested call runs through [`with_call_stack`] so the limit, not the
//! thread's stack size, is what ends runaway recursion.

/// Headroom a single interpreter step may need before the next check.
const CALL_HEADROOM: usize = 128 * 1024;

/// Segment allocated once the headroom is gone. Large enough for a few
/// hundred nested calls, so growth stays rare.
const CALL_SEGMENT: usize = 2 * 1024 * 1024;

/// Run `call`, first moving to a fresh stack segment if fewer than
/// `CALL_HEADROOM` bytes remain.
#[inline]
pub(crate) fn with_call_stack<R>(call: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(CALL_HEADROOM, CALL_SEGMENT, call)
}

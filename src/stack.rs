//! Stack growth for the recursive evaluator.
//!
//! Evaluation recurses once per nesting level and per call. The depth limit bounds
//! that recursion, but a debug build or a small thread stack can run out first, so
//! each level makes sure some stack remains before descending.

/// Grow the stack when less than this remains
const RED_ZONE: usize = 128 * 1024;

/// Size of each new stack segment
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

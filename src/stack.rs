//! Stack growth for the recursive parser and evaluator.
//!
//! Deeply nested source or deep script recursion can outrun a host thread's
//! stack long before `max_call_depth` trips, so every recursive entry point
//! runs through [`ensure_sufficient_stack`].

/// Minimum stack space to keep available (100KB red zone).
const RED_ZONE: usize = 100 * 1024;

/// Stack space to allocate when growing (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Runs `f`, first moving onto a fresh stack segment when less than the red
/// zone remains.
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

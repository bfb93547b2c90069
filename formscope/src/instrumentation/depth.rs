//! Per-thread nesting depth of the transform routine.
//!
//! Only the outermost transformation of a list form is captured; nested
//! transformations triggered from inside it are only counted.

use std::cell::Cell;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Increment the depth and return its previous value.
pub(crate) fn enter() -> usize {
    DEPTH.with(|depth| {
        let previous = depth.get();
        depth.set(previous + 1);
        previous
    })
}

/// Decrement the depth, never below zero.
pub(crate) fn exit() {
    DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
}

/// Current depth on this thread.
pub fn current() -> usize {
    DEPTH.with(Cell::get)
}

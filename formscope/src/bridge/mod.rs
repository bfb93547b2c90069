//! # Capture Bridges
//!
//! Process-wide, thread-safe buffers that decouple the interception points
//! (writers, on compiling threads) from consumers (readers, on any thread).
//!
//! ```text
//! transform hook  ──▶ FormBridge       (namespace, symbol, phase) → FormEvent
//! reference hooks ──▶ ReferenceBridge  callee → {callers}
//! unit hook       ──▶ UnitBridge       unit name → UnitRecord
//!                          │
//!                          └─▶ Session (owns all three, plus the live feed)
//! ```
//!
//! Writers never block on readers for longer than a map insert, and a
//! disabled bridge ignores writes entirely.

pub mod forms;
pub mod references;
pub mod units;
pub mod session;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use forms::FormBridge;
pub use references::ReferenceBridge;
pub use session::{CaptureNotice, Session};
pub use units::UnitBridge;

/// Lock a bridge buffer, recovering it if a writer panicked mid-insert.
///
/// Every buffer operation is a single map call, so a poisoned buffer is
/// still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

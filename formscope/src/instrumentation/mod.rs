//! # Compiler Instrumentation
//!
//! Attaches a non-transforming observer to the host's internal routines and
//! routes what it sees into the capture bridges.
//!
//! ```text
//!            ┌──────────── Installer (once) ─────────────┐
//!            │ self-test → capture toggles → attach ×4    │
//!            └──────────────────┬─────────────────────────┘
//!                               ▼
//! host routines ──▶ Instrumentation ──▶ Session bridges
//!                    │  depth guard (thread-local)
//!                    └─ error guard (catch_unwind + Result)
//! ```
//!
//! Hooks run synchronously on compiling threads. None of them blocks,
//! alters host behavior, or lets an error escape.

pub mod depth;
pub(crate) mod guard;
pub mod installer;
pub mod observer;

pub use installer::{install_global, InstallReport, Installer};
pub use observer::{EnterToken, Instrumentation};

//! # Reference Host
//!
//! A self-contained compiler/loader implementing [`Host`](crate::host::Host),
//! used to exercise the instrumentation end to end without a production
//! runtime.
//!
//! ```text
//! source ──▶ reader ──▶ macroexpand (transform hook, re-entrant)
//!                           │
//!                           ▼
//!                       analyze ──▶ symbol analysis hook
//!                           │   └─▶ reference construction hook (non-constants)
//!                           ▼
//!                       emitter ──▶ class_builder ──▶ unit definition hook
//! ```

pub mod class_builder;
pub mod emitter;
pub mod expander;
pub mod host;
pub mod reader;

pub use class_builder::{ClassBuilder, CodeBuilder, PoolBuilder};
pub use host::{CompileSummary, SimHost};
pub use reader::{read_all, read_one};

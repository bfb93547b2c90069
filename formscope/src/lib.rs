//! # formscope - Compile-time Capture for a Live Form Compiler
//!
//! formscope observes a running compiler/loader from the outside. It watches
//! top-level definitions as they are written and as they look after macro
//! expansion, records which definitions reference which, measures every
//! compiled unit the loader defines, and derives a list of probably-unused
//! symbols. It never changes what the host compiles.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Host compiler / loader                         │
//! │   transform   reference ctor   symbol analysis   unit define   │
//! └───────┬─────────────┬────────────────┬────────────────┬─────────┘
//!         │             │                │                │
//!         ▼             ▼                ▼                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │            Interception points (instrumentation)                │
//! │  depth guard · RAW/EXPANDED reconciliation · const correction   │
//! └───────┬─────────────┬────────────────────────────────┬──────────┘
//!         ▼             ▼                                ▼
//! ┌──────────────┐ ┌──────────────┐              ┌──────────────┐
//! │  FormBridge  │ │ Reference    │              │  UnitBridge  │
//! │              │ │ Bridge       │              │  (bytecode)  │
//! └──────┬───────┘ └──────┬───────┘              └──────┬───────┘
//!        └────────────────┼─────────────────────────────┘
//!                         ▼
//!                ┌─────────────────┐     ┌──────────────┐
//!                │     Session     │────▶│   Detector   │
//!                │ drain · peek    │     │ (unused)     │
//!                └────────┬────────┘     └──────────────┘
//!                         ▼
//!               analysis · export (JSON)
//! ```
//!
//! ## Module Structure
//!
//! - [`host`]: the contract between formscope and the host: [`host::Host`],
//!   [`host::CompilerObserver`], interception points and reflective capabilities
//! - [`instrumentation`]: installer plus the observer armed at every point
//! - [`bridge`]: the three capture buffers and the [`bridge::Session`] owning them
//! - [`bytecode`]: single-pass visitor over compiled units
//! - [`selftest`]: one-shot probe of host bindings, sets the health flag
//! - [`detector`]: unused-symbol heuristic over captured references
//! - [`analysis`]: post-processing of drained captures
//! - [`export`]: JSON snapshot of a session
//! - [`scan`]: loads compiled units from disk for the CLI
//! - `sim`: in-process reference host used by the tests and embedders
//!   (behind the `sim` feature)
//! - [`config`]: capture toggles and the debug/verbose flags
//! - [`cli`]: command-line argument parsing
//! - [`domain`]: newtypes and error enums
//!
//! ## Typical Usage
//!
//! ```text
//! let session = Session::global();
//! let report = install_global(&host, InstrumentationConfig::from_env());
//! // ... host compiles ...
//! let forms = session.drain_form_events();
//! let unused = session.find_unused_symbols(host.as_ref(), &["app.core"])?;
//! ```

pub mod analysis;
pub mod bridge;
pub mod bytecode;
pub mod cli;
pub mod config;
pub mod detector;
pub mod domain;
pub mod export;
pub mod host;
pub mod instrumentation;
pub mod scan;
pub mod selftest;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use bridge::Session;
pub use config::InstrumentationConfig;
pub use host::{CompilerObserver, Host};
pub use instrumentation::{install_global, InstallReport, Installer};

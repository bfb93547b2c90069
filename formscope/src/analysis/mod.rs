//! Analysis of captured data
//!
//! Pure functions over bridge snapshots, separated from capture and from
//! presentation (CLI output, JSON export).

pub mod expansion;
pub mod form_metrics;
pub mod reference_graph;
pub mod units;

pub use expansion::{summarize_definitions, DefinitionSummary};
pub use form_metrics::{measure, FormMetrics};
pub use reference_graph::{rank_fan_in, FanIn};
pub use units::{summarize_units, UnitSummary};

//! Snapshot export
//!
//! Serializes the contents of a capture session to JSON for offline
//! inspection and for consumers outside the process.

pub mod snapshot;

pub use snapshot::SnapshotExporter;

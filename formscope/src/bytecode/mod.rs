//! # Compiled-Unit Visitor
//!
//! Extracts structural metrics from a compiled unit's raw bytes without
//! loading or executing it.
//!
//! ```text
//! bytes ──▶ ClassReader ──▶ MetricsVisitor ──▶ UnitMetrics
//!                │
//!                └─ ClassFormatError ──▶ UnitMetrics::unknown()  (-1 counts)
//! ```
//!
//! Parsing is defensive: a malformed unit is logged at debug level and
//! reported with unknown counts. It never fails unit definition.

pub mod descriptor;
pub mod metrics;
pub mod opcodes;
pub mod reader;

use log::debug;

use formscope_common::UnitMetrics;

use crate::domain::ClassFormatError;

pub use metrics::MetricsVisitor;
pub use reader::{ClassHeader, ClassReader, ClassVisitor, Instruction, MemberInfo, Operand};

/// Count fields and instructions and collect outgoing references of a unit.
///
/// Returns [`UnitMetrics::unknown`] for bytes the reader cannot parse.
#[must_use]
pub fn analyze_unit(bytes: &[u8]) -> UnitMetrics {
    let mut visitor = MetricsVisitor::new();
    match ClassReader::new(bytes).accept(&mut visitor) {
        Ok(()) => visitor.finish(),
        Err(e) => {
            debug!("Unit visitor failed after {} bytes: {e}", bytes.len());
            UnitMetrics::unknown()
        }
    }
}

/// Dotted name declared by a unit's own bytes.
///
/// # Errors
/// Returns [`ClassFormatError`] if the header or constant pool is malformed.
pub fn peek_class_name(bytes: &[u8]) -> Result<String, ClassFormatError> {
    ClassReader::new(bytes)
        .class_name()
        .map(|internal| formscope_common::normalize_unit_name(&internal))
}

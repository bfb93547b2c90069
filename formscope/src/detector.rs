//! Unused-symbol detection
//!
//! A defined symbol is reported as unused when no captured reference names
//! it. This is a heuristic: the result is only as complete as the capture.
//! Symbols reached through dynamic lookup, reflection or quoted data, or
//! referenced by code compiled before instrumentation was installed, are
//! reported as unused even though they are not.

use std::collections::BTreeSet;

use log::debug;

use crate::bridge::ReferenceBridge;
use crate::domain::DetectError;
use crate::host::Host;

/// Defined symbols of `namespaces` that never appear as a callee in `references`.
///
/// # Errors
/// Returns [`DetectError::Enumerate`] if the host cannot list a namespace.
pub fn find_unused_symbols(
    host: &dyn Host,
    references: &ReferenceBridge,
    namespaces: &[&str],
) -> Result<BTreeSet<String>, DetectError> {
    let referenced = references.references();
    let mut unused = BTreeSet::new();

    for namespace in namespaces {
        let defined = host.defined_symbols(namespace).map_err(|source| DetectError::Enumerate {
            namespace: (*namespace).to_string(),
            source,
        })?;
        let before = unused.len();
        unused.extend(unreferenced(defined.iter().map(ToString::to_string), &referenced));
        debug!(
            "{namespace}: {} defined, {} unreferenced",
            defined.len(),
            unused.len() - before
        );
    }

    Ok(unused)
}

/// Names from `defined` that are not in `referenced`.
pub fn unreferenced(
    defined: impl IntoIterator<Item = String>,
    referenced: &BTreeSet<String>,
) -> BTreeSet<String> {
    defined.into_iter().filter(|name| !referenced.contains(name)).collect()
}

//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep symbol names and compiled-unit names apart,
//! and make function signatures more expressive.

use std::fmt;

/// Namespace-qualified symbol name (`ns/name`)
///
/// Identifies a definition across namespaces. Reference edges, unused-symbol
/// results and caller sets are all keyed by its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    namespace: String,
    name: String,
}

impl QualifiedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Compiled unit name in dotted form (`app.core$handler`)
///
/// Loaders report internal names (`app/core$handler`); the constructor
/// normalizes them so both spellings compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitName(String);

impl UnitName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(formscope_common::normalize_unit_name(name.as_ref()))
    }

    /// Get the unit name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UnitName {
    fn from(s: &str) -> Self {
        UnitName::new(s)
    }
}

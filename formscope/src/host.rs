//! # Host Contract
//!
//! The host compiler/loader is an uncontrolled external system. This module
//! names everything formscope needs from it and everything it offers back.
//!
//! ## What the host provides ([`Host`])
//!
//! - Registration of a non-transforming observer at each [`InterceptionPoint`]
//! - Thread-bound compiler state: current namespace, current line, enclosing
//!   definition
//! - Symbol resolution and namespace enumeration
//! - Capability probes used by the self-test to detect internals drift
//!
//! ## What the host calls ([`CompilerObserver`])
//!
//! ```text
//! transform routine      ──▶ transform_enter / transform_exit
//! reference construction ──▶ reference_constructed
//! symbol analysis        ──▶ symbol_analyzed      (inlined-constant correction)
//! unit definition        ──▶ unit_defined         (always returns None)
//! ```
//!
//! All observer methods are infallible from the host's point of view: they
//! never panic out and never return errors.

use std::fmt;
use std::sync::Arc;

use formscope_common::{FormRef, Symbol};

use crate::domain::{HostError, QualifiedName};
use crate::instrumentation::EnterToken;

/// Internal routines of the host that formscope observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InterceptionPoint {
    /// Re-entrant form transformation (macro expansion)
    Transform,
    /// Construction of a symbolic reference to a bound definition
    ReferenceConstruction,
    /// Symbol analysis, observed to catch references to inlined constants
    ConstantResolution,
    /// Definition of a compiled unit from its bytes
    UnitDefinition,
}

impl InterceptionPoint {
    pub const ALL: [InterceptionPoint; 4] = [
        InterceptionPoint::Transform,
        InterceptionPoint::ReferenceConstruction,
        InterceptionPoint::ConstantResolution,
        InterceptionPoint::UnitDefinition,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            InterceptionPoint::Transform => "transform",
            InterceptionPoint::ReferenceConstruction => "reference-construction",
            InterceptionPoint::ConstantResolution => "constant-resolution",
            InterceptionPoint::UnitDefinition => "unit-definition",
        }
    }
}

impl fmt::Display for InterceptionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reflective bindings into host internals that the interception points rely on.
///
/// Each one may disappear or change shape between host versions; the
/// self-test probes them all once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    VarNamespace,
    VarSymbol,
    NamespaceName,
    SymbolResolution,
    VarMetadata,
    ConstantMarker,
    MetadataLookup,
    CompilerLine,
    CurrentNamespace,
    EnclosingDefinition,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::VarNamespace,
        Capability::VarSymbol,
        Capability::NamespaceName,
        Capability::SymbolResolution,
        Capability::VarMetadata,
        Capability::ConstantMarker,
        Capability::MetadataLookup,
        Capability::CompilerLine,
        Capability::CurrentNamespace,
        Capability::EnclosingDefinition,
    ];

    /// Human-readable name of the binding, used in self-test diagnostics.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Capability::VarNamespace => "var namespace accessor",
            Capability::VarSymbol => "var symbol accessor",
            Capability::NamespaceName => "namespace name accessor",
            Capability::SymbolResolution => "compiler symbol resolution",
            Capability::VarMetadata => "var metadata accessor",
            Capability::ConstantMarker => "constant marker keyword",
            Capability::MetadataLookup => "metadata map lookup",
            Capability::CompilerLine => "compiler line position",
            Capability::CurrentNamespace => "current namespace binding",
            Capability::EnclosingDefinition => "enclosing definition binding",
        }
    }

    /// Interception points that degrade when this binding is missing.
    #[must_use]
    pub fn used_by(self) -> &'static [InterceptionPoint] {
        match self {
            Capability::VarNamespace | Capability::VarSymbol | Capability::NamespaceName => &[
                InterceptionPoint::ReferenceConstruction,
                InterceptionPoint::ConstantResolution,
            ],
            Capability::SymbolResolution
            | Capability::VarMetadata
            | Capability::ConstantMarker
            | Capability::MetadataLookup => &[InterceptionPoint::ConstantResolution],
            Capability::CompilerLine | Capability::CurrentNamespace => {
                &[InterceptionPoint::Transform]
            }
            Capability::EnclosingDefinition => &[
                InterceptionPoint::ReferenceConstruction,
                InterceptionPoint::ConstantResolution,
            ],
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A bound definition as seen at a reference site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRef {
    pub name: QualifiedName,
    /// Marked as a compile-time constant (inlined, so never referenced directly)
    pub constant: bool,
}

impl VarRef {
    #[must_use]
    pub fn new(name: QualifiedName) -> Self {
        Self { name, constant: false }
    }

    #[must_use]
    pub fn constant(name: QualifiedName) -> Self {
        Self { name, constant: true }
    }
}

/// Observer invoked by the host at each interception point.
///
/// Implementations must return quickly, never block and never panic out;
/// they run synchronously on the compiling thread.
pub trait CompilerObserver: Send + Sync {
    /// Entry into the transform routine with its input form.
    fn transform_enter(&self, form: &FormRef) -> EnterToken;

    /// Exit from the transform routine. `token` is the value returned by the
    /// matching `transform_enter` on the same thread.
    fn transform_exit(&self, token: EnterToken, result: &FormRef);

    /// A symbolic reference to `var` was constructed.
    fn reference_constructed(&self, var: &VarRef);

    /// The compiler is about to analyze `symbol`.
    fn symbol_analyzed(&self, symbol: &Symbol);

    /// A compiled unit is being defined. Returns replacement bytes, or `None`
    /// for no transformation.
    fn unit_defined(&self, internal_name: &str, bytes: &[u8]) -> Option<Vec<u8>>;
}

/// The host compiler/loader as seen from formscope.
pub trait Host: Send + Sync {
    /// Register `observer` at `point`.
    ///
    /// # Errors
    /// Returns [`HostError::AttachRefused`] if the routine cannot be instrumented.
    fn attach(
        &self,
        point: InterceptionPoint,
        observer: Arc<dyn CompilerObserver>,
    ) -> Result<(), HostError>;

    /// Check that a reflective binding is reachable.
    ///
    /// # Errors
    /// Returns [`HostError::BindingUnavailable`] when it is not.
    fn probe(&self, capability: Capability) -> Result<(), HostError>;

    /// Namespace currently bound on the calling thread.
    ///
    /// # Errors
    /// Returns an error if the binding cannot be read.
    fn current_namespace(&self) -> Result<String, HostError>;

    /// Line the compiler is positioned at on the calling thread, if any.
    ///
    /// # Errors
    /// Returns an error if the binding cannot be read.
    fn compiler_line(&self) -> Result<Option<u32>, HostError>;

    /// Definition currently being compiled on the calling thread, if any.
    ///
    /// # Errors
    /// Returns an error if the binding cannot be read.
    fn enclosing_definition(&self) -> Result<Option<QualifiedName>, HostError>;

    /// Resolve `symbol` in the calling thread's namespace. `Ok(None)` means it
    /// does not name a definition (local, special form, class).
    ///
    /// # Errors
    /// Returns [`HostError::Unresolved`] when resolution itself fails.
    fn resolve(&self, symbol: &Symbol) -> Result<Option<VarRef>, HostError>;

    /// Every symbol currently defined in `namespace`.
    ///
    /// # Errors
    /// Returns [`HostError::NamespaceNotFound`] for unknown namespaces.
    fn defined_symbols(&self, namespace: &str) -> Result<Vec<QualifiedName>, HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_capability_degrades_some_point() {
        for capability in Capability::ALL {
            assert!(!capability.used_by().is_empty(), "{capability:?} maps to no point");
        }
    }

    #[test]
    fn test_interception_point_names_are_distinct() {
        let mut names: Vec<_> = InterceptionPoint::ALL.iter().map(|p| p.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), InterceptionPoint::ALL.len());
    }
}

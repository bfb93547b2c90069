//! # Shared Data Structures (Capture Core ↔ Consumers)
//!
//! Defines the plain record shapes produced by the instrumentation core and
//! consumed by downstream layers (metrics, export, visualization). Consumers
//! depend on this crate only; they never need the instrumentation itself.
//!
//! ## Record Kinds
//!
//! 1. [`FormEvent`] - one captured definition form per phase (RAW / EXPANDED)
//! 2. [`ReferenceEdge`] - a symbolic reference `callee <- caller`
//! 3. [`UnitRecord`] - a loaded compiled unit with visitor-derived metrics
//!
//! ## Key Types
//!
//! - [`Form`] / [`FormRef`] - tree-shaped payload of a captured definition
//! - [`Phase`] - pre- or post-transformation state
//! - [`DefKind`] - definition category named by the defining operator
//! - [`FormKey`] - composite `(namespace, symbol_name, phase)` buffer key

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Constants
// ============================================================================

/// Sentinel for a count the bytecode visitor could not determine.
///
/// Emitted when a compiled unit is malformed or uses an unsupported format.
/// Consumers must read this as "unknown", never as zero.
pub const UNKNOWN_COUNT: i32 = -1;

/// Namespace recorded when the host cannot report the current one.
pub const DEFAULT_NAMESPACE: &str = "user";

/// Operators whose forms are captured as definitions.
pub const DEF_OPERATORS: &[&str] = &[
    "def",
    "defn",
    "defn-",
    "defmacro",
    "defmulti",
    "defprotocol",
    "defrecord",
    "deftype",
    "definterface",
];

/// Convert an internal unit name (`a/b/C`) to dotted form (`a.b.C`).
#[must_use]
pub fn normalize_unit_name(internal: &str) -> String {
    internal.replace('/', ".")
}

// ============================================================================
// Forms
// ============================================================================

/// Shared handle to a form. Identity (`Arc::ptr_eq`) is what tells a
/// transformed form apart from an untouched one.
pub type FormRef = Arc<Form>;

/// Position and flag metadata attached to symbols and collections.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Meta {
    /// First source line of the form
    pub line: Option<u32>,
    /// Last source line of the form
    pub end_line: Option<u32>,
    /// Boolean metadata keys set on the form (e.g. `const`, `private`)
    pub flags: Vec<String>,
}

impl Meta {
    /// Metadata carrying only a start line.
    #[must_use]
    pub fn at_line(line: u32) -> Self {
        Self { line: Some(line), ..Self::default() }
    }

    /// Returns true if the boolean flag `name` is set.
    #[must_use]
    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|f| f == name)
    }

    /// Returns true if no position or flag is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.line.is_none() && self.end_line.is_none() && self.flags.is_empty()
    }
}

/// A possibly namespace-qualified symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub namespace: Option<String>,
    pub name: String,
    pub meta: Meta,
}

impl Symbol {
    /// Unqualified symbol without metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self { namespace: None, name: name.into(), meta: Meta::default() }
    }

    /// Namespace-qualified symbol without metadata.
    pub fn qualified(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: Some(namespace.into()), name: name.into(), meta: Meta::default() }
    }

    /// Replace the symbol's metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn is_qualified(&self) -> bool {
        self.namespace.is_some()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Some(ref ns) => write!(f, "{ns}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Ordered child forms plus the collection's metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Seq {
    pub items: Vec<FormRef>,
    pub meta: Meta,
}

/// Tree-shaped form data as handed over by the host compiler.
///
/// The capture core treats the payload as opaque apart from three questions:
/// is it a list, what is its head operator, and what name does it define.
#[derive(Debug, Clone, PartialEq)]
pub enum Form {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
    Keyword(String),
    Symbol(Symbol),
    List(Seq),
    Vector(Seq),
    Map(Vec<(FormRef, FormRef)>),
    Set(Vec<FormRef>),
}

impl Form {
    /// List form without metadata.
    #[must_use]
    pub fn list(items: Vec<FormRef>) -> FormRef {
        Arc::new(Form::List(Seq { items, meta: Meta::default() }))
    }

    /// List form carrying `meta`.
    #[must_use]
    pub fn list_with_meta(items: Vec<FormRef>, meta: Meta) -> FormRef {
        Arc::new(Form::List(Seq { items, meta }))
    }

    /// Vector form without metadata.
    #[must_use]
    pub fn vector(items: Vec<FormRef>) -> FormRef {
        Arc::new(Form::Vector(Seq { items, meta: Meta::default() }))
    }

    /// Unqualified symbol form.
    pub fn symbol(name: impl Into<String>) -> FormRef {
        Arc::new(Form::Symbol(Symbol::new(name)))
    }

    pub fn keyword(name: impl Into<String>) -> FormRef {
        Arc::new(Form::Keyword(name.into()))
    }

    #[must_use]
    pub fn int(value: i64) -> FormRef {
        Arc::new(Form::Int(value))
    }

    pub fn string(value: impl Into<String>) -> FormRef {
        Arc::new(Form::Str(value.into()))
    }

    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, Form::List(_))
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&Seq> {
        match self {
            Form::List(seq) => Some(seq),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Form::Symbol(sym) => Some(sym),
            _ => None,
        }
    }

    /// Metadata of a symbol, list or vector.
    #[must_use]
    pub fn meta(&self) -> Option<&Meta> {
        match self {
            Form::Symbol(sym) => Some(&sym.meta),
            Form::List(seq) | Form::Vector(seq) => Some(&seq.meta),
            _ => None,
        }
    }

    /// `n`th element of a list.
    #[must_use]
    pub fn nth(&self, n: usize) -> Option<&FormRef> {
        self.as_list().and_then(|seq| seq.items.get(n))
    }

    /// Name of the head operator of a list, if it is an unqualified symbol.
    #[must_use]
    pub fn head_name(&self) -> Option<&str> {
        self.nth(0)
            .and_then(|head| head.as_symbol())
            .filter(|sym| !sym.is_qualified())
            .map(|sym| sym.name.as_str())
    }

    /// Direct children of a collection form, map entries flattened as key then value.
    #[must_use]
    pub fn children(&self) -> Vec<&FormRef> {
        match self {
            Form::List(seq) | Form::Vector(seq) => seq.items.iter().collect(),
            Form::Set(items) => items.iter().collect(),
            Form::Map(entries) => entries.iter().flat_map(|(k, v)| [k, v]).collect(),
            _ => Vec::new(),
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[FormRef]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Form::Nil => f.write_str("nil"),
            Form::Bool(b) => write!(f, "{b}"),
            Form::Int(i) => write!(f, "{i}"),
            Form::Float(x) => write!(f, "{x:?}"),
            Form::Char(c) => write!(f, "\\{c}"),
            Form::Str(s) => write!(f, "{s:?}"),
            Form::Keyword(k) => write!(f, ":{k}"),
            Form::Symbol(sym) => write!(f, "{sym}"),
            Form::List(seq) => {
                f.write_str("(")?;
                write_items(f, &seq.items)?;
                f.write_str(")")
            }
            Form::Vector(seq) => {
                f.write_str("[")?;
                write_items(f, &seq.items)?;
                f.write_str("]")
            }
            Form::Set(items) => {
                f.write_str("#{")?;
                write_items(f, items)?;
                f.write_str("}")
            }
            Form::Map(entries) => {
                f.write_str("{")?;
                for (idx, (k, v)) in entries.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{k} {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

// ============================================================================
// Definition Events
// ============================================================================

/// Whether a captured form reflects pre- or post-transformation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// The form exactly as written, before any macro expansion
    Raw,
    /// The form after the compiler's transformation step (only when it changed)
    Expanded,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Raw => "raw",
            Phase::Expanded => "expanded",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition category, named by the defining operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefKind {
    Def,
    Defn,
    DefnPrivate,
    Defmacro,
    Defmulti,
    Defprotocol,
    Defrecord,
    Deftype,
    Definterface,
}

impl DefKind {
    /// Map a defining operator name to its kind.
    #[must_use]
    pub fn from_operator(op: &str) -> Option<Self> {
        Some(match op {
            "def" => DefKind::Def,
            "defn" => DefKind::Defn,
            "defn-" => DefKind::DefnPrivate,
            "defmacro" => DefKind::Defmacro,
            "defmulti" => DefKind::Defmulti,
            "defprotocol" => DefKind::Defprotocol,
            "defrecord" => DefKind::Defrecord,
            "deftype" => DefKind::Deftype,
            "definterface" => DefKind::Definterface,
            _ => return None,
        })
    }

    /// Kind of a definition form `(op name ...)`, if `form` is one.
    #[must_use]
    pub fn of_form(form: &Form) -> Option<Self> {
        form.head_name().and_then(Self::from_operator)
    }

    /// The defining operator as written in source.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DefKind::Def => "def",
            DefKind::Defn => "defn",
            DefKind::DefnPrivate => "defn-",
            DefKind::Defmacro => "defmacro",
            DefKind::Defmulti => "defmulti",
            DefKind::Defprotocol => "defprotocol",
            DefKind::Defrecord => "defrecord",
            DefKind::Deftype => "deftype",
            DefKind::Definterface => "definterface",
        }
    }
}

impl fmt::Display for DefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name defined by `(op name ...)`: the second element, when it is a symbol.
#[must_use]
pub fn definition_name(form: &Form) -> Option<String> {
    form.nth(1).and_then(|second| second.as_symbol()).map(ToString::to_string)
}

/// Composite buffer key; at most one live [`FormEvent`] exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormKey {
    pub namespace: String,
    pub symbol_name: String,
    pub phase: Phase,
}

/// One captured definition form in one phase.
#[derive(Debug, Clone)]
pub struct FormEvent {
    pub phase: Phase,
    pub kind: DefKind,
    pub namespace: String,
    pub symbol_name: String,
    /// Best-effort first line (form metadata, else enclosing compiler position)
    pub line: Option<u32>,
    /// Best-effort last line (form metadata only)
    pub end_line: Option<u32>,
    /// The captured form; treat as an immutable snapshot
    pub payload: FormRef,
}

impl FormEvent {
    #[must_use]
    pub fn key(&self) -> FormKey {
        FormKey {
            namespace: self.namespace.clone(),
            symbol_name: self.symbol_name.clone(),
            phase: self.phase,
        }
    }

    /// `namespace/symbol_name`
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.symbol_name)
    }
}

// ============================================================================
// References
// ============================================================================

/// A resolved symbolic reference. `caller` is `None` for top-level or
/// anonymous reference sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceEdge {
    pub callee: String,
    pub caller: Option<String>,
}

// ============================================================================
// Loaded Units
// ============================================================================

/// Visitor output for one compiled unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnitMetrics {
    /// Declared fields, or [`UNKNOWN_COUNT`]
    pub field_count: i32,
    /// Decoded instructions across all method bodies, or [`UNKNOWN_COUNT`]
    pub instruction_count: i32,
    /// Other units referenced (dotted names, self excluded)
    pub references: BTreeSet<String>,
}

impl UnitMetrics {
    /// Result for bytes the visitor could not parse.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            field_count: UNKNOWN_COUNT,
            instruction_count: UNKNOWN_COUNT,
            references: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        self.field_count != UNKNOWN_COUNT && self.instruction_count != UNKNOWN_COUNT
    }
}

/// A compiled unit observed at definition time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    /// Dotted unit name
    pub name: String,
    /// Size of the unit's byte representation
    pub byte_size: usize,
    /// Declared fields, or [`UNKNOWN_COUNT`]
    pub field_count: i32,
    /// Decoded instructions, or [`UNKNOWN_COUNT`]
    pub instruction_count: i32,
    /// Outgoing references (dotted names, self excluded)
    pub references: BTreeSet<String>,
}

impl UnitRecord {
    #[must_use]
    pub fn new(name: String, byte_size: usize, metrics: UnitMetrics) -> Self {
        Self {
            name,
            byte_size,
            field_count: metrics.field_count,
            instruction_count: metrics.instruction_count,
            references: metrics.references,
        }
    }

    /// Field count, `None` when unknown.
    #[must_use]
    pub fn known_field_count(&self) -> Option<u32> {
        u32::try_from(self.field_count).ok()
    }

    /// Instruction count, `None` when unknown.
    #[must_use]
    pub fn known_instruction_count(&self) -> Option<u32> {
        u32::try_from(self.instruction_count).ok()
    }
}

//! In-process reference host.
//!
//! A small compiler for the s-expression language that exposes the same
//! internal routines a production host does: re-entrant macro expansion,
//! reference construction, symbol analysis with constant inlining, and unit
//! definition. Observers attached through [`Host::attach`] see every one of
//! them, on the compiling thread, in compiler order.
//!
//! Fault injection (`break_capability`, `crash_capability`, `refuse`) models
//! a host whose internals drifted.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use log::debug;

use formscope_common::{normalize_unit_name, Form, FormRef, Seq, Symbol, DEFAULT_NAMESPACE};

use crate::bridge::lock;
use crate::domain::{HostError, QualifiedName, SimError};
use crate::host::{Capability, CompilerObserver, Host, InterceptionPoint, VarRef};
use crate::sim::emitter::{emit_function, ResolvedRef};
use crate::sim::{expander, reader};

const CORE_NAMESPACE: &str = "clojure.core";

const CORE_FUNCTIONS: &[&str] = &[
    "+", "-", "*", "=", "<", ">", "inc", "dec", "str", "println", "list", "vector", "map",
    "filter", "reduce", "first", "rest", "cons", "count", "get", "assoc", "not", "nil?",
];

const SPECIAL_FORMS: &[&str] = &["def", "fn", "if", "do", "let", "quote", "ns", "&"];

#[derive(Debug, Clone, Copy)]
struct VarInfo {
    constant: bool,
    function: bool,
}

#[derive(Debug, Default)]
struct Namespace {
    vars: BTreeMap<String, VarInfo>,
    uses: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct CompileContext {
    namespace: Option<String>,
    line: Option<u32>,
    enclosing: Option<QualifiedName>,
}

thread_local! {
    static CONTEXT: RefCell<CompileContext> = RefCell::new(CompileContext::default());
}

fn context<T>(f: impl FnOnce(&mut CompileContext) -> T) -> T {
    CONTEXT.with(|ctx| f(&mut ctx.borrow_mut()))
}

/// Restores the previous compile context when dropped.
struct ContextScope(CompileContext);

impl ContextScope {
    fn enter(next: CompileContext) -> Self {
        Self(context(|ctx| std::mem::replace(ctx, next)))
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut self.0);
        context(|ctx| *ctx = previous);
    }
}

/// Restores the previous enclosing definition when dropped.
struct EnclosingScope(Option<QualifiedName>);

impl EnclosingScope {
    fn enter(name: QualifiedName) -> Self {
        Self(context(|ctx| ctx.enclosing.replace(name)))
    }
}

impl Drop for EnclosingScope {
    fn drop(&mut self) {
        let previous = self.0.take();
        context(|ctx| ctx.enclosing = previous);
    }
}

/// What one `compile_str` call defined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileSummary {
    pub definitions: Vec<QualifiedName>,
    /// Dotted names of the units emitted
    pub units: Vec<String>,
}

pub struct SimHost {
    namespaces: Mutex<BTreeMap<String, Namespace>>,
    observers: Mutex<BTreeMap<InterceptionPoint, Arc<dyn CompilerObserver>>>,
    broken: Mutex<BTreeSet<Capability>>,
    crashing: Mutex<BTreeSet<Capability>>,
    refused: Mutex<BTreeSet<InterceptionPoint>>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    #[must_use]
    pub fn new() -> Self {
        let mut core = Namespace::default();
        for name in CORE_FUNCTIONS {
            core.vars.insert((*name).to_string(), VarInfo { constant: false, function: true });
        }
        let mut namespaces = BTreeMap::new();
        namespaces.insert(CORE_NAMESPACE.to_string(), core);
        namespaces.insert(DEFAULT_NAMESPACE.to_string(), Namespace::default());

        Self {
            namespaces: Mutex::new(namespaces),
            observers: Mutex::new(BTreeMap::new()),
            broken: Mutex::new(BTreeSet::new()),
            crashing: Mutex::new(BTreeSet::new()),
            refused: Mutex::new(BTreeSet::new()),
        }
    }

    // ------------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------------

    /// Make `capability` report unavailable, in probes and in host calls.
    pub fn break_capability(&self, capability: Capability) {
        lock(&self.broken).insert(capability);
    }

    /// Make host calls that need `capability` panic.
    pub fn crash_capability(&self, capability: Capability) {
        lock(&self.crashing).insert(capability);
    }

    /// Refuse future attachment at `point`.
    pub fn refuse(&self, point: InterceptionPoint) {
        lock(&self.refused).insert(point);
    }

    /// Number of interception points with an attached observer.
    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    fn check(&self, capability: Capability) -> Result<(), HostError> {
        if lock(&self.crashing).contains(&capability) {
            panic!("{capability} threw inside the host");
        }
        if lock(&self.broken).contains(&capability) {
            return Err(HostError::BindingUnavailable {
                binding: capability.description().to_string(),
                reason: "not present in this host build".to_string(),
            });
        }
        Ok(())
    }

    fn observer(&self, point: InterceptionPoint) -> Option<Arc<dyn CompilerObserver>> {
        lock(&self.observers).get(&point).cloned()
    }

    // ------------------------------------------------------------------------
    // Namespaces
    // ------------------------------------------------------------------------

    /// Bind `namespace/name` directly, as an earlier compilation would have.
    pub fn define_var(&self, namespace: &str, name: &str, constant: bool) {
        self.intern(namespace, name, VarInfo { constant, function: false });
    }

    fn intern(&self, namespace: &str, name: &str, info: VarInfo) {
        lock(&self.namespaces)
            .entry(namespace.to_string())
            .or_default()
            .vars
            .insert(name.to_string(), info);
    }

    fn lookup(&self, symbol: &Symbol) -> Option<(QualifiedName, VarInfo)> {
        let namespaces = lock(&self.namespaces);
        let find = |ns: &str| {
            namespaces
                .get(ns)
                .and_then(|n| n.vars.get(&symbol.name))
                .map(|info| (QualifiedName::new(ns, symbol.name.clone()), *info))
        };

        if let Some(ns) = &symbol.namespace {
            return find(ns);
        }
        let current = context(|ctx| ctx.namespace.clone()).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        if let Some(found) = find(&current) {
            return Some(found);
        }
        let uses = namespaces.get(&current).map(|n| n.uses.clone()).unwrap_or_default();
        uses.iter()
            .map(String::as_str)
            .chain(std::iter::once(CORE_NAMESPACE))
            .find_map(find)
    }

    // ------------------------------------------------------------------------
    // Compilation
    // ------------------------------------------------------------------------

    /// Read and compile every form in `source`, starting in namespace `user`.
    ///
    /// # Errors
    /// Returns [`SimError`] on read errors, malformed special forms, or
    /// unresolvable symbols. Forms before the failing one stay compiled.
    pub fn compile_str(&self, source: &str) -> Result<CompileSummary, SimError> {
        let forms = reader::read_all(source)?;
        let _scope = ContextScope::enter(CompileContext {
            namespace: Some(DEFAULT_NAMESPACE.to_string()),
            ..CompileContext::default()
        });

        let mut summary = CompileSummary::default();
        for form in &forms {
            context(|ctx| ctx.line = form.meta().and_then(|m| m.line));
            let expanded = self.macroexpand(form)?;
            self.evaluate(&expanded, &mut summary)?;
        }
        Ok(summary)
    }

    /// The transform routine: expand `form` fully, reporting entry and exit
    /// of this call and of every nested call to the transform observer.
    ///
    /// # Errors
    /// Returns [`SimError::Syntax`] for malformed macro calls.
    pub fn macroexpand(&self, form: &FormRef) -> Result<FormRef, SimError> {
        let observer = self.observer(InterceptionPoint::Transform);
        let token = observer.as_ref().map(|o| o.transform_enter(form));
        let result = self.expand_inner(form);
        if let (Some(observer), Some(token)) = (&observer, token) {
            // A failed expansion hands the input back, like a routine that threw
            observer.transform_exit(token, result.as_ref().unwrap_or(form));
        }
        result
    }

    fn expand_inner(&self, form: &FormRef) -> Result<FormRef, SimError> {
        match &**form {
            Form::List(seq) => {
                if form.head_name() == Some("quote") {
                    return Ok(Arc::clone(form));
                }
                if let Some(expansion) = expander::expand_once(form)? {
                    return self.macroexpand(&expansion);
                }
                Ok(match self.expand_children(&seq.items)? {
                    Some(items) => Arc::new(Form::List(Seq { items, meta: seq.meta.clone() })),
                    None => Arc::clone(form),
                })
            }
            Form::Vector(seq) => Ok(match self.expand_children(&seq.items)? {
                Some(items) => Arc::new(Form::Vector(Seq { items, meta: seq.meta.clone() })),
                None => Arc::clone(form),
            }),
            _ => Ok(Arc::clone(form)),
        }
    }

    /// Expanded children, or `None` when every child came back unchanged.
    fn expand_children(&self, items: &[FormRef]) -> Result<Option<Vec<FormRef>>, SimError> {
        let mut changed = false;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let expanded = match &**item {
                Form::List(_) => self.macroexpand(item)?,
                Form::Vector(_) => self.expand_inner(item)?,
                _ => Arc::clone(item),
            };
            changed |= !Arc::ptr_eq(&expanded, item);
            out.push(expanded);
        }
        Ok(changed.then_some(out))
    }

    fn evaluate(&self, form: &FormRef, summary: &mut CompileSummary) -> Result<(), SimError> {
        match form.head_name() {
            Some("ns") => self.enter_namespace(form),
            Some("def") => self.define(form, summary),
            Some("do") => {
                for child in form.children().into_iter().skip(1) {
                    self.evaluate(child, summary)?;
                }
                Ok(())
            }
            _ => self.analyze(form, &BTreeSet::new(), &mut Vec::new()),
        }
    }

    /// `(ns name (:use other ...) (:require other ...))`
    fn enter_namespace(&self, form: &Form) -> Result<(), SimError> {
        let Some(name) = form.nth(1).and_then(|n| n.as_symbol()) else {
            return Err(SimError::Syntax("ns requires a name".to_string()));
        };
        let mut uses = Vec::new();
        for clause in form.children().into_iter().skip(2) {
            let Some(seq) = clause.as_list() else {
                continue;
            };
            if matches!(seq.items.first().map(Arc::as_ref), Some(Form::Keyword(k)) if k == "use") {
                uses.extend(seq.items[1..].iter().filter_map(|i| i.as_symbol()).map(ToString::to_string));
            }
        }

        let ns = name.to_string();
        lock(&self.namespaces).entry(ns.clone()).or_default().uses.extend(uses);
        context(|ctx| ctx.namespace = Some(ns));
        Ok(())
    }

    fn define(&self, form: &Form, summary: &mut CompileSummary) -> Result<(), SimError> {
        let Some(name) = form.nth(1).and_then(|n| n.as_symbol()) else {
            return Err(SimError::Syntax(format!("def requires a symbol name: {form}")));
        };
        let namespace =
            context(|ctx| ctx.namespace.clone()).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let init = form.nth(2);
        let arity = init.filter(|i| i.head_name() == Some("fn")).map(|f| fn_arity(f));
        let info = VarInfo { constant: name.meta.has_flag("const"), function: arity.is_some() };

        // Interned before its body is analyzed, so recursion resolves
        self.intern(&namespace, &name.name, info);
        let qualified = QualifiedName::new(namespace, name.name.clone());

        let mut refs = Vec::new();
        {
            let _enclosing = EnclosingScope::enter(qualified.clone());
            if let Some(init) = init {
                self.analyze(init, &BTreeSet::new(), &mut refs)?;
            }
        }

        if let Some(arity) = arity {
            let line = name.meta.line.or_else(|| form.meta().and_then(|m| m.line));
            let (internal, bytes) = emit_function(&qualified, arity, &refs, line);
            self.define_unit(&internal, bytes);
            summary.units.push(normalize_unit_name(&internal));
        }
        debug!("Defined {qualified} ({} references)", refs.len());
        summary.definitions.push(qualified);
        Ok(())
    }

    /// The unit definition routine. Returns the bytes actually defined.
    pub fn define_unit(&self, internal_name: &str, bytes: Vec<u8>) -> Vec<u8> {
        match self.observer(InterceptionPoint::UnitDefinition) {
            Some(observer) => observer.unit_defined(internal_name, &bytes).unwrap_or(bytes),
            None => bytes,
        }
    }

    fn analyze(
        &self,
        form: &FormRef,
        locals: &BTreeSet<String>,
        refs: &mut Vec<ResolvedRef>,
    ) -> Result<(), SimError> {
        match &**form {
            Form::Symbol(symbol) => self.analyze_symbol(symbol, locals, refs),
            Form::List(seq) => match form.head_name() {
                Some("quote") => Ok(()),
                Some("fn") => self.analyze_fn(seq, locals, refs),
                Some("let") => self.analyze_let(seq, locals, refs),
                Some("def") => Err(SimError::Syntax("def is only supported at top level".to_string())),
                Some("if" | "do") => self.analyze_all(&seq.items[1..], locals, refs),
                _ => self.analyze_all(&seq.items, locals, refs),
            },
            Form::Vector(seq) => self.analyze_all(&seq.items, locals, refs),
            Form::Set(items) => self.analyze_all(items, locals, refs),
            Form::Map(entries) => {
                for (k, v) in entries {
                    self.analyze(k, locals, refs)?;
                    self.analyze(v, locals, refs)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn analyze_all(
        &self,
        items: &[FormRef],
        locals: &BTreeSet<String>,
        refs: &mut Vec<ResolvedRef>,
    ) -> Result<(), SimError> {
        items.iter().try_for_each(|item| self.analyze(item, locals, refs))
    }

    /// `(fn name? [params] body*)`
    fn analyze_fn(
        &self,
        seq: &Seq,
        locals: &BTreeSet<String>,
        refs: &mut Vec<ResolvedRef>,
    ) -> Result<(), SimError> {
        let mut scope = locals.clone();
        let mut idx = 1;
        if let Some(name) = seq.items.get(1).and_then(|n| n.as_symbol()) {
            scope.insert(name.name.clone());
            idx = 2;
        }
        let Some(Form::Vector(params)) = seq.items.get(idx).map(Arc::as_ref) else {
            return Err(SimError::Syntax("fn requires a parameter vector".to_string()));
        };
        scope.extend(params.items.iter().filter_map(|p| p.as_symbol()).map(|s| s.name.clone()));
        self.analyze_all(&seq.items[idx + 1..], &scope, refs)
    }

    /// `(let [name value ...] body*)`
    fn analyze_let(
        &self,
        seq: &Seq,
        locals: &BTreeSet<String>,
        refs: &mut Vec<ResolvedRef>,
    ) -> Result<(), SimError> {
        let Some(Form::Vector(bindings)) = seq.items.get(1).map(Arc::as_ref) else {
            return Err(SimError::Syntax("let requires a binding vector".to_string()));
        };
        if bindings.items.len() % 2 != 0 {
            return Err(SimError::Syntax("let requires an even number of binding forms".to_string()));
        }
        let mut scope = locals.clone();
        for pair in bindings.items.chunks(2) {
            self.analyze(&pair[1], &scope, refs)?;
            if let Some(name) = pair[0].as_symbol() {
                scope.insert(name.name.clone());
            }
        }
        self.analyze_all(&seq.items[2..], &scope, refs)
    }

    fn analyze_symbol(
        &self,
        symbol: &Symbol,
        locals: &BTreeSet<String>,
        refs: &mut Vec<ResolvedRef>,
    ) -> Result<(), SimError> {
        if !symbol.is_qualified()
            && (locals.contains(&symbol.name) || SPECIAL_FORMS.contains(&symbol.name.as_str()))
        {
            return Ok(());
        }

        if let Some(observer) = self.observer(InterceptionPoint::ConstantResolution) {
            observer.symbol_analyzed(symbol);
        }

        let Some((name, info)) = self.lookup(symbol) else {
            return Err(HostError::Unresolved(symbol.to_string()).into());
        };

        // Constants are inlined: no reference is ever constructed for them
        if !info.constant {
            if let Some(observer) = self.observer(InterceptionPoint::ReferenceConstruction) {
                observer.reference_constructed(&VarRef::new(name.clone()));
            }
        }
        refs.push(ResolvedRef { name, constant: info.constant, function: info.function });
        Ok(())
    }
}

fn fn_arity(form: &Form) -> usize {
    let params = match (form.nth(1).map(Arc::as_ref), form.nth(2).map(Arc::as_ref)) {
        (Some(Form::Vector(params)), _) | (Some(Form::Symbol(_)), Some(Form::Vector(params))) => params,
        _ => return 0,
    };
    params
        .items
        .iter()
        .take_while(|p| p.as_symbol().map_or(true, |s| s.name != "&"))
        .count()
}

impl Host for SimHost {
    fn attach(
        &self,
        point: InterceptionPoint,
        observer: Arc<dyn CompilerObserver>,
    ) -> Result<(), HostError> {
        if lock(&self.refused).contains(&point) {
            return Err(HostError::AttachRefused {
                point: point.to_string(),
                reason: "routine signature not recognized".to_string(),
            });
        }
        lock(&self.observers).insert(point, observer);
        Ok(())
    }

    fn probe(&self, capability: Capability) -> Result<(), HostError> {
        self.check(capability)
    }

    fn current_namespace(&self) -> Result<String, HostError> {
        self.check(Capability::CurrentNamespace)?;
        Ok(context(|ctx| ctx.namespace.clone()).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()))
    }

    fn compiler_line(&self) -> Result<Option<u32>, HostError> {
        self.check(Capability::CompilerLine)?;
        Ok(context(|ctx| ctx.line))
    }

    fn enclosing_definition(&self) -> Result<Option<QualifiedName>, HostError> {
        self.check(Capability::EnclosingDefinition)?;
        Ok(context(|ctx| ctx.enclosing.clone()))
    }

    fn resolve(&self, symbol: &Symbol) -> Result<Option<VarRef>, HostError> {
        self.check(Capability::SymbolResolution)?;
        self.check(Capability::ConstantMarker)?;
        Ok(self
            .lookup(symbol)
            .map(|(name, info)| VarRef { name, constant: info.constant }))
    }

    fn defined_symbols(&self, namespace: &str) -> Result<Vec<QualifiedName>, HostError> {
        self.check(Capability::NamespaceName)?;
        let namespaces = lock(&self.namespaces);
        let ns = namespaces
            .get(namespace)
            .ok_or_else(|| HostError::NamespaceNotFound(namespace.to_string()))?;
        Ok(ns.vars.keys().map(|name| QualifiedName::new(namespace, name.clone())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_defines_and_emits() {
        let host = SimHost::new();
        let summary = host
            .compile_str("(ns app.core)\n(def ^:const limit 3)\n(defn f [x] (+ x limit))")
            .unwrap();
        assert_eq!(
            summary.definitions,
            vec![QualifiedName::new("app.core", "limit"), QualifiedName::new("app.core", "f")]
        );
        assert_eq!(summary.units, vec!["app.core$f".to_string()]);
    }

    #[test]
    fn test_unresolved_symbol() {
        let host = SimHost::new();
        let err = host.compile_str("(defn f [] (missing 1))").unwrap_err();
        assert!(matches!(err, SimError::Host(HostError::Unresolved(ref s)) if s == "missing"));
    }

    #[test]
    fn test_use_clause_resolution() {
        let host = SimHost::new();
        host.compile_str("(ns lib.core)\n(defn helper [x] x)").unwrap();
        host.compile_str("(ns app.core (:use lib.core))\n(defn b [] (helper 1))").unwrap();
        let defined = host.defined_symbols("app.core").unwrap();
        assert_eq!(defined, vec![QualifiedName::new("app.core", "b")]);
    }

    #[test]
    fn test_context_restored_after_compile() {
        let host = SimHost::new();
        host.compile_str("(ns app.core)").unwrap();
        assert_eq!(host.current_namespace().unwrap(), DEFAULT_NAMESPACE);
        assert_eq!(host.enclosing_definition().unwrap(), None);
    }

    #[test]
    fn test_macroexpand_preserves_identity_when_unchanged() {
        let host = SimHost::new();
        let form = reader::read_one("(def x (+ 1 2))").unwrap();
        let expanded = host.macroexpand(&form).unwrap();
        assert!(Arc::ptr_eq(&form, &expanded));

        let defn = reader::read_one("(defn f [] (when true 1))").unwrap();
        let expanded = host.macroexpand(&defn).unwrap();
        assert_eq!(expanded.to_string(), "(def f (fn f [] (if true (do 1) nil)))");
    }

    #[test]
    fn test_fn_arity() {
        let form = reader::read_one("(fn f [a b & more] a)").unwrap();
        assert_eq!(fn_arity(&form), 2);
    }

    #[test]
    fn test_broken_capability_fails_host_call() {
        let host = SimHost::new();
        host.break_capability(Capability::CurrentNamespace);
        assert!(matches!(
            host.current_namespace(),
            Err(HostError::BindingUnavailable { .. })
        ));
    }
}

//! The observer attached at every interception point.
//!
//! ## Transform (RAW / EXPANDED reconciliation)
//!
//! ```text
//! enter(list form)      depth 0 → 1, definition?  ──▶ capture RAW, token = Capturing
//!   enter(nested list)  depth 1 → 2               ──▶ token = Nested
//!   exit(nested)        depth 2 → 1
//! exit(result)          depth 1 → 0, result is not input ──▶ capture EXPANDED
//! ```
//!
//! Depth bookkeeping happens outside the error guard so a failing capture
//! can never leave the counter unbalanced.
//!
//! ## References
//!
//! Reference construction records `callee <- enclosing definition`. Inlined
//! constants never reach reference construction, so symbol analysis records
//! an edge for every symbol that resolves to a constant.

use std::sync::{Arc, Weak};

use formscope_common::{
    definition_name, DefKind, Form, FormEvent, FormRef, Phase, Symbol, DEFAULT_NAMESPACE,
};

use crate::bridge::Session;
use crate::domain::{CaptureError, HostError};
use crate::host::{CompilerObserver, Host, InterceptionPoint, VarRef};
use crate::instrumentation::depth;
use crate::instrumentation::guard::run_guarded;

/// Opaque value carried from `transform_enter` to the matching `transform_exit`.
///
/// A token dropped without reaching `transform_exit` (the host unwound out
/// of the transform routine) still restores the depth it took.
#[must_use = "the token must be handed back to transform_exit"]
#[derive(Debug)]
pub struct EnterToken(TokenState);

#[derive(Debug)]
enum TokenState {
    /// Not a list form; depth untouched
    Untracked,
    /// Depth incremented, nothing captured
    Nested,
    /// Depth incremented, RAW captured, EXPANDED pending
    Capturing(Box<PendingCapture>),
}

#[derive(Debug)]
struct PendingCapture {
    input: FormRef,
    kind: DefKind,
    namespace: String,
    symbol_name: String,
    line: Option<u32>,
    end_line: Option<u32>,
}

impl EnterToken {
    /// Token for a routine entry the observer did not see; exit is a no-op.
    pub fn untracked() -> Self {
        EnterToken(TokenState::Untracked)
    }

    /// Take the state out, leaving a token whose drop does nothing.
    fn take(&mut self) -> TokenState {
        std::mem::replace(&mut self.0, TokenState::Untracked)
    }
}

impl Drop for EnterToken {
    fn drop(&mut self) {
        if !matches!(self.0, TokenState::Untracked) {
            depth::exit();
        }
    }
}

/// Compiler observer writing into a [`Session`].
///
/// Holds the host weakly: the host owns the observer once attached.
pub struct Instrumentation {
    session: Arc<Session>,
    host: Weak<dyn Host>,
    debug: bool,
}

impl Instrumentation {
    pub fn new(session: Arc<Session>, host: Weak<dyn Host>, debug: bool) -> Self {
        Self { session, host, debug }
    }

    fn host(&self) -> Result<Arc<dyn Host>, CaptureError> {
        self.host
            .upgrade()
            .ok_or_else(|| HostError::Other("host released".to_string()).into())
    }

    /// Namespace bound on the compiling thread, `user` when the binding
    /// fails or panics.
    fn current_namespace(&self, host: &dyn Host) -> String {
        run_guarded(InterceptionPoint::Transform, self.debug, || Ok(host.current_namespace()?))
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    /// Compiler line on the compiling thread, `None` when the binding fails
    /// or panics.
    fn compiler_line(&self, host: &dyn Host) -> Option<u32> {
        run_guarded(InterceptionPoint::Transform, self.debug, || Ok(host.compiler_line()?)).flatten()
    }

    /// Enclosing definition as `ns/name`, `None` at top level or when unknown.
    fn enclosing_caller(&self, host: &dyn Host, site: InterceptionPoint) -> Option<String> {
        run_guarded(site, self.debug, || Ok(host.enclosing_definition()?))
            .flatten()
            .map(|q| q.to_string())
    }

    fn begin_capture(&self, form: &FormRef) -> Result<Option<PendingCapture>, CaptureError> {
        let Some(kind) = DefKind::of_form(form) else {
            return Ok(None);
        };
        let Some(symbol_name) = definition_name(form) else {
            return Ok(None);
        };

        let host = self.host()?;
        let namespace = self.current_namespace(host.as_ref());
        let compiler_line = self.compiler_line(host.as_ref());
        let (line, end_line) = form_position(form, compiler_line);

        self.session.capture_form_event(FormEvent {
            phase: Phase::Raw,
            kind,
            namespace: namespace.clone(),
            symbol_name: symbol_name.clone(),
            line,
            end_line,
            payload: Arc::clone(form),
        });

        Ok(Some(PendingCapture {
            input: Arc::clone(form),
            kind,
            namespace,
            symbol_name,
            line,
            end_line,
        }))
    }

    fn capture_expanded(&self, pending: PendingCapture, result: &FormRef) {
        let (line, end_line) = form_position(result, pending.line);
        self.session.capture_form_event(FormEvent {
            phase: Phase::Expanded,
            kind: pending.kind,
            namespace: pending.namespace,
            symbol_name: pending.symbol_name,
            line,
            end_line: end_line.or(pending.end_line),
            payload: Arc::clone(result),
        });
    }
}

/// Start and end line of a definition form: the form's own metadata, then
/// its name symbol's metadata, then `fallback_line` for the start.
fn form_position(form: &Form, fallback_line: Option<u32>) -> (Option<u32>, Option<u32>) {
    let form_meta = form.meta();
    let name_meta = form.nth(1).and_then(|name| name.meta());

    let line = form_meta
        .and_then(|m| m.line)
        .or_else(|| name_meta.and_then(|m| m.line))
        .or(fallback_line);
    let end_line = form_meta
        .and_then(|m| m.end_line)
        .or_else(|| name_meta.and_then(|m| m.end_line));
    (line, end_line)
}

impl CompilerObserver for Instrumentation {
    fn transform_enter(&self, form: &FormRef) -> EnterToken {
        if !form.is_list() {
            return EnterToken::untracked();
        }
        let previous = depth::enter();
        if previous > 0 || !self.session.forms().is_enabled() {
            return EnterToken(TokenState::Nested);
        }

        match run_guarded(InterceptionPoint::Transform, self.debug, || self.begin_capture(form)) {
            Some(Some(pending)) => EnterToken(TokenState::Capturing(Box::new(pending))),
            Some(None) | None => EnterToken(TokenState::Nested),
        }
    }

    fn transform_exit(&self, mut token: EnterToken, result: &FormRef) {
        let pending = match token.take() {
            TokenState::Untracked => return,
            TokenState::Nested => {
                depth::exit();
                return;
            }
            TokenState::Capturing(pending) => {
                depth::exit();
                pending
            }
        };

        if Arc::ptr_eq(&pending.input, result) {
            return;
        }
        run_guarded(InterceptionPoint::Transform, self.debug, || {
            self.capture_expanded(*pending, result);
            Ok(())
        });
    }

    fn reference_constructed(&self, var: &VarRef) {
        if !self.session.references().is_enabled() {
            return;
        }
        run_guarded(InterceptionPoint::ReferenceConstruction, self.debug, || {
            let host = self.host()?;
            let caller =
                self.enclosing_caller(host.as_ref(), InterceptionPoint::ReferenceConstruction);
            self.session.capture_reference_edge(&var.name.to_string(), caller.as_deref());
            Ok(())
        });
    }

    fn symbol_analyzed(&self, symbol: &Symbol) {
        if !self.session.references().is_enabled() {
            return;
        }
        run_guarded(InterceptionPoint::ConstantResolution, self.debug, || {
            let host = self.host()?;
            let var = match host.resolve(symbol) {
                Ok(Some(var)) if var.constant => var,
                Ok(_) | Err(HostError::Unresolved(_)) => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            let caller = self.enclosing_caller(host.as_ref(), InterceptionPoint::ConstantResolution);
            self.session.capture_reference_edge(&var.name.to_string(), caller.as_deref());
            Ok(())
        });
    }

    fn unit_defined(&self, internal_name: &str, bytes: &[u8]) -> Option<Vec<u8>> {
        if self.session.units().is_enabled() {
            run_guarded(InterceptionPoint::UnitDefinition, self.debug, || {
                self.session.capture_loaded_unit(internal_name, bytes);
                Ok(())
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formscope_common::Meta;

    #[test]
    fn test_dropped_token_restores_depth() {
        let observer = Instrumentation::new(
            Arc::new(Session::new()),
            Weak::<crate::sim::SimHost>::new(),
            false,
        );
        let form = Form::list(vec![Form::symbol("println"), Form::int(1)]);

        let token = observer.transform_enter(&form);
        assert_eq!(depth::current(), 1);
        drop(token);
        assert_eq!(depth::current(), 0);

        let token = observer.transform_enter(&form);
        observer.transform_exit(token, &form);
        assert_eq!(depth::current(), 0);
    }

    #[test]
    fn test_untracked_token_leaves_depth_alone() {
        drop(EnterToken::untracked());
        assert_eq!(depth::current(), 0);
    }

    #[test]
    fn test_position_prefers_form_meta() {
        let form = Form::list_with_meta(
            vec![Form::symbol("def"), Form::symbol("x")],
            Meta { line: Some(4), end_line: Some(6), flags: vec![] },
        );
        assert_eq!(form_position(&form, Some(1)), (Some(4), Some(6)));
    }

    #[test]
    fn test_position_falls_back_to_name_then_compiler() {
        let named = Form::list(vec![
            Form::symbol("def"),
            Arc::new(Form::Symbol(Symbol::new("x").with_meta(Meta::at_line(9)))),
        ]);
        assert_eq!(form_position(&named, Some(1)), (Some(9), None));

        let bare = Form::list(vec![Form::symbol("def"), Form::symbol("x")]);
        assert_eq!(form_position(&bare, Some(1)), (Some(1), None));
        assert_eq!(form_position(&bare, None), (None, None));
    }
}

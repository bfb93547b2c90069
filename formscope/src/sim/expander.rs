//! Built-in macros of the reference host.
//!
//! [`expand_once`] rewrites a single list form whose head names a built-in
//! macro. Re-expansion of the result and of child forms is driven by the
//! compiler, so every nested expansion passes through the transform hook.

use std::sync::Arc;

use formscope_common::{Form, FormRef, Seq, Symbol};

use crate::domain::SimError;

/// Expand `form` one step. `Ok(None)` when its head is not a built-in macro.
///
/// # Errors
/// Returns [`SimError::Syntax`] when a macro call is malformed.
pub fn expand_once(form: &Form) -> Result<Option<FormRef>, SimError> {
    let Some(seq) = form.as_list() else {
        return Ok(None);
    };
    let Some(head) = form.head_name() else {
        return Ok(None);
    };
    let args = &seq.items[1..];

    let expanded = match head {
        "defn" => expand_defn(args, None)?,
        "defn-" => expand_defn(args, Some("private"))?,
        "defmacro" => expand_defn(args, Some("macro"))?,
        "when" => expand_when(args, false)?,
        "when-not" => expand_when(args, true)?,
        "->" => expand_thread_first(args)?,
        "cond" => expand_cond(args)?,
        _ => return Ok(None),
    };
    Ok(Some(expanded))
}

fn syntax(message: impl Into<String>) -> SimError {
    SimError::Syntax(message.into())
}

/// `(defn name doc? [params] body*)` → `(def name (fn name [params] body*))`
fn expand_defn(args: &[FormRef], flag: Option<&str>) -> Result<FormRef, SimError> {
    let Some((name_form, rest)) = args.split_first() else {
        return Err(syntax("defn requires a name"));
    };
    let Some(name) = name_form.as_symbol() else {
        return Err(syntax(format!("defn name must be a symbol, got {name_form}")));
    };
    let rest = match rest.first().map(Arc::as_ref) {
        Some(Form::Str(_)) => &rest[1..],
        _ => rest,
    };
    if !matches!(rest.first().map(Arc::as_ref), Some(Form::Vector(_))) {
        return Err(syntax(format!("{name}: parameter vector expected")));
    }

    let mut def_name = name.clone();
    if let Some(flag) = flag {
        def_name.meta.flags.push(flag.to_string());
    }

    let mut fn_items = vec![Form::symbol("fn"), Arc::new(Form::Symbol(Symbol::new(&name.name)))];
    fn_items.extend(rest.iter().cloned());

    // The expansion keeps the name symbol's position but not the call's span
    Ok(Form::list(vec![
        Form::symbol("def"),
        Arc::new(Form::Symbol(def_name)),
        Form::list(fn_items),
    ]))
}

/// `(when test body*)` → `(if test (do body*) nil)`
fn expand_when(args: &[FormRef], negate: bool) -> Result<FormRef, SimError> {
    let Some((test, body)) = args.split_first() else {
        return Err(syntax("when requires a test"));
    };
    let mut do_items = vec![Form::symbol("do")];
    do_items.extend(body.iter().cloned());
    let body = Form::list(do_items);
    let nil = Arc::new(Form::Nil);

    let (then, otherwise) = if negate { (nil, body) } else { (body, nil) };
    Ok(Form::list(vec![Form::symbol("if"), Arc::clone(test), then, otherwise]))
}

/// `(-> x (f a) g)` → `(g (f x a))`
fn expand_thread_first(args: &[FormRef]) -> Result<FormRef, SimError> {
    let Some((first, steps)) = args.split_first() else {
        return Err(syntax("-> requires an initial form"));
    };
    let mut acc = Arc::clone(first);
    for step in steps {
        acc = match step.as_list() {
            Some(Seq { items, .. }) if !items.is_empty() => {
                let mut threaded = vec![Arc::clone(&items[0]), acc];
                threaded.extend(items[1..].iter().cloned());
                Form::list(threaded)
            }
            _ => Form::list(vec![Arc::clone(step), acc]),
        };
    }
    Ok(acc)
}

/// `(cond t1 e1 t2 e2)` → `(if t1 e1 (cond t2 e2))`
fn expand_cond(args: &[FormRef]) -> Result<FormRef, SimError> {
    match args {
        [] => Ok(Arc::new(Form::Nil)),
        [_] => Err(syntax("cond requires an even number of forms")),
        [test, then, rest @ ..] => {
            let mut tail = vec![Form::symbol("cond")];
            tail.extend(rest.iter().cloned());
            let otherwise = if rest.is_empty() { Arc::new(Form::Nil) } else { Form::list(tail) };
            Ok(Form::list(vec![Form::symbol("if"), Arc::clone(test), Arc::clone(then), otherwise]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::reader::read_one;

    fn expand(source: &str) -> String {
        let form = read_one(source).unwrap();
        expand_once(&form).unwrap().unwrap().to_string()
    }

    #[test]
    fn test_defn() {
        assert_eq!(expand("(defn f \"doc\" [x] (g x))"), "(def f (fn f [x] (g x)))");
    }

    #[test]
    fn test_defn_private_flags_name() {
        let form = read_one("(defn- f [] 1)").unwrap();
        let expanded = expand_once(&form).unwrap().unwrap();
        let name = expanded.nth(1).unwrap().as_symbol().unwrap();
        assert!(name.meta.has_flag("private"));
        assert_eq!(name.meta.line, Some(1));
    }

    #[test]
    fn test_when_and_threading() {
        assert_eq!(expand("(when a b c)"), "(if a (do b c) nil)");
        assert_eq!(expand("(when-not a b)"), "(if a nil (do b))");
        assert_eq!(expand("(-> x (f 1) g)"), "(g (f x 1))");
        assert_eq!(expand("(cond a 1 b 2)"), "(if a 1 (cond b 2))");
    }

    #[test]
    fn test_non_macro() {
        let form = read_one("(def x 1)").unwrap();
        assert!(expand_once(&form).unwrap().is_none());
    }

    #[test]
    fn test_malformed_defn() {
        let form = read_one("(defn f x)").unwrap();
        assert!(matches!(expand_once(&form), Err(SimError::Syntax(_))));
    }
}

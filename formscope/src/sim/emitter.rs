//! Unit emission for function definitions.
//!
//! Each `(def name (fn ...))` becomes one unit `ns$name` extending
//! `clojure/lang/AFunction`. Non-constant references become static `Var`
//! fields initialized in `<clinit>`; references to other functions are
//! direct-linked with `invokestatic`; constants are inlined and leave no
//! trace in the unit.

use crate::bytecode::opcodes::{ACONST_NULL, ARETURN, IRETURN, POP, RETURN};
use crate::domain::QualifiedName;
use crate::sim::class_builder::{ClassBuilder, ACC_FINAL, ACC_PUBLIC, ACC_STATIC};

const AFUNCTION: &str = "clojure/lang/AFunction";
const VAR: &str = "clojure/lang/Var";
const VAR_DESC: &str = "Lclojure/lang/Var;";
const RT: &str = "clojure/lang/RT";

/// A definition referenced from a function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub name: QualifiedName,
    pub constant: bool,
    pub function: bool,
}

/// Munge a symbol name into a unit-name segment.
#[must_use]
pub fn munge(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '-' => out.push('_'),
            '?' => out.push_str("_QMARK_"),
            '!' => out.push_str("_BANG_"),
            '*' => out.push_str("_STAR_"),
            '+' => out.push_str("_PLUS_"),
            '>' => out.push_str("_GT_"),
            '<' => out.push_str("_LT_"),
            '=' => out.push_str("_EQ_"),
            '/' => out.push_str("_SLASH_"),
            '.' => out.push_str("_DOT_"),
            c => out.push(c),
        }
    }
    out
}

/// Internal unit name of the function bound to `name`: `app/core$handler`.
#[must_use]
pub fn unit_name(name: &QualifiedName) -> String {
    let ns = name.namespace().replace('-', "_").replace('.', "/");
    format!("{ns}${}", munge(name.name()))
}

fn invoke_descriptor(arity: usize) -> String {
    format!("({})Ljava/lang/Object;", "Ljava/lang/Object;".repeat(arity))
}

/// Emit the unit for function `name`. Returns its internal name and bytes.
#[must_use]
pub fn emit_function(
    name: &QualifiedName,
    arity: usize,
    refs: &[ResolvedRef],
    line: Option<u32>,
) -> (String, Vec<u8>) {
    let this = unit_name(name);

    let mut vars: Vec<&QualifiedName> = Vec::new();
    for r in refs.iter().filter(|r| !r.constant) {
        if !vars.contains(&&r.name) {
            vars.push(&r.name);
        }
    }

    let mut class = ClassBuilder::new(&this, AFUNCTION);
    for idx in 0..vars.len() {
        class.field(ACC_PUBLIC | ACC_STATIC | ACC_FINAL, &format!("const__{idx}"), VAR_DESC);
    }

    class.method(ACC_STATIC, "<clinit>", "()V", |code| {
        for (idx, var) in vars.iter().enumerate() {
            code.ldc_string(var.namespace())
                .ldc_string(var.name())
                .invokestatic(RT, "var", "(Ljava/lang/String;Ljava/lang/String;)Lclojure/lang/Var;")
                .checkcast(VAR)
                .putstatic(&this, &format!("const__{idx}"), VAR_DESC);
        }
        code.op(RETURN, &[]);
    });

    let descriptor = invoke_descriptor(arity);
    class.method(ACC_PUBLIC | ACC_STATIC, "invokeStatic", &descriptor, |code| {
        if let Some(line) = line {
            code.line(line);
        }
        for r in refs {
            if r.constant {
                code.op(ACONST_NULL, &[]).op(POP, &[]);
            } else if r.function {
                code.invokestatic(&unit_name(&r.name), "invokeStatic", &invoke_descriptor(0))
                    .op(POP, &[]);
            } else {
                let idx = vars.iter().position(|v| **v == r.name).unwrap_or_default();
                code.getstatic(&this, &format!("const__{idx}"), VAR_DESC)
                    .invokevirtual(VAR, "getRawRoot", "()Ljava/lang/Object;")
                    .op(POP, &[]);
            }
        }
        code.op(ACONST_NULL, &[]).op(ARETURN, &[]);
    });

    class.method(ACC_PUBLIC, "invoke", &descriptor, |code| {
        for slot in 1..=arity {
            code.aload(u8::try_from(slot).unwrap_or(u8::MAX));
        }
        code.invokestatic(&this, "invokeStatic", &descriptor).op(ARETURN, &[]);
    });

    class.method(ACC_PUBLIC, "getRequiredArity", "()I", |code| {
        code.ldc_int(i32::try_from(arity).unwrap_or(i32::MAX)).op(IRETURN, &[]);
    });

    let bytes = class.source_file(&format!("{}.clj", name.namespace().replace('.', "/"))).build();
    (this, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::analyze_unit;

    #[test]
    fn test_unit_name() {
        assert_eq!(unit_name(&QualifiedName::new("app.core", "valid?")), "app/core$valid_QMARK_");
        assert_eq!(unit_name(&QualifiedName::new("my-app.core", "do-it!")), "my_app/core$do_it_BANG_");
    }

    #[test]
    fn test_direct_link_reference() {
        let refs = [
            ResolvedRef { name: QualifiedName::new("lib.core", "helper"), constant: false, function: true },
            ResolvedRef { name: QualifiedName::new("app.core", "limit"), constant: true, function: false },
            ResolvedRef { name: QualifiedName::new("app.core", "b"), constant: false, function: true },
        ];
        let (internal, bytes) = emit_function(&QualifiedName::new("app.core", "b"), 1, &refs, Some(3));
        assert_eq!(internal, "app/core$b");

        let metrics = analyze_unit(&bytes);
        assert!(metrics.is_known());
        assert_eq!(metrics.field_count, 2);
        assert!(metrics.references.contains("lib.core$helper"));
        assert!(metrics.references.contains("clojure.lang.RT"));
        assert!(!metrics.references.contains("app.core$b"));
    }
}

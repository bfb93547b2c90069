//! Writer for compiled-unit bytes.
//!
//! Produces well-formed units with an interning constant pool, fields, and
//! methods with `Code` and `LineNumberTable` attributes. Used by the
//! reference host's emitter and by tests that need precise unit layouts.

use std::collections::HashMap;

use crate::bytecode::opcodes::{
    ALOAD, ANEWARRAY, CHECKCAST, GETFIELD, GETSTATIC, IINC, INSTANCEOF, INVOKEINTERFACE,
    INVOKESPECIAL, INVOKESTATIC, INVOKEVIRTUAL, LDC, LDC2_W, LDC_W, LOOKUPSWITCH, MULTIANEWARRAY,
    NEW, PUTFIELD, PUTSTATIC, TABLESWITCH, WIDE,
};
use crate::bytecode::reader::CLASS_MAGIC;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;

/// Sizes beyond the format's 16-bit limits saturate; the emitter stays far below them.
fn to_u16(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Class(String),
    Str(String),
    Integer(i32),
    Long(i64),
    NameAndType(String, String),
    Field(String, String, String),
    Method(String, String, String),
    InterfaceMethod(String, String, String),
}

/// Constant pool under construction. Equal entries share one index.
#[derive(Debug)]
pub struct PoolBuilder {
    bytes: Vec<u8>,
    next_index: u16,
    interned: HashMap<PoolKey, u16>,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self { bytes: Vec::new(), next_index: 1, interned: HashMap::new() }
    }
}

impl PoolBuilder {
    fn intern(&mut self, key: PoolKey, slots: u16, encode: impl FnOnce(&mut Self) -> Vec<u8>) -> u16 {
        if let Some(&index) = self.interned.get(&key) {
            return index;
        }
        let encoded = encode(self);
        let index = self.next_index;
        self.bytes.extend_from_slice(&encoded);
        self.next_index = self.next_index.saturating_add(slots);
        self.interned.insert(key, index);
        index
    }

    pub fn utf8(&mut self, text: &str) -> u16 {
        self.intern(PoolKey::Utf8(text.to_string()), 1, |_| {
            let mut out = vec![1];
            out.extend_from_slice(&to_u16(text.len()).to_be_bytes());
            out.extend_from_slice(text.as_bytes());
            out
        })
    }

    pub fn class(&mut self, internal_name: &str) -> u16 {
        self.intern(PoolKey::Class(internal_name.to_string()), 1, |pool| {
            let name = pool.utf8(internal_name);
            let mut out = vec![7];
            out.extend_from_slice(&name.to_be_bytes());
            out
        })
    }

    pub fn string(&mut self, text: &str) -> u16 {
        self.intern(PoolKey::Str(text.to_string()), 1, |pool| {
            let utf8 = pool.utf8(text);
            let mut out = vec![8];
            out.extend_from_slice(&utf8.to_be_bytes());
            out
        })
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        self.intern(PoolKey::Integer(value), 1, |_| {
            let mut out = vec![3];
            out.extend_from_slice(&value.to_be_bytes());
            out
        })
    }

    /// Long constants occupy two pool slots.
    pub fn long(&mut self, value: i64) -> u16 {
        self.intern(PoolKey::Long(value), 2, |_| {
            let mut out = vec![5];
            out.extend_from_slice(&value.to_be_bytes());
            out
        })
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        self.intern(PoolKey::NameAndType(name.to_string(), descriptor.to_string()), 1, |pool| {
            let name = pool.utf8(name);
            let descriptor = pool.utf8(descriptor);
            let mut out = vec![12];
            out.extend_from_slice(&name.to_be_bytes());
            out.extend_from_slice(&descriptor.to_be_bytes());
            out
        })
    }

    fn member(&mut self, tag: u8, key: PoolKey, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.intern(key, 1, |pool| {
            let class = pool.class(owner);
            let nat = pool.name_and_type(name, descriptor);
            let mut out = vec![tag];
            out.extend_from_slice(&class.to_be_bytes());
            out.extend_from_slice(&nat.to_be_bytes());
            out
        })
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let key = PoolKey::Field(owner.to_string(), name.to_string(), descriptor.to_string());
        self.member(9, key, owner, name, descriptor)
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let key = PoolKey::Method(owner.to_string(), name.to_string(), descriptor.to_string());
        self.member(10, key, owner, name, descriptor)
    }

    pub fn interface_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let key =
            PoolKey::InterfaceMethod(owner.to_string(), name.to_string(), descriptor.to_string());
        self.member(11, key, owner, name, descriptor)
    }
}

/// Method body under construction.
pub struct CodeBuilder<'p> {
    pool: &'p mut PoolBuilder,
    code: Vec<u8>,
    max_stack: u16,
    max_locals: u16,
    lines: Vec<(u16, u16)>,
}

impl CodeBuilder<'_> {
    pub fn pool(&mut self) -> &mut PoolBuilder {
        self.pool
    }

    /// Offset the next instruction will be written at.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn max_stack(&mut self, max_stack: u16) -> &mut Self {
        self.max_stack = max_stack;
        self
    }

    pub fn max_locals(&mut self, max_locals: u16) -> &mut Self {
        self.max_locals = max_locals;
        self
    }

    /// Map the next instruction to source `line`.
    pub fn line(&mut self, line: u32) -> &mut Self {
        let line = u16::try_from(line).unwrap_or(u16::MAX);
        self.lines.push((to_u16(self.code.len()), line));
        self
    }

    /// Append an instruction with raw operand bytes.
    pub fn op(&mut self, opcode: u8, operands: &[u8]) -> &mut Self {
        self.code.push(opcode);
        self.code.extend_from_slice(operands);
        self
    }

    fn op_index(&mut self, opcode: u8, index: u16) -> &mut Self {
        self.op(opcode, &index.to_be_bytes())
    }

    pub fn aload(&mut self, local: u8) -> &mut Self {
        self.op(ALOAD, &[local])
    }

    pub fn ldc_int(&mut self, value: i32) -> &mut Self {
        let index = self.pool.integer(value);
        self.ldc(index)
    }

    pub fn ldc_string(&mut self, text: &str) -> &mut Self {
        let index = self.pool.string(text);
        self.ldc(index)
    }

    pub fn ldc_class(&mut self, internal_name: &str) -> &mut Self {
        let index = self.pool.class(internal_name);
        self.ldc(index)
    }

    fn ldc(&mut self, index: u16) -> &mut Self {
        match u8::try_from(index) {
            Ok(short) => self.op(LDC, &[short]),
            Err(_) => self.op_index(LDC_W, index),
        }
    }

    pub fn ldc_long(&mut self, value: i64) -> &mut Self {
        let index = self.pool.long(value);
        self.op_index(LDC2_W, index)
    }

    pub fn getstatic(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.field_ref(owner, name, descriptor);
        self.op_index(GETSTATIC, index)
    }

    pub fn putstatic(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.field_ref(owner, name, descriptor);
        self.op_index(PUTSTATIC, index)
    }

    pub fn getfield(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.field_ref(owner, name, descriptor);
        self.op_index(GETFIELD, index)
    }

    pub fn putfield(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.field_ref(owner, name, descriptor);
        self.op_index(PUTFIELD, index)
    }

    pub fn invokevirtual(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.method_ref(owner, name, descriptor);
        self.op_index(INVOKEVIRTUAL, index)
    }

    pub fn invokespecial(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.method_ref(owner, name, descriptor);
        self.op_index(INVOKESPECIAL, index)
    }

    pub fn invokestatic(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.method_ref(owner, name, descriptor);
        self.op_index(INVOKESTATIC, index)
    }

    pub fn invokeinterface(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        arg_slots: u8,
    ) -> &mut Self {
        let index = self.pool.interface_method_ref(owner, name, descriptor);
        let [hi, lo] = index.to_be_bytes();
        self.op(INVOKEINTERFACE, &[hi, lo, arg_slots, 0])
    }

    pub fn new_object(&mut self, internal_name: &str) -> &mut Self {
        let index = self.pool.class(internal_name);
        self.op_index(NEW, index)
    }

    pub fn anewarray(&mut self, internal_name: &str) -> &mut Self {
        let index = self.pool.class(internal_name);
        self.op_index(ANEWARRAY, index)
    }

    pub fn checkcast(&mut self, internal_name: &str) -> &mut Self {
        let index = self.pool.class(internal_name);
        self.op_index(CHECKCAST, index)
    }

    pub fn instanceof(&mut self, internal_name: &str) -> &mut Self {
        let index = self.pool.class(internal_name);
        self.op_index(INSTANCEOF, index)
    }

    /// `descriptor` is an array descriptor such as `[[Lapp/Foo;`.
    pub fn multianewarray(&mut self, descriptor: &str, dimensions: u8) -> &mut Self {
        let [hi, lo] = self.pool.class(descriptor).to_be_bytes();
        self.op(MULTIANEWARRAY, &[hi, lo, dimensions])
    }

    /// `wide iinc local, delta`
    pub fn wide_iinc(&mut self, local: u16, delta: i16) -> &mut Self {
        let [l_hi, l_lo] = local.to_be_bytes();
        let [d_hi, d_lo] = delta.to_be_bytes();
        self.op(WIDE, &[IINC, l_hi, l_lo, d_hi, d_lo])
    }

    /// `tableswitch` over `low..=high`, every target pointing at the next
    /// instruction.
    pub fn tableswitch(&mut self, low: i32, high: i32) -> &mut Self {
        let start = self.code.len();
        self.code.push(TABLESWITCH);
        self.pad_to_word();
        let targets = usize::try_from(i64::from(high) - i64::from(low) + 1).unwrap_or(0);
        let next = i32::try_from(self.code.len() - start + 12 + targets * 4).unwrap_or(i32::MAX);
        self.code.extend_from_slice(&next.to_be_bytes());
        self.code.extend_from_slice(&low.to_be_bytes());
        self.code.extend_from_slice(&high.to_be_bytes());
        for _ in 0..targets {
            self.code.extend_from_slice(&next.to_be_bytes());
        }
        self
    }

    /// `lookupswitch` over sorted `keys`, every target pointing at the next
    /// instruction.
    pub fn lookupswitch(&mut self, keys: &[i32]) -> &mut Self {
        let start = self.code.len();
        self.code.push(LOOKUPSWITCH);
        self.pad_to_word();
        let next = i32::try_from(self.code.len() - start + 8 + keys.len() * 8).unwrap_or(i32::MAX);
        self.code.extend_from_slice(&next.to_be_bytes());
        self.code.extend_from_slice(&i32::try_from(keys.len()).unwrap_or(i32::MAX).to_be_bytes());
        for key in keys {
            self.code.extend_from_slice(&key.to_be_bytes());
            self.code.extend_from_slice(&next.to_be_bytes());
        }
        self
    }

    fn pad_to_word(&mut self) {
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
    }
}

struct FieldDef {
    access: u16,
    name: u16,
    descriptor: u16,
}

/// A compiled unit under construction.
pub struct ClassBuilder {
    pool: PoolBuilder,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<FieldDef>,
    methods: Vec<Vec<u8>>,
    source_file: Option<u16>,
}

impl ClassBuilder {
    /// Public unit `internal_name` extending `super_class`.
    #[must_use]
    pub fn new(internal_name: &str, super_class: &str) -> Self {
        let mut pool = PoolBuilder::default();
        let this_class = pool.class(internal_name);
        let super_class = pool.class(super_class);
        Self {
            pool,
            access: ACC_PUBLIC | ACC_SUPER | ACC_FINAL,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
        }
    }

    pub fn interface(&mut self, internal_name: &str) -> &mut Self {
        let index = self.pool.class(internal_name);
        self.interfaces.push(index);
        self
    }

    pub fn field(&mut self, access: u16, name: &str, descriptor: &str) -> &mut Self {
        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(descriptor);
        self.fields.push(FieldDef { access, name, descriptor });
        self
    }

    pub fn source_file(&mut self, file: &str) -> &mut Self {
        self.source_file = Some(self.pool.utf8(file));
        self
    }

    /// Add a method whose body is written by `body`.
    pub fn method(
        &mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        body: impl FnOnce(&mut CodeBuilder<'_>),
    ) -> &mut Self {
        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(descriptor);
        let code_attr = self.pool.utf8("Code");

        let mut builder = CodeBuilder {
            pool: &mut self.pool,
            code: Vec::new(),
            max_stack: 8,
            max_locals: 8,
            lines: Vec::new(),
        };
        body(&mut builder);
        let CodeBuilder { code, max_stack, max_locals, lines, .. } = builder;
        let line_attr = (!lines.is_empty()).then(|| self.pool.utf8("LineNumberTable"));

        let mut attr = Vec::new();
        attr.extend_from_slice(&max_stack.to_be_bytes());
        attr.extend_from_slice(&max_locals.to_be_bytes());
        attr.extend_from_slice(&to_u32(code.len()).to_be_bytes());
        attr.extend_from_slice(&code);
        attr.extend_from_slice(&0u16.to_be_bytes()); // exception table
        match line_attr {
            Some(line_attr) => {
                attr.extend_from_slice(&1u16.to_be_bytes());
                attr.extend_from_slice(&line_attr.to_be_bytes());
                attr.extend_from_slice(&to_u32(2 + lines.len() * 4).to_be_bytes());
                attr.extend_from_slice(&to_u16(lines.len()).to_be_bytes());
                for (pc, line) in &lines {
                    attr.extend_from_slice(&pc.to_be_bytes());
                    attr.extend_from_slice(&line.to_be_bytes());
                }
            }
            None => attr.extend_from_slice(&0u16.to_be_bytes()),
        }

        let mut method = Vec::new();
        method.extend_from_slice(&access.to_be_bytes());
        method.extend_from_slice(&name.to_be_bytes());
        method.extend_from_slice(&descriptor.to_be_bytes());
        method.extend_from_slice(&1u16.to_be_bytes());
        method.extend_from_slice(&code_attr.to_be_bytes());
        method.extend_from_slice(&to_u32(attr.len()).to_be_bytes());
        method.extend_from_slice(&attr);
        self.methods.push(method);
        self
    }

    /// Serialize the unit.
    #[must_use]
    pub fn build(&mut self) -> Vec<u8> {
        let source_attr = self.source_file.map(|file| (self.pool.utf8("SourceFile"), file));

        let mut out = Vec::with_capacity(self.pool.bytes.len() + 64);
        out.extend_from_slice(&CLASS_MAGIC.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // minor
        out.extend_from_slice(&52u16.to_be_bytes()); // major
        out.extend_from_slice(&self.pool.next_index.to_be_bytes());
        out.extend_from_slice(&self.pool.bytes);
        out.extend_from_slice(&self.access.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());

        out.extend_from_slice(&to_u16(self.interfaces.len()).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }

        out.extend_from_slice(&to_u16(self.fields.len()).to_be_bytes());
        for field in &self.fields {
            out.extend_from_slice(&field.access.to_be_bytes());
            out.extend_from_slice(&field.name.to_be_bytes());
            out.extend_from_slice(&field.descriptor.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
        }

        out.extend_from_slice(&to_u16(self.methods.len()).to_be_bytes());
        for method in &self.methods {
            out.extend_from_slice(method);
        }

        match source_attr {
            Some((name, file)) => {
                out.extend_from_slice(&1u16.to_be_bytes());
                out.extend_from_slice(&name.to_be_bytes());
                out.extend_from_slice(&2u32.to_be_bytes());
                out.extend_from_slice(&file.to_be_bytes());
            }
            None => out.extend_from_slice(&0u16.to_be_bytes()),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::opcodes::{ARETURN, RETURN};
    use crate::bytecode::{analyze_unit, peek_class_name};

    #[test]
    fn test_pool_interning() {
        let mut pool = PoolBuilder::default();
        let a = pool.class("app/A");
        let b = pool.class("app/A");
        assert_eq!(a, b);
        // utf8 at 1, class at 2, long takes 3 and 4
        assert_eq!(pool.long(7), 3);
        assert_eq!(pool.utf8("x"), 5);
    }

    #[test]
    fn test_built_unit_parses() {
        let bytes = ClassBuilder::new("app/core$f", "clojure/lang/AFunction")
            .field(ACC_PUBLIC | ACC_STATIC | ACC_FINAL, "const__0", "Lclojure/lang/Var;")
            .method(ACC_PUBLIC, "invoke", "()Ljava/lang/Object;", |code| {
                code.line(3)
                    .getstatic("app/core$f", "const__0", "Lclojure/lang/Var;")
                    .invokevirtual("clojure/lang/Var", "getRawRoot", "()Ljava/lang/Object;")
                    .op(ARETURN, &[]);
            })
            .source_file("core.clj")
            .build();

        assert_eq!(peek_class_name(&bytes).unwrap(), "app.core$f");
        let metrics = analyze_unit(&bytes);
        assert_eq!(metrics.field_count, 1);
        assert_eq!(metrics.instruction_count, 3);
        assert_eq!(
            metrics.references.into_iter().collect::<Vec<_>>(),
            vec!["clojure.lang.AFunction".to_string(), "clojure.lang.Var".to_string()]
        );
    }

    #[test]
    fn test_switches_decode() {
        let bytes = ClassBuilder::new("S", "java/lang/Object")
            .method(ACC_PUBLIC | ACC_STATIC, "f", "()V", |code| {
                code.op(crate::bytecode::opcodes::ICONST_0, &[])
                    .tableswitch(1, 3)
                    .op(crate::bytecode::opcodes::ICONST_0, &[])
                    .lookupswitch(&[-1, 10])
                    .wide_iinc(300, -2)
                    .op(RETURN, &[]);
            })
            .build();
        assert_eq!(analyze_unit(&bytes).instruction_count, 6);
    }
}

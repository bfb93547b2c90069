//! Streaming reader for compiled-unit bytes.
//!
//! Walks the class-file layout once, front to back, and reports structure to
//! a [`ClassVisitor`]. Nothing is retained beyond the constant pool; attribute
//! bodies other than method `Code` are skipped by length.
//!
//! ```text
//! magic · version · constant pool · access · this · super · interfaces
//!       · fields[attrs] · methods[attrs ⊃ Code] · attrs
//! ```
//!
//! Bytes after the final attribute table are ignored.

use crate::bytecode::opcodes::{
    fixed_operand_len, is_widenable, ANEWARRAY, CHECKCAST, GETSTATIC, IINC, INSTANCEOF,
    INVOKEDYNAMIC, INVOKEINTERFACE, INVOKESTATIC, INVOKEVIRTUAL, LOOKUPSWITCH, MULTIANEWARRAY,
    NEW, PUTFIELD, TABLESWITCH, WIDE,
};
use crate::domain::ClassFormatError;

pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

type Result<T> = std::result::Result<T, ClassFormatError>;

// ============================================================================
// Byte cursor
// ============================================================================

/// Big-endian cursor over a byte slice with bounds-checked reads.
pub(crate) struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(ClassFormatError::Truncated { offset: self.pos, needed: n })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

// ============================================================================
// Constant pool
// ============================================================================

#[derive(Debug)]
enum Constant {
    /// Slot 0 and the upper half of long/double entries
    Unusable,
    Utf8(String),
    Class { name_index: u16 },
    MemberRef { class_index: u16 },
    Other,
}

/// The subset of the constant pool the visitor needs: UTF-8 text, class
/// entries and member owners. Every other tag is validated and skipped.
#[derive(Debug)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let count = cursor.u16()?;
        let mut entries = Vec::with_capacity(usize::from(count));
        entries.push(Constant::Unusable);

        let mut index: u16 = 1;
        while index < count {
            let tag = cursor.u8()?;
            let entry = match tag {
                1 => {
                    let len = cursor.u16()?;
                    // Modified UTF-8 only differs from UTF-8 for NUL and
                    // supplementary characters, neither of which matter for names.
                    Constant::Utf8(String::from_utf8_lossy(cursor.take(usize::from(len))?).into_owned())
                }
                3 | 4 => {
                    cursor.skip(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    cursor.skip(8)?;
                    entries.push(Constant::Other);
                    entries.push(Constant::Unusable);
                    index = index.saturating_add(2);
                    continue;
                }
                7 => Constant::Class { name_index: cursor.u16()? },
                8 | 16 | 19 | 20 => {
                    cursor.skip(2)?;
                    Constant::Other
                }
                9..=11 => {
                    let class_index = cursor.u16()?;
                    cursor.skip(2)?;
                    Constant::MemberRef { class_index }
                }
                12 | 17 | 18 => {
                    cursor.skip(4)?;
                    Constant::Other
                }
                15 => {
                    cursor.skip(3)?;
                    Constant::Other
                }
                tag => return Err(ClassFormatError::UnknownConstantTag { index, tag }),
            };
            entries.push(entry);
            index += 1;
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant> {
        self.entries
            .get(usize::from(index))
            .ok_or(ClassFormatError::BadConstantIndex(index))
    }

    /// Text of a UTF-8 entry.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(text) => Ok(text),
            _ => Err(ClassFormatError::UnexpectedConstant { index, expected: "utf8 entry" }),
        }
    }

    /// Internal name of a class entry.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassFormatError::UnexpectedConstant { index, expected: "class entry" }),
        }
    }

    /// Internal name of the class owning a field or method reference.
    pub fn member_owner(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::MemberRef { class_index } => self.class_name(*class_index),
            _ => Err(ClassFormatError::UnexpectedConstant { index, expected: "member reference" }),
        }
    }
}

// ============================================================================
// Visitor interface
// ============================================================================

/// Unit-level facts reported before any member.
#[derive(Debug)]
pub struct ClassHeader<'a> {
    pub major_version: u16,
    pub minor_version: u16,
    pub access: u16,
    pub this_class: &'a str,
    pub super_class: Option<&'a str>,
    pub interfaces: Vec<&'a str>,
}

/// A declared field or method.
#[derive(Debug)]
pub struct MemberInfo<'a> {
    pub access: u16,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// Constant-pool operand of an instruction, resolved to a unit name where
/// the instruction names one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand<'a> {
    None,
    Field { owner: &'a str },
    Method { owner: &'a str },
    Type { name: &'a str },
    Dynamic,
}

#[derive(Debug, Clone, Copy)]
pub struct Instruction<'a> {
    /// Offset of the opcode from the start of the method body
    pub offset: usize,
    pub opcode: u8,
    pub operand: Operand<'a>,
}

/// Receives structure as the reader walks a unit. All methods default to no-ops.
pub trait ClassVisitor {
    fn visit_header(&mut self, _header: &ClassHeader<'_>) {}

    fn visit_field(&mut self, _field: &MemberInfo<'_>) {}

    fn visit_method(&mut self, _method: &MemberInfo<'_>) {}

    fn visit_instruction(&mut self, _insn: &Instruction<'_>) {}

    fn visit_end(&mut self) {}
}

// ============================================================================
// Reader
// ============================================================================

pub struct ClassReader<'a> {
    data: &'a [u8],
}

impl<'a> ClassReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Internal name of the unit, reading no further than the `this` entry.
    ///
    /// # Errors
    /// Returns [`ClassFormatError`] if the header or constant pool is malformed.
    pub fn class_name(&self) -> Result<String> {
        let mut cursor = ByteCursor::new(self.data);
        let (_, pool) = Self::read_prelude(&mut cursor)?;
        let _access = cursor.u16()?;
        Ok(pool.class_name(cursor.u16()?)?.to_owned())
    }

    /// Walk the whole unit, reporting to `visitor`.
    ///
    /// The visitor may have seen a prefix of the unit when this fails; callers
    /// discard its state on error.
    ///
    /// # Errors
    /// Returns [`ClassFormatError`] on truncated, malformed or unsupported bytes.
    pub fn accept<V: ClassVisitor + ?Sized>(&self, visitor: &mut V) -> Result<()> {
        let mut cursor = ByteCursor::new(self.data);
        let ((minor_version, major_version), pool) = Self::read_prelude(&mut cursor)?;

        let access = cursor.u16()?;
        let this_class = pool.class_name(cursor.u16()?)?;
        let super_index = cursor.u16()?;
        let super_class = match super_index {
            0 => None,
            idx => Some(pool.class_name(idx)?),
        };
        let interface_count = cursor.u16()?;
        let mut interfaces = Vec::with_capacity(usize::from(interface_count));
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(cursor.u16()?)?);
        }

        visitor.visit_header(&ClassHeader {
            major_version,
            minor_version,
            access,
            this_class,
            super_class,
            interfaces,
        });

        let field_count = cursor.u16()?;
        for _ in 0..field_count {
            let field = read_member(&mut cursor, &pool)?;
            visitor.visit_field(&field);
            skip_attributes(&mut cursor)?;
        }

        let method_count = cursor.u16()?;
        for _ in 0..method_count {
            let method = read_member(&mut cursor, &pool)?;
            visitor.visit_method(&method);
            let attribute_count = cursor.u16()?;
            for _ in 0..attribute_count {
                let name = pool.utf8(cursor.u16()?)?;
                let len = cursor.u32()? as usize;
                let body = cursor.take(len)?;
                if name == "Code" {
                    read_code(body, &pool, visitor)?;
                }
            }
        }

        skip_attributes(&mut cursor)?;
        visitor.visit_end();
        Ok(())
    }

    /// Magic, `(minor, major)` version and constant pool.
    fn read_prelude(cursor: &mut ByteCursor<'_>) -> Result<((u16, u16), ConstantPool)> {
        let magic = cursor.u32()?;
        if magic != CLASS_MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let minor = cursor.u16()?;
        let major = cursor.u16()?;
        Ok(((minor, major), ConstantPool::parse(cursor)?))
    }
}

fn read_member<'p>(cursor: &mut ByteCursor<'_>, pool: &'p ConstantPool) -> Result<MemberInfo<'p>> {
    let access = cursor.u16()?;
    let name = pool.utf8(cursor.u16()?)?;
    let descriptor = pool.utf8(cursor.u16()?)?;
    Ok(MemberInfo { access, name, descriptor })
}

fn skip_attributes(cursor: &mut ByteCursor<'_>) -> Result<()> {
    let count = cursor.u16()?;
    for _ in 0..count {
        cursor.skip(2)?;
        let len = cursor.u32()? as usize;
        cursor.skip(len)?;
    }
    Ok(())
}

/// Decode the instruction stream of a `Code` attribute body. The exception
/// table and nested attributes (line numbers, local variables) are not read.
fn read_code<V: ClassVisitor + ?Sized>(
    body: &[u8],
    pool: &ConstantPool,
    visitor: &mut V,
) -> Result<()> {
    let mut cursor = ByteCursor::new(body);
    cursor.skip(4)?; // max_stack, max_locals
    let code_len = cursor.u32()? as usize;
    let code = cursor.take(code_len)?;
    decode_instructions(code, pool, visitor)
}

fn decode_instructions<V: ClassVisitor + ?Sized>(
    code: &[u8],
    pool: &ConstantPool,
    visitor: &mut V,
) -> Result<()> {
    let mut cursor = ByteCursor::new(code);
    while cursor.remaining() > 0 {
        let offset = cursor.position();
        let opcode = cursor.u8()?;
        let operand = match opcode {
            GETSTATIC..=PUTFIELD => Operand::Field { owner: pool.member_owner(cursor.u16()?)? },
            INVOKEVIRTUAL..=INVOKESTATIC => {
                Operand::Method { owner: pool.member_owner(cursor.u16()?)? }
            }
            INVOKEINTERFACE => {
                let index = cursor.u16()?;
                cursor.skip(2)?; // count, zero
                Operand::Method { owner: pool.member_owner(index)? }
            }
            INVOKEDYNAMIC => {
                cursor.skip(4)?;
                Operand::Dynamic
            }
            NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
                Operand::Type { name: pool.class_name(cursor.u16()?)? }
            }
            MULTIANEWARRAY => {
                let index = cursor.u16()?;
                cursor.skip(1)?; // dimensions
                Operand::Type { name: pool.class_name(index)? }
            }
            TABLESWITCH => {
                skip_switch_padding(&mut cursor)?;
                cursor.skip(4)?; // default
                let low = cursor.i32()?;
                let high = cursor.i32()?;
                if high < low {
                    return Err(ClassFormatError::MalformedSwitch(offset));
                }
                let targets = usize::try_from(i64::from(high) - i64::from(low) + 1)
                    .map_err(|_| ClassFormatError::MalformedSwitch(offset))?;
                skip_jump_table(&mut cursor, targets, 4, offset)?;
                Operand::None
            }
            LOOKUPSWITCH => {
                skip_switch_padding(&mut cursor)?;
                cursor.skip(4)?; // default
                let pairs = usize::try_from(cursor.i32()?)
                    .map_err(|_| ClassFormatError::MalformedSwitch(offset))?;
                skip_jump_table(&mut cursor, pairs, 8, offset)?;
                Operand::None
            }
            WIDE => {
                let widened = cursor.u8()?;
                if widened == IINC {
                    cursor.skip(4)?;
                } else if is_widenable(widened) {
                    cursor.skip(2)?;
                } else {
                    return Err(ClassFormatError::InvalidOpcode { opcode: widened, offset });
                }
                Operand::None
            }
            _ => {
                let len = fixed_operand_len(opcode)
                    .ok_or(ClassFormatError::InvalidOpcode { opcode, offset })?;
                cursor.skip(len)?;
                Operand::None
            }
        };
        visitor.visit_instruction(&Instruction { offset, opcode, operand });
    }
    Ok(())
}

/// Switch operands start on a 4-byte boundary relative to the method body.
fn skip_switch_padding(cursor: &mut ByteCursor<'_>) -> Result<()> {
    let pad = (4 - cursor.position() % 4) % 4;
    cursor.skip(pad)
}

fn skip_jump_table(
    cursor: &mut ByteCursor<'_>,
    entries: usize,
    entry_len: usize,
    offset: usize,
) -> Result<()> {
    let len = entries
        .checked_mul(entry_len)
        .ok_or(ClassFormatError::MalformedSwitch(offset))?;
    cursor.skip(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        this_class: String,
        fields: Vec<String>,
        opcodes: Vec<u8>,
        ended: bool,
    }

    impl ClassVisitor for Recorder {
        fn visit_header(&mut self, header: &ClassHeader<'_>) {
            self.this_class = header.this_class.to_owned();
        }

        fn visit_field(&mut self, field: &MemberInfo<'_>) {
            self.fields.push(field.name.to_owned());
        }

        fn visit_instruction(&mut self, insn: &Instruction<'_>) {
            self.opcodes.push(insn.opcode);
        }

        fn visit_end(&mut self) {
            self.ended = true;
        }
    }

    /// Smallest valid unit: `Min extends java/lang/Object`, no members.
    fn minimal_unit() -> Vec<u8> {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
        bytes.extend_from_slice(&[0, 5]); // pool count
        bytes.extend_from_slice(&[1, 0, 3]);
        bytes.extend_from_slice(b"Min");
        bytes.extend_from_slice(&[7, 0, 1]);
        bytes.extend_from_slice(&[1, 0, 16]);
        bytes.extend_from_slice(b"java/lang/Object");
        bytes.extend_from_slice(&[7, 0, 3]);
        bytes.extend_from_slice(&[0, 0x21, 0, 2, 0, 4]); // access, this, super
        bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]); // interfaces, fields, methods, attrs
        bytes
    }

    #[test]
    fn test_minimal_unit() {
        let bytes = minimal_unit();
        let mut recorder = Recorder::default();
        ClassReader::new(&bytes).accept(&mut recorder).unwrap();
        assert_eq!(recorder.this_class, "Min");
        assert!(recorder.fields.is_empty());
        assert!(recorder.opcodes.is_empty());
        assert!(recorder.ended);
    }

    #[test]
    fn test_class_name_peek() {
        assert_eq!(ClassReader::new(&minimal_unit()).class_name().unwrap(), "Min");
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut bytes = minimal_unit();
        bytes.extend_from_slice(&[0xde, 0xad]);
        assert!(ClassReader::new(&bytes).accept(&mut Recorder::default()).is_ok());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = minimal_unit();
        bytes[0] = 0;
        let err = ClassReader::new(&bytes).accept(&mut Recorder::default()).unwrap_err();
        assert!(matches!(err, ClassFormatError::BadMagic(_)));
    }

    #[test]
    fn test_every_truncation_fails_cleanly() {
        let bytes = minimal_unit();
        for len in 0..bytes.len() {
            let result = ClassReader::new(&bytes[..len]).accept(&mut Recorder::default());
            assert!(result.is_err(), "prefix of {len} bytes parsed");
        }
    }

    #[test]
    fn test_unknown_constant_tag() {
        let mut bytes = minimal_unit();
        bytes[10] = 2;
        let err = ClassReader::new(&bytes).accept(&mut Recorder::default()).unwrap_err();
        assert_eq!(err, ClassFormatError::UnknownConstantTag { index: 1, tag: 2 });
    }

    #[test]
    fn test_switch_padding_is_relative_to_body() {
        // tableswitch at offset 1: two padding bytes, then default/low/high
        // and one jump target, then return
        let mut code = vec![0x00, TABLESWITCH, 0, 0];
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&5_i32.to_be_bytes());
        code.extend_from_slice(&5_i32.to_be_bytes());
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.push(0xb1);

        let pool = ConstantPool { entries: vec![Constant::Unusable] };
        let mut recorder = Recorder::default();
        decode_instructions(&code, &pool, &mut recorder).unwrap();
        assert_eq!(recorder.opcodes, vec![0x00, TABLESWITCH, 0xb1]);
    }

    #[test]
    fn test_inverted_tableswitch_rejected() {
        let mut code = vec![TABLESWITCH, 0, 0, 0];
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&9_i32.to_be_bytes());
        code.extend_from_slice(&1_i32.to_be_bytes());

        let pool = ConstantPool { entries: vec![Constant::Unusable] };
        let err = decode_instructions(&code, &pool, &mut Recorder::default()).unwrap_err();
        assert_eq!(err, ClassFormatError::MalformedSwitch(0));
    }

    #[test]
    fn test_wide_forms() {
        // wide iload 0x0100 ; wide iinc 0x0001 by 7 ; return
        let code = [WIDE, 0x15, 0x01, 0x00, WIDE, IINC, 0x00, 0x01, 0x00, 0x07, 0xb1];
        let pool = ConstantPool { entries: vec![Constant::Unusable] };
        let mut recorder = Recorder::default();
        decode_instructions(&code, &pool, &mut recorder).unwrap();
        assert_eq!(recorder.opcodes, vec![WIDE, WIDE, 0xb1]);
    }

    #[test]
    fn test_undefined_opcode_rejected() {
        let pool = ConstantPool { entries: vec![Constant::Unusable] };
        let err = decode_instructions(&[0x00, 0xe0], &pool, &mut Recorder::default()).unwrap_err();
        assert_eq!(err, ClassFormatError::InvalidOpcode { opcode: 0xe0, offset: 1 });
    }
}

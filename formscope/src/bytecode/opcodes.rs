//! Opcode constants and operand widths for the compiled-unit instruction set.
//!
//! Only opcodes the visitor or the reference emitter name individually get a
//! constant; the rest are covered by ranges in [`fixed_operand_len`].

pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_0: u8 = 0x03;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const ILOAD: u8 = 0x15;
pub const ALOAD: u8 = 0x19;
pub const ALOAD_0: u8 = 0x2a;
pub const ISTORE: u8 = 0x36;
pub const ASTORE: u8 = 0x3a;
pub const POP: u8 = 0x57;
pub const DUP: u8 = 0x59;
pub const IINC: u8 = 0x84;
pub const IFEQ: u8 = 0x99;
pub const GOTO: u8 = 0xa7;
pub const RET: u8 = 0xa9;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const IRETURN: u8 = 0xac;
pub const ARETURN: u8 = 0xb0;
pub const RETURN: u8 = 0xb1;
pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const NEWARRAY: u8 = 0xbc;
pub const ANEWARRAY: u8 = 0xbd;
pub const ARRAYLENGTH: u8 = 0xbe;
pub const ATHROW: u8 = 0xbf;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const MONITORENTER: u8 = 0xc2;
pub const MONITOREXIT: u8 = 0xc3;
pub const WIDE: u8 = 0xc4;
pub const MULTIANEWARRAY: u8 = 0xc5;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
pub const GOTO_W: u8 = 0xc8;
pub const JSR_W: u8 = 0xc9;
pub const BREAKPOINT: u8 = 0xca;
pub const IMPDEP1: u8 = 0xfe;
pub const IMPDEP2: u8 = 0xff;

/// Operand bytes following `opcode`, for every opcode with a fixed width.
///
/// Returns `None` for the variable-width opcodes (`tableswitch`,
/// `lookupswitch`, `wide`) and for undefined opcodes.
#[must_use]
pub fn fixed_operand_len(opcode: u8) -> Option<usize> {
    let len = match opcode {
        NOP..=0x0f => 0,
        BIPUSH | LDC => 1,
        SIPUSH | LDC_W | LDC2_W => 2,
        ILOAD..=ALOAD => 1,
        0x1a..=0x35 => 0,
        ISTORE..=ASTORE => 1,
        0x3b..=0x83 => 0,
        IINC => 2,
        0x85..=0x98 => 0,
        IFEQ..=0xa8 => 2,
        RET => 1,
        IRETURN..=RETURN => 0,
        GETSTATIC..=INVOKESTATIC => 2,
        INVOKEINTERFACE | INVOKEDYNAMIC => 4,
        NEW | ANEWARRAY => 2,
        NEWARRAY => 1,
        ARRAYLENGTH | ATHROW | MONITORENTER | MONITOREXIT => 0,
        CHECKCAST | INSTANCEOF => 2,
        MULTIANEWARRAY => 3,
        IFNULL | IFNONNULL => 2,
        GOTO_W | JSR_W => 4,
        BREAKPOINT | IMPDEP1 | IMPDEP2 => 0,
        _ => return None,
    };
    Some(len)
}

/// Opcodes that `wide` may prefix with a two-byte local index.
#[must_use]
pub fn is_widenable(opcode: u8) -> bool {
    matches!(opcode, ILOAD..=ALOAD | ISTORE..=ASTORE | RET)
}

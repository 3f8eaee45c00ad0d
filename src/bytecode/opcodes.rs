// This module holds the static opcode knowledge the decoder and the block builder need: named
// opcode constants, the per-opcode operand-length table (fixed byte counts, or a dynamic marker for
// the switch instructions and the wide prefix whose length depends on their position and payload),
// mnemonics for listings, and the control-transfer category of each opcode. The table is exposed
// through the OperandTable trait so callers can supply their own (for example a producer with
// extended opcodes); StandardOperandTable covers the standard instruction set.

//! Opcode constants, operand lengths and categories.

pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_M1: u8 = 0x02;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_1: u8 = 0x04;
pub const ICONST_2: u8 = 0x05;
pub const ICONST_3: u8 = 0x06;
pub const ICONST_4: u8 = 0x07;
pub const ICONST_5: u8 = 0x08;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const ILOAD: u8 = 0x15;
pub const ALOAD: u8 = 0x19;
pub const ILOAD_0: u8 = 0x1a;
pub const ILOAD_1: u8 = 0x1b;
pub const ILOAD_2: u8 = 0x1c;
pub const ILOAD_3: u8 = 0x1d;
pub const ALOAD_0: u8 = 0x2a;
pub const ALOAD_1: u8 = 0x2b;
pub const ALOAD_2: u8 = 0x2c;
pub const ALOAD_3: u8 = 0x2d;
pub const IALOAD: u8 = 0x2e;
pub const AALOAD: u8 = 0x32;
pub const ISTORE: u8 = 0x36;
pub const ASTORE: u8 = 0x3a;
pub const ISTORE_0: u8 = 0x3b;
pub const ISTORE_1: u8 = 0x3c;
pub const ISTORE_2: u8 = 0x3d;
pub const ISTORE_3: u8 = 0x3e;
pub const ASTORE_0: u8 = 0x4b;
pub const ASTORE_1: u8 = 0x4c;
pub const ASTORE_2: u8 = 0x4d;
pub const ASTORE_3: u8 = 0x4e;
pub const IASTORE: u8 = 0x4f;
pub const AASTORE: u8 = 0x53;
pub const POP: u8 = 0x57;
pub const DUP: u8 = 0x59;
pub const SWAP: u8 = 0x5f;
pub const IADD: u8 = 0x60;
pub const ISUB: u8 = 0x64;
pub const IMUL: u8 = 0x68;
pub const IDIV: u8 = 0x6c;
pub const IREM: u8 = 0x70;
pub const INEG: u8 = 0x74;
pub const ISHL: u8 = 0x78;
pub const ISHR: u8 = 0x7a;
pub const IUSHR: u8 = 0x7c;
pub const IAND: u8 = 0x7e;
pub const IOR: u8 = 0x80;
pub const IXOR: u8 = 0x82;
pub const IINC: u8 = 0x84;
pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9a;
pub const IFLT: u8 = 0x9b;
pub const IFGE: u8 = 0x9c;
pub const IFGT: u8 = 0x9d;
pub const IFLE: u8 = 0x9e;
pub const IF_ICMPEQ: u8 = 0x9f;
pub const IF_ICMPNE: u8 = 0xa0;
pub const IF_ICMPLT: u8 = 0xa1;
pub const IF_ICMPGE: u8 = 0xa2;
pub const IF_ICMPGT: u8 = 0xa3;
pub const IF_ICMPLE: u8 = 0xa4;
pub const IF_ACMPEQ: u8 = 0xa5;
pub const IF_ACMPNE: u8 = 0xa6;
pub const GOTO: u8 = 0xa7;
pub const JSR: u8 = 0xa8;
pub const RET: u8 = 0xa9;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const IRETURN: u8 = 0xac;
pub const LRETURN: u8 = 0xad;
pub const FRETURN: u8 = 0xae;
pub const DRETURN: u8 = 0xaf;
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
pub const ATHROW: u8 = 0xbf;
pub const WIDE: u8 = 0xc4;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
pub const GOTO_W: u8 = 0xc8;
pub const JSR_W: u8 = 0xc9;

/// Number of operand bytes following an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandLength {
    /// Always this many bytes.
    Fixed(u8),
    /// Depends on the instruction's address or payload.
    Dynamic,
}

/// Source of per-opcode operand lengths.
pub trait OperandTable {
    /// Operand length for `opcode`, or `None` if the opcode is not defined.
    fn operand_length(&self, opcode: u8) -> Option<OperandLength>;
}

/// Operand-length table for the standard instruction set.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardOperandTable;

impl OperandTable for StandardOperandTable {
    fn operand_length(&self, opcode: u8) -> Option<OperandLength> {
        use OperandLength::*;
        let len = match opcode {
            0x00..=0x0f => Fixed(0),
            BIPUSH | LDC => Fixed(1),
            SIPUSH | LDC_W | 0x14 => Fixed(2),
            0x15..=0x19 => Fixed(1),
            0x1a..=0x35 => Fixed(0),
            0x36..=0x3a => Fixed(1),
            0x3b..=0x83 => Fixed(0),
            IINC => Fixed(2),
            0x85..=0x98 => Fixed(0),
            0x99..=0xa8 => Fixed(2),
            RET => Fixed(1),
            TABLESWITCH | LOOKUPSWITCH => Dynamic,
            0xac..=0xb1 => Fixed(0),
            0xb2..=0xb8 => Fixed(2),
            INVOKEINTERFACE | INVOKEDYNAMIC => Fixed(4),
            NEW => Fixed(2),
            0xbc => Fixed(1),
            0xbd => Fixed(2),
            0xbe | ATHROW => Fixed(0),
            0xc0 | 0xc1 => Fixed(2),
            0xc2 | 0xc3 => Fixed(0),
            WIDE => Dynamic,
            0xc5 => Fixed(3),
            IFNULL | IFNONNULL => Fixed(2),
            GOTO_W | JSR_W => Fixed(4),
            _ => return None,
        };
        Some(len)
    }
}

/// Control-transfer category of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeCategory {
    ConditionalBranch,
    Goto,
    Subroutine,
    SubroutineReturn,
    Switch,
    Return,
    Throw,
    Other,
}

impl OpcodeCategory {
    /// Classify an opcode.
    pub fn of(opcode: u8) -> Self {
        match opcode {
            IFEQ..=IF_ACMPNE | IFNULL | IFNONNULL => Self::ConditionalBranch,
            GOTO | GOTO_W => Self::Goto,
            JSR | JSR_W => Self::Subroutine,
            RET => Self::SubroutineReturn,
            TABLESWITCH | LOOKUPSWITCH => Self::Switch,
            IRETURN..=RETURN => Self::Return,
            ATHROW => Self::Throw,
            _ => Self::Other,
        }
    }

    /// Whether the instruction carries jump targets.
    pub fn has_targets(self) -> bool {
        matches!(
            self,
            Self::ConditionalBranch | Self::Goto | Self::Subroutine | Self::Switch
        )
    }

    /// Whether the instruction ends a basic block.
    pub fn ends_block(self) -> bool {
        self != Self::Other
    }
}

const MNEMONICS: [&str; 0xca] = [
    "nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2", "iconst_3", "iconst_4",
    "iconst_5", "lconst_0", "lconst_1", "fconst_0", "fconst_1", "fconst_2", "dconst_0", "dconst_1",
    "bipush", "sipush", "ldc", "ldc_w", "ldc2_w", "iload", "lload", "fload", "dload", "aload",
    "iload_0", "iload_1", "iload_2", "iload_3", "lload_0", "lload_1", "lload_2", "lload_3",
    "fload_0", "fload_1", "fload_2", "fload_3", "dload_0", "dload_1", "dload_2", "dload_3",
    "aload_0", "aload_1", "aload_2", "aload_3", "iaload", "laload", "faload", "daload", "aaload",
    "baload", "caload", "saload", "istore", "lstore", "fstore", "dstore", "astore", "istore_0",
    "istore_1", "istore_2", "istore_3", "lstore_0", "lstore_1", "lstore_2", "lstore_3", "fstore_0",
    "fstore_1", "fstore_2", "fstore_3", "dstore_0", "dstore_1", "dstore_2", "dstore_3", "astore_0",
    "astore_1", "astore_2", "astore_3", "iastore", "lastore", "fastore", "dastore", "aastore",
    "bastore", "castore", "sastore", "pop", "pop2", "dup", "dup_x1", "dup_x2", "dup2", "dup2_x1",
    "dup2_x2", "swap", "iadd", "ladd", "fadd", "dadd", "isub", "lsub", "fsub", "dsub", "imul",
    "lmul", "fmul", "dmul", "idiv", "ldiv", "fdiv", "ddiv", "irem", "lrem", "frem", "drem", "ineg",
    "lneg", "fneg", "dneg", "ishl", "lshl", "ishr", "lshr", "iushr", "lushr", "iand", "land", "ior",
    "lor", "ixor", "lxor", "iinc", "i2l", "i2f", "i2d", "l2i", "l2f", "l2d", "f2i", "f2l", "f2d",
    "d2i", "d2l", "d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl", "fcmpg", "dcmpl", "dcmpg", "ifeq",
    "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq", "if_icmpne", "if_icmplt", "if_icmpge",
    "if_icmpgt", "if_icmple", "if_acmpeq", "if_acmpne", "goto", "jsr", "ret", "tableswitch",
    "lookupswitch", "ireturn", "lreturn", "freturn", "dreturn", "areturn", "return", "getstatic",
    "putstatic", "getfield", "putfield", "invokevirtual", "invokespecial", "invokestatic",
    "invokeinterface", "invokedynamic", "new", "newarray", "anewarray", "arraylength", "athrow",
    "checkcast", "instanceof", "monitorenter", "monitorexit", "wide", "multianewarray", "ifnull",
    "ifnonnull", "goto_w", "jsr_w",
];

/// Mnemonic of an opcode, for listings.
pub fn mnemonic(opcode: u8) -> &'static str {
    MNEMONICS.get(opcode as usize).copied().unwrap_or("<unknown>")
}

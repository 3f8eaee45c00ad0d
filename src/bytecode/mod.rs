//! Bytecode-level data: decoded instruction tuples and the class-file facing
//! collaborators (operand tables, descriptors, constant pool).
//!
//! A [`Tuple`] is one decoded instruction: its address, opcode and raw operand
//! bytes. Tuples are produced once by the [`decoder`] and never change
//! afterwards, except for the `is_leader` flag the block builder sets.

pub mod constant_pool;
pub mod decoder;
pub mod descriptor;
pub mod opcodes;

use opcodes::{OpcodeCategory, GOTO_W, JSR_W, LOOKUPSWITCH, TABLESWITCH, WIDE};
use std::fmt;

pub use constant_pool::{ConstantPool, ConstantTable, MemberRef, PoolEntry};
pub use decoder::Decoder;
pub use descriptor::{MethodDescriptor, ValueType};
pub use opcodes::{OperandLength, OperandTable, StandardOperandTable};

/// A decoded bytecode instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    /// Address of the opcode byte, relative to the start of the method's code.
    pub address: u32,
    /// Opcode byte.
    pub opcode: u8,
    /// Raw operand bytes, including switch alignment padding.
    pub operands: Vec<u8>,
    /// Whether this tuple starts a basic block.
    pub is_leader: bool,
}

/// Decoded payload of a `tableswitch` or `lookupswitch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchTable {
    /// Offset of the default target relative to the switch address.
    pub default: i32,
    /// `(key, offset)` pairs in payload order.
    pub cases: Vec<(i32, i32)>,
}

impl Tuple {
    pub fn new(address: u32, opcode: u8, operands: Vec<u8>) -> Self {
        Self { address, opcode, operands, is_leader: false }
    }

    /// Control-transfer category of the opcode.
    pub fn category(&self) -> OpcodeCategory {
        OpcodeCategory::of(self.opcode)
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> u32 {
        1 + self.operands.len() as u32
    }

    /// Address of the instruction that follows this one.
    pub fn next_address(&self) -> u32 {
        self.address + self.len()
    }

    pub fn u8_operand(&self, index: usize) -> u8 {
        self.operands.get(index).copied().unwrap_or(0)
    }

    pub fn i8_operand(&self, index: usize) -> i8 {
        self.u8_operand(index) as i8
    }

    pub fn u16_operand(&self, index: usize) -> u16 {
        u16::from_be_bytes([self.u8_operand(index), self.u8_operand(index + 1)])
    }

    pub fn i16_operand(&self, index: usize) -> i16 {
        self.u16_operand(index) as i16
    }

    pub fn i32_operand(&self, index: usize) -> i32 {
        i32::from_be_bytes([
            self.u8_operand(index),
            self.u8_operand(index + 1),
            self.u8_operand(index + 2),
            self.u8_operand(index + 3),
        ])
    }

    /// Number of alignment bytes between a switch opcode and its payload.
    pub fn switch_padding(address: u32) -> usize {
        ((4 - (address + 1) % 4) % 4) as usize
    }

    /// Switch payload, if this is a switch instruction.
    pub fn switch_table(&self) -> Option<SwitchTable> {
        let base = Self::switch_padding(self.address);
        match self.opcode {
            TABLESWITCH => {
                let default = self.i32_operand(base);
                let low = self.i32_operand(base + 4);
                let high = self.i32_operand(base + 8);
                let cases = (low..=high)
                    .enumerate()
                    .map(|(i, key)| (key, self.i32_operand(base + 12 + i * 4)))
                    .collect();
                Some(SwitchTable { default, cases })
            }
            LOOKUPSWITCH => {
                let default = self.i32_operand(base);
                let pairs = self.i32_operand(base + 4).max(0) as usize;
                let cases = (0..pairs)
                    .map(|i| {
                        let at = base + 8 + i * 8;
                        (self.i32_operand(at), self.i32_operand(at + 4))
                    })
                    .collect();
                Some(SwitchTable { default, cases })
            }
            _ => None,
        }
    }

    /// Absolute jump targets in operand order.
    ///
    /// Targets are not validated here; the block builder checks that each one
    /// lands on an instruction.
    pub fn jump_targets(&self) -> Vec<i64> {
        let here = self.address as i64;
        match self.category() {
            OpcodeCategory::ConditionalBranch | OpcodeCategory::Goto | OpcodeCategory::Subroutine => {
                let offset = if self.opcode == GOTO_W || self.opcode == JSR_W {
                    self.i32_operand(0) as i64
                } else {
                    self.i16_operand(0) as i64
                };
                vec![here + offset]
            }
            OpcodeCategory::Switch => match self.switch_table() {
                Some(table) => std::iter::once(table.default)
                    .chain(table.cases.iter().map(|&(_, offset)| offset))
                    .map(|offset| here + offset as i64)
                    .collect(),
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Opcode this instruction acts as, looking through a `wide` prefix.
    pub fn effective_opcode(&self) -> u8 {
        if self.opcode == WIDE {
            self.u8_operand(0)
        } else {
            self.opcode
        }
    }

    /// Local-variable index operand of a load, store, `iinc` or `ret`.
    pub fn local_index(&self) -> u16 {
        if self.opcode == WIDE {
            self.u16_operand(1)
        } else {
            self.u8_operand(0) as u16
        }
    }

    /// Increment operand of `iinc` (plain or wide).
    pub fn increment(&self) -> i32 {
        if self.opcode == WIDE {
            self.i16_operand(3) as i32
        } else {
            self.i8_operand(1) as i32
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5}: {}", self.address, opcodes::mnemonic(self.opcode))?;
        let targets = self.jump_targets();
        if !targets.is_empty() {
            let list: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
            write!(f, " -> {}", list.join(", "))
        } else {
            for byte in &self.operands {
                write!(f, " {:02x}", byte)?;
            }
            Ok(())
        }
    }
}

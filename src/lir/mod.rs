// This module defines the low-level IR handed to the register allocator and the assembly emitter.
// A LirNode is one machine-level operation with an explicit list of registers it reads and at most
// one register it writes; registers are either physical (fixed indices into the target register
// file) or virtual (numbered from FIRST_VIRTUAL_REGISTER by the per-method graph counter). Nodes are
// created once during lowering, placed into their block's instruction list, and afterwards only
// touched through replace_registers, which is how an allocator substitutes physical registers in
// place. IntervalLookup is the allocator-side contract: given a virtual register and an instruction
// id (the program point), it names the physical register holding that register's live interval there.
// Lowering renumbers the placed instructions in block address order, so ids count positions in the
// linearized method.

//! Low-level IR over virtual and physical registers.

pub mod calling_convention;
pub mod lowering;

use crate::bytecode::constant_pool::MemberRef;
use crate::cfg::BlockId;
use crate::core::register_file::Register;
use crate::hir::{ArithOp, Condition};
use std::fmt;

pub use calling_convention::{CCAssigner, CCAssignment, FixedAssigner};
pub use lowering::{DataEntry, Lowered, Lowering};

/// LIR instruction identifier. After lowering it is the instruction's position in
/// the method, with blocks laid out in address order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LirId(pub u32);

impl fmt::Display for LirId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

/// LIR operation. Operands are in the node's `reads`, the result in `write`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LirOp<'a> {
    /// `write = reads[0]`
    Move,
    LoadConstant(i32),
    /// Address of a data-segment label.
    LoadAddress(&'a str),
    Binary(ArithOp),
    Negate,
    LoadStatic(MemberRef<'a>),
    /// Store `reads[0]` into a static field.
    StoreStatic(MemberRef<'a>),
    /// `write = [reads[0] + reads[1]]`
    Load,
    /// `[reads[0] + reads[1]] = reads[2]`
    Store,
    /// Load an incoming stack argument at an `sp` offset.
    LoadStack(i32),
    /// Store an outgoing stack argument at an `sp` offset.
    StoreStack(i32),
    Call(MemberRef<'a>),
    Jump(BlockId),
    Branch {
        condition: Condition,
        taken: BlockId,
        fallthrough: BlockId,
    },
    Switch {
        default: BlockId,
        cases: Vec<(i32, BlockId)>,
    },
    Return,
    Throw,
}

/// A LIR instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LirNode<'a> {
    pub id: LirId,
    pub op: LirOp<'a>,
    reads: Vec<Register>,
    write: Option<Register>,
}

impl<'a> LirNode<'a> {
    pub fn new(id: LirId, op: LirOp<'a>, reads: Vec<Register>, write: Option<Register>) -> Self {
        Self { id, op, reads, write }
    }

    pub fn reads(&self) -> &[Register] {
        &self.reads
    }

    pub fn write(&self) -> Option<Register> {
        self.write
    }

    /// Rewrite every register reference in place.
    pub fn replace_registers(&mut self, mut map: impl FnMut(Register) -> Register) {
        for reg in &mut self.reads {
            *reg = map(*reg);
        }
        if let Some(reg) = &mut self.write {
            *reg = map(*reg);
        }
    }

    /// Jump, branch or switch.
    pub fn is_jump(&self) -> bool {
        matches!(self.op, LirOp::Jump(_) | LirOp::Branch { .. } | LirOp::Switch { .. })
    }

    /// Any instruction that ends a block.
    pub fn is_control(&self) -> bool {
        self.is_jump() || matches!(self.op, LirOp::Return | LirOp::Throw)
    }

    pub fn is_move(&self) -> bool {
        self.op == LirOp::Move
    }

    fn mnemonic(&self) -> &'static str {
        match &self.op {
            LirOp::Move => "mov",
            LirOp::LoadConstant(_) => "ldi",
            LirOp::LoadAddress(_) => "adr",
            LirOp::Binary(op) => op.mnemonic(),
            LirOp::Negate => "neg",
            LirOp::LoadStatic(_) => "ldsf",
            LirOp::StoreStatic(_) => "stsf",
            LirOp::Load => "ld",
            LirOp::Store => "st",
            LirOp::LoadStack(_) => "ldsp",
            LirOp::StoreStack(_) => "stsp",
            LirOp::Call(_) => "call",
            LirOp::Jump(_) => "jmp",
            LirOp::Branch { condition, .. } => condition.mnemonic(),
            LirOp::Switch { .. } => "switch",
            LirOp::Return => "ret",
            LirOp::Throw => "throw",
        }
    }
}

impl fmt::Display for LirNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.id)?;
        if let Some(write) = self.write {
            write!(f, "{} = ", write)?;
        }
        f.write_str(self.mnemonic())?;

        let reads: Vec<String> = self.reads.iter().map(|r| r.to_string()).collect();
        let mut sep = if reads.is_empty() { " " } else { ", " };
        if !reads.is_empty() {
            write!(f, " {}", reads.join(", "))?;
        }

        match &self.op {
            LirOp::LoadConstant(value) => write!(f, "{}#{}", sep, value),
            LirOp::LoadAddress(label) => write!(f, "{}{}", sep, label),
            LirOp::LoadStatic(member) | LirOp::StoreStatic(member) | LirOp::Call(member) => {
                write!(f, "{}{}", sep, member)
            }
            LirOp::LoadStack(offset) | LirOp::StoreStack(offset) => write!(f, "{}[sp + {}]", sep, offset),
            LirOp::Jump(target) => write!(f, "{}{}", sep, target),
            LirOp::Branch { taken, fallthrough, .. } => {
                write!(f, "{}{} else {}", sep, taken, fallthrough)
            }
            LirOp::Switch { default, cases } => {
                write!(f, "{}default {}", sep, default)?;
                sep = ", ";
                for (key, target) in cases {
                    write!(f, "{}{} => {}", sep, key, target)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Register-allocator query: which physical register holds `vreg` at `position`.
///
/// `position` is an instruction id, i.e. a position in the linearized method.
pub trait IntervalLookup {
    /// Physical register of the live interval of `vreg` that contains `position`,
    /// or `None` to leave the reference virtual.
    fn physical_register(&self, vreg: Register, position: LirId) -> Option<Register>;
}

impl<F> IntervalLookup for F
where
    F: Fn(Register, LirId) -> Option<Register>,
{
    fn physical_register(&self, vreg: Register, position: LirId) -> Option<Register> {
        self(vreg, position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::register_file::RegisterFile;

    #[test]
    fn test_display() {
        let v = Register::from_raw(17);
        let node = LirNode::new(LirId(3), LirOp::LoadConstant(5), vec![], Some(v));
        assert_eq!(node.to_string(), "l3: v17 = ldi #5");

        let node = LirNode::new(LirId(4), LirOp::Move, vec![v], Some(RegisterFile::RETURN_REGISTER));
        assert_eq!(node.to_string(), "l4: r0 = mov v17");

        let node = LirNode::new(LirId(5), LirOp::StoreStack(4), vec![v], None);
        assert_eq!(node.to_string(), "l5: stsp v17, [sp + 4]");
        assert!(!node.is_control());
    }

    #[test]
    fn test_replace_registers() {
        let a = Register::from_raw(16);
        let b = Register::from_raw(17);
        let mut node = LirNode::new(LirId(0), LirOp::Binary(ArithOp::Add), vec![a, b], Some(a));
        node.replace_registers(|r| if r == a { Register::physical(4) } else { r });
        assert_eq!(node.reads(), &[Register::physical(4), b]);
        assert_eq!(node.write(), Some(Register::physical(4)));
    }
}

// This module implements the fixed calling convention of the target. The first four arguments of a
// call travel in r0..r3 in argument order; every further argument is written to the outgoing stack
// area at consecutive 4-byte slots starting at offset 0 from the stack pointer, and a callee reads
// its own parameters beyond the fourth from the same offsets. A non-void result comes back in r0.
// CCAssigner is the seam lowering uses to ask where each argument goes, and FixedAssigner is the
// only implementation; it hands out assignments in order and tracks the outgoing stack area size.

//! Fixed argument and return value assignment.

use crate::bytecode::descriptor::ValueType;
use crate::core::register_file::{Register, RegisterFile};

/// Bytes per stack argument slot.
pub const STACK_SLOT_SIZE: u32 = 4;

/// Where one argument or return value lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CCAssignment {
    /// Assigned register (if any).
    pub reg: Option<Register>,
    /// Stack offset from `sp` (if assigned to stack).
    pub stack_off: Option<i32>,
}

impl CCAssignment {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Trait for calling convention argument assignment.
pub trait CCAssigner {
    /// Assign the next argument.
    fn assign_arg(&mut self, arg: &mut CCAssignment);

    /// Assign a return value of type `ty`.
    fn assign_ret(&self, ty: ValueType, ret: &mut CCAssignment);

    /// Start over for a new call.
    fn reset(&mut self);

    /// Bytes of outgoing stack arguments assigned so far.
    fn stack_size(&self) -> u32;
}

/// The target's only calling convention: four argument registers, then the stack.
#[derive(Debug, Default, Clone)]
pub struct FixedAssigner {
    /// Argument registers handed out.
    reg_cnt: usize,
    /// Next stack offset.
    stack: u32,
}

impl FixedAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the argument at `index`.
    pub fn nth_arg(index: usize) -> CCAssignment {
        let mut assigner = Self::new();
        for _ in 0..index {
            assigner.assign_arg(&mut CCAssignment::new());
        }
        let mut arg = CCAssignment::new();
        assigner.assign_arg(&mut arg);
        arg
    }
}

impl CCAssigner for FixedAssigner {
    fn assign_arg(&mut self, arg: &mut CCAssignment) {
        if let Some(&reg) = RegisterFile::ARGUMENT_REGISTERS.get(self.reg_cnt) {
            arg.reg = Some(reg);
            self.reg_cnt += 1;
        } else {
            arg.stack_off = Some(self.stack as i32);
            self.stack += STACK_SLOT_SIZE;
        }
    }

    fn assign_ret(&self, ty: ValueType, ret: &mut CCAssignment) {
        if ty != ValueType::Void {
            ret.reg = Some(RegisterFile::RETURN_REGISTER);
        }
    }

    fn reset(&mut self) {
        self.reg_cnt = 0;
        self.stack = 0;
    }

    fn stack_size(&self) -> u32 {
        self.stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_assignment() {
        let mut cc = FixedAssigner::new();
        let assigned: Vec<CCAssignment> = (0..6)
            .map(|_| {
                let mut arg = CCAssignment::new();
                cc.assign_arg(&mut arg);
                arg
            })
            .collect();

        for (i, arg) in assigned.iter().take(4).enumerate() {
            assert_eq!(arg.reg, Some(RegisterFile::ARGUMENT_REGISTERS[i]));
            assert_eq!(arg.stack_off, None);
        }
        assert_eq!(assigned[4].stack_off, Some(0));
        assert_eq!(assigned[5].stack_off, Some(4));
        assert_eq!(cc.stack_size(), 8);

        cc.reset();
        assert_eq!(cc.stack_size(), 0);
    }

    #[test]
    fn test_nth_arg_and_return() {
        assert_eq!(FixedAssigner::nth_arg(2).reg, Some(Register::physical(2)));
        assert_eq!(FixedAssigner::nth_arg(6).stack_off, Some(8));

        let cc = FixedAssigner::new();
        let mut ret = CCAssignment::new();
        cc.assign_ret(ValueType::Void, &mut ret);
        assert_eq!(ret.reg, None);
        cc.assign_ret(ValueType::Int, &mut ret);
        assert_eq!(ret.reg, Some(RegisterFile::RETURN_REGISTER));
    }
}

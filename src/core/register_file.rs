//! Machine register file and register naming.
//!
//! The backend never assigns physical registers itself; it only creates virtual
//! registers and refers to a handful of physical ones by fixed index (argument
//! registers, the return register and the stack pointer). Both kinds share one
//! numeric space: ids below [`PHYSICAL_REGISTER_COUNT`] are physical, everything
//! above is virtual. The external allocator relies on that split when it sizes
//! its interval arrays.

use std::fmt;

/// Number of physical registers in the target register file.
pub const PHYSICAL_REGISTER_COUNT: u32 = 16;

/// First id handed out for virtual registers.
pub const FIRST_VIRTUAL_REGISTER: u32 = PHYSICAL_REGISTER_COUNT;

/// Register identifier, physical or virtual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(u32);

impl Register {
    /// Physical register by fixed index.
    pub const fn physical(index: u32) -> Self {
        assert!(index < PHYSICAL_REGISTER_COUNT);
        Self(index)
    }

    /// Virtual register from a raw id, as produced by the graph's counter.
    pub(crate) const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Raw numeric id.
    pub const fn id(self) -> u32 {
        self.0
    }

    pub const fn is_physical(self) -> bool {
        self.0 < PHYSICAL_REGISTER_COUNT
    }

    pub const fn is_virtual(self) -> bool {
        !self.is_physical()
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_physical() {
            f.write_str(RegisterFile::name(*self))
        } else {
            write!(f, "v{}", self.0)
        }
    }
}

/// Fixed description of the target register file.
pub struct RegisterFile;

impl RegisterFile {
    /// Registers carrying the first four call arguments, in order.
    pub const ARGUMENT_REGISTERS: [Register; 4] = [
        Register::physical(0),
        Register::physical(1),
        Register::physical(2),
        Register::physical(3),
    ];

    /// Register holding a call's result.
    pub const RETURN_REGISTER: Register = Register::physical(0);

    /// Stack pointer.
    pub const STACK_POINTER: Register = Register::physical(13);

    /// Link register.
    pub const LINK_REGISTER: Register = Register::physical(14);

    /// Program counter.
    pub const PROGRAM_COUNTER: Register = Register::physical(15);

    const NAMES: [&'static str; PHYSICAL_REGISTER_COUNT as usize] = [
        "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "sp",
        "lr", "pc",
    ];

    /// Assembly name of a physical register.
    ///
    /// Virtual registers have no fixed name and map to `"?"`.
    pub fn name(reg: Register) -> &'static str {
        Self::NAMES.get(reg.id() as usize).copied().unwrap_or("?")
    }

    /// Whether the register is one of the argument registers.
    pub fn is_argument(reg: Register) -> bool {
        Self::ARGUMENT_REGISTERS.contains(&reg)
    }
}

// This module defines the error type shared by every stage of the backend using the thiserror
// crate. CompileError covers decoding failures (unknown opcodes, truncated operands, jump targets
// that do not land on an instruction), graph construction problems (falling off the end of the
// method, irreducible or malformed graphs, edges naming blocks that do not exist), HIR building failures (unsupported instructions,
// constant-pool inconsistencies, bad descriptors, operand stack underflow or mismatched stack depths
// at joins) and lowering failures. Each variant carries the address, opcode or index needed to
// find the offending instruction. CompileResult<T> is the convenience alias used throughout.

//! Error types for the bytecode backend.

use thiserror::Error;

/// Main error type for method compilation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("No operand length entry for opcode {opcode:#04x} at address {address}")]
    UnknownOpcode { opcode: u8, address: u32 },

    #[error("Instruction {opcode:#04x} at address {address} runs past the end of the code")]
    TruncatedInstruction { opcode: u8, address: u32 },

    #[error("Jump at address {address} targets {target}, which is not an instruction boundary")]
    InvalidJumpTarget { address: u32, target: i64 },

    #[error("Control falls through past the last instruction at address {address}")]
    FallThroughPastEnd { address: u32 },

    #[error("Unsupported instruction {opcode:#04x} at address {address}")]
    UnsupportedInstruction { opcode: u8, address: u32 },

    #[error("Constant pool has no entry at index {index}")]
    MissingConstant { index: u16 },

    #[error("Constant pool entry {index} is not a {expected}")]
    UnexpectedConstant { index: u16, expected: &'static str },

    #[error("Invalid descriptor {descriptor:?}: {reason}")]
    InvalidDescriptor { descriptor: String, reason: String },

    #[error("Local variable {index} at address {address} is outside the frame")]
    InvalidLocal { index: u16, address: u32 },

    #[error("Operand stack underflow at address {address}")]
    StackUnderflow { address: u32 },

    #[error("Operand stack depth mismatch entering block {block}: expected {expected}, found {found}")]
    StackMismatch {
        block: u32,
        expected: usize,
        found: usize,
    },

    #[error("Block B{block} is not in the graph")]
    UnknownBlock { block: u32 },

    #[error("Block layout error: {reason}")]
    BlockLayout { reason: String },

    #[error("Lowering failed: {reason}")]
    Lowering { reason: String },
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

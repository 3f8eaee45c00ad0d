//! StackJIT - bytecode backend from stack machine code to register LIR.
//!
//! Takes the flat bytecode of one method and recovers its structure: basic
//! blocks and control-flow edges, loops and dominators, an SSA-like HIR with
//! merge nodes in place of the operand stack, and finally a register-oriented
//! LIR that follows the target's calling convention and is ready for an
//! external register allocator and assembly emitter.
//!
//! # Primary Usage
//!
//! ```ignore
//! use stackjit::{CompilationSession, ConstantTable, MethodCompiler, MethodInfo};
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let pool = ConstantTable::new();
//!
//! let method = MethodInfo {
//!     owner: "Main",
//!     name: "three",
//!     descriptor: "()I",
//!     is_static: true,
//!     max_locals: 0,
//!     code: &[0x04, 0x05, 0x60, 0xac], // iconst_1 iconst_2 iadd ireturn
//! };
//! let compiled = MethodCompiler::new(&session, &pool).compile(&method)?;
//! println!("{}", compiled);
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Shared infrastructure (errors, session, register file)
//! - [`bytecode`] - Opcodes, instruction decoding, descriptors, constant pool
//! - [`cfg`] - Basic blocks, graph construction and flow analysis
//! - [`hir`] - High-level IR, its builder and merge-node cleanup
//! - [`lir`] - Low-level IR, calling convention and lowering
//! - [`compiler`] - Per-method pipeline driver

pub mod bytecode;
pub mod cfg;
pub mod compiler;
pub mod core;
pub mod hir;
pub mod lir;

pub use bytecode::{ConstantPool, ConstantTable, MemberRef, PoolEntry, Tuple, ValueType};
pub use cfg::{BasicBlock, BlockId, ControlFlowGraph};
pub use compiler::{CompiledMethod, MethodCompiler, MethodInfo};
pub use crate::core::{CompilationSession, CompileError, CompileResult, Register, RegisterFile, SessionStats};
pub use hir::{HirId, HirKind, HirNode};
pub use lir::{DataEntry, IntervalLookup, LirId, LirNode, LirOp};

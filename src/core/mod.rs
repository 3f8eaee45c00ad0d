// This module is the hub for infrastructure shared by every backend stage: the error type
// (CompileError with thiserror), the arena-backed compilation session that interns symbol names
// and accumulates statistics, and the fixed machine register file that defines physical register
// ids, argument and return registers and the boundary above which virtual registers are numbered.

//! Core backend infrastructure.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-backed string interning using `bumpalo`
//! - Per-session compilation statistics
//!
//! ## Register File (`register_file`)
//! - Physical/virtual register split
//! - Fixed argument, return and stack pointer registers
//!
//! ## Errors (`error`)
//! - One error enum for every stage, propagated with `?`

pub mod error;
pub mod register_file;
pub mod session;

pub use error::{CompileError, CompileResult};
pub use register_file::{Register, RegisterFile, FIRST_VIRTUAL_REGISTER, PHYSICAL_REGISTER_COUNT};
pub use session::{CompilationSession, SessionStats};

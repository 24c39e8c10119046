//! ELLE common types: the bytecode format and the program model.
//!
//! - [`Opcode`]: the 22 opcodes and their encoded sizes
//! - [`Instruction`]: one decoded instruction with big-endian immediates
//! - [`ProgramImage`]: the `ELLE` container, decoded but not verified
//! - [`Program`] / [`Function`]: the verified model the VM executes
//! - [`CodeBuilder`] / [`ProgramBuilder`]: programmatic construction
//! - [`disassemble`]: program dumps
//!
//! # Dependencies
//!
//! This crate uses `thiserror` and has no other dependencies.

pub mod builder;
pub mod disassembler;
pub mod error;
pub mod image;
pub mod instruction;
pub mod opcode;
pub mod program;

// Re-export commonly used types at the crate root.
pub use builder::{CodeBuilder, Label, ProgramBuilder};
pub use disassembler::disassemble;
pub use error::{BuildError, DecodeError, LoadError};
pub use image::{FunctionImage, ProgramImage, StringImage, EYECATCHER};
pub use instruction::{instructions, Instruction};
pub use opcode::{Opcode, UnknownOpcode};
pub use program::{Function, FunctionId, Program};

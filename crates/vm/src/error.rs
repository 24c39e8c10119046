//! Runtime errors for the ELLE VM.
//!
//! Verification rules out most faults before a program runs. What is left
//! is arithmetic, host I/O, and defensive checks on frame access.

use elle_common::DecodeError;
use thiserror::Error;

/// Errors that end a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// DIV or MOD with a zero divisor.
    #[error("division by zero in {function} at offset {at}")]
    DivisionByZero { function: String, at: usize },

    /// Opcode byte with no handler.
    #[error("unknown opcode {byte:#04x} in {function} at offset {at}")]
    UnknownOpcode {
        function: String,
        at: usize,
        byte: u8,
    },

    /// Stack, local or argument access outside the frame layout.
    #[error("frame access out of bounds in {function} at offset {at}")]
    CorruptFrame { function: String, at: usize },

    #[error("unknown function {id}")]
    UnknownFunction { id: usize },

    #[error("unknown string {id} in {function} at offset {at}")]
    UnknownString {
        function: String,
        at: usize,
        id: i64,
    },

    /// Entry call with the wrong number of arguments.
    #[error("{function} expects {expected} arguments, got {got}")]
    ArityMismatch {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("program has no function named main")]
    MissingMain,

    /// The host failed to write program output.
    #[error("output failed: {message}")]
    Output { message: String },
}

/// Why a call did not return a value.
///
/// `Halt` is not an error: it unwinds every active frame and ends the run
/// normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Interrupt {
    #[error("halted")]
    Halt,

    #[error(transparent)]
    Fault(#[from] RuntimeError),
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The entry function returned a value.
    Returned(i64),
    /// HALT executed somewhere in the call chain.
    Halted,
}

/// Failure to produce compiled code. The function stays interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("cannot decode {function}: {source}")]
    Decode {
        function: String,
        #[source]
        source: DecodeError,
    },

    #[error("jump target {target} in {function} at offset {at} is not an instruction")]
    BadJumpTarget {
        function: String,
        at: usize,
        target: i64,
    },

    #[error("negative operand {value} in {function} at offset {at}")]
    NegativeOperand {
        function: String,
        at: usize,
        value: i64,
    },

    /// The backend does not handle this function.
    #[error("{function} not supported: {reason}")]
    Unsupported { function: String, reason: String },
}

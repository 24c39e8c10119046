//! Errors for decoding ELLE instructions and program containers.
//!
//! Every error carries the byte offset (`at`) where the problem was found.

use crate::opcode::Opcode;
use thiserror::Error;

/// Errors from decoding a single instruction inside a code buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The byte at `at` is not an opcode.
    #[error("unknown opcode {byte:#04x} at offset {at}")]
    UnknownOpcode { at: usize, byte: u8 },

    /// The instruction's operands run past the end of the code.
    #[error("truncated {} at offset {at}", .opcode.mnemonic())]
    Truncated { at: usize, opcode: Opcode },
}

impl DecodeError {
    /// Offset of the offending instruction.
    pub fn at(&self) -> usize {
        match self {
            DecodeError::UnknownOpcode { at, .. } | DecodeError::Truncated { at, .. } => *at,
        }
    }
}

/// Errors from decoding a program container. These are always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Opening or closing eyecatcher is not `ELLE`.
    #[error("bad eyecatcher at byte {at}: expected \"ELLE\"")]
    BadEyecatcher { at: usize },

    /// Input ended before a field could be read.
    #[error("unexpected end of input at byte {at}: {needed} more bytes needed")]
    Truncated { at: usize, needed: usize },

    /// A name length byte above 127.
    #[error("name length {len} at byte {at} exceeds 127")]
    NameTooLong { at: usize, len: u8 },

    /// A name that is not valid UTF-8.
    #[error("name at byte {at} is not valid UTF-8")]
    InvalidName { at: usize },

    /// Function count byte above 127.
    #[error("function count {count} exceeds 127")]
    TooManyFunctions { count: u8 },

    /// A size, count or argument count field that is negative.
    #[error("negative {field} {value} at byte {at}")]
    NegativeField {
        at: usize,
        field: &'static str,
        value: i64,
    },

    /// Function ID outside `0..functionCount`.
    #[error("function id {id} at byte {at} out of range (function count {count})")]
    FunctionIdOutOfRange { at: usize, id: i64, count: usize },

    /// Two functions claim the same ID.
    #[error("duplicate function id {id} at byte {at}")]
    DuplicateFunction { at: usize, id: usize },

    /// String ID outside `0..stringCount`.
    #[error("string id {id} at byte {at} out of range (string count {count})")]
    StringIdOutOfRange { at: usize, id: i64, count: i64 },

    /// Two strings claim the same ID.
    #[error("duplicate string id {id} at byte {at}")]
    DuplicateString { at: usize, id: usize },

    /// Data after the closing eyecatcher.
    #[error("{count} trailing bytes after closing eyecatcher")]
    TrailingBytes { count: usize },
}

/// Errors from assembling code with [`crate::builder::CodeBuilder`] or
/// [`crate::builder::ProgramBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A jump refers to a label that was never bound.
    #[error("label {label} used but never bound")]
    UnboundLabel { label: usize },

    /// A label was bound twice.
    #[error("label {label} bound more than once")]
    LabelRebound { label: usize },

    /// `define` named a function that was never declared.
    #[error("function {id} was never declared")]
    UndeclaredFunction { id: usize },

    /// `build` found a declared function without a body.
    #[error("function {name:?} declared but never defined")]
    UndefinedFunction { name: String },

    /// A program or function name longer than the container allows.
    #[error("name {name:?} is {len} bytes, limit is 127")]
    NameTooLong { name: String, len: usize },

    /// More functions than the container's one-byte count can hold.
    #[error("{count} functions, limit is 127")]
    TooManyFunctions { count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_decode_errors() {
        assert_eq!(
            DecodeError::UnknownOpcode { at: 4, byte: 0x30 }.to_string(),
            "unknown opcode 0x30 at offset 4"
        );
        assert_eq!(
            DecodeError::Truncated {
                at: 0,
                opcode: Opcode::Call
            }
            .to_string(),
            "truncated CALL at offset 0"
        );
    }

    #[test]
    fn display_load_errors() {
        assert_eq!(
            LoadError::BadEyecatcher { at: 0 }.to_string(),
            "bad eyecatcher at byte 0: expected \"ELLE\""
        );
        assert_eq!(
            LoadError::NegativeField {
                at: 12,
                field: "argCount",
                value: -1
            }
            .to_string(),
            "negative argCount -1 at byte 12"
        );
        assert_eq!(
            LoadError::TrailingBytes { count: 3 }.to_string(),
            "3 trailing bytes after closing eyecatcher"
        );
    }

    #[test]
    fn decode_error_offset() {
        assert_eq!(DecodeError::UnknownOpcode { at: 9, byte: 99 }.at(), 9);
    }
}

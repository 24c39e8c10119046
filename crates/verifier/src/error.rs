//! Verification errors for the ELLE verifier.
//!
//! Every error names the function and, where it applies, the byte offset
//! (`at`) of the offending instruction. The verifier reports the first error
//! found in each function and collects errors across functions.

use elle_common::LoadError;
use thiserror::Error;

/// Errors found during static verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    // --- Stack simulation ---
    /// A jump target or join point reached with two different depths.
    #[error("stack depth mismatch in {function} at offset {at}: expected {expected}, found {found}")]
    StackMismatch {
        function: String,
        at: usize,
        expected: usize,
        found: usize,
    },

    /// An instruction no path can reach.
    #[error("unreachable instruction in {function} at offset {at}")]
    UnreachableInstruction { function: String, at: usize },

    /// RET with anything other than exactly one value on the stack.
    #[error("RET in {function} at offset {at} with stack depth {depth} (expected 1)")]
    ReturnDepth {
        function: String,
        at: usize,
        depth: usize,
    },

    /// An instruction pops more values than the stack holds.
    #[error("stack underflow in {function} at offset {at}")]
    StackUnderflow { function: String, at: usize },

    #[error("unknown opcode {byte:#04x} in {function} at offset {at}")]
    UnknownOpcode {
        function: String,
        at: usize,
        byte: u8,
    },

    /// Operands run past the end of the code.
    #[error("truncated instruction in {function} at offset {at}")]
    TruncatedInstruction { function: String, at: usize },

    /// Jump target negative, past the end, or inside an instruction.
    #[error("invalid jump target {target} in {function} at offset {at}")]
    InvalidJumpTarget {
        function: String,
        at: usize,
        target: i64,
    },

    /// Control can run off the end of the code.
    #[error("execution falls off the end of {function}")]
    FallsOffEnd { function: String },

    /// Negative argument, local or argument-count immediate.
    #[error("negative operand {value} in {function} at offset {at}")]
    NegativeOperand {
        function: String,
        at: usize,
        value: i64,
    },

    // --- Limits ---
    /// A local index beyond the frame size limit.
    #[error("local index {index} in {function} at offset {at} exceeds the limit")]
    TooManyLocals {
        function: String,
        at: usize,
        index: i64,
    },

    // --- Linking ---
    /// CALL to a function ID not in the table.
    #[error("call to unknown function {id} in {function} at offset {at}")]
    UnknownFunction { function: String, at: usize, id: i64 },

    /// CALL passing a different count than the callee declares.
    #[error("call to {callee} in {function} at offset {at} passes {passed} arguments, callee declares {declared}")]
    ArgCountMismatch {
        function: String,
        at: usize,
        callee: String,
        passed: i64,
        declared: usize,
    },

    /// PRINT_STRING of a string ID not in the table.
    #[error("unknown string {id} in {function} at offset {at}")]
    UnknownString { function: String, at: usize, id: i64 },

    /// PUSH_ARG beyond the function's declared argument count.
    #[error("argument index {index} in {function} at offset {at} out of range (argCount {arg_count})")]
    ArgIndexOutOfRange {
        function: String,
        at: usize,
        index: i64,
        arg_count: usize,
    },
}

/// Errors from [`crate::load`]: either the container is malformed or its code
/// fails verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("program failed verification with {} error(s)", .0.len())]
    Verify(Vec<VerifyError>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        assert_eq!(
            VerifyError::UnreachableInstruction {
                function: "main".into(),
                at: 10
            }
            .to_string(),
            "unreachable instruction in main at offset 10"
        );
        assert_eq!(
            VerifyError::ReturnDepth {
                function: "f".into(),
                at: 19,
                depth: 2
            }
            .to_string(),
            "RET in f at offset 19 with stack depth 2 (expected 1)"
        );
        assert_eq!(
            ProgramError::Verify(vec![VerifyError::FallsOffEnd {
                function: "g".into()
            }])
            .to_string(),
            "program failed verification with 1 error(s)"
        );
    }

    #[test]
    fn load_errors_pass_through() {
        let err: ProgramError = LoadError::TrailingBytes { count: 1 }.into();
        assert_eq!(err.to_string(), "1 trailing bytes after closing eyecatcher");
    }
}

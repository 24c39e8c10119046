//! Opcode definitions for the ELLE instruction set.
//!
//! Byte values are the declaration order of the instruction set and are part
//! of the container format: changing them breaks every existing program file.

use thiserror::Error;

/// A byte that does not name any opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown opcode {0:#04x}")]
pub struct UnknownOpcode(pub u8);

/// Identifies the operation to perform.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    /// Do nothing.
    Nop = 0,

    // Stack and storage
    /// Push the immediate 64-bit constant.
    PushConstant = 1,
    /// Push `args[index]`.
    PushArg = 2,
    /// Push `locals[index]`.
    PushLocal = 3,
    /// Discard the top of stack.
    Pop = 4,
    /// Pop into `locals[index]`.
    PopLocal = 5,
    /// Duplicate the top of stack.
    Dup = 6,

    // Arithmetic: pop right, pop left, push `left OP right`
    /// Wrapping addition.
    Add = 7,
    /// Wrapping subtraction.
    Sub = 8,
    /// Wrapping multiplication.
    Mul = 9,
    /// Truncating division. Division by zero traps.
    Div = 10,
    /// Remainder. A zero divisor traps.
    Mod = 11,

    // Control flow
    /// Unconditional jump to a byte offset.
    Jmp = 12,
    /// Pop right, pop left, jump if `left == right`.
    Jmpe = 13,
    /// Pop right, pop left, jump if `left < right`.
    Jmpl = 14,
    /// Pop right, pop left, jump if `left > right`.
    Jmpg = 15,
    /// Call a function, passing the top `argCount` stack slots.
    Call = 16,
    /// Return the single value left on the stack.
    Ret = 17,

    // Host built-ins
    /// Print a string from the program's string table.
    PrintString = 18,
    /// Pop and print a signed 64-bit integer.
    PrintInt64 = 19,
    /// Push wall-clock time in milliseconds since the Unix epoch.
    CurrentTime = 20,
    /// End the whole run.
    Halt = 21,
}

/// All opcodes in byte order. `ALL_OPCODES[b]` has byte value `b`.
pub const ALL_OPCODES: [Opcode; 22] = [
    Opcode::Nop,
    Opcode::PushConstant,
    Opcode::PushArg,
    Opcode::PushLocal,
    Opcode::Pop,
    Opcode::PopLocal,
    Opcode::Dup,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::Mod,
    Opcode::Jmp,
    Opcode::Jmpe,
    Opcode::Jmpl,
    Opcode::Jmpg,
    Opcode::Call,
    Opcode::Ret,
    Opcode::PrintString,
    Opcode::PrintInt64,
    Opcode::CurrentTime,
    Opcode::Halt,
];

/// Size in bytes of one immediate operand.
pub const OPERAND_SIZE: usize = 8;

impl TryFrom<u8> for Opcode {
    type Error = UnknownOpcode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ALL_OPCODES
            .get(value as usize)
            .copied()
            .ok_or(UnknownOpcode(value))
    }
}

impl Opcode {
    /// Returns the mnemonic used by the disassembler.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::PushConstant => "PUSH_CONSTANT",
            Opcode::PushArg => "PUSH_ARG",
            Opcode::PushLocal => "PUSH_LOCAL",
            Opcode::Pop => "POP",
            Opcode::PopLocal => "POP_LOCAL",
            Opcode::Dup => "DUP",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Jmp => "JMP",
            Opcode::Jmpe => "JMPE",
            Opcode::Jmpl => "JMPL",
            Opcode::Jmpg => "JMPG",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::PrintString => "PRINT_STRING",
            Opcode::PrintInt64 => "PRINT_INT64",
            Opcode::CurrentTime => "CURRENT_TIME",
            Opcode::Halt => "HALT",
        }
    }

    /// Look an opcode up by mnemonic (case-sensitive).
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        ALL_OPCODES
            .iter()
            .copied()
            .find(|op| op.mnemonic() == mnemonic)
    }

    /// Number of 8-byte immediates following the opcode byte.
    pub fn operand_count(&self) -> usize {
        match self {
            Opcode::PushConstant
            | Opcode::PushArg
            | Opcode::PushLocal
            | Opcode::PopLocal
            | Opcode::Jmp
            | Opcode::Jmpe
            | Opcode::Jmpl
            | Opcode::Jmpg
            | Opcode::PrintString => 1,
            Opcode::Call => 2,
            _ => 0,
        }
    }

    /// Total encoded size: 1, 9 or 17 bytes.
    pub fn encoded_len(&self) -> usize {
        1 + self.operand_count() * OPERAND_SIZE
    }

    /// True for opcodes after which control never falls through.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::Ret | Opcode::Halt)
    }

    /// True for the three conditional jumps.
    pub fn is_conditional_jump(&self) -> bool {
        matches!(self, Opcode::Jmpe | Opcode::Jmpl | Opcode::Jmpg)
    }
}

//! Instruction encoding and decoding for the ELLE instruction set.
//!
//! Instructions are variable length:
//! ```text
//! Byte 0:     opcode (u8)
//! Bytes 1-8:  first immediate (i64, big-endian), if any
//! Bytes 9-16: second immediate (i64, big-endian), CALL only
//! ```
//! Jump targets are byte offsets from the start of the function's code.

use crate::error::DecodeError;
use crate::opcode::{Opcode, OPERAND_SIZE};

/// A single decoded ELLE instruction with its immediates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    PushConstant(i64),
    PushArg(i64),
    PushLocal(i64),
    Pop,
    PopLocal(i64),
    Dup,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Jmp(i64),
    Jmpe(i64),
    Jmpl(i64),
    Jmpg(i64),
    /// Call `function`, passing the top `args` stack slots.
    Call {
        function: i64,
        args: i64,
    },
    Ret,
    PrintString(i64),
    PrintInt64,
    CurrentTime,
    Halt,
}

/// Read immediate number `index` of the instruction starting at `at`.
///
/// Returns `None` if the immediate runs past the end of `code`.
pub fn operand(code: &[u8], at: usize, index: usize) -> Option<i64> {
    let start = at.checked_add(1 + index * OPERAND_SIZE)?;
    let bytes = code.get(start..start.checked_add(OPERAND_SIZE)?)?;
    let mut raw = [0u8; OPERAND_SIZE];
    raw.copy_from_slice(bytes);
    Some(i64::from_be_bytes(raw))
}

impl Instruction {
    /// The opcode of this instruction.
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nop => Opcode::Nop,
            Instruction::PushConstant(_) => Opcode::PushConstant,
            Instruction::PushArg(_) => Opcode::PushArg,
            Instruction::PushLocal(_) => Opcode::PushLocal,
            Instruction::Pop => Opcode::Pop,
            Instruction::PopLocal(_) => Opcode::PopLocal,
            Instruction::Dup => Opcode::Dup,
            Instruction::Add => Opcode::Add,
            Instruction::Sub => Opcode::Sub,
            Instruction::Mul => Opcode::Mul,
            Instruction::Div => Opcode::Div,
            Instruction::Mod => Opcode::Mod,
            Instruction::Jmp(_) => Opcode::Jmp,
            Instruction::Jmpe(_) => Opcode::Jmpe,
            Instruction::Jmpl(_) => Opcode::Jmpl,
            Instruction::Jmpg(_) => Opcode::Jmpg,
            Instruction::Call { .. } => Opcode::Call,
            Instruction::Ret => Opcode::Ret,
            Instruction::PrintString(_) => Opcode::PrintString,
            Instruction::PrintInt64 => Opcode::PrintInt64,
            Instruction::CurrentTime => Opcode::CurrentTime,
            Instruction::Halt => Opcode::Halt,
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        self.opcode().encoded_len()
    }

    /// The jump destination, for the four jump instructions.
    pub fn jump_target(&self) -> Option<i64> {
        match *self {
            Instruction::Jmp(t)
            | Instruction::Jmpe(t)
            | Instruction::Jmpl(t)
            | Instruction::Jmpg(t) => Some(t),
            _ => None,
        }
    }

    /// Append the encoded instruction to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode() as u8);
        match *self {
            Instruction::PushConstant(v)
            | Instruction::PushArg(v)
            | Instruction::PushLocal(v)
            | Instruction::PopLocal(v)
            | Instruction::Jmp(v)
            | Instruction::Jmpe(v)
            | Instruction::Jmpl(v)
            | Instruction::Jmpg(v)
            | Instruction::PrintString(v) => out.extend_from_slice(&v.to_be_bytes()),
            Instruction::Call { function, args } => {
                out.extend_from_slice(&function.to_be_bytes());
                out.extend_from_slice(&args.to_be_bytes());
            }
            _ => {}
        }
    }

    /// Decode the instruction starting at byte `at` of `code`.
    pub fn decode(code: &[u8], at: usize) -> Result<Self, DecodeError> {
        let byte = *code.get(at).ok_or(DecodeError::Truncated {
            at,
            opcode: Opcode::Nop,
        })?;
        let opcode = Opcode::try_from(byte).map_err(|_| DecodeError::UnknownOpcode { at, byte })?;
        let imm = |index: usize| operand(code, at, index).ok_or(DecodeError::Truncated { at, opcode });

        Ok(match opcode {
            Opcode::Nop => Instruction::Nop,
            Opcode::PushConstant => Instruction::PushConstant(imm(0)?),
            Opcode::PushArg => Instruction::PushArg(imm(0)?),
            Opcode::PushLocal => Instruction::PushLocal(imm(0)?),
            Opcode::Pop => Instruction::Pop,
            Opcode::PopLocal => Instruction::PopLocal(imm(0)?),
            Opcode::Dup => Instruction::Dup,
            Opcode::Add => Instruction::Add,
            Opcode::Sub => Instruction::Sub,
            Opcode::Mul => Instruction::Mul,
            Opcode::Div => Instruction::Div,
            Opcode::Mod => Instruction::Mod,
            Opcode::Jmp => Instruction::Jmp(imm(0)?),
            Opcode::Jmpe => Instruction::Jmpe(imm(0)?),
            Opcode::Jmpl => Instruction::Jmpl(imm(0)?),
            Opcode::Jmpg => Instruction::Jmpg(imm(0)?),
            Opcode::Call => Instruction::Call {
                function: imm(0)?,
                args: imm(1)?,
            },
            Opcode::Ret => Instruction::Ret,
            Opcode::PrintString => Instruction::PrintString(imm(0)?),
            Opcode::PrintInt64 => Instruction::PrintInt64,
            Opcode::CurrentTime => Instruction::CurrentTime,
            Opcode::Halt => Instruction::Halt,
        })
    }
}

/// Iterator over `(offset, instruction)` pairs of a code buffer.
///
/// Yields at most one error and then stops.
pub struct Instructions<'a> {
    code: &'a [u8],
    offset: usize,
    failed: bool,
}

/// Walk the instructions of `code` from offset 0.
pub fn instructions(code: &[u8]) -> Instructions<'_> {
    Instructions {
        code,
        offset: 0,
        failed: false,
    }
}

impl Iterator for Instructions<'_> {
    type Item = Result<(usize, Instruction), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }
        let at = self.offset;
        match Instruction::decode(self.code, at) {
            Ok(instr) => {
                self.offset += instr.encoded_len();
                Some(Ok((at, instr)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(instrs: &[Instruction]) -> Vec<u8> {
        let mut out = Vec::new();
        for instr in instrs {
            instr.encode(&mut out);
        }
        out
    }

    #[test]
    fn operands_are_big_endian() {
        let bytes = encoded(&[Instruction::PushConstant(0x0102)]);
        assert_eq!(bytes, vec![1, 0, 0, 0, 0, 0, 0, 0x01, 0x02]);
    }

    #[test]
    fn call_carries_two_operands() {
        let call = Instruction::Call {
            function: 3,
            args: 2,
        };
        let bytes = encoded(&[call]);
        assert_eq!(bytes.len(), 17);
        assert_eq!(Instruction::decode(&bytes, 0), Ok(call));
        assert_eq!(operand(&bytes, 0, 1), Some(2));
    }

    #[test]
    fn negative_constant_survives() {
        let bytes = encoded(&[Instruction::PushConstant(-7)]);
        assert_eq!(
            Instruction::decode(&bytes, 0),
            Ok(Instruction::PushConstant(-7))
        );
    }

    #[test]
    fn decode_unknown_opcode() {
        assert_eq!(
            Instruction::decode(&[0, 99], 1),
            Err(DecodeError::UnknownOpcode { at: 1, byte: 99 })
        );
    }

    #[test]
    fn decode_truncated_operand() {
        let mut bytes = encoded(&[Instruction::Jmp(5)]);
        bytes.pop();
        assert_eq!(
            Instruction::decode(&bytes, 0),
            Err(DecodeError::Truncated {
                at: 0,
                opcode: Opcode::Jmp
            })
        );
    }

    #[test]
    fn iterate_offsets() {
        let code = encoded(&[
            Instruction::PushConstant(2),
            Instruction::PushConstant(3),
            Instruction::Add,
            Instruction::Ret,
        ]);
        let offsets: Vec<usize> = instructions(&code).map(|r| r.unwrap().0).collect();
        assert_eq!(offsets, vec![0, 9, 18, 19]);
    }

    #[test]
    fn iteration_stops_after_error() {
        let code = [Opcode::Add as u8, 200, Opcode::Ret as u8];
        let items: Vec<_> = instructions(&code).collect();
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[test]
    fn jump_targets() {
        assert_eq!(Instruction::Jmpl(18).jump_target(), Some(18));
        assert_eq!(Instruction::PushConstant(18).jump_target(), None);
    }
}

//! Abstract stack-depth simulation.
//!
//! Walks one function's code linearly, tracking the operand stack depth
//! before every instruction. After a terminal instruction (JMP, RET, HALT)
//! the depth is unknown until the walk reaches an offset some earlier jump
//! recorded. Every path into an offset must agree on its depth.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::VerifyError;
use crate::limits::check_local_index;
use elle_common::{DecodeError, FunctionImage, Instruction};

/// What the simulation learned about a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSummary {
    /// Highest depth reached.
    pub max_stack_depth: usize,
    /// `1 + highest local index`, or 0 if no locals are used.
    pub local_count: usize,
    /// Depth before each instruction, keyed by byte offset.
    pub depths: BTreeMap<usize, usize>,
}

/// Simulate `function`, stopping at its first error.
pub fn simulate(function: &FunctionImage) -> Result<StackSummary, VerifyError> {
    let name = function.name.as_str();
    let code = function.code.as_slice();

    let mut depths: BTreeMap<usize, usize> = BTreeMap::new();
    let mut starts = BTreeSet::new();
    let mut forward_jumps: Vec<(usize, usize)> = Vec::new();
    let mut depth: Option<usize> = Some(0);
    let mut max_stack_depth = 0;
    let mut local_count = 0;
    let mut offset = 0;

    while offset < code.len() {
        let current = match (depth, depths.get(&offset).copied()) {
            (None, Some(recorded)) => recorded,
            (None, None) => {
                return Err(VerifyError::UnreachableInstruction {
                    function: name.to_string(),
                    at: offset,
                })
            }
            (Some(found), Some(expected)) if found != expected => {
                return Err(VerifyError::StackMismatch {
                    function: name.to_string(),
                    at: offset,
                    expected,
                    found,
                })
            }
            (Some(found), _) => found,
        };
        depths.insert(offset, current);
        starts.insert(offset);

        let instr = Instruction::decode(code, offset).map_err(|e| match e {
            DecodeError::UnknownOpcode { at, byte } => VerifyError::UnknownOpcode {
                function: name.to_string(),
                at,
                byte,
            },
            DecodeError::Truncated { at, .. } => VerifyError::TruncatedInstruction {
                function: name.to_string(),
                at,
            },
        })?;

        if instr == Instruction::Ret && current != 1 {
            return Err(VerifyError::ReturnDepth {
                function: name.to_string(),
                at: offset,
                depth: current,
            });
        }

        let (pops, pushes) = stack_effect(name, offset, &instr)?;
        if current < pops {
            return Err(VerifyError::StackUnderflow {
                function: name.to_string(),
                at: offset,
            });
        }
        let after = current - pops + pushes;
        max_stack_depth = max_stack_depth.max(after);

        match instr {
            Instruction::PushArg(index) => {
                non_negative(name, offset, index)?;
            }
            Instruction::PushLocal(index) | Instruction::PopLocal(index) => {
                non_negative(name, offset, index)?;
                let slot = check_local_index(name, offset, index)?;
                local_count = local_count.max(slot + 1);
            }
            _ => {}
        }

        if let Some(target) = instr.jump_target() {
            let invalid = || VerifyError::InvalidJumpTarget {
                function: name.to_string(),
                at: offset,
                target,
            };
            let dest = usize::try_from(target)
                .ok()
                .filter(|&t| t < code.len())
                .ok_or_else(invalid)?;

            match depths.get(&dest).copied() {
                Some(expected) if expected != after => {
                    return Err(VerifyError::StackMismatch {
                        function: name.to_string(),
                        at: dest,
                        expected,
                        found: after,
                    })
                }
                Some(_) => {}
                // Backward targets were all visited; a miss lands mid-instruction.
                None if dest <= offset => return Err(invalid()),
                None => {
                    depths.insert(dest, after);
                }
            }
            if dest > offset {
                forward_jumps.push((offset, dest));
            }
        }

        depth = if instr.opcode().is_terminal() {
            None
        } else {
            Some(after)
        };
        offset += instr.encoded_len();
    }

    if depth.is_some() {
        return Err(VerifyError::FallsOffEnd {
            function: name.to_string(),
        });
    }

    if let Some(&(at, dest)) = forward_jumps.iter().find(|(_, dest)| !starts.contains(dest)) {
        return Err(VerifyError::InvalidJumpTarget {
            function: name.to_string(),
            at,
            target: dest as i64,
        });
    }

    Ok(StackSummary {
        max_stack_depth,
        local_count,
        depths,
    })
}

/// Values popped and pushed by an instruction.
fn stack_effect(
    function: &str,
    at: usize,
    instr: &Instruction,
) -> Result<(usize, usize), VerifyError> {
    Ok(match *instr {
        Instruction::Nop | Instruction::Jmp(_) | Instruction::PrintString(_) | Instruction::Halt => {
            (0, 0)
        }
        Instruction::PushConstant(_)
        | Instruction::PushArg(_)
        | Instruction::PushLocal(_)
        | Instruction::CurrentTime => (0, 1),
        Instruction::Pop | Instruction::PopLocal(_) | Instruction::PrintInt64 | Instruction::Ret => {
            (1, 0)
        }
        Instruction::Dup => (1, 2),
        Instruction::Add
        | Instruction::Sub
        | Instruction::Mul
        | Instruction::Div
        | Instruction::Mod => (2, 1),
        Instruction::Jmpe(_) | Instruction::Jmpl(_) | Instruction::Jmpg(_) => (2, 0),
        Instruction::Call { args, .. } => (non_negative(function, at, args)?, 1),
    })
}

fn non_negative(function: &str, at: usize, value: i64) -> Result<usize, VerifyError> {
    usize::try_from(value).map_err(|_| VerifyError::NegativeOperand {
        function: function.to_string(),
        at,
        value,
    })
}

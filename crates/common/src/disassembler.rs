//! Human-readable program dumps.
//!
//! ```text
//! Dumping Program: fib
//! Function: main opcodeCount 20
//! 	0	PUSH_CONSTANT 10
//! 	9	CALL fib(1) 1
//! 	26	RET
//! ```

use std::fmt::Write;

use crate::instruction::{instructions, Instruction};
use crate::program::{Function, Program};

/// Dump every function of `program`.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Dumping Program: {}", program.name);
    for function in &program.functions {
        out.push_str(&disassemble_function(program, function));
    }
    out
}

/// Dump one function, resolving CALL targets and strings against `program`.
pub fn disassemble_function(program: &Program, function: &Function) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Function: {} opcodeCount {}",
        function.name,
        function.code.len()
    );
    for item in instructions(&function.code) {
        let (offset, instr) = match item {
            Ok(pair) => pair,
            Err(e) => {
                let _ = writeln!(out, "\t{}\t<{e}>", e.at());
                break;
            }
        };
        let _ = write!(out, "\t{offset}\t{}", instr.opcode().mnemonic());
        match instr {
            Instruction::PushConstant(v)
            | Instruction::PushArg(v)
            | Instruction::PushLocal(v)
            | Instruction::PopLocal(v)
            | Instruction::Jmp(v)
            | Instruction::Jmpe(v)
            | Instruction::Jmpl(v)
            | Instruction::Jmpg(v) => {
                let _ = write!(out, " {v}");
            }
            Instruction::Call { function, args } => {
                let name = usize::try_from(function)
                    .ok()
                    .and_then(|id| program.function(id))
                    .map_or("?", |f| f.name.as_str());
                let _ = write!(out, " {name}({function}) {args}");
            }
            Instruction::PrintString(id) => {
                let text = usize::try_from(id)
                    .ok()
                    .and_then(|id| program.string(id))
                    .map(|s| String::from_utf8_lossy(s).replace('\n', "\\n"))
                    .unwrap_or_default();
                let _ = write!(out, " \"{text}\"");
            }
            _ => {}
        }
        out.push('\n');
    }
    out
}

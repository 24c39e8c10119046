//! Threaded-code backend.
//!
//! Compilation pre-decodes a verified function into a flat list of [`Op`]s:
//! operands are parsed once, NOPs disappear, and jump targets become indices
//! into the op list. Execution uses the same frames, arithmetic and calling
//! convention as the interpreter, so results are identical.

use std::collections::BTreeMap;
use std::io;
use std::rc::Rc;

use crate::arith::{BinaryOp, Condition};
use crate::error::{CompileError, Interrupt, RuntimeError};
use crate::frame::Frame;
use crate::host::TraceEvent;
use crate::machine::Vm;
use crate::tiering::{CompiledCode, Compiler};
use elle_common::{instructions, Function, FunctionId, Instruction, Opcode, Program};

/// One pre-decoded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    PushConstant(i64),
    PushArg(usize),
    PushLocal(usize),
    Pop,
    PopLocal(usize),
    Dup,
    Binary(BinaryOp),
    /// Unconditional jump to an op index.
    Jump(usize),
    /// Pop right then left; jump to the op index if the condition holds.
    Branch(Condition, usize),
    Call { function: FunctionId, args: usize },
    Ret,
    PrintString(usize),
    PrintInt64,
    CurrentTime,
    Halt,
}

/// The default [`Compiler`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadedCompiler;

impl Compiler for ThreadedCompiler {
    fn compile(
        &self,
        program: &Program,
        function: &Function,
    ) -> Result<Rc<dyn CompiledCode>, CompileError> {
        Ok(Rc::new(ThreadedCode::translate(program, function)?))
    }
}

/// A compiled function.
#[derive(Debug)]
pub struct ThreadedCode {
    function: Function,
    ops: Vec<Op>,
    /// Byte offset of each op in the original code.
    offsets: Vec<usize>,
}

impl ThreadedCode {
    pub fn translate(program: &Program, function: &Function) -> Result<Self, CompileError> {
        let decoded = instructions(&function.code)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| CompileError::Decode {
                function: function.name.clone(),
                source,
            })?;

        // A NOP maps to the op that follows it.
        let mut targets = BTreeMap::new();
        let mut offsets = Vec::with_capacity(decoded.len());
        for (at, instr) in &decoded {
            targets.insert(*at, offsets.len());
            if *instr != Instruction::Nop {
                offsets.push(*at);
            }
        }

        let index = |at: usize, value: i64| {
            usize::try_from(value).map_err(|_| CompileError::NegativeOperand {
                function: function.name.clone(),
                at,
                value,
            })
        };
        let target = |at: usize, value: i64| {
            usize::try_from(value)
                .ok()
                .and_then(|offset| targets.get(&offset).copied())
                .ok_or_else(|| CompileError::BadJumpTarget {
                    function: function.name.clone(),
                    at,
                    target: value,
                })
        };

        let mut ops = Vec::with_capacity(offsets.len());
        for (at, instr) in decoded {
            let op = match instr {
                Instruction::Nop => continue,
                Instruction::PushConstant(v) => Op::PushConstant(v),
                Instruction::PushArg(i) => Op::PushArg(index(at, i)?),
                Instruction::PushLocal(i) => Op::PushLocal(index(at, i)?),
                Instruction::Pop => Op::Pop,
                Instruction::PopLocal(i) => Op::PopLocal(index(at, i)?),
                Instruction::Dup => Op::Dup,
                Instruction::Add => Op::Binary(BinaryOp::Add),
                Instruction::Sub => Op::Binary(BinaryOp::Sub),
                Instruction::Mul => Op::Binary(BinaryOp::Mul),
                Instruction::Div => Op::Binary(BinaryOp::Div),
                Instruction::Mod => Op::Binary(BinaryOp::Mod),
                Instruction::Jmp(t) => Op::Jump(target(at, t)?),
                Instruction::Jmpe(t) => Op::Branch(Condition::Equal, target(at, t)?),
                Instruction::Jmpl(t) => Op::Branch(Condition::Less, target(at, t)?),
                Instruction::Jmpg(t) => Op::Branch(Condition::Greater, target(at, t)?),
                Instruction::Call { function: f, args } => {
                    let callee = index(at, f)?;
                    if program.function(callee).is_none() {
                        return Err(CompileError::Unsupported {
                            function: function.name.clone(),
                            reason: format!("call to unknown function {callee}"),
                        });
                    }
                    Op::Call {
                        function: callee,
                        args: index(at, args)?,
                    }
                }
                Instruction::Ret => Op::Ret,
                Instruction::PrintString(s) => Op::PrintString(index(at, s)?),
                Instruction::PrintInt64 => Op::PrintInt64,
                Instruction::CurrentTime => Op::CurrentTime,
                Instruction::Halt => Op::Halt,
            };
            ops.push(op);
        }

        Ok(Self {
            function: function.clone(),
            ops,
            offsets,
        })
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Byte offset of op `index`, or the code length past the last op.
    fn offset(&self, index: usize) -> usize {
        self.offsets
            .get(index)
            .copied()
            .unwrap_or(self.function.code.len())
    }

    fn fault(&self, index: usize) -> Interrupt {
        RuntimeError::CorruptFrame {
            function: self.function.name.clone(),
            at: self.offset(index),
        }
        .into()
    }

    /// Report op `index` with the byte offset and opcode it was built from.
    fn trace(&self, vm: &mut Vm, index: usize, depth: usize) {
        let offset = self.offset(index);
        let Some(opcode) = self
            .function
            .code
            .get(offset)
            .and_then(|&b| Opcode::try_from(b).ok())
        else {
            return;
        };
        let event = TraceEvent {
            function: &self.function.name,
            offset,
            opcode,
            depth,
            call_depth: vm.chain.len(),
        };
        vm.host.trace(&event);
    }

    fn execute(&self, vm: &mut Vm, frame: &mut Frame<'_>) -> Result<i64, Interrupt> {
        let output = |e: io::Error| RuntimeError::Output {
            message: e.to_string(),
        };
        let mut pc = 0;
        loop {
            let at = pc;
            let op = *self.ops.get(at).ok_or_else(|| self.fault(at))?;
            if vm.config.trace {
                self.trace(vm, at, frame.depth());
            }
            pc += 1;
            let push = |frame: &mut Frame<'_>, value| frame.push(value).ok_or_else(|| self.fault(at));
            let pop = |frame: &mut Frame<'_>| frame.pop().ok_or_else(|| self.fault(at));

            match op {
                Op::PushConstant(v) => push(frame, v)?,
                Op::PushArg(i) => {
                    let value = frame.arg(i).ok_or_else(|| self.fault(at))?;
                    push(frame, value)?;
                }
                Op::PushLocal(i) => {
                    let value = frame.local(i).ok_or_else(|| self.fault(at))?;
                    push(frame, value)?;
                }
                Op::Pop => {
                    pop(frame)?;
                }
                Op::PopLocal(i) => {
                    let value = pop(frame)?;
                    frame.set_local(i, value).ok_or_else(|| self.fault(at))?;
                }
                Op::Dup => {
                    let value = frame.peek().ok_or_else(|| self.fault(at))?;
                    push(frame, value)?;
                }
                Op::Binary(op) => {
                    let right = pop(frame)?;
                    let left = pop(frame)?;
                    let value = op.apply(left, right).ok_or_else(|| RuntimeError::DivisionByZero {
                        function: self.function.name.clone(),
                        at: self.offset(at),
                    })?;
                    push(frame, value)?;
                }
                Op::Jump(target) => pc = target,
                Op::Branch(cond, target) => {
                    let right = pop(frame)?;
                    let left = pop(frame)?;
                    if cond.holds(left, right) {
                        pc = target;
                    }
                }
                Op::Call { function, args } => {
                    let base = frame.depth().checked_sub(args).ok_or_else(|| self.fault(at))?;
                    let result = vm.call(function, &frame.stack()[base..])?;
                    frame.truncate(base);
                    push(frame, result)?;
                }
                Op::Ret => return pop(frame),
                Op::PrintString(id) => {
                    let bytes = vm.program.string(id).ok_or_else(|| RuntimeError::UnknownString {
                        function: self.function.name.clone(),
                        at: self.offset(at),
                        id: id as i64,
                    })?;
                    vm.host.print_string(bytes).map_err(output)?;
                }
                Op::PrintInt64 => {
                    let value = pop(frame)?;
                    vm.host.print_int64(value).map_err(output)?;
                }
                Op::CurrentTime => {
                    let now = vm.host.current_time_millis();
                    push(frame, now)?;
                }
                Op::Halt => return Err(Interrupt::Halt),
            }
        }
    }
}

impl CompiledCode for ThreadedCode {
    fn invoke(&self, vm: &mut Vm, args: &[i64]) -> Result<i64, Interrupt> {
        vm.with_frame(&self.function, args, |vm, frame| self.execute(vm, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::error::Completion;
    use crate::host::RecordingHost;
    use elle_common::{CodeBuilder, ProgramBuilder};

    fn verified(p: &ProgramBuilder) -> Program {
        elle_verifier::verify(&p.build().unwrap()).unwrap()
    }

    #[test]
    fn nops_are_dropped_and_targets_remapped() {
        let mut b = CodeBuilder::new();
        let skip = b.new_label();
        b.nop()
            .push_constant(1)
            .jmp(skip)
            .bind(skip)
            .nop()
            .ret();
        let mut p = ProgramBuilder::new("t");
        p.function("main", 0, b.finish().unwrap());
        let program = verified(&p);
        let code = ThreadedCode::translate(&program, &program.functions[0]).unwrap();
        assert_eq!(code.ops(), &[Op::PushConstant(1), Op::Jump(2), Op::Ret]);
    }

    #[test]
    fn rejects_jump_into_operand() {
        let mut code = Vec::new();
        Instruction::Jmp(3).encode(&mut code);
        Instruction::Halt.encode(&mut code);
        let function = Function {
            name: "bad".into(),
            id: 0,
            arg_count: 0,
            local_count: 0,
            max_stack_depth: 0,
            code: Rc::from(code),
        };
        let program = Program {
            name: "t".into(),
            functions: vec![function.clone()],
            strings: vec![],
        };
        assert_eq!(
            ThreadedCode::translate(&program, &function).unwrap_err(),
            CompileError::BadJumpTarget {
                function: "bad".into(),
                at: 0,
                target: 3
            }
        );
    }

    #[test]
    fn compiled_code_matches_interpreter() {
        // sum of 1..=n with a loop
        let mut sum = CodeBuilder::new();
        let top = sum.new_label();
        let done = sum.new_label();
        sum.push_constant(0)
            .pop_local(0)
            .push_arg(0)
            .pop_local(1)
            .bind(top)
            .push_local(1)
            .push_constant(0)
            .jmpe(done)
            .push_local(0)
            .push_local(1)
            .add()
            .pop_local(0)
            .push_local(1)
            .push_constant(1)
            .sub()
            .pop_local(1)
            .jmp(top)
            .bind(done)
            .push_local(0)
            .ret();

        let mut p = ProgramBuilder::new("sum");
        let mut main = CodeBuilder::new();
        main.push_constant(100).call(1, 1).ret();
        p.function("main", 0, main.finish().unwrap());
        p.function("sum", 1, sum.finish().unwrap());
        let program = verified(&p);

        let compiled = ThreadedCode::translate(&program, &program.functions[1]).unwrap();
        let mut vm = Vm::new(program, VmConfig::default(), RecordingHost::new());
        assert_eq!(compiled.invoke(&mut vm, &[100]), Ok(5050));
        assert_eq!(vm.run_main(), Ok(Completion::Returned(5050)));
        assert_eq!(vm.call_depth(), 0);
    }

    #[test]
    fn compiled_code_traces_like_the_interpreter() {
        // sum of 1..=n with a NOP at the loop head
        let mut sum = CodeBuilder::new();
        let top = sum.new_label();
        let done = sum.new_label();
        sum.push_arg(0)
            .pop_local(1)
            .push_constant(0)
            .pop_local(0)
            .bind(top)
            .nop()
            .push_local(1)
            .push_constant(0)
            .jmpe(done)
            .push_local(0)
            .push_local(1)
            .add()
            .pop_local(0)
            .push_local(1)
            .push_constant(1)
            .sub()
            .pop_local(1)
            .jmp(top)
            .bind(done)
            .push_local(0)
            .ret();
        let mut p = ProgramBuilder::new("t");
        let mut main = CodeBuilder::new();
        main.push_constant(3).call(1, 1).push_constant(0).call(1, 1).add().ret();
        p.function("main", 0, main.finish().unwrap());
        p.function("sum", 1, sum.finish().unwrap());
        let program = Rc::new(verified(&p));

        let records = |mut config: VmConfig| {
            config.trace = true;
            let host = RecordingHost::new();
            let mut vm = Vm::new(Rc::clone(&program), config, host.clone());
            assert_eq!(vm.run_main(), Ok(Completion::Returned(6)));
            host.trace_records()
        };
        let interpreted: Vec<_> = records(VmConfig::interpreted(crate::config::Dispatch::Switch))
            .into_iter()
            .filter(|r| r.opcode != Opcode::Nop)
            .collect();
        let compiled = records(VmConfig::tiered(1));
        assert!(compiled.iter().any(|r| r.function == "sum"));
        assert_eq!(compiled, interpreted);
    }

    #[test]
    fn compiled_division_by_zero_reports_byte_offset() {
        let mut b = CodeBuilder::new();
        b.nop().push_arg(0).push_constant(0).rem().ret();
        let mut p = ProgramBuilder::new("t");
        p.function("f", 1, b.finish().unwrap());
        let program = verified(&p);
        let compiled = ThreadedCode::translate(&program, &program.functions[0]).unwrap();
        let mut vm = Vm::new(program, VmConfig::default(), RecordingHost::new());
        assert_eq!(
            compiled.invoke(&mut vm, &[9]),
            Err(Interrupt::Fault(RuntimeError::DivisionByZero {
                function: "f".into(),
                at: 19
            }))
        );
    }

    #[test]
    fn compiled_prints_and_halts() {
        let mut p = ProgramBuilder::new("t");
        let s = p.string("bye");
        let mut b = CodeBuilder::new();
        b.print_string(s).halt();
        p.function("main", 0, b.finish().unwrap());
        let program = verified(&p);
        let compiled = ThreadedCode::translate(&program, &program.functions[0]).unwrap();
        let host = RecordingHost::new();
        let mut vm = Vm::new(program, VmConfig::default(), host.clone());
        assert_eq!(compiled.invoke(&mut vm, &[]), Err(Interrupt::Halt));
        assert_eq!(host.output_string(), "bye");
    }
}

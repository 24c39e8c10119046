//! Bytecode interpreter.
//!
//! Each opcode has one handler function. The two dispatch modes differ only
//! in how the handler is found: [`Dispatch::Switch`] matches on the opcode,
//! [`Dispatch::Table`] indexes a static array of handler pointers by the
//! opcode byte. Handlers are shared, so both modes have identical semantics.

use std::io;
use std::rc::Rc;

use crate::arith::{BinaryOp, Condition};
use crate::config::Dispatch;
use crate::error::{Interrupt, RuntimeError};
use crate::frame::Frame;
use crate::host::TraceEvent;
use crate::machine::Vm;
use elle_common::instruction::operand;
use elle_common::{Function, FunctionId, Opcode};

/// What the loop does after a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Next,
    Return(i64),
}

/// Execution state of one interpreted call.
struct Interpreter<'f, 'a> {
    function: &'f Function,
    frame: &'f mut Frame<'a>,
    /// Byte offset of the current instruction.
    pc: usize,
}

type Handler = fn(&mut Interpreter<'_, '_>, &mut Vm) -> Result<Flow, Interrupt>;

/// Indexed by opcode byte.
static HANDLERS: [Handler; 22] = [
    exec_nop,
    exec_push_constant,
    exec_push_arg,
    exec_push_local,
    exec_pop,
    exec_pop_local,
    exec_dup,
    exec_add,
    exec_sub,
    exec_mul,
    exec_div,
    exec_mod,
    exec_jmp,
    exec_jmpe,
    exec_jmpl,
    exec_jmpg,
    exec_call,
    exec_ret,
    exec_print_string,
    exec_print_int64,
    exec_current_time,
    exec_halt,
];

/// Interpret function `id` with `args` in a fresh frame.
pub fn interpret(vm: &mut Vm, id: FunctionId, args: &[i64]) -> Result<i64, Interrupt> {
    let program = Rc::clone(&vm.program);
    let function = program
        .function(id)
        .ok_or(RuntimeError::UnknownFunction { id })?;
    let dispatch = vm.config.dispatch;
    let trace = vm.config.trace;

    vm.with_frame(function, args, |vm, frame| -> Result<i64, Interrupt> {
        let mut it = Interpreter {
            function,
            frame,
            pc: 0,
        };
        loop {
            if trace {
                it.trace(vm);
            }
            let flow = match dispatch {
                Dispatch::Switch => step_switch(&mut it, vm)?,
                Dispatch::Table => step_table(&mut it, vm)?,
            };
            if let Flow::Return(value) = flow {
                return Ok(value);
            }
        }
    })
}

fn step_switch(it: &mut Interpreter<'_, '_>, vm: &mut Vm) -> Result<Flow, Interrupt> {
    let byte = it.current()?;
    let opcode = Opcode::try_from(byte).map_err(|_| it.unknown_opcode(byte))?;
    match opcode {
        Opcode::Nop => exec_nop(it, vm),
        Opcode::PushConstant => exec_push_constant(it, vm),
        Opcode::PushArg => exec_push_arg(it, vm),
        Opcode::PushLocal => exec_push_local(it, vm),
        Opcode::Pop => exec_pop(it, vm),
        Opcode::PopLocal => exec_pop_local(it, vm),
        Opcode::Dup => exec_dup(it, vm),
        Opcode::Add => exec_add(it, vm),
        Opcode::Sub => exec_sub(it, vm),
        Opcode::Mul => exec_mul(it, vm),
        Opcode::Div => exec_div(it, vm),
        Opcode::Mod => exec_mod(it, vm),
        Opcode::Jmp => exec_jmp(it, vm),
        Opcode::Jmpe => exec_jmpe(it, vm),
        Opcode::Jmpl => exec_jmpl(it, vm),
        Opcode::Jmpg => exec_jmpg(it, vm),
        Opcode::Call => exec_call(it, vm),
        Opcode::Ret => exec_ret(it, vm),
        Opcode::PrintString => exec_print_string(it, vm),
        Opcode::PrintInt64 => exec_print_int64(it, vm),
        Opcode::CurrentTime => exec_current_time(it, vm),
        Opcode::Halt => exec_halt(it, vm),
    }
}

fn step_table(it: &mut Interpreter<'_, '_>, vm: &mut Vm) -> Result<Flow, Interrupt> {
    let byte = it.current()?;
    let handler = HANDLERS
        .get(usize::from(byte))
        .ok_or_else(|| it.unknown_opcode(byte))?;
    handler(it, vm)
}

impl Interpreter<'_, '_> {
    fn fault(&self) -> Interrupt {
        RuntimeError::CorruptFrame {
            function: self.function.name.clone(),
            at: self.pc,
        }
        .into()
    }

    fn unknown_opcode(&self, byte: u8) -> Interrupt {
        RuntimeError::UnknownOpcode {
            function: self.function.name.clone(),
            at: self.pc,
            byte,
        }
        .into()
    }

    fn current(&self) -> Result<u8, Interrupt> {
        self.function
            .code
            .get(self.pc)
            .copied()
            .ok_or_else(|| self.fault())
    }

    fn operand(&self, index: usize) -> Result<i64, Interrupt> {
        operand(&self.function.code, self.pc, index).ok_or_else(|| self.fault())
    }

    /// An operand used as a slot, string, or code index.
    fn index_operand(&self, index: usize) -> Result<usize, Interrupt> {
        usize::try_from(self.operand(index)?).map_err(|_| self.fault())
    }

    fn push(&mut self, value: i64) -> Result<(), Interrupt> {
        self.frame.push(value).ok_or_else(|| self.fault())
    }

    fn pop(&mut self) -> Result<i64, Interrupt> {
        self.frame.pop().ok_or_else(|| self.fault())
    }

    fn advance(&mut self, opcode: Opcode) -> Flow {
        self.pc += opcode.encoded_len();
        Flow::Next
    }

    fn trace(&self, vm: &mut Vm) {
        let Some(opcode) = self
            .function
            .code
            .get(self.pc)
            .and_then(|&b| Opcode::try_from(b).ok())
        else {
            return;
        };
        let event = TraceEvent {
            function: &self.function.name,
            offset: self.pc,
            opcode,
            depth: self.frame.depth(),
            call_depth: vm.chain.len(),
        };
        vm.host.trace(&event);
    }
}

fn output_error(e: io::Error) -> RuntimeError {
    RuntimeError::Output {
        message: e.to_string(),
    }
}

fn exec_nop(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    Ok(it.advance(Opcode::Nop))
}

fn exec_push_constant(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    let value = it.operand(0)?;
    it.push(value)?;
    Ok(it.advance(Opcode::PushConstant))
}

fn exec_push_arg(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    let index = it.index_operand(0)?;
    let value = it.frame.arg(index).ok_or_else(|| it.fault())?;
    it.push(value)?;
    Ok(it.advance(Opcode::PushArg))
}

fn exec_push_local(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    let index = it.index_operand(0)?;
    let value = it.frame.local(index).ok_or_else(|| it.fault())?;
    it.push(value)?;
    Ok(it.advance(Opcode::PushLocal))
}

fn exec_pop(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    it.pop()?;
    Ok(it.advance(Opcode::Pop))
}

fn exec_pop_local(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    let index = it.index_operand(0)?;
    let value = it.pop()?;
    it.frame.set_local(index, value).ok_or_else(|| it.fault())?;
    Ok(it.advance(Opcode::PopLocal))
}

fn exec_dup(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    let value = it.frame.peek().ok_or_else(|| it.fault())?;
    it.push(value)?;
    Ok(it.advance(Opcode::Dup))
}

fn exec_binary(it: &mut Interpreter<'_, '_>, op: BinaryOp, opcode: Opcode) -> Result<Flow, Interrupt> {
    let right = it.pop()?;
    let left = it.pop()?;
    let value = op
        .apply(left, right)
        .ok_or_else(|| RuntimeError::DivisionByZero {
            function: it.function.name.clone(),
            at: it.pc,
        })?;
    it.push(value)?;
    Ok(it.advance(opcode))
}

fn exec_add(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    exec_binary(it, BinaryOp::Add, Opcode::Add)
}

fn exec_sub(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    exec_binary(it, BinaryOp::Sub, Opcode::Sub)
}

fn exec_mul(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    exec_binary(it, BinaryOp::Mul, Opcode::Mul)
}

fn exec_div(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    exec_binary(it, BinaryOp::Div, Opcode::Div)
}

fn exec_mod(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    exec_binary(it, BinaryOp::Mod, Opcode::Mod)
}

fn exec_jmp(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    it.pc = it.index_operand(0)?;
    Ok(Flow::Next)
}

/// Pops right then left; jumps when `left <cond> right`.
fn exec_branch(it: &mut Interpreter<'_, '_>, cond: Condition, opcode: Opcode) -> Result<Flow, Interrupt> {
    let target = it.index_operand(0)?;
    let right = it.pop()?;
    let left = it.pop()?;
    if cond.holds(left, right) {
        it.pc = target;
        Ok(Flow::Next)
    } else {
        Ok(it.advance(opcode))
    }
}

fn exec_jmpe(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    exec_branch(it, Condition::Equal, Opcode::Jmpe)
}

fn exec_jmpl(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    exec_branch(it, Condition::Less, Opcode::Jmpl)
}

fn exec_jmpg(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    exec_branch(it, Condition::Greater, Opcode::Jmpg)
}

fn exec_call(it: &mut Interpreter<'_, '_>, vm: &mut Vm) -> Result<Flow, Interrupt> {
    let callee = it.index_operand(0)?;
    let argc = it.index_operand(1)?;
    let base = it.frame.depth().checked_sub(argc).ok_or_else(|| it.fault())?;

    // The callee reads its arguments in place from our stack.
    let result = vm.call(callee, &it.frame.stack()[base..])?;

    it.frame.truncate(base);
    it.push(result)?;
    Ok(it.advance(Opcode::Call))
}

fn exec_ret(it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    Ok(Flow::Return(it.pop()?))
}

fn exec_print_string(it: &mut Interpreter<'_, '_>, vm: &mut Vm) -> Result<Flow, Interrupt> {
    let id = it.operand(0)?;
    let bytes = usize::try_from(id)
        .ok()
        .and_then(|index| vm.program.string(index))
        .ok_or_else(|| RuntimeError::UnknownString {
            function: it.function.name.clone(),
            at: it.pc,
            id,
        })?;
    vm.host.print_string(bytes).map_err(output_error)?;
    Ok(it.advance(Opcode::PrintString))
}

fn exec_print_int64(it: &mut Interpreter<'_, '_>, vm: &mut Vm) -> Result<Flow, Interrupt> {
    let value = it.pop()?;
    vm.host.print_int64(value).map_err(output_error)?;
    Ok(it.advance(Opcode::PrintInt64))
}

fn exec_current_time(it: &mut Interpreter<'_, '_>, vm: &mut Vm) -> Result<Flow, Interrupt> {
    let now = vm.host.current_time_millis();
    it.push(now)?;
    Ok(it.advance(Opcode::CurrentTime))
}

fn exec_halt(_it: &mut Interpreter<'_, '_>, _vm: &mut Vm) -> Result<Flow, Interrupt> {
    Err(Interrupt::Halt)
}

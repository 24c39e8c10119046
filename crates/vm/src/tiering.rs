//! Tiering controller and the shared calling convention.
//!
//! Every call, from the entry point, from interpreted code, or from compiled
//! code, goes through [`Vm::call`]. It counts the invocation, promotes the
//! function when the count reaches the threshold, and then invokes whichever
//! tier is current. Both tiers take `(vm, args)` and return one `i64`, so a
//! caller never needs to know which tier it is calling.

use std::fmt;
use std::rc::Rc;

use crate::config::TierPolicy;
use crate::error::{CompileError, Interrupt, RuntimeError};
use crate::interpreter;
use crate::machine::Vm;
use elle_common::{Function, FunctionId, Program};

/// Executable code produced by a [`Compiler`].
pub trait CompiledCode {
    /// Run the function. The implementation manages its own frame through
    /// [`Vm::with_frame`].
    fn invoke(&self, vm: &mut Vm, args: &[i64]) -> Result<i64, Interrupt>;
}

/// A backend that turns a verified function into [`CompiledCode`].
pub trait Compiler {
    fn compile(
        &self,
        program: &Program,
        function: &Function,
    ) -> Result<Rc<dyn CompiledCode>, CompileError>;
}

/// Mutable tiering state of one function.
#[derive(Default)]
pub struct TierSlot {
    invoked: u32,
    entry: Option<Rc<dyn CompiledCode>>,
    compile_attempts: u32,
    compile_failed: bool,
}

impl TierSlot {
    /// Invocations counted so far. Stops at the threshold.
    pub fn invoked(&self) -> u32 {
        self.invoked
    }

    pub fn is_compiled(&self) -> bool {
        self.entry.is_some()
    }

    pub fn compile_attempts(&self) -> u32 {
        self.compile_attempts
    }

    pub fn compile_failed(&self) -> bool {
        self.compile_failed
    }
}

impl fmt::Debug for TierSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TierSlot")
            .field("invoked", &self.invoked)
            .field("compiled", &self.is_compiled())
            .field("compile_attempts", &self.compile_attempts)
            .field("compile_failed", &self.compile_failed)
            .finish()
    }
}

/// The tier selected for one call.
#[derive(Clone)]
pub enum Callee {
    Interpreted(FunctionId),
    Compiled(Rc<dyn CompiledCode>),
}

impl Callee {
    pub fn invoke(&self, vm: &mut Vm, args: &[i64]) -> Result<i64, Interrupt> {
        match self {
            Callee::Interpreted(id) => interpreter::interpret(vm, *id, args),
            Callee::Compiled(code) => code.invoke(vm, args),
        }
    }
}

impl fmt::Debug for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callee::Interpreted(id) => f.debug_tuple("Interpreted").field(id).finish(),
            Callee::Compiled(_) => f.write_str("Compiled"),
        }
    }
}

impl Vm {
    /// Call a function through the tiering controller.
    pub fn call(&mut self, id: FunctionId, args: &[i64]) -> Result<i64, Interrupt> {
        let callee = self.resolve(id)?;
        callee.invoke(self, args)
    }

    /// Count one invocation of `id` and pick its tier.
    pub fn resolve(&mut self, id: FunctionId) -> Result<Callee, RuntimeError> {
        let slot = self
            .tiers
            .get_mut(id)
            .ok_or(RuntimeError::UnknownFunction { id })?;

        if let TierPolicy::Tiered { threshold } = self.config.tiering {
            if slot.invoked < threshold {
                slot.invoked += 1;
                if slot.invoked == threshold {
                    self.promote(id);
                }
            }
        }

        Ok(match &self.tiers[id].entry {
            Some(code) => Callee::Compiled(Rc::clone(code)),
            None => Callee::Interpreted(id),
        })
    }

    /// Compile `id` once. Failure leaves the function interpreted for good.
    fn promote(&mut self, id: FunctionId) {
        let program = Rc::clone(&self.program);
        let Some(function) = program.function(id) else {
            return;
        };
        let verbose = self.config.verbose;

        if verbose {
            self.host
                .diagnostic(&format!("Attempting to compile {}", function.name));
        }
        let result = self.compiler.compile(&program, function);

        let slot = &mut self.tiers[id];
        slot.compile_attempts += 1;
        let message = match result {
            Ok(code) => {
                slot.entry = Some(code);
                format!("Successfully compiled {}", function.name)
            }
            Err(e) => {
                slot.compile_failed = true;
                format!("Failed to compile {}: {e}", function.name)
            }
        };
        if verbose {
            self.host.diagnostic(&message);
        }
    }
}

//! VM state: the program, per-function tier slots, the call chain, and the
//! host.

use std::rc::Rc;

use crate::config::VmConfig;
use crate::error::{Completion, Interrupt, RuntimeError};
use crate::frame::{Frame, FrameLink, FrameStats};
use crate::host::Host;
use crate::threaded::ThreadedCompiler;
use crate::tiering::{Compiler, TierSlot};
use elle_common::{Function, FunctionId, Program};

/// The ELLE virtual machine. One instance runs one program.
pub struct Vm {
    pub(crate) program: Rc<Program>,
    /// Indexed by function ID.
    pub(crate) tiers: Vec<TierSlot>,
    pub(crate) chain: Vec<FrameLink>,
    pub(crate) stats: FrameStats,
    pub(crate) host: Box<dyn Host>,
    pub(crate) compiler: Box<dyn Compiler>,
    pub(crate) config: VmConfig,
}

impl Vm {
    /// Create a VM using the threaded-code compiler.
    pub fn new(program: impl Into<Rc<Program>>, config: VmConfig, host: impl Host + 'static) -> Self {
        let program = program.into();
        let tiers = program.functions.iter().map(|_| TierSlot::default()).collect();
        Self {
            program,
            tiers,
            chain: Vec::new(),
            stats: FrameStats::default(),
            host: Box::new(host),
            compiler: Box::new(ThreadedCompiler),
            config,
        }
    }

    /// Replace the compiler used for promotion.
    pub fn with_compiler(mut self, compiler: impl Compiler + 'static) -> Self {
        self.compiler = Box::new(compiler);
        self
    }

    pub fn program(&self) -> &Rc<Program> {
        &self.program
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn host_mut(&mut self) -> &mut dyn Host {
        self.host.as_mut()
    }

    /// Run a function with no arguments.
    pub fn run(&mut self, id: FunctionId) -> Result<Completion, RuntimeError> {
        self.run_with_args(id, &[])
    }

    /// Run a function to completion. HALT anywhere in the call chain ends the
    /// run with [`Completion::Halted`].
    pub fn run_with_args(&mut self, id: FunctionId, args: &[i64]) -> Result<Completion, RuntimeError> {
        let function = self
            .program
            .function(id)
            .ok_or(RuntimeError::UnknownFunction { id })?;
        if args.len() != function.arg_count {
            return Err(RuntimeError::ArityMismatch {
                function: function.name.clone(),
                expected: function.arg_count,
                got: args.len(),
            });
        }

        match self.call(id, args) {
            Ok(value) => Ok(Completion::Returned(value)),
            Err(Interrupt::Halt) => Ok(Completion::Halted),
            Err(Interrupt::Fault(e)) => Err(e),
        }
    }

    /// Run the function named `main`.
    pub fn run_main(&mut self) -> Result<Completion, RuntimeError> {
        let id = self
            .program
            .find_function("main")
            .map(|f| f.id)
            .ok_or(RuntimeError::MissingMain)?;
        self.run(id)
    }

    /// Enter a frame for `function`, run `body` in it, and leave it.
    ///
    /// Every call, interpreted or compiled, goes through here so that the
    /// call chain and frame counters stay exact.
    pub fn with_frame<'a, R>(
        &mut self,
        function: &Function,
        args: &'a [i64],
        body: impl FnOnce(&mut Self, &mut Frame<'a>) -> R,
    ) -> R {
        let mut frame = Frame::new(function, args);
        let heap = frame.is_heap();
        if heap {
            self.stats.heap_allocations += 1;
        } else {
            self.stats.inline_frames += 1;
        }
        self.chain.push(FrameLink {
            function: function.id,
            heap,
        });

        let result = body(self, &mut frame);

        self.chain.pop();
        drop(frame);
        if heap {
            self.stats.heap_releases += 1;
        }
        result
    }

    /// Number of active frames.
    pub fn call_depth(&self) -> usize {
        self.chain.len()
    }

    /// Active frames, outermost first.
    pub fn call_chain(&self) -> &[FrameLink] {
        &self.chain
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.stats
    }

    pub fn tier_slot(&self, id: FunctionId) -> Option<&TierSlot> {
        self.tiers.get(id)
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("program", &self.program.name)
            .field("config", &self.config)
            .field("chain", &self.chain)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

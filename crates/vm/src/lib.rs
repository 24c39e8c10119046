//! ELLE virtual machine: executes verified programs.
//!
//! The VM is a stack machine with:
//! - One frame per call, holding an operand stack and locals, inline when small
//! - An interpreter with switch or table dispatch
//! - A tiering controller that hands hot functions to a compiler
//! - A threaded-code compiler as the default backend
//! - Host built-ins for output and the clock
//!
//! # Usage
//!
//! ```
//! use elle_common::{CodeBuilder, ProgramBuilder};
//! use elle_vm::{run, Completion, RecordingHost, VmConfig};
//!
//! let mut main = CodeBuilder::new();
//! main.push_constant(2).push_constant(3).add().ret();
//! let mut builder = ProgramBuilder::new("demo");
//! builder.function("main", 0, main.finish().unwrap());
//!
//! let program = elle_verifier::verify(&builder.build().unwrap()).unwrap();
//! let result = run(program, VmConfig::default(), RecordingHost::new()).unwrap();
//! assert_eq!(result, Completion::Returned(5));
//! ```

pub mod arith;
pub mod config;
pub mod error;
pub mod frame;
pub mod host;
pub mod interpreter;
pub mod machine;
pub mod threaded;
pub mod tiering;

pub use config::{Dispatch, TierPolicy, VmConfig, DEFAULT_COMPILE_THRESHOLD};
pub use error::{CompileError, Completion, Interrupt, RuntimeError};
pub use frame::{Frame, FrameLink, FrameStats, INLINE_FRAME_SLOTS};
pub use host::{Host, RecordingHost, StdHost, TraceEvent, TraceRecord};
pub use machine::Vm;
pub use threaded::{ThreadedCode, ThreadedCompiler};
pub use tiering::{Callee, CompiledCode, Compiler, TierSlot};

use std::rc::Rc;

use elle_common::Program;

/// Run a program's `main` function.
///
/// # Errors
///
/// Returns [`RuntimeError::MissingMain`] if there is no `main`, or the
/// runtime error that ended execution.
pub fn run(
    program: impl Into<Rc<Program>>,
    config: VmConfig,
    host: impl Host + 'static,
) -> Result<Completion, RuntimeError> {
    Vm::new(program, config, host).run_main()
}

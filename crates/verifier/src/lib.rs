//! ELLE loader and verifier.
//!
//! [`load`] turns the bytes of a program file into a [`Program`] the VM can
//! run. A program is only returned once every function has passed
//! verification; nothing about it needs to be checked again at run time.
//!
//! # Usage
//!
//! ```
//! use elle_common::{CodeBuilder, ProgramBuilder};
//! use elle_verifier::load;
//!
//! let mut main = CodeBuilder::new();
//! main.push_constant(2).push_constant(3).add().ret();
//! let mut builder = ProgramBuilder::new("demo");
//! builder.function("main", 0, main.finish().unwrap());
//! let bytes = builder.build().unwrap().encode();
//!
//! let program = load(&bytes).unwrap();
//! assert_eq!(program.functions[0].max_stack_depth, 2);
//! assert_eq!(program.functions[0].local_count, 0);
//! ```
//!
//! # Passes
//!
//! 1. **Container**: framing and table consistency ([`elle_common::ProgramImage::decode`])
//! 2. **Stack**: per-function depth simulation, frame layout
//! 3. **Linking**: call targets, arities, strings, argument indices

pub mod error;
pub mod limits;
pub mod linking;
pub mod stack;

pub use error::{ProgramError, VerifyError};
pub use stack::StackSummary;

use std::rc::Rc;

use elle_common::{Function, Program, ProgramImage};

/// Verify a decoded container and build the executable program.
///
/// Returns all errors found: the first from each function's stack pass plus
/// every linking error.
pub fn verify(image: &ProgramImage) -> Result<Program, Vec<VerifyError>> {
    let mut all_errors = Vec::new();
    let mut functions = Vec::with_capacity(image.functions.len());

    for f in &image.functions {
        match stack::simulate(f) {
            Ok(summary) => functions.push(Function {
                name: f.name.clone(),
                id: f.id,
                arg_count: f.arg_count,
                local_count: summary.local_count,
                max_stack_depth: summary.max_stack_depth,
                code: Rc::from(f.code.as_slice()),
            }),
            Err(e) => all_errors.push(e),
        }
    }

    all_errors.extend(linking::check_links(image));

    if !all_errors.is_empty() {
        return Err(all_errors);
    }

    functions.sort_by_key(|f| f.id);
    let mut strings: Vec<_> = image.strings.iter().collect();
    strings.sort_by_key(|s| s.id);

    Ok(Program {
        name: image.name.clone(),
        functions,
        strings: strings.into_iter().map(|s| s.bytes.clone()).collect(),
    })
}

/// Decode and verify a program file.
pub fn load(bytes: &[u8]) -> Result<Program, ProgramError> {
    let image = ProgramImage::decode(bytes)?;
    verify(&image).map_err(ProgramError::Verify)
}

//! The verified program model executed by the VM.
//!
//! A [`Program`] is only produced by the verifier; its functions carry the
//! frame layout computed during verification. It is immutable once built.

use std::rc::Rc;

use crate::image::{FunctionImage, ProgramImage, StringImage};

/// Index into a program's function table.
pub type FunctionId = usize;

/// A verified function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Used only for diagnostics and `main` lookup.
    pub name: String,
    pub id: FunctionId,
    pub arg_count: usize,
    /// `1 + highest local index` used by the code, or 0.
    pub local_count: usize,
    /// Highest operand stack depth reached on any path.
    pub max_stack_depth: usize,
    /// Bytecode exactly as stored in the container.
    pub code: Rc<[u8]>,
}

impl Function {
    /// Slots needed for operand stack plus locals.
    pub fn frame_slots(&self) -> usize {
        self.max_stack_depth + self.local_count
    }
}

/// A loaded and verified program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub name: String,
    /// Dense: `functions[i].id == i`.
    pub functions: Vec<Function>,
    /// Dense: string ID is the index.
    pub strings: Vec<Vec<u8>>,
}

impl Program {
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id)
    }

    pub fn string(&self, id: usize) -> Option<&[u8]> {
        self.strings.get(id).map(Vec::as_slice)
    }

    /// First function with the given name.
    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Re-encodable container with entries in ID order.
    pub fn to_image(&self) -> ProgramImage {
        ProgramImage {
            name: self.name.clone(),
            functions: self
                .functions
                .iter()
                .map(|f| FunctionImage {
                    name: f.name.clone(),
                    id: f.id,
                    arg_count: f.arg_count,
                    code: f.code.to_vec(),
                })
                .collect(),
            strings: self
                .strings
                .iter()
                .enumerate()
                .map(|(id, bytes)| StringImage {
                    id,
                    bytes: bytes.clone(),
                })
                .collect(),
        }
    }
}

//! Programmatic construction of ELLE code and program containers.
//!
//! [`CodeBuilder`] emits one function body, resolving jump labels when the
//! body is finished. [`ProgramBuilder`] assembles the function and string
//! tables; functions may be declared before they are defined so that bodies
//! can call functions that come later, or themselves.

use crate::error::BuildError;
use crate::image::{FunctionImage, ProgramImage, StringImage, MAX_FUNCTIONS, MAX_NAME_LEN};
use crate::instruction::Instruction;
use crate::opcode::Opcode;

/// A jump destination inside one [`CodeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

/// A jump whose operand still needs the label's offset.
#[derive(Debug)]
struct ForwardRef {
    /// Byte position of the 8-byte operand.
    operand_at: usize,
    label: Label,
}

/// Builder for one function body.
#[derive(Debug, Default)]
pub struct CodeBuilder {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    forward_refs: Vec<ForwardRef>,
    rebound: Option<usize>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current byte offset.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current offset.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        match self.labels[label.0] {
            Some(_) => self.rebound = self.rebound.or(Some(label.0)),
            None => self.labels[label.0] = Some(self.code.len()),
        }
        self
    }

    /// Emit a raw instruction. Jump operands are used as-is.
    pub fn emit(&mut self, instr: Instruction) -> &mut Self {
        instr.encode(&mut self.code);
        self
    }

    pub fn nop(&mut self) -> &mut Self {
        self.emit(Instruction::Nop)
    }

    pub fn push_constant(&mut self, value: i64) -> &mut Self {
        self.emit(Instruction::PushConstant(value))
    }

    pub fn push_arg(&mut self, index: i64) -> &mut Self {
        self.emit(Instruction::PushArg(index))
    }

    pub fn push_local(&mut self, index: i64) -> &mut Self {
        self.emit(Instruction::PushLocal(index))
    }

    pub fn pop(&mut self) -> &mut Self {
        self.emit(Instruction::Pop)
    }

    pub fn pop_local(&mut self, index: i64) -> &mut Self {
        self.emit(Instruction::PopLocal(index))
    }

    pub fn dup(&mut self) -> &mut Self {
        self.emit(Instruction::Dup)
    }

    pub fn add(&mut self) -> &mut Self {
        self.emit(Instruction::Add)
    }

    pub fn sub(&mut self) -> &mut Self {
        self.emit(Instruction::Sub)
    }

    pub fn mul(&mut self) -> &mut Self {
        self.emit(Instruction::Mul)
    }

    pub fn div(&mut self) -> &mut Self {
        self.emit(Instruction::Div)
    }

    pub fn rem(&mut self) -> &mut Self {
        self.emit(Instruction::Mod)
    }

    pub fn jmp(&mut self, label: Label) -> &mut Self {
        self.jump(Opcode::Jmp, label)
    }

    pub fn jmpe(&mut self, label: Label) -> &mut Self {
        self.jump(Opcode::Jmpe, label)
    }

    pub fn jmpl(&mut self, label: Label) -> &mut Self {
        self.jump(Opcode::Jmpl, label)
    }

    pub fn jmpg(&mut self, label: Label) -> &mut Self {
        self.jump(Opcode::Jmpg, label)
    }

    pub fn call(&mut self, function: usize, args: usize) -> &mut Self {
        self.emit(Instruction::Call {
            function: function as i64,
            args: args as i64,
        })
    }

    pub fn ret(&mut self) -> &mut Self {
        self.emit(Instruction::Ret)
    }

    pub fn print_string(&mut self, string: usize) -> &mut Self {
        self.emit(Instruction::PrintString(string as i64))
    }

    pub fn print_int64(&mut self) -> &mut Self {
        self.emit(Instruction::PrintInt64)
    }

    pub fn current_time(&mut self) -> &mut Self {
        self.emit(Instruction::CurrentTime)
    }

    pub fn halt(&mut self) -> &mut Self {
        self.emit(Instruction::Halt)
    }

    fn jump(&mut self, opcode: Opcode, label: Label) -> &mut Self {
        self.code.push(opcode as u8);
        self.forward_refs.push(ForwardRef {
            operand_at: self.code.len(),
            label,
        });
        self.code.extend_from_slice(&[0; 8]);
        self
    }

    /// Patch every jump and return the finished code, leaving the builder
    /// empty. On `UnboundLabel` the body is kept so the label can still be
    /// bound; a rebound label discards the body.
    pub fn finish(&mut self) -> Result<Vec<u8>, BuildError> {
        if let Some(label) = self.rebound.take() {
            self.code.clear();
            self.labels.clear();
            self.forward_refs.clear();
            return Err(BuildError::LabelRebound { label });
        }
        // Patch in place so an unbound label leaves the body intact.
        for fref in &self.forward_refs {
            let target = self.labels[fref.label.0].ok_or(BuildError::UnboundLabel {
                label: fref.label.0,
            })?;
            self.code[fref.operand_at..fref.operand_at + 8]
                .copy_from_slice(&(target as i64).to_be_bytes());
        }
        self.forward_refs.clear();
        self.labels.clear();
        Ok(std::mem::take(&mut self.code))
    }
}

/// Builder for a whole program container.
#[derive(Debug)]
pub struct ProgramBuilder {
    name: String,
    functions: Vec<(String, usize, Option<Vec<u8>>)>,
    strings: Vec<Vec<u8>>,
}

impl ProgramBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            strings: Vec::new(),
        }
    }

    /// Reserve the next function ID without a body yet.
    pub fn declare(&mut self, name: impl Into<String>, arg_count: usize) -> usize {
        self.functions.push((name.into(), arg_count, None));
        self.functions.len() - 1
    }

    /// Give a declared function its body.
    pub fn define(&mut self, id: usize, code: Vec<u8>) -> Result<(), BuildError> {
        let slot = self
            .functions
            .get_mut(id)
            .ok_or(BuildError::UndeclaredFunction { id })?;
        slot.2 = Some(code);
        Ok(())
    }

    /// Declare and define in one step.
    pub fn function(&mut self, name: impl Into<String>, arg_count: usize, code: Vec<u8>) -> usize {
        self.functions.push((name.into(), arg_count, Some(code)));
        self.functions.len() - 1
    }

    /// Intern a string, returning its ID. Equal strings share one ID.
    pub fn string(&mut self, bytes: impl AsRef<[u8]>) -> usize {
        let bytes = bytes.as_ref();
        if let Some(id) = self.strings.iter().position(|s| s == bytes) {
            return id;
        }
        self.strings.push(bytes.to_vec());
        self.strings.len() - 1
    }

    pub fn build(&self) -> Result<ProgramImage, BuildError> {
        if self.functions.len() > MAX_FUNCTIONS {
            return Err(BuildError::TooManyFunctions {
                count: self.functions.len(),
            });
        }
        check_name(&self.name)?;
        let functions = self
            .functions
            .iter()
            .enumerate()
            .map(|(id, (name, arg_count, code))| {
                check_name(name)?;
                let code = code.clone().ok_or_else(|| BuildError::UndefinedFunction {
                    name: name.clone(),
                })?;
                Ok(FunctionImage {
                    name: name.clone(),
                    id,
                    arg_count: *arg_count,
                    code,
                })
            })
            .collect::<Result<Vec<_>, BuildError>>()?;

        Ok(ProgramImage {
            name: self.name.clone(),
            functions,
            strings: self
                .strings
                .iter()
                .enumerate()
                .map(|(id, bytes)| StringImage {
                    id,
                    bytes: bytes.clone(),
                })
                .collect(),
        })
    }
}

/// Names are stored behind a one-byte length.
fn check_name(name: &str) -> Result<(), BuildError> {
    if name.len() > MAX_NAME_LEN {
        return Err(BuildError::NameTooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::instructions;

    #[test]
    fn forward_jump_is_patched() {
        let mut b = CodeBuilder::new();
        let end = b.new_label();
        b.jmp(end).push_constant(1).bind(end).push_constant(2).ret();
        let code = b.finish().unwrap();

        let decoded: Vec<_> = instructions(&code).map(|r| r.unwrap()).collect();
        assert_eq!(decoded[0], (0, Instruction::Jmp(18)));
        assert_eq!(decoded[2], (18, Instruction::PushConstant(2)));
    }

    #[test]
    fn backward_jump_is_patched() {
        let mut b = CodeBuilder::new();
        let top = b.new_label();
        b.bind(top).nop().jmp(top);
        let code = b.finish().unwrap();
        assert_eq!(Instruction::decode(&code, 1), Ok(Instruction::Jmp(0)));
    }

    #[test]
    fn unbound_label_is_an_error() {
        let mut b = CodeBuilder::new();
        let nowhere = b.new_label();
        b.jmpe(nowhere);
        assert_eq!(b.finish(), Err(BuildError::UnboundLabel { label: 0 }));
    }

    #[test]
    fn label_bound_twice_is_an_error() {
        let mut b = CodeBuilder::new();
        let l = b.new_label();
        b.bind(l).nop().bind(l).ret();
        assert_eq!(b.finish(), Err(BuildError::LabelRebound { label: 0 }));
    }

    #[test]
    fn unbound_label_keeps_the_body() {
        let mut b = CodeBuilder::new();
        let end = b.new_label();
        b.push_constant(1).jmp(end);
        assert_eq!(b.finish(), Err(BuildError::UnboundLabel { label: 0 }));

        b.bind(end).ret();
        let code = b.finish().unwrap();
        let decoded: Vec<_> = instructions(&code).map(|r| r.unwrap()).collect();
        assert_eq!(
            decoded,
            vec![
                (0, Instruction::PushConstant(1)),
                (9, Instruction::Jmp(18)),
                (18, Instruction::Ret),
            ]
        );
    }

    #[test]
    fn builder_is_reusable_after_rebound() {
        let mut b = CodeBuilder::new();
        let l = b.new_label();
        b.bind(l).nop().bind(l).ret();
        assert!(b.finish().is_err());

        let top = b.new_label();
        b.bind(top).push_constant(4).ret();
        let code = b.finish().unwrap();
        assert_eq!(code.len(), 10);
        assert_eq!(Instruction::decode(&code, 0), Ok(Instruction::PushConstant(4)));

        // A finished builder starts over with fresh labels.
        let next = b.new_label();
        b.jmp(next).bind(next).ret();
        assert_eq!(Instruction::decode(&b.finish().unwrap(), 0), Ok(Instruction::Jmp(9)));
    }

    #[test]
    fn long_names_fail_build() {
        let long = "n".repeat(MAX_NAME_LEN + 1);

        let mut p = ProgramBuilder::new(long.clone());
        p.function("main", 0, vec![Opcode::Halt as u8]);
        assert_eq!(
            p.build(),
            Err(BuildError::NameTooLong {
                name: long.clone(),
                len: 128
            })
        );

        let mut p = ProgramBuilder::new("p");
        p.function(long.clone(), 0, vec![Opcode::Halt as u8]);
        assert!(matches!(p.build(), Err(BuildError::NameTooLong { len: 128, .. })));

        let mut p = ProgramBuilder::new("n".repeat(MAX_NAME_LEN));
        p.function("main", 0, vec![Opcode::Halt as u8]);
        assert!(p.build().is_ok());
    }

    #[test]
    fn too_many_functions_fail_build() {
        let mut p = ProgramBuilder::new("p");
        for i in 0..MAX_FUNCTIONS {
            p.function(format!("f{i}"), 0, vec![Opcode::Halt as u8]);
        }
        let image = p.build().unwrap();
        assert_eq!(ProgramImage::decode(&image.encode()), Ok(image));

        p.function("one_more", 0, vec![Opcode::Halt as u8]);
        assert_eq!(
            p.build(),
            Err(BuildError::TooManyFunctions { count: 128 })
        );
    }

    #[test]
    fn strings_are_interned() {
        let mut p = ProgramBuilder::new("p");
        let a = p.string("hello");
        let b = p.string("world");
        assert_eq!(p.string("hello"), a);
        assert_ne!(a, b);
    }

    #[test]
    fn declare_then_define() {
        let mut p = ProgramBuilder::new("p");
        let f = p.declare("f", 1);
        let main = p.function("main", 0, vec![Opcode::Halt as u8]);
        p.define(f, vec![Opcode::Ret as u8]).unwrap();

        let image = p.build().unwrap();
        assert_eq!(image.functions[f].name, "f");
        assert_eq!(image.functions[f].arg_count, 1);
        assert_eq!(image.functions[main].id, 1);
    }

    #[test]
    fn undefined_function_fails_build() {
        let mut p = ProgramBuilder::new("p");
        p.declare("ghost", 0);
        assert_eq!(
            p.build(),
            Err(BuildError::UndefinedFunction {
                name: "ghost".into()
            })
        );
    }

    #[test]
    fn define_unknown_id() {
        let mut p = ProgramBuilder::new("p");
        assert_eq!(
            p.define(3, vec![]),
            Err(BuildError::UndeclaredFunction { id: 3 })
        );
    }
}

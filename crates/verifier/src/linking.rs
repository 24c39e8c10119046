//! Cross-function checks: call targets, arities, string IDs and argument
//! indices.

use crate::error::VerifyError;
use elle_common::{instructions, Instruction, ProgramImage};

/// Check every CALL, PRINT_STRING and PUSH_ARG against the program tables.
///
/// Code that fails to decode is skipped; the stack pass reports it.
pub fn check_links(image: &ProgramImage) -> Vec<VerifyError> {
    let mut errors = Vec::new();

    for function in &image.functions {
        let name = || function.name.clone();
        for item in instructions(&function.code) {
            let Ok((at, instr)) = item else { break };
            match instr {
                Instruction::Call { function: id, args } => {
                    let callee = usize::try_from(id).ok().and_then(|id| image.function(id));
                    match callee {
                        None => errors.push(VerifyError::UnknownFunction {
                            function: name(),
                            at,
                            id,
                        }),
                        Some(callee) if args != callee.arg_count as i64 => {
                            errors.push(VerifyError::ArgCountMismatch {
                                function: name(),
                                at,
                                callee: callee.name.clone(),
                                passed: args,
                                declared: callee.arg_count,
                            })
                        }
                        Some(_) => {}
                    }
                }
                Instruction::PrintString(id) => {
                    let known = usize::try_from(id).is_ok_and(|id| id < image.strings.len());
                    if !known {
                        errors.push(VerifyError::UnknownString {
                            function: name(),
                            at,
                            id,
                        });
                    }
                }
                Instruction::PushArg(index) => {
                    if index >= 0 && index as u64 >= function.arg_count as u64 {
                        errors.push(VerifyError::ArgIndexOutOfRange {
                            function: name(),
                            at,
                            index,
                            arg_count: function.arg_count,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use elle_common::{CodeBuilder, ProgramBuilder};

    fn build(f: impl FnOnce(&mut ProgramBuilder)) -> ProgramImage {
        let mut p = ProgramBuilder::new("t");
        f(&mut p);
        p.build().unwrap()
    }

    #[test]
    fn well_linked_program() {
        let image = build(|p| {
            let hello = p.string("hello");
            let mut inc = CodeBuilder::new();
            inc.push_arg(0).push_constant(1).add().ret();
            let inc = p.function("inc", 1, inc.finish().unwrap());
            let mut main = CodeBuilder::new();
            main.print_string(hello).push_constant(1).call(inc, 1).ret();
            p.function("main", 0, main.finish().unwrap());
        });
        assert!(check_links(&image).is_empty());
    }

    #[test]
    fn call_to_missing_function() {
        let image = build(|p| {
            let mut main = CodeBuilder::new();
            main.call(7, 0).ret();
            p.function("main", 0, main.finish().unwrap());
        });
        assert_eq!(
            check_links(&image),
            vec![VerifyError::UnknownFunction {
                function: "main".into(),
                at: 0,
                id: 7
            }]
        );
    }

    #[test]
    fn call_with_wrong_arity() {
        let image = build(|p| {
            let mut two = CodeBuilder::new();
            two.push_arg(1).ret();
            let two = p.function("two", 2, two.finish().unwrap());
            let mut main = CodeBuilder::new();
            main.push_constant(1).call(two, 1).ret();
            p.function("main", 0, main.finish().unwrap());
        });
        assert!(matches!(
            check_links(&image).as_slice(),
            [VerifyError::ArgCountMismatch { passed: 1, declared: 2, .. }]
        ));
    }

    #[test]
    fn unknown_string() {
        let image = build(|p| {
            let mut main = CodeBuilder::new();
            main.print_string(0).halt();
            p.function("main", 0, main.finish().unwrap());
        });
        assert!(matches!(
            check_links(&image).as_slice(),
            [VerifyError::UnknownString { id: 0, .. }]
        ));
    }

    #[test]
    fn arg_index_past_arg_count() {
        let image = build(|p| {
            let mut f = CodeBuilder::new();
            f.push_arg(1).ret();
            p.function("f", 1, f.finish().unwrap());
        });
        assert!(matches!(
            check_links(&image).as_slice(),
            [VerifyError::ArgIndexOutOfRange { index: 1, arg_count: 1, .. }]
        ));
    }

    #[test]
    fn errors_from_all_functions_are_collected() {
        let image = build(|p| {
            let mut a = CodeBuilder::new();
            a.print_string(3).halt();
            p.function("a", 0, a.finish().unwrap());
            let mut b = CodeBuilder::new();
            b.call(9, 0).ret();
            p.function("b", 0, b.finish().unwrap());
        });
        assert_eq!(check_links(&image).len(), 2);
    }
}

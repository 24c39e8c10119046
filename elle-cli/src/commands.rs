//! Option parsing and the load/dump/run pipeline.

use std::fs;

use elle_verifier::ProgramError;
use elle_vm::{Completion, StdHost, VmConfig};

pub const EXIT_USAGE: i32 = -1;
pub const EXIT_MALFORMED: i32 = -2;
pub const EXIT_UNKNOWN_INTERPRETER: i32 = -3;
pub const EXIT_RUNTIME: i32 = -4;

/// Parsed command line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Options {
    pub program_file: String,
    /// Raw `-it` value; checked only when the program is about to run.
    pub interpreter: Option<String>,
    pub dump: bool,
    pub load_only: bool,
    pub trace: bool,
    pub verbose: bool,
    pub help: bool,
}

pub fn parse_options(args: &[String]) -> Result<Options, i32> {
    let mut options = Options::default();
    let mut program_file = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                options.help = true;
                return Ok(options);
            }
            "-o" => options.dump = true,
            "-l" => options.load_only = true,
            "-t" => options.trace = true,
            "-v" => options.verbose = true,
            "-it" => {
                let value = iter.next().ok_or_else(|| {
                    eprintln!("error: -it requires a value");
                    EXIT_USAGE
                })?;
                options.interpreter = Some(value.clone());
            }
            // -it2
            other if other.starts_with("-it") => {
                options.interpreter = Some(other["-it".len()..].to_string());
            }
            other if other.starts_with('-') => {
                eprintln!("error: invalid option '{other}'");
                return Err(EXIT_USAGE);
            }
            other => {
                if program_file.replace(other.to_string()).is_some() {
                    eprintln!("error: more than one program file given");
                    return Err(EXIT_USAGE);
                }
            }
        }
    }

    if options.trace && options.load_only {
        eprintln!("error: invalid option combination, -t and -l cannot be used together");
        return Err(EXIT_USAGE);
    }

    options.program_file = program_file.ok_or_else(|| {
        eprintln!("error: no program file given");
        EXIT_USAGE
    })?;
    Ok(options)
}

/// Map the `-it` value to a VM configuration. Default is 2.
fn select_config(options: &Options) -> Result<VmConfig, i32> {
    let selection = options.interpreter.as_deref().unwrap_or("2");
    let mut config = selection
        .parse::<u32>()
        .ok()
        .and_then(VmConfig::from_selection)
        .ok_or_else(|| {
            eprintln!("error: unknown interpreter type {selection}");
            EXIT_UNKNOWN_INTERPRETER
        })?;
    config.trace = options.trace;
    config.verbose = options.verbose;
    Ok(config)
}

/// Load, verify and (unless `-l`) run the program.
pub fn run(options: &Options) -> Result<(), i32> {
    let path = &options.program_file;
    let bytes = fs::read(path).map_err(|e| {
        eprintln!("error: cannot read '{path}': {e}");
        EXIT_USAGE
    })?;

    let program = elle_verifier::load(&bytes).map_err(|e| {
        match e {
            ProgramError::Load(e) => eprintln!("error: {e}"),
            ProgramError::Verify(errors) => {
                for e in &errors {
                    eprintln!("error: {e}");
                }
            }
        }
        EXIT_MALFORMED
    })?;

    if options.dump {
        print!("{}", elle_common::disassemble(&program));
    }

    if options.load_only {
        println!("Finished parsing program \"{}\" with no errors", program.name);
        return Ok(());
    }

    let config = select_config(options)?;

    if program.find_function("main").is_none() {
        eprintln!("Failed to find main function");
        return Ok(());
    }

    match elle_vm::run(program, config, StdHost) {
        Ok(Completion::Returned(value)) => {
            println!("Main returned {value}");
            Ok(())
        }
        Ok(Completion::Halted) => {
            println!("Program halted");
            Ok(())
        }
        Err(e) => {
            eprintln!("runtime error: {e}");
            Err(EXIT_RUNTIME)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults() {
        let options = parse_options(&args(&["prog.elle"])).unwrap();
        assert_eq!(options.program_file, "prog.elle");
        assert_eq!(select_config(&options), Ok(VmConfig::default()));
    }

    #[test]
    fn flags_and_interpreter() {
        let options = parse_options(&args(&["-o", "-it", "0", "-t", "-v", "p"])).unwrap();
        assert!(options.dump && options.trace && options.verbose);
        let config = select_config(&options).unwrap();
        assert_eq!(config.dispatch, elle_vm::Dispatch::Switch);
        assert!(config.trace && config.verbose);

        let joined = parse_options(&args(&["-it1", "p"])).unwrap();
        assert_eq!(joined.interpreter.as_deref(), Some("1"));
    }

    #[test]
    fn rejects_bad_usage() {
        assert_eq!(parse_options(&args(&[])), Err(EXIT_USAGE));
        assert_eq!(parse_options(&args(&["-t", "-l", "p"])), Err(EXIT_USAGE));
        assert_eq!(parse_options(&args(&["-x", "p"])), Err(EXIT_USAGE));
        assert_eq!(parse_options(&args(&["a", "b"])), Err(EXIT_USAGE));
        assert_eq!(parse_options(&args(&["p", "-it"])), Err(EXIT_USAGE));
    }

    #[test]
    fn unknown_interpreter() {
        for value in ["3", "-1", "fast"] {
            let options = parse_options(&args(&["-it", value, "p"])).unwrap();
            assert_eq!(select_config(&options), Err(EXIT_UNKNOWN_INTERPRETER));
        }
    }

    #[test]
    fn help_stops_parsing() {
        assert!(parse_options(&args(&["-x", "--help"])).is_err());
        assert!(parse_options(&args(&["--help", "-x"])).unwrap().help);
    }
}

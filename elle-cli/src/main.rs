//! ELLE CLI: load, verify, dump, and run a bytecode program.
//!
//! Exit codes:
//! - 0: Success (including a halted run or a program without `main`)
//! - -1: Usage error or unreadable program file
//! - -2: Malformed program or verification failure
//! - -3: Unknown interpreter type
//! - -4: Runtime error

mod commands;

use std::process;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let options = match commands::parse_options(&args) {
        Ok(options) => options,
        Err(code) => {
            eprintln!();
            print_usage();
            process::exit(code);
        }
    };

    if options.help {
        print_usage();
        process::exit(0);
    }

    if let Err(code) = commands::run(&options) {
        process::exit(code);
    }
}

fn print_usage() {
    eprintln!("Usage: elle [options] <programFile>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -it <0|1|2>   Interpreter: 0 switch, 1 table, 2 table with tiering (default 2)");
    eprintln!("  -o            Dump the program after loading");
    eprintln!("  -l            Only load the program, do not run it");
    eprintln!("  -t            Trace execution");
    eprintln!("  -v            Report tiering decisions");
    eprintln!("  -h, --help    Show this message");
}

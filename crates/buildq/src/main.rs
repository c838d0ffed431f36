#![forbid(unsafe_code)]

use anyhow::Result;
use buildq::cli::app::{Cli, Command};
use buildq::cli::commands;
use clap::Parser;
use clap::error::ErrorKind;

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_USAGE_ERROR: i32 = 64;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => return exit_code_for_parse_error(error),
    };

    match execute(cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(error) => {
            eprintln!("buildq: {error:#}");
            EXIT_RUNTIME_FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Builds(args) => commands::builds::run(&args),
        Command::Schema(args) => commands::schema::run(&args),
    }
}

fn exit_code_for_parse_error(error: clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = error.print();
            EXIT_SUCCESS
        }
        _ => {
            let _ = error.print();
            EXIT_USAGE_ERROR
        }
    }
}

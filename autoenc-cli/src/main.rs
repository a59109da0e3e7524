// autoenc-cli/src/main.rs
//
// Entry point of the `autoenc` binary: parses the command line, runs the
// selected command and turns an error into a red message and exit code 1.

use autoenc::{Cli, Commands, run_encode};
use clap::Parser;
use console::style;
use std::process;

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Encode(args) => run_encode(args, cli.verbose),
    };

    if let Err(e) = result {
        log::error!("{e}");
        eprintln!("{} {}", style("Error:").red().bold(), style(&e).red());
        process::exit(1);
    }
}

//! suid-ctl: run programs under a chosen user, group, directory and environment

mod cli;
mod commands;
mod logging;
mod runner;

use clap::Parser;
use cli::{Cli, Commands};
use commands::{check_requirements, probe};
use console::style;
use runner::{RunConfig, run_program};

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", style("error:").red().bold(), e);
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();

    logging::init_logger(cli.verbose);

    match cli.command {
        Commands::Run {
            uid,
            gid,
            cwd,
            env,
            set,
            trusted_path,
            json,
            program,
            args,
        } => {
            let config = RunConfig {
                uid,
                gid,
                cwd,
                env,
                set,
                trusted_path,
                json,
                program,
                args,
            };
            match run_program(config) {
                Ok(code) => std::process::exit(code),
                Err(e) => fail(e),
            }
        }
        Commands::Probe { output } => {
            if let Err(e) = probe(output.as_deref()) {
                fail(e);
            }
        }
        Commands::Check => check_requirements(),
    }
}

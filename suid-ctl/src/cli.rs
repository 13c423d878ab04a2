use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "suid-ctl")]
#[command(version, about = "Launch programs under a chosen user, group and environment", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Run as nobody with a synthesized environment
    suid-ctl run --uid 65534 --gid 65534 --env empty -- /usr/bin/id

    # Exactly these variables (PATH is always the trusted one)
    suid-ctl run --env explicit --set TERM=xterm --set LANG=C.UTF-8 /usr/bin/env

    # Report what a launched process sees
    suid-ctl run --uid 1000 --gid 1000 --cwd /tmp -- suid-ctl probe

    # Show what this system supports
    suid-ctl check
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// `--env` choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EnvMode {
    /// Keep the caller's environment
    Inherit,
    /// Synthesize from the target user's passwd entry
    Empty,
    /// Only the variables given with --set
    Explicit,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a program as another user and wait for it
    Run {
        /// Target user id (defaults to the caller's real uid)
        #[arg(short, long, value_name = "UID")]
        uid: Option<u32>,

        /// Target group id (defaults to the caller's real gid)
        #[arg(short, long, value_name = "GID")]
        gid: Option<u32>,

        /// Working directory of the program
        #[arg(short = 'C', long, value_name = "DIR", default_value = "/")]
        cwd: PathBuf,

        /// Environment policy
        #[arg(short, long, value_enum, default_value_t = EnvMode::Inherit)]
        env: EnvMode,

        /// Variable for --env explicit (repeatable)
        #[arg(short, long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        set: Vec<(String, String)>,

        /// Search path forced as PATH (defaults to the init process's PATH)
        #[arg(long, value_name = "PATH")]
        trusted_path: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Program to run
        program: String,

        /// Program arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print this process's argv, environment and ids as JSON
    Probe {
        /// Write to FILE instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Check what launches can rely on here
    Check,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

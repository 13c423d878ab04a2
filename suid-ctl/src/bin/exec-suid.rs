//! exec-suid: setuid interpreter for `#!` scripts
//!
//! Install setuid-root and reference it from a script header:
//!
//! ```text
//! #!/usr/bin/exec-suid --real -- /usr/bin/python3 -I
//! ```
//!
//! Set `DEBUG_EXEC_SUID` to get a trace of each step on stderr.

use log::LevelFilter;
use std::io::Write;

use suid_launch::dispatch::{self, ScriptInvocation};
use suid_launch::{DispatchError, EnvironmentBuilder, SystemDirectory};

fn init_logger() {
    if std::env::var_os("DEBUG_EXEC_SUID").is_none() {
        return;
    }
    env_logger::Builder::new()
        .format(|buf, record| writeln!(buf, "[exec-suid] {}", record.args()))
        .filter_level(LevelFilter::Debug)
        .try_init()
        .ok();
}

fn run(args: Vec<String>) -> Result<(), DispatchError> {
    let invocation = ScriptInvocation::from_args(args)?;
    let plan = dispatch::plan(
        &invocation,
        &EnvironmentBuilder::from_init_process(),
        &SystemDirectory,
    )?;
    dispatch::exec(plan)?;
    Ok(())
}

fn main() {
    init_logger();

    let args: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let name = args
        .first()
        .cloned()
        .unwrap_or_else(|| "exec-suid".to_string());

    if let Err(e) = run(args) {
        eprintln!("{}: {}", name, e);
        std::process::exit(1);
    }
}

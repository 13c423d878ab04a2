//! Setuid script interpreter
//!
//! Linux ignores setuid bits on interpreted scripts. `exec-suid` is
//! installed setuid-root and named in a script's `#!` line; it re-applies
//! the script's own setuid/setgid bits and then execs the real command from
//! the header:
//!
//! ```text
//! #!/usr/bin/exec-suid --real --environ=safe -- /usr/bin/python3 -I
//! ```
//!
//! The kernel runs this as `exec-suid "<options>" <script> [args...]`.
//! The options argument is ignored; the header is re-read from the script
//! itself once the script path has been validated.

use clap::{Parser, ValueEnum};
use log::debug;
use nix::unistd::execve;
use std::convert::Infallible;
use std::ffi::CString;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use suid_core::identity::FileOwnership;
use suid_core::util::{get_gid, get_uid};
use suid_core::{
    DispatchError, IdentityDirectory, IdentityResolver, IdentityTransition, LaunchError,
    ShebangError,
};

use crate::environment::{
    EnvMap, EnvironmentBuilder, EnvironmentPolicy, caller_environment, to_envp,
};
use crate::secure_path;
use crate::shebang::parse_header;

/// `--environ` modes of a script header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EnvironMode {
    /// Synthesized from the target user, keeping locale settings
    #[default]
    Safe,
    /// No environment at all
    #[value(name = "none")]
    Clear,
    /// The caller's environment, untouched
    All,
}

impl EnvironMode {
    fn policy(self) -> EnvironmentPolicy {
        match self {
            EnvironMode::Safe => EnvironmentPolicy::Sanitized(caller_environment()),
            EnvironMode::Clear => EnvironmentPolicy::Explicit(EnvMap::new()),
            EnvironMode::All => EnvironmentPolicy::Inherited,
        }
    }
}

/// Interpreter options taken from the `#!` line
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
pub struct HeaderOptions {
    /// Set the real user and group ids as well as the effective ones
    #[arg(long)]
    pub real: bool,

    /// Environment policy
    #[arg(long, value_enum, default_value_t = EnvironMode::Safe)]
    pub environ: EnvironMode,
}

impl HeaderOptions {
    pub fn parse_tokens(tokens: &[String]) -> Result<Self, DispatchError> {
        Self::try_parse_from(tokens).map_err(|e| DispatchError::Options(e.to_string()))
    }
}

/// How `exec-suid` was started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInvocation {
    /// argv[0], which must match the interpreter named in the header
    pub invoked_as: String,
    pub script: PathBuf,
    pub args: Vec<String>,
}

impl ScriptInvocation {
    /// Split the interpreter's own argv.
    ///
    /// With more than one argument the first is the header remainder passed
    /// by the kernel and the script follows it.
    pub fn from_args(args: Vec<String>) -> Result<Self, DispatchError> {
        let mut args = args.into_iter();
        let invoked_as = args.next().unwrap_or_else(|| "exec-suid".to_string());
        let rest: Vec<String> = args.collect();

        let script_index = match rest.len() {
            0 => return Err(DispatchError::Usage(invoked_as)),
            1 => 0,
            _ => 1,
        };
        let mut rest = rest.into_iter().skip(script_index);
        let script = rest.next().map(PathBuf::from).ok_or_else(|| {
            DispatchError::Usage(invoked_as.clone())
        })?;

        Ok(Self {
            invoked_as,
            script,
            args: rest.collect(),
        })
    }
}

/// Fully resolved exec of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub exec_path: PathBuf,
    pub argv: Vec<String>,
    pub transition: IdentityTransition,
    pub env: EnvMap,
}

/// Validate the script and work out what to exec and as whom.
pub fn plan(
    invocation: &ScriptInvocation,
    environment: &EnvironmentBuilder,
    directory: &dyn IdentityDirectory,
) -> Result<DispatchPlan, DispatchError> {
    let script = &invocation.script;
    debug!("Path: {}", script.display());

    secure_path::validate(script)?;

    // Header and mode bits come from the same open file.
    let file = File::open(script).map_err(ShebangError::from)?;
    let ownership = FileOwnership::from_metadata(&file.metadata().map_err(LaunchError::from)?);
    let header = parse_header(BufReader::new(file))?;
    debug!("Header: {:?}", header);

    if header.interpreter_path() != invocation.invoked_as {
        return Err(DispatchError::InterpreterMismatch {
            expected: invocation.invoked_as.clone(),
            found: header.interpreter_path().to_string(),
        });
    }

    let options = HeaderOptions::parse_tokens(header.interpreter_options())?;
    debug!("Options: {:?}", options);

    debug!(
        "Owner (UID, GID): {} {}, permissions: {:o}",
        ownership.uid,
        ownership.gid,
        ownership.mode & 0o7777
    );
    let transition = IdentityTransition::for_file(ownership, get_uid(), get_gid(), options.real);
    debug!("Transition: {:?}", transition);

    let policy = options.environ.policy();
    let target_uid = transition.uid.effective;
    let record = if policy.needs_identity_record() {
        directory.lookup(target_uid)
    } else {
        None
    };
    let env = environment.build(&policy, target_uid, record.as_ref())?;

    let mut argv = header.command;
    argv.push(script.to_string_lossy().into_owned());
    argv.extend(invocation.args.iter().cloned());
    debug!("Arguments (script): {:?}", argv);

    Ok(DispatchPlan {
        exec_path: PathBuf::from(&argv[0]),
        argv,
        transition,
        env,
    })
}

/// Assume the planned identity and replace the process image.
///
/// Only returns on failure.
pub fn exec(plan: DispatchPlan) -> Result<Infallible, DispatchError> {
    let path = c_string(plan.exec_path.to_string_lossy().as_ref())?;
    let argv = plan
        .argv
        .iter()
        .map(|arg| c_string(arg))
        .collect::<Result<Vec<_>, _>>()?;
    let envp = to_envp(&plan.env)?;

    IdentityResolver::apply(&plan.transition)?;

    execve(&path, &argv, &envp).map_err(|errno| {
        DispatchError::Launch(LaunchError::ExecFailed {
            path: plan.exec_path.clone(),
            errno,
        })
    })
}

fn c_string(s: &str) -> Result<CString, LaunchError> {
    CString::new(s).map_err(|_| LaunchError::InvalidArgument(format!("{:?} contains nul byte", s)))
}

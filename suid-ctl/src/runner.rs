use console::style;
use log::{debug, info};
use serde::Serialize;
use std::path::PathBuf;

use suid_launch::{
    EnvMap, EnvironmentBuilder, EnvironmentPolicy, ExecutionSpec, LaunchError, ProcessLauncher,
    TargetIdentity,
};

use crate::cli::EnvMode;

/// Configuration for one launch
pub struct RunConfig {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub cwd: PathBuf,
    pub env: EnvMode,
    pub set: Vec<(String, String)>,
    pub trusted_path: Option<String>,
    pub json: bool,
    pub program: String,
    pub args: Vec<String>,
}

impl RunConfig {
    fn env_policy(&self) -> Result<EnvironmentPolicy, String> {
        if !self.set.is_empty() && self.env != EnvMode::Explicit {
            return Err("--set requires --env explicit".to_string());
        }
        Ok(match self.env {
            EnvMode::Inherit => EnvironmentPolicy::Inherited,
            EnvMode::Empty => EnvironmentPolicy::Empty,
            EnvMode::Explicit => EnvironmentPolicy::Explicit(self.set.iter().cloned().collect::<EnvMap>()),
        })
    }
}

#[derive(Serialize)]
struct RunReport {
    pid: Option<i32>,
    exit_code: Option<i32>,
    signal: Option<i32>,
    exec_time_ms: Option<u64>,
}

/// Launch the configured program and return the exit code to leave with.
///
/// A signal death maps to `128 + signal`, as shells report it.
pub fn run_program(config: RunConfig) -> Result<i32, Box<dyn std::error::Error>> {
    let policy = config.env_policy()?;
    let current = TargetIdentity::current();
    let uid = config.uid.unwrap_or(current.uid);
    let gid = config.gid.unwrap_or(current.gid);

    let environment = match &config.trusted_path {
        Some(path) => EnvironmentBuilder::new(path.clone()),
        None => EnvironmentBuilder::from_init_process(),
    };
    debug!("Trusted PATH: {}", environment.trusted_path());
    debug!("Environment policy: {:?}", policy);

    let spec = ExecutionSpec::builder(config.program.as_str())
        .args(config.args.iter().cloned())
        .identity(uid, gid)
        .cwd(&config.cwd)
        .env_policy(policy)
        .build();

    info!("Executing: {} {:?}", config.program, config.args);

    let launcher = ProcessLauncher::new().with_environment_builder(environment);
    let report = match launcher.launch(spec) {
        Ok(status) => {
            info!("Execution completed in {}ms", status.exec_time_ms);
            RunReport {
                pid: Some(status.pid.as_raw()),
                exit_code: Some(status.code),
                signal: None,
                exec_time_ms: Some(status.exec_time_ms),
            }
        }
        Err(LaunchError::Signaled(signal)) => RunReport {
            pid: None,
            exit_code: None,
            signal: Some(signal),
            exec_time_ms: None,
        },
        Err(e) => return Err(e.into()),
    };

    if config.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_report(&report);
    }

    Ok(match (report.exit_code, report.signal) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    })
}

fn print_report(report: &RunReport) {
    if let Some(signal) = report.signal {
        println!(
            "{}={}",
            style("signal").dim(),
            style(signal).red().bold()
        );
        return;
    }

    let code = report.exit_code.unwrap_or_default();
    let code_styled = if code == 0 {
        style(code).green().bold()
    } else {
        style(code).red().bold()
    };

    println!(
        "{}={} | {}={} | {}={}",
        style("exit_code").dim(),
        code_styled,
        style("pid").dim(),
        style(report.pid.unwrap_or_default()).bold(),
        style("exec_time_ms").dim(),
        style(report.exec_time_ms.unwrap_or_default()).bold(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(env: EnvMode, set: &[(&str, &str)]) -> RunConfig {
        RunConfig {
            uid: None,
            gid: None,
            cwd: PathBuf::from("/"),
            env,
            set: set
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            trusted_path: None,
            json: false,
            program: "/bin/true".to_string(),
            args: Vec::new(),
        }
    }

    #[test]
    fn env_modes_map_to_policies() {
        assert_eq!(
            config(EnvMode::Inherit, &[]).env_policy().unwrap(),
            EnvironmentPolicy::Inherited
        );
        assert_eq!(
            config(EnvMode::Empty, &[]).env_policy().unwrap(),
            EnvironmentPolicy::Empty
        );

        let policy = config(EnvMode::Explicit, &[("TERM", "xterm")])
            .env_policy()
            .unwrap();
        let expected: EnvMap = [("TERM".to_string(), "xterm".to_string())]
            .into_iter()
            .collect();
        assert_eq!(policy, EnvironmentPolicy::Explicit(expected));
    }

    #[test]
    fn set_without_explicit_is_rejected() {
        assert!(config(EnvMode::Empty, &[("A", "b")]).env_policy().is_err());
    }

    #[test]
    fn run_true_returns_zero() {
        assert_eq!(run_program(config(EnvMode::Inherit, &[])).unwrap(), 0);
    }
}

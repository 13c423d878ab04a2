//! What a launched probe reports about itself
//!
//! A probe is any target that prints its own argv, environment and
//! identity as one JSON object. The launcher never depends on it; tests use
//! it to check what a child actually observed.

use serde::{Deserialize, Serialize};
use std::io::Write;

use suid_core::util::{gid_triple, uid_triple};
use suid_core::{IdentityError, LaunchError, Result};

use crate::environment::EnvMap;

/// A process's view of its own invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessObservation {
    pub argv: Vec<String>,
    pub env: EnvMap,
    /// `[real, effective, saved]`
    pub uid: [u32; 3],
    /// `[real, effective, saved]`
    pub gid: [u32; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl ProcessObservation {
    /// Observe the current process.
    pub fn capture() -> std::result::Result<Self, IdentityError> {
        Ok(Self {
            argv: std::env::args_os()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            env: std::env::vars_os()
                .map(|(k, v)| {
                    (
                        k.to_string_lossy().into_owned(),
                        v.to_string_lossy().into_owned(),
                    )
                })
                .collect(),
            uid: uid_triple()?,
            gid: gid_triple()?,
            cwd: std::env::current_dir()
                .ok()
                .map(|p| p.to_string_lossy().into_owned()),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| LaunchError::InvalidArgument(format!("observation encoding: {}", e)))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| LaunchError::InvalidArgument(format!("observation decoding: {}", e)))
    }

    /// Write as one JSON line.
    pub fn write_to(&self, mut out: impl Write) -> Result<()> {
        writeln!(out, "{}", self.to_json()?)?;
        out.flush()?;
        Ok(())
    }
}

/// Source of process observations
pub trait Probe {
    fn observe(&self) -> std::result::Result<ProcessObservation, IdentityError>;
}

/// Observes the process it runs in
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfProbe;

impl Probe for SelfProbe {
    fn observe(&self) -> std::result::Result<ProcessObservation, IdentityError> {
        ProcessObservation::capture()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_probe_reports_own_identity() {
        let observation = SelfProbe.observe().unwrap();
        assert_eq!(observation.uid[0], suid_core::util::get_uid());
        assert_eq!(observation.uid[1], suid_core::util::get_euid());
        assert_eq!(observation.gid[0], suid_core::util::get_gid());
        assert!(!observation.argv.is_empty());
    }

    #[test]
    fn json_uses_probe_field_names() {
        let observation = ProcessObservation {
            argv: vec!["./probe".to_string(), "x".to_string()],
            env: [("TERM".to_string(), "xterm".to_string())].into_iter().collect(),
            uid: [1000, 0, 0],
            gid: [1000, 1000, 1000],
            cwd: None,
        };

        let value: serde_json::Value = serde_json::from_str(&observation.to_json().unwrap()).unwrap();
        assert_eq!(value["argv"], serde_json::json!(["./probe", "x"]));
        assert_eq!(value["env"]["TERM"], "xterm");
        assert_eq!(value["uid"], serde_json::json!([1000, 0, 0]));
        assert!(value.get("cwd").is_none());
    }

    #[test]
    fn parses_probe_output_without_cwd() {
        let text = r#"{"argv":["/p"],"env":{},"uid":[0,0,0],"gid":[0,0,0]}"#;
        let observation = ProcessObservation::from_json(text).unwrap();
        assert_eq!(observation.argv, vec!["/p"]);
        assert!(observation.env.is_empty());
        assert_eq!(observation.cwd, None);
    }
}

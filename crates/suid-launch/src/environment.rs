//! Environment construction for launched processes
//!
//! `PATH` is never taken from the caller except under
//! [`EnvironmentPolicy::Inherited`]; every other policy sets it to the
//! builder's trusted search path.

use log::{debug, warn};
use std::collections::BTreeMap;
use std::ffi::CString;
use std::fs;

use suid_core::{EnvironmentError, LaunchError, PasswdRecord};

/// Final environment handed to a child
pub type EnvMap = BTreeMap<String, String>;

/// Search path used when no trusted source is available.
pub const DEFAULT_SEARCH_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

const INIT_ENVIRON: &str = "/proc/1/environ";

/// Keys carried over from the caller under [`EnvironmentPolicy::Sanitized`]
const LOCALE_KEYS: [&str; 5] = ["TERM", "LANG", "LANGUAGE", "TZ", "LS_COLORS"];

/// How the child environment is derived
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnvironmentPolicy {
    /// The caller's environment, untouched
    #[default]
    Inherited,
    /// No environment supplied: synthesize one from the passwd record
    Empty,
    /// Exactly this mapping, with `PATH` forced to the trusted path
    Explicit(EnvMap),
    /// Synthesized defaults plus the locale and terminal keys of this mapping
    Sanitized(EnvMap),
}

impl EnvironmentPolicy {
    /// Whether building this policy needs the target's passwd record
    pub fn needs_identity_record(&self) -> bool {
        matches!(
            self,
            EnvironmentPolicy::Empty | EnvironmentPolicy::Sanitized(_)
        )
    }
}

/// Derives child environments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentBuilder {
    trusted_path: String,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_PATH)
    }
}

impl EnvironmentBuilder {
    pub fn new(trusted_path: impl Into<String>) -> Self {
        Self {
            trusted_path: trusted_path.into(),
        }
    }

    /// Use the `PATH` of the init process, falling back to
    /// [`DEFAULT_SEARCH_PATH`] when it cannot be read.
    pub fn from_init_process() -> Self {
        match fs::read(INIT_ENVIRON) {
            Ok(raw) => match path_from_environ_block(&raw) {
                Some(path) => {
                    debug!("Trusted PATH from {}: {}", INIT_ENVIRON, path);
                    Self::new(path)
                }
                None => {
                    warn!("No PATH in {}; using default search path", INIT_ENVIRON);
                    Self::default()
                }
            },
            Err(e) => {
                debug!("Cannot read {}: {}; using default search path", INIT_ENVIRON, e);
                Self::default()
            }
        }
    }

    pub fn trusted_path(&self) -> &str {
        &self.trusted_path
    }

    /// Build the final environment for `policy`.
    pub fn build(
        &self,
        policy: &EnvironmentPolicy,
        uid: u32,
        record: Option<&PasswdRecord>,
    ) -> Result<EnvMap, EnvironmentError> {
        match policy {
            EnvironmentPolicy::Inherited => Ok(caller_environment()),
            EnvironmentPolicy::Empty => {
                let record = record.ok_or(EnvironmentError::MissingIdentityRecord { uid })?;
                Ok(self.synthesize(record))
            }
            EnvironmentPolicy::Explicit(map) => {
                let mut env = map.clone();
                if !env.is_empty() {
                    env.insert("PATH".to_string(), self.trusted_path.clone());
                }
                Ok(env)
            }
            EnvironmentPolicy::Sanitized(map) => {
                let record = record.ok_or(EnvironmentError::MissingIdentityRecord { uid })?;
                let mut env = self.synthesize(record);
                for (key, value) in map {
                    if LOCALE_KEYS.contains(&key.as_str()) || key.starts_with("LC_") {
                        env.insert(key.clone(), value.clone());
                    }
                }
                Ok(env)
            }
        }
    }

    fn synthesize(&self, record: &PasswdRecord) -> EnvMap {
        let mut env = EnvMap::new();
        env.insert("LOGNAME".to_string(), record.name.clone());
        env.insert("USER".to_string(), record.name.clone());
        env.insert("HOME".to_string(), record.home_dir.clone());
        env.insert("SHELL".to_string(), record.shell.clone());
        env.insert("MAIL".to_string(), format!("/var/mail/{}", record.name));
        env.insert("TERM".to_string(), "unknown".to_string());
        env.insert("LANG".to_string(), "C.UTF-8".to_string());
        env.insert("PATH".to_string(), self.trusted_path.clone());
        env
    }
}

/// Caller environment; entries that are not UTF-8 cannot be represented.
pub fn caller_environment() -> EnvMap {
    std::env::vars_os()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                warn!("Skipping non UTF-8 environment entry {:?}", key);
                None
            }
        })
        .collect()
}

fn path_from_environ_block(raw: &[u8]) -> Option<String> {
    raw.split(|b| *b == 0)
        .find_map(|entry| entry.strip_prefix(b"PATH="))
        .map(|value| String::from_utf8_lossy(value).into_owned())
}

/// Render `KEY=VALUE` strings for `execve`.
pub fn to_envp(env: &EnvMap) -> Result<Vec<CString>, LaunchError> {
    env.iter()
        .map(|(key, value)| {
            if key.is_empty() || key.contains('=') {
                return Err(LaunchError::InvalidArgument(format!(
                    "invalid environment key: {:?}",
                    key
                )));
            }
            CString::new(format!("{}={}", key, value)).map_err(|_| {
                LaunchError::InvalidArgument(format!("environment entry {} contains nul byte", key))
            })
        })
        .collect()
}

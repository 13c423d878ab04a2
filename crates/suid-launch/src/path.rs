//! Launch target addressing
//!
//! No `PATH` search is done here: a bare name is treated like any other
//! relative path.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use suid_core::{LaunchError, Result};

/// Target as given by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDescriptor(PathBuf);

impl PathDescriptor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn is_absolute(&self) -> bool {
        self.0.is_absolute()
    }
}

impl From<&str> for PathDescriptor {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for PathDescriptor {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for PathDescriptor {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

/// Where to exec and what the child sees as argv[0]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub exec_path: PathBuf,
    pub argv0: OsString,
}

/// Resolve a target against the current working directory.
///
/// Relative targets are anchored to the caller's directory at the time of
/// the call, before the child changes into its own working directory.
pub fn resolve(target: &PathDescriptor) -> Result<ResolvedTarget> {
    let path = target.as_path();
    if path.as_os_str().is_empty() {
        return Err(LaunchError::InvalidArgument(
            "launch target is empty".to_string(),
        ));
    }

    let exec_path = if target.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    Ok(ResolvedTarget {
        exec_path,
        argv0: path.as_os_str().to_os_string(),
    })
}

//! Launch configuration

use std::path::{Path, PathBuf};

use suid_core::TargetIdentity;

use crate::environment::EnvironmentPolicy;
use crate::path::PathDescriptor;

/// Everything one launch needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSpec {
    /// Program to execute
    pub target: PathDescriptor,
    /// Arguments following argv[0]
    pub argv_extra: Vec<String>,
    /// Identity to drop to before exec
    pub identity: TargetIdentity,
    /// Working directory of the child
    pub cwd: PathBuf,
    /// How the child environment is derived
    pub env_policy: EnvironmentPolicy,
}

impl ExecutionSpec {
    pub fn builder(target: impl Into<PathDescriptor>) -> ExecutionSpecBuilder {
        ExecutionSpecBuilder::new(target)
    }
}

/// Builder pattern for execution specs
pub struct ExecutionSpecBuilder {
    spec: ExecutionSpec,
}

impl ExecutionSpecBuilder {
    /// Defaults: caller's real ids, `/` as working directory, inherited
    /// environment, no extra arguments.
    pub fn new(target: impl Into<PathDescriptor>) -> Self {
        Self {
            spec: ExecutionSpec {
                target: target.into(),
                argv_extra: Vec::new(),
                identity: TargetIdentity::current(),
                cwd: PathBuf::from("/"),
                env_policy: EnvironmentPolicy::default(),
            },
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.spec.argv_extra.push(arg.into());
        self
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.argv_extra.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the identity to drop to
    pub fn identity(mut self, uid: u32, gid: u32) -> Self {
        self.spec.identity = TargetIdentity::new(uid, gid);
        self
    }

    /// Set the child's working directory
    pub fn cwd(mut self, path: impl AsRef<Path>) -> Self {
        self.spec.cwd = path.as_ref().to_path_buf();
        self
    }

    /// Set the environment policy
    pub fn env_policy(mut self, policy: EnvironmentPolicy) -> Self {
        self.spec.env_policy = policy;
        self
    }

    pub fn build(self) -> ExecutionSpec {
        self.spec
    }
}

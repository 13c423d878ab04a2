//! suid-launch: run programs under a chosen identity
//!
//! A launcher for privileged callers. Each launch forks one child which
//! changes directory, drops to the requested user and group, and execs the
//! target with an environment derived from an [`EnvironmentPolicy`]. The
//! caller blocks until the child exits and gets its exit code back, or a
//! discriminated [`LaunchError`] if any step before exec failed.
//!
//! The crate also carries the pieces of `exec-suid`, a setuid interpreter
//! that honours the setuid bits of `#!` scripts.
//!
//! # Example
//!
//! ```ignore
//! use suid_launch::{EnvironmentPolicy, ExecutionSpec, ProcessLauncher};
//!
//! let spec = ExecutionSpec::builder("/usr/bin/id")
//!     .identity(65534, 65534)
//!     .cwd("/tmp")
//!     .env_policy(EnvironmentPolicy::Empty)
//!     .build();
//!
//! let status = ProcessLauncher::new().launch(spec)?;
//! println!("Exit code: {}", status.code);
//! ```

pub mod dispatch;
pub mod environment;
pub mod launcher;
pub mod observation;
pub mod path;
pub mod secure_path;
pub mod shebang;
pub mod spec;

pub use suid_core::{
    self, DispatchError, EnvironmentError, IdentityDirectory, IdentityError, LaunchError,
    PasswdRecord, Result, StaticDirectory, SystemDirectory, TargetIdentity,
    capabilities::SystemCapabilities, util,
};

pub use dispatch::{DispatchPlan, ScriptInvocation};
pub use environment::{DEFAULT_SEARCH_PATH, EnvMap, EnvironmentBuilder, EnvironmentPolicy};
pub use launcher::{ExitStatus, ProcessLauncher};
pub use observation::{Probe, ProcessObservation, SelfProbe};
pub use path::{PathDescriptor, ResolvedTarget};
pub use spec::{ExecutionSpec, ExecutionSpecBuilder};

#[cfg(test)]
mod tests {
    #[test]
    fn core_crate_is_reexported_under_its_own_name() {
        assert_eq!(crate::suid_core::util::get_uid(), crate::util::get_uid());
        let _: crate::suid_core::Result<()> = Ok(());
    }
}

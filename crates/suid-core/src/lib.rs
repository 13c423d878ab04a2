//! suid-core: shared types, errors, and identity handling for suid-launch
//!
//! This crate provides the foundational pieces used by the launcher and the
//! command line tools:
//! - Error types and Result alias
//! - Identity transitions (real/effective/saved uid and gid)
//! - Passwd-style identity record lookup
//! - Utility functions (uid/gid queries)
//! - Runtime capability detection

pub mod capabilities;
pub mod error;
pub mod identity;
pub mod passwd;
pub mod util;

pub use error::{
    DispatchError, EnvironmentError, IdentityError, InsecurePath, LaunchError, Result,
    ShebangError,
};
pub use identity::{
    FileOwnership, IdTriple, IdentityResolver, IdentityTransition, TargetIdentity,
};
pub use passwd::{IdentityDirectory, PasswdRecord, StaticDirectory, SystemDirectory};

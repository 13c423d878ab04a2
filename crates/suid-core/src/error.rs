//! Error types for launch operations

use nix::errno::Errno;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for launch operations
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Errors raised while changing the process identity
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Insufficient privilege to assume uid {uid} gid {gid}")]
    InsufficientPrivilege { uid: u32, gid: u32 },

    #[error("uid {uid} / gid {gid} does not name a valid principal")]
    InvalidIdentity { uid: u32, gid: u32 },

    #[error("{op} failed: {errno}")]
    Os { op: &'static str, errno: Errno },
}

impl IdentityError {
    /// Classify a failed identity syscall.
    pub fn from_errno(op: &'static str, uid: u32, gid: u32, errno: Errno) -> Self {
        match errno {
            Errno::EPERM => IdentityError::InsufficientPrivilege { uid, gid },
            Errno::EINVAL => IdentityError::InvalidIdentity { uid, gid },
            errno => IdentityError::Os { op, errno },
        }
    }

    /// Syscall that failed, for errors that name one.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            IdentityError::Os { op, .. } => Some(op),
            _ => None,
        }
    }

    /// The errno this error travels as across the launch status pipe.
    pub fn errno(&self) -> Errno {
        match self {
            IdentityError::InsufficientPrivilege { .. } => Errno::EPERM,
            IdentityError::InvalidIdentity { .. } => Errno::EINVAL,
            IdentityError::Os { errno, .. } => *errno,
        }
    }
}

/// Errors raised while deriving the child environment
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("No passwd record for uid {uid}")]
    MissingIdentityRecord { uid: u32 },
}

/// Errors that can occur during a launch
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("chdir to {} failed: {errno}", path.display())]
    Chdir { path: PathBuf, errno: Errno },

    #[error("exec of {} failed: {errno}", path.display())]
    ExecFailed { path: PathBuf, errno: Errno },

    #[error("Target killed by signal {0}")]
    Signaled(i32),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Syscall error: {0}")]
    Syscall(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl LaunchError {
    /// True when the launch never reached a running target; false only for
    /// a target that ran and was terminated by a signal.
    pub fn is_preparation_failure(&self) -> bool {
        !matches!(self, LaunchError::Signaled(_))
    }
}

/// Errors in a script's `#!` header
#[derive(Error, Debug)]
pub enum ShebangError {
    #[error("Failed to read header: {0}")]
    Read(#[from] io::Error),

    #[error("Header does not start with #!")]
    MissingMagic,

    #[error("Header does not end with a newline")]
    Unterminated,

    #[error("Header does not contain a -- separator")]
    MissingSeparator,

    #[error("Header names no interpreter")]
    MissingInterpreter,

    #[error("Header names no script command")]
    MissingCommand,
}

/// Reasons a script path is not trusted for setuid dispatch
#[derive(Error, Debug)]
pub enum InsecurePath {
    #[error("{}: path does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("{}: path is a symlink", .0.display())]
    Symlink(PathBuf),

    #[error("{}: path is not owned by root (owner uid {owner})", path.display())]
    NotRootOwned { path: PathBuf, owner: u32 },

    #[error("{}: path is in a nosuid mount ({})", path.display(), mount_point.display())]
    NosuidMount { path: PathBuf, mount_point: PathBuf },

    #[error("{}: path is not in any mount", .0.display())]
    NoMount(PathBuf),

    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Errors raised by the setuid script interpreter
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Usage: {0} [path]")]
    Usage(String),

    #[error("{0}")]
    Insecure(#[from] InsecurePath),

    #[error("{0}")]
    Shebang(#[from] ShebangError),

    #[error("Executed binary {expected} does not match the interpreter {found}")]
    InterpreterMismatch { expected: String, found: String },

    #[error("Invalid header options: {0}")]
    Options(String),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

impl From<IdentityError> for DispatchError {
    fn from(err: IdentityError) -> Self {
        DispatchError::Launch(err.into())
    }
}

impl From<EnvironmentError> for DispatchError {
    fn from(err: EnvironmentError) -> Self {
        DispatchError::Launch(err.into())
    }
}

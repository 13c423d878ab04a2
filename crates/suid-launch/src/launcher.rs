//! Process launching under a controlled identity
//!
//! Order of operations:
//! 1. Resolve the target path and the identity transition (parent)
//! 2. Chdir (child)
//! 3. Environment (built in the parent, since passwd lookups allocate; a
//!    build failure is reported by the child after chdir succeeded)
//! 4. Drop privileges, group before user (child)
//! 5. Execve (child)
//! 6. Wait for termination (parent)
//!
//! The child reports a failed step through a close-on-exec pipe as a
//! `(stage, op, errno)` triple. EOF on the pipe means execve succeeded. Between
//! fork and execve the child only makes syscalls on data prepared by the
//! parent; it never allocates.

use log::{debug, info};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, chdir, fork, pipe2};
use std::ffi::{CString, OsStr};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use suid_core::{
    EnvironmentError, IdentityDirectory, IdentityError, IdentityResolver, LaunchError, Result,
    SystemDirectory, TargetIdentity,
};

use crate::environment::{EnvMap, EnvironmentBuilder, to_envp};
use crate::path::{self, ResolvedTarget};
use crate::spec::ExecutionSpec;

/// Exit status of a target that terminated normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Process ID of the child
    pub pid: Pid,
    /// Exit code
    pub code: i32,
    /// Time from fork to termination in milliseconds
    pub exec_time_ms: u64,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Launches targets described by an [`ExecutionSpec`]
///
/// Holds no mutable state; one launcher may serve concurrent launches from
/// several threads.
pub struct ProcessLauncher {
    environment: EnvironmentBuilder,
    directory: Box<dyn IdentityDirectory>,
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher {
    /// Launcher with the default trusted search path and the system user
    /// database.
    pub fn new() -> Self {
        Self {
            environment: EnvironmentBuilder::default(),
            directory: Box::new(SystemDirectory),
        }
    }

    pub fn with_environment_builder(mut self, builder: EnvironmentBuilder) -> Self {
        self.environment = builder;
        self
    }

    pub fn with_directory(mut self, directory: impl IdentityDirectory + 'static) -> Self {
        self.directory = Box::new(directory);
        self
    }

    pub fn environment_builder(&self) -> &EnvironmentBuilder {
        &self.environment
    }

    /// Run `spec` in a fresh child and wait for it.
    ///
    /// The caller's own identity, working directory and environment are
    /// never touched. A target killed by a signal is reported as
    /// [`LaunchError::Signaled`].
    pub fn launch(&self, spec: ExecutionSpec) -> Result<ExitStatus> {
        let ExecutionSpec {
            target,
            argv_extra,
            identity,
            cwd,
            env_policy,
        } = spec;

        let resolved = path::resolve(&target)?;
        IdentityResolver::resolve(identity)?;

        let record = if env_policy.needs_identity_record() {
            self.directory.lookup(identity.uid)
        } else {
            None
        };
        let env = self
            .environment
            .build(&env_policy, identity.uid, record.as_ref());

        let image = ChildImage::prepare(&resolved, &argv_extra, &cwd, env)?;

        info!(
            "Launching {} as uid {} gid {} in {}",
            resolved.exec_path.display(),
            identity.uid,
            identity.gid,
            cwd.display()
        );
        debug!("argv0 {:?}, {} extra args", resolved.argv0, argv_extra.len());

        let (status_read, status_write) = pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| LaunchError::Syscall(format!("pipe2 failed: {}", e)))?;

        let start = Instant::now();
        // SAFETY: the child only runs ChildImage::exec, which makes raw
        // syscalls on pre-built buffers, then execs or _exits.
        let pid = match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                drop(status_read);
                let failure = image.exec(identity);
                report_failure(status_write.as_raw_fd(), failure);
                unsafe { libc::_exit(127) }
            }
            Ok(ForkResult::Parent { child }) => child,
            Err(e) => return Err(LaunchError::Syscall(format!("fork failed: {}", e))),
        };
        drop(status_write);

        let report = read_failure(status_read);
        let termination = wait_for_child(pid)?;
        let exec_time_ms = start.elapsed().as_millis() as u64;

        if let Some(failure) = report? {
            debug!("Child {} failed at {:?}: {}", pid, failure.stage, failure.errno);
            return Err(image.into_error(failure, identity));
        }

        match termination {
            Termination::Exited(code) => {
                info!("{} exited with {} after {}ms", pid, code, exec_time_ms);
                Ok(ExitStatus {
                    pid,
                    code,
                    exec_time_ms,
                })
            }
            Termination::Signaled(signal) => {
                info!("{} killed by signal {}", pid, signal);
                Err(LaunchError::Signaled(signal))
            }
        }
    }
}

/// Step at which the child gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Chdir = 1,
    Environment = 2,
    Identity = 3,
    Exec = 4,
}

impl Stage {
    fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Stage::Chdir),
            2 => Some(Stage::Environment),
            3 => Some(Stage::Identity),
            4 => Some(Stage::Exec),
            _ => None,
        }
    }
}

/// Identity syscalls a failure report can name; index + 1 goes on the wire,
/// 0 means none.
const IDENTITY_OPS: [&str; 5] = ["setgroups", "setresgid", "setresuid", "getresuid", "getresgid"];

fn op_code(error: &IdentityError) -> i32 {
    error
        .op()
        .and_then(|op| IDENTITY_OPS.iter().position(|known| *known == op))
        .map_or(0, |index| index as i32 + 1)
}

fn op_name(code: i32) -> &'static str {
    usize::try_from(code - 1)
        .ok()
        .and_then(|index| IDENTITY_OPS.get(index).copied())
        .unwrap_or("drop_privileges")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChildFailure {
    stage: Stage,
    op: i32,
    errno: Errno,
}

impl ChildFailure {
    const WIRE_SIZE: usize = 12;

    fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[..4].copy_from_slice(&(self.stage as i32).to_ne_bytes());
        buf[4..8].copy_from_slice(&self.op.to_ne_bytes());
        buf[8..].copy_from_slice(&(self.errno as i32).to_ne_bytes());
        buf
    }

    fn decode(buf: [u8; Self::WIRE_SIZE]) -> Option<Self> {
        let field = |at: usize| i32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let stage = Stage::from_raw(field(0))?;
        Some(Self {
            stage,
            op: field(4),
            errno: Errno::from_raw(field(8)),
        })
    }
}

/// Everything the child needs, prepared before fork
struct ChildImage {
    exec_path: PathBuf,
    cwd: PathBuf,
    exec_path_c: CString,
    cwd_c: CString,
    // Owns the strings the pointer arrays below point into.
    _argv: Vec<CString>,
    argv_ptrs: Vec<*const libc::c_char>,
    envp: std::result::Result<(Vec<CString>, Vec<*const libc::c_char>), EnvironmentError>,
}

impl ChildImage {
    fn prepare(
        resolved: &ResolvedTarget,
        argv_extra: &[String],
        cwd: &Path,
        env: std::result::Result<EnvMap, EnvironmentError>,
    ) -> Result<Self> {
        let exec_path_c = c_string(resolved.exec_path.as_os_str())?;
        let cwd_c = c_string(cwd.as_os_str())?;

        let mut argv = Vec::with_capacity(argv_extra.len() + 1);
        argv.push(c_string(&resolved.argv0)?);
        for arg in argv_extra {
            argv.push(c_string(OsStr::new(arg))?);
        }
        let argv_ptrs = null_terminated(&argv);

        let envp = match env {
            Ok(map) => {
                let strings = to_envp(&map)?;
                let ptrs = null_terminated(&strings);
                Ok((strings, ptrs))
            }
            Err(e) => Err(e),
        };

        Ok(Self {
            exec_path: resolved.exec_path.clone(),
            cwd: cwd.to_path_buf(),
            exec_path_c,
            cwd_c,
            _argv: argv,
            argv_ptrs,
            envp,
        })
    }

    /// Runs in the forked child. Returns only on failure.
    fn exec(&self, identity: TargetIdentity) -> ChildFailure {
        let fail = |stage, errno| ChildFailure { stage, op: 0, errno };

        if let Err(errno) = chdir(self.cwd_c.as_c_str()) {
            return fail(Stage::Chdir, errno);
        }

        let env_ptrs = match &self.envp {
            Ok((_, ptrs)) => ptrs,
            Err(_) => return fail(Stage::Environment, Errno::UnknownErrno),
        };

        if let Err(e) = IdentityResolver::drop_privileges(identity.uid, identity.gid) {
            return ChildFailure {
                stage: Stage::Identity,
                op: op_code(&e),
                errno: e.errno(),
            };
        }

        // Rust ignores SIGPIPE; the target expects the default disposition.
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
            // nix::unistd::execve allocates its pointer arrays, so call
            // execve directly with the ones built before fork.
            libc::execve(
                self.exec_path_c.as_ptr(),
                self.argv_ptrs.as_ptr(),
                env_ptrs.as_ptr(),
            );
        }
        fail(Stage::Exec, Errno::last())
    }

    fn into_error(self, failure: ChildFailure, identity: TargetIdentity) -> LaunchError {
        match failure.stage {
            Stage::Chdir => LaunchError::Chdir {
                path: self.cwd,
                errno: failure.errno,
            },
            Stage::Environment => match self.envp {
                Err(e) => e.into(),
                Ok(_) => LaunchError::Syscall("child reported a spurious environment failure".into()),
            },
            Stage::Identity => IdentityError::from_errno(
                op_name(failure.op),
                identity.uid,
                identity.gid,
                failure.errno,
            )
            .into(),
            Stage::Exec => LaunchError::ExecFailed {
                path: self.exec_path,
                errno: failure.errno,
            },
        }
    }
}

fn c_string(s: &OsStr) -> Result<CString> {
    CString::new(s.as_bytes())
        .map_err(|_| LaunchError::InvalidArgument(format!("{:?} contains nul byte", s)))
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Write the failure to the status pipe (child side, no allocation).
fn report_failure(fd: RawFd, failure: ChildFailure) {
    let buf = failure.encode();
    let mut written = 0;
    while written < buf.len() {
        let ret = unsafe {
            libc::write(
                fd,
                buf[written..].as_ptr() as *const libc::c_void,
                buf.len() - written,
            )
        };
        if ret > 0 {
            written += ret as usize;
        } else if ret < 0 && Errno::last() == Errno::EINTR {
            continue;
        } else {
            return;
        }
    }
}

/// Read the child's failure report; `None` means execve succeeded.
fn read_failure(fd: OwnedFd) -> Result<Option<ChildFailure>> {
    let mut file = File::from(fd);
    let mut buf = [0u8; ChildFailure::WIRE_SIZE];
    let mut filled = 0;

    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    match filled {
        0 => Ok(None),
        ChildFailure::WIRE_SIZE => ChildFailure::decode(buf).map(Some).ok_or_else(|| {
            LaunchError::Syscall("child sent an unknown failure stage".to_string())
        }),
        n => Err(LaunchError::Syscall(format!(
            "short failure report from child ({} bytes)",
            n
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Exited(i32),
    Signaled(i32),
}

/// Wait for child process and get its termination
fn wait_for_child(pid: Pid) -> Result<Termination> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, status)) => return Ok(Termination::Exited(status)),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return Ok(Termination::Signaled(signal as i32));
            }
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(LaunchError::Syscall(format!("waitpid failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentPolicy;
    use std::sync::Arc;
    use std::thread;
    use suid_core::{PasswdRecord, StaticDirectory};

    fn own_identity(builder: crate::spec::ExecutionSpecBuilder) -> ExecutionSpec {
        let TargetIdentity { uid, gid } = TargetIdentity::current();
        builder.identity(uid, gid).build()
    }

    #[test]
    fn failure_wire_format_round_trips() {
        let failure = ChildFailure {
            stage: Stage::Identity,
            op: 3,
            errno: Errno::EPERM,
        };
        assert_eq!(ChildFailure::decode(failure.encode()), Some(failure));
    }

    #[test]
    fn identity_op_codes_round_trip() {
        for op in IDENTITY_OPS {
            let error = IdentityError::Os {
                op,
                errno: Errno::EAGAIN,
            };
            assert_eq!(op_name(op_code(&error)), op);
        }
        let denied = IdentityError::InsufficientPrivilege { uid: 1, gid: 2 };
        assert_eq!(op_code(&denied), 0);
        assert_eq!(op_name(0), "drop_privileges");
        assert_eq!(op_name(42), "drop_privileges");
    }

    #[test]
    fn identity_failure_keeps_failing_syscall() {
        let target = ResolvedTarget {
            exec_path: PathBuf::from("/bin/true"),
            argv0: "/bin/true".into(),
        };
        let image = ChildImage::prepare(&target, &[], Path::new("/"), Ok(EnvMap::new())).unwrap();

        let error = IdentityError::Os {
            op: "setgroups",
            errno: Errno::EAGAIN,
        };
        let failure = ChildFailure {
            stage: Stage::Identity,
            op: op_code(&error),
            errno: error.errno(),
        };
        let decoded = ChildFailure::decode(failure.encode()).unwrap();

        let err = image.into_error(decoded, TargetIdentity::new(1, 2));
        assert!(matches!(
            err,
            LaunchError::Identity(IdentityError::Os {
                op: "setgroups",
                errno: Errno::EAGAIN
            })
        ));
    }

    #[test]
    fn concurrent_launches_get_their_own_exit_codes() {
        let launcher = Arc::new(ProcessLauncher::new());
        let TargetIdentity { uid, gid } = TargetIdentity::current();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let launcher = Arc::clone(&launcher);
                thread::spawn(move || {
                    let spec = ExecutionSpec::builder("/bin/sh")
                        .args(["-c".to_string(), format!("exit {}", i)])
                        .identity(uid, gid)
                        .build();
                    (i, launcher.launch(spec))
                })
            })
            .collect();

        for handle in handles {
            let (i, result) = handle.join().unwrap();
            assert_eq!(result.unwrap().code, i);
        }
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let mut buf = [0u8; ChildFailure::WIRE_SIZE];
        buf[..4].copy_from_slice(&99i32.to_ne_bytes());
        assert_eq!(ChildFailure::decode(buf), None);
    }

    #[test]
    fn null_terminated_appends_null() {
        let strings = vec![CString::new("a").unwrap(), CString::new("b").unwrap()];
        let ptrs = null_terminated(&strings);
        assert_eq!(ptrs.len(), 3);
        assert!(ptrs[2].is_null());
        assert_eq!(ptrs[0], strings[0].as_ptr());
    }

    #[test]
    fn launch_true_exits_zero() {
        let spec = own_identity(ExecutionSpec::builder("/bin/true"));
        let status = ProcessLauncher::new().launch(spec).unwrap();
        assert_eq!(status.code, 0);
        assert!(status.success());
    }

    #[test]
    fn launch_reports_nonzero_exit() {
        let spec = own_identity(ExecutionSpec::builder("/bin/sh").args(["-c", "exit 7"]));
        let status = ProcessLauncher::new().launch(spec).unwrap();
        assert_eq!(status.code, 7);
        assert!(!status.success());
    }

    #[test]
    fn launch_reports_signal() {
        let spec = own_identity(ExecutionSpec::builder("/bin/sh").args(["-c", "kill -9 $$"]));
        let err = ProcessLauncher::new().launch(spec).unwrap_err();
        assert!(matches!(err, LaunchError::Signaled(9)));
        assert!(!err.is_preparation_failure());
    }

    #[test]
    fn launch_missing_cwd_is_chdir_error() {
        let spec = own_identity(
            ExecutionSpec::builder("/bin/true").cwd("/nonexistent/suid-launch-cwd"),
        );
        let err = ProcessLauncher::new().launch(spec).unwrap_err();
        match err {
            LaunchError::Chdir { path, errno } => {
                assert_eq!(path, PathBuf::from("/nonexistent/suid-launch-cwd"));
                assert_eq!(errno, Errno::ENOENT);
            }
            other => panic!("expected chdir error, got {:?}", other),
        }
    }

    #[test]
    fn launch_missing_target_is_exec_error() {
        let spec = own_identity(ExecutionSpec::builder("/nonexistent/suid-launch-target"));
        let err = ProcessLauncher::new().launch(spec).unwrap_err();
        assert!(matches!(
            err,
            LaunchError::ExecFailed {
                errno: Errno::ENOENT,
                ..
            }
        ));
    }

    #[test]
    fn chdir_failure_precedes_environment_failure() {
        let spec = own_identity(
            ExecutionSpec::builder("/bin/true")
                .cwd("/nonexistent/suid-launch-cwd")
                .env_policy(EnvironmentPolicy::Empty),
        );
        let launcher = ProcessLauncher::new().with_directory(StaticDirectory::new());
        let err = launcher.launch(spec).unwrap_err();
        assert!(matches!(err, LaunchError::Chdir { .. }));
    }

    #[test]
    fn missing_record_aborts_before_exec() {
        let spec = own_identity(
            ExecutionSpec::builder("/bin/true").env_policy(EnvironmentPolicy::Empty),
        );
        let launcher = ProcessLauncher::new().with_directory(StaticDirectory::new());
        let err = launcher.launch(spec).unwrap_err();
        assert!(matches!(
            err,
            LaunchError::Environment(EnvironmentError::MissingIdentityRecord { .. })
        ));
    }

    #[test]
    fn empty_policy_uses_directory_record() {
        let TargetIdentity { uid, gid } = TargetIdentity::current();
        let directory = StaticDirectory::new().with_record(
            uid,
            PasswdRecord {
                name: "probe".to_string(),
                home_dir: "/home/probe".to_string(),
                shell: "/bin/sh".to_string(),
                primary_gid: gid,
            },
        );
        let spec = ExecutionSpec::builder("/bin/sh")
            .args(["-c", r#"test "$USER" = probe && test "$MAIL" = /var/mail/probe"#])
            .identity(uid, gid)
            .env_policy(EnvironmentPolicy::Empty)
            .build();

        let status = ProcessLauncher::new()
            .with_directory(directory)
            .launch(spec)
            .unwrap();
        assert_eq!(status.code, 0);
    }

    #[test]
    fn unprivileged_drop_to_root_fails_before_exec() {
        if suid_core::util::is_root() {
            eprintln!("SKIP: running as root");
            return;
        }

        let spec = ExecutionSpec::builder("/bin/true").identity(0, 0).build();
        let err = ProcessLauncher::new().launch(spec).unwrap_err();
        assert!(matches!(
            err,
            LaunchError::Identity(IdentityError::InsufficientPrivilege { uid: 0, gid: 0 })
        ));
    }

    #[test]
    fn nul_in_argument_is_invalid() {
        let spec = own_identity(ExecutionSpec::builder("/bin/true").arg("bad\0arg"));
        let err = ProcessLauncher::new().launch(spec).unwrap_err();
        assert!(matches!(err, LaunchError::InvalidArgument(_)));
    }

    #[test]
    fn caller_cwd_is_untouched() {
        let before = std::env::current_dir().unwrap();
        let spec = own_identity(ExecutionSpec::builder("/bin/true").cwd("/tmp"));
        ProcessLauncher::new().launch(spec).unwrap();
        assert_eq!(std::env::current_dir().unwrap(), before);
    }
}

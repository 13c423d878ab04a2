//! Identity transitions for launched processes
//!
//! The group identity is always changed before the user identity: changing
//! gids needs privileges that are gone once the uid has been dropped.
//!
//! [`IdentityResolver::drop_privileges`] and [`IdentityResolver::apply`] run
//! in a forked child between `fork` and `execve`. They must not allocate.

use nix::unistd::{Gid, Uid, geteuid, getgid, getresgid, getresuid, getuid};
use nix::unistd::{setgroups, setresgid, setresuid};
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

use crate::error::IdentityError;

/// Raw id value that leaves an id unchanged in `setres[ug]id`.
pub const UNCHANGED: u32 = u32::MAX;

/// Identity to drop to before executing the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetIdentity {
    pub uid: u32,
    pub gid: u32,
}

impl TargetIdentity {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// The caller's real uid and gid.
    pub fn current() -> Self {
        Self {
            uid: getuid().as_raw(),
            gid: getgid().as_raw(),
        }
    }
}

/// One real/effective/saved id triple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdTriple {
    pub real: u32,
    pub effective: u32,
    /// `None` keeps the current saved id.
    pub saved: Option<u32>,
}

impl IdTriple {
    /// All three ids set to `id`.
    pub fn uniform(id: u32) -> Self {
        Self {
            real: id,
            effective: id,
            saved: Some(id),
        }
    }

    fn saved_raw(&self) -> u32 {
        self.saved.unwrap_or(UNCHANGED)
    }
}

/// Full uid and gid triples to install
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityTransition {
    pub uid: IdTriple,
    pub gid: IdTriple,
}

/// Ownership and mode bits of an executable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOwnership {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl FileOwnership {
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
        }
    }

    pub fn is_setuid(&self) -> bool {
        self.mode & libc::S_ISUID != 0
    }

    pub fn is_setgid(&self) -> bool {
        self.mode & libc::S_ISGID != 0
    }
}

impl IdentityTransition {
    /// Emulate exec-time setuid/setgid handling for an interpreted file.
    ///
    /// The effective ids become the file's owner/group when the matching mode
    /// bit is set, otherwise they stay the caller's real ids. With
    /// `promote_real` the real ids follow the effective ones. Saved ids are
    /// left alone.
    pub fn for_file(file: FileOwnership, real_uid: u32, real_gid: u32, promote_real: bool) -> Self {
        let euid = if file.is_setuid() { file.uid } else { real_uid };
        let egid = if file.is_setgid() { file.gid } else { real_gid };
        let (ruid, rgid) = if promote_real {
            (euid, egid)
        } else {
            (real_uid, real_gid)
        };

        Self {
            uid: IdTriple {
                real: ruid,
                effective: euid,
                saved: None,
            },
            gid: IdTriple {
                real: rgid,
                effective: egid,
                saved: None,
            },
        }
    }
}

/// Computes and performs privilege transitions
pub struct IdentityResolver;

impl IdentityResolver {
    /// Compute the `[U,U,U]` / `[G,G,G]` transition for a target identity.
    pub fn resolve(identity: TargetIdentity) -> Result<IdentityTransition, IdentityError> {
        let TargetIdentity { uid, gid } = identity;
        if uid == UNCHANGED || gid == UNCHANGED {
            return Err(IdentityError::InvalidIdentity { uid, gid });
        }

        Ok(IdentityTransition {
            uid: IdTriple::uniform(uid),
            gid: IdTriple::uniform(gid),
        })
    }

    /// Permanently become `uid`/`gid`: group first, then user.
    ///
    /// A privileged caller also reduces its supplementary groups to `[gid]`.
    pub fn drop_privileges(uid: u32, gid: u32) -> Result<(), IdentityError> {
        let transition = Self::resolve(TargetIdentity { uid, gid })?;

        if geteuid().is_root() {
            setgroups(&[Gid::from_raw(gid)])
                .map_err(|e| IdentityError::from_errno("setgroups", uid, gid, e))?;
        }

        Self::apply(&transition)
    }

    /// Install an arbitrary transition, group triple first.
    pub fn apply(transition: &IdentityTransition) -> Result<(), IdentityError> {
        let IdentityTransition { uid, gid } = transition;
        let (target_uid, target_gid) = (uid.effective, gid.effective);

        setresgid(
            Gid::from_raw(gid.real),
            Gid::from_raw(gid.effective),
            Gid::from_raw(gid.saved_raw()),
        )
        .map_err(|e| IdentityError::from_errno("setresgid", target_uid, target_gid, e))?;

        setresuid(
            Uid::from_raw(uid.real),
            Uid::from_raw(uid.effective),
            Uid::from_raw(uid.saved_raw()),
        )
        .map_err(|e| IdentityError::from_errno("setresuid", target_uid, target_gid, e))?;

        verify(transition)
    }
}

/// Read the installed ids back; any difference means the kernel did not
/// grant the full transition.
fn verify(transition: &IdentityTransition) -> Result<(), IdentityError> {
    let IdentityTransition { uid, gid } = transition;
    let denied = IdentityError::InsufficientPrivilege {
        uid: uid.effective,
        gid: gid.effective,
    };

    let res_uid = getresuid().map_err(|e| IdentityError::Os {
        op: "getresuid",
        errno: e,
    })?;
    let res_gid = getresgid().map_err(|e| IdentityError::Os {
        op: "getresgid",
        errno: e,
    })?;

    let uid_ok = res_uid.real.as_raw() == uid.real
        && res_uid.effective.as_raw() == uid.effective
        && uid.saved.is_none_or(|s| res_uid.saved.as_raw() == s);
    let gid_ok = res_gid.real.as_raw() == gid.real
        && res_gid.effective.as_raw() == gid.effective
        && gid.saved.is_none_or(|s| res_gid.saved.as_raw() == s);

    if uid_ok && gid_ok { Ok(()) } else { Err(denied) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::wait::{WaitStatus, waitpid};
    use nix::unistd::{ForkResult, fork};

    fn file(mode: u32, uid: u32, gid: u32) -> FileOwnership {
        FileOwnership { mode, uid, gid }
    }

    #[test]
    fn resolve_produces_uniform_triples() {
        let transition = IdentityResolver::resolve(TargetIdentity::new(1000, 100)).unwrap();
        assert_eq!(transition.uid, IdTriple::uniform(1000));
        assert_eq!(transition.gid, IdTriple::uniform(100));
    }

    #[test]
    fn resolve_rejects_unchanged_sentinel() {
        let err = IdentityResolver::resolve(TargetIdentity::new(UNCHANGED, 100)).unwrap_err();
        assert_eq!(
            err,
            IdentityError::InvalidIdentity {
                uid: UNCHANGED,
                gid: 100
            }
        );

        let err = IdentityResolver::resolve(TargetIdentity::new(0, UNCHANGED)).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidIdentity { .. }));
    }

    #[test]
    fn for_file_plain_keeps_real_ids() {
        let t = IdentityTransition::for_file(file(0o755, 0, 0), 1000, 1000, false);
        assert_eq!(t.uid.real, 1000);
        assert_eq!(t.uid.effective, 1000);
        assert_eq!(t.gid.effective, 1000);
        assert!(t.uid.saved.is_none());
        assert!(t.gid.saved.is_none());
    }

    #[test]
    fn for_file_setuid_root_elevates_effective_only() {
        let t = IdentityTransition::for_file(file(0o4755, 0, 0), 1000, 1000, false);
        assert_eq!(t.uid.real, 1000);
        assert_eq!(t.uid.effective, 0);
        assert_eq!(t.gid.real, 1000);
        assert_eq!(t.gid.effective, 1000);
    }

    #[test]
    fn for_file_setgid_elevates_group() {
        let t = IdentityTransition::for_file(file(0o2755, 0, 50), 1000, 1000, false);
        assert_eq!(t.uid.effective, 1000);
        assert_eq!(t.gid.effective, 50);
        assert_eq!(t.gid.real, 1000);
    }

    #[test]
    fn for_file_promote_real_follows_effective() {
        let t = IdentityTransition::for_file(file(0o6755, 0, 0), 1000, 1000, true);
        assert_eq!(t.uid.real, 0);
        assert_eq!(t.uid.effective, 0);
        assert_eq!(t.gid.real, 0);
        assert_eq!(t.gid.effective, 0);
    }

    #[test]
    fn file_ownership_mode_bits() {
        assert!(file(0o4755, 0, 0).is_setuid());
        assert!(!file(0o4755, 0, 0).is_setgid());
        assert!(file(0o2755, 0, 0).is_setgid());
        assert!(!file(0o755, 0, 0).is_setuid());
    }

    /// Run `f` in a forked child and return its exit code.
    fn in_child(f: impl FnOnce() -> i32) -> i32 {
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let code = f();
                unsafe { libc::_exit(code) }
            }
            Ok(ForkResult::Parent { child }) => match waitpid(child, None) {
                Ok(WaitStatus::Exited(_, code)) => code,
                other => panic!("unexpected wait status: {:?}", other),
            },
            Err(e) => panic!("fork failed: {}", e),
        }
    }

    #[test]
    fn drop_to_own_identity_succeeds() {
        let code = in_child(|| {
            let TargetIdentity { uid, gid } = TargetIdentity::current();
            if IdentityResolver::drop_privileges(uid, gid).is_err() {
                return 1;
            }
            let res_uid = getresuid().unwrap();
            let res_gid = getresgid().unwrap();
            let ok = [res_uid.real, res_uid.effective, res_uid.saved]
                .iter()
                .all(|u| u.as_raw() == uid)
                && [res_gid.real, res_gid.effective, res_gid.saved]
                    .iter()
                    .all(|g| g.as_raw() == gid);
            if ok { 0 } else { 2 }
        });
        assert_eq!(code, 0);
    }

    #[test]
    fn unprivileged_drop_to_root_is_insufficient_privilege() {
        if geteuid().is_root() {
            eprintln!("SKIP: running as root");
            return;
        }

        let code = in_child(|| match IdentityResolver::drop_privileges(0, 0) {
            Err(IdentityError::InsufficientPrivilege { uid: 0, gid: 0 }) => 0,
            Err(_) => 1,
            Ok(()) => 2,
        });
        assert_eq!(code, 0);
    }

    #[test]
    fn root_drop_to_nobody_sets_all_triples() {
        if !geteuid().is_root() {
            eprintln!("SKIP: requires root");
            return;
        }

        let code = in_child(|| {
            if IdentityResolver::drop_privileges(65534, 65534).is_err() {
                return 1;
            }
            let res_uid = getresuid().unwrap();
            if res_uid.saved.as_raw() != 65534 {
                return 2;
            }
            // No way back once dropped.
            match IdentityResolver::drop_privileges(0, 0) {
                Err(IdentityError::InsufficientPrivilege { .. }) => 0,
                _ => 3,
            }
        });
        assert_eq!(code, 0);
    }
}

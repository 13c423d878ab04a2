//! Utility functions for identity queries

use nix::unistd::{getegid, geteuid, getgid, getresgid, getresuid, getuid};

use crate::error::IdentityError;

/// Check if running with an effective uid of root
pub fn is_root() -> bool {
    geteuid().is_root()
}

/// Get real UID
pub fn get_uid() -> u32 {
    getuid().as_raw()
}

/// Get real GID
pub fn get_gid() -> u32 {
    getgid().as_raw()
}

/// Get effective UID
pub fn get_euid() -> u32 {
    geteuid().as_raw()
}

/// Get effective GID
pub fn get_egid() -> u32 {
    getegid().as_raw()
}

/// Current `[real, effective, saved]` uids
pub fn uid_triple() -> Result<[u32; 3], IdentityError> {
    let ids = getresuid().map_err(|errno| IdentityError::Os {
        op: "getresuid",
        errno,
    })?;
    Ok([
        ids.real.as_raw(),
        ids.effective.as_raw(),
        ids.saved.as_raw(),
    ])
}

/// Current `[real, effective, saved]` gids
pub fn gid_triple() -> Result<[u32; 3], IdentityError> {
    let ids = getresgid().map_err(|errno| IdentityError::Os {
        op: "getresgid",
        errno,
    })?;
    Ok([
        ids.real.as_raw(),
        ids.effective.as_raw(),
        ids.saved.as_raw(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triples_match_simple_getters() {
        let uids = uid_triple().unwrap();
        let gids = gid_triple().unwrap();
        assert_eq!(uids[0], get_uid());
        assert_eq!(uids[1], get_euid());
        assert_eq!(gids[0], get_gid());
        assert_eq!(gids[1], get_egid());
    }

    #[test]
    fn root_detection_matches_euid() {
        assert_eq!(is_root(), get_euid() == 0);
    }
}

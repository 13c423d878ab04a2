//! Passwd-style identity records looked up by uid

use log::warn;
use nix::unistd::{Uid, User};
use std::collections::BTreeMap;

/// The parts of a passwd entry the launcher needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdRecord {
    pub name: String,
    pub home_dir: String,
    pub shell: String,
    pub primary_gid: u32,
}

impl From<User> for PasswdRecord {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            home_dir: user.dir.to_string_lossy().into_owned(),
            shell: user.shell.to_string_lossy().into_owned(),
            primary_gid: user.gid.as_raw(),
        }
    }
}

/// Read-only directory of identity records
pub trait IdentityDirectory: Send + Sync {
    /// Look up the record for `uid`; `None` when there is none.
    fn lookup(&self, uid: u32) -> Option<PasswdRecord>;
}

/// The system user database (`getpwuid_r`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDirectory;

impl IdentityDirectory for SystemDirectory {
    fn lookup(&self, uid: u32) -> Option<PasswdRecord> {
        match User::from_uid(Uid::from_raw(uid)) {
            Ok(user) => user.map(PasswdRecord::from),
            Err(e) => {
                warn!("passwd lookup for uid {} failed: {}", uid, e);
                None
            }
        }
    }
}

/// Fixed in-memory directory
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    records: BTreeMap<u32, PasswdRecord>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, uid: u32, record: PasswdRecord) -> Self {
        self.records.insert(uid, record);
        self
    }
}

impl IdentityDirectory for StaticDirectory {
    fn lookup(&self, uid: u32) -> Option<PasswdRecord> {
        self.records.get(&uid).cloned()
    }
}

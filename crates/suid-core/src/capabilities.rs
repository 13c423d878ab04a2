//! Runtime detection of what a launch can rely on
//!
//! Probes the running process and kernel to report whether identity changes
//! and setuid escalation will behave as expected.

use std::fs::File;
use std::path::Path;

/// Detected launch capabilities
#[derive(Debug, Clone)]
pub struct SystemCapabilities {
    /// Running with euid == 0
    pub has_root: bool,
    /// Real and effective uid differ (started through a setuid binary)
    pub is_setuid: bool,
    /// `PR_SET_NO_NEW_PRIVS` is set; exec ignores setuid/setgid bits
    pub no_new_privs: bool,
    /// `/proc/1/environ` is readable (trusted PATH source)
    pub has_init_environ: bool,
    /// `/proc/self/mounts` is readable (nosuid checks)
    pub has_proc_mounts: bool,
}

impl SystemCapabilities {
    /// Detect all capabilities of the current process
    pub fn detect() -> Self {
        Self {
            has_root: detect_root(),
            is_setuid: detect_setuid(),
            no_new_privs: detect_no_new_privs(),
            has_init_environ: readable("/proc/1/environ"),
            has_proc_mounts: readable("/proc/self/mounts"),
        }
    }

    /// Whether this process may drop to an arbitrary identity
    pub fn can_change_identity(&self) -> bool {
        self.has_root
    }

    /// Whether exec will honor setuid/setgid bits on targets
    pub fn honors_setuid_bits(&self) -> bool {
        !self.no_new_privs
    }

    /// Get a human-readable summary of capabilities
    pub fn summary(&self) -> String {
        let check = |available: bool| if available { "[ok]" } else { "[--]" };

        [
            format!("{} Root privileges", check(self.has_root)),
            format!("{} Started setuid", check(self.is_setuid)),
            format!("{} Setuid bits honored", check(self.honors_setuid_bits())),
            format!("{} Init environment readable", check(self.has_init_environ)),
            format!("{} Mount table readable", check(self.has_proc_mounts)),
        ]
        .join("\n")
    }
}

fn detect_root() -> bool {
    crate::util::is_root()
}

fn detect_setuid() -> bool {
    crate::util::get_uid() != crate::util::get_euid()
}

fn detect_no_new_privs() -> bool {
    let ret = unsafe { libc::prctl(libc::PR_GET_NO_NEW_PRIVS, 0, 0, 0, 0) };
    ret == 1
}

fn readable(path: impl AsRef<Path>) -> bool {
    File::open(path).is_ok()
}

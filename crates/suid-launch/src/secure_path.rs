//! Trust checks for scripts run through the setuid interpreter
//!
//! A script is trusted only if every component of its path is owned by
//! root, none of them is a symlink, and the file does not live on a mount
//! with `nosuid`.

use log::debug;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use suid_core::InsecurePath;

const MOUNTS: &str = "/proc/self/mounts";

/// One line of the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub mount_point: PathBuf,
    pub options: Vec<String>,
}

impl MountEntry {
    pub fn is_nosuid(&self) -> bool {
        self.options.iter().any(|opt| opt == "nosuid")
    }
}

/// Check that `path` may be trusted for setuid dispatch.
pub fn validate(path: &Path) -> Result<(), InsecurePath> {
    if fs::symlink_metadata(path).is_err() {
        return Err(InsecurePath::NotFound(path.to_path_buf()));
    }

    let base = if path.is_relative() {
        std::env::current_dir().map_err(|source| InsecurePath::Io {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        PathBuf::new()
    };

    let mut current = PathBuf::new();
    for component in base.components().chain(path.components()) {
        current.push(component);
        let meta = fs::symlink_metadata(&current).map_err(|source| InsecurePath::Io {
            path: current.clone(),
            source,
        })?;
        if meta.file_type().is_symlink() {
            return Err(InsecurePath::Symlink(current));
        }
        if meta.uid() != 0 {
            return Err(InsecurePath::NotRootOwned {
                path: current,
                owner: meta.uid(),
            });
        }
    }

    let canonical = path.canonicalize().map_err(|source| InsecurePath::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table = fs::read_to_string(MOUNTS).map_err(|source| InsecurePath::Io {
        path: PathBuf::from(MOUNTS),
        source,
    })?;

    let mount = mount_for(&canonical, &table)
        .ok_or_else(|| InsecurePath::NoMount(canonical.clone()))?;
    debug!(
        "{} is on {} ({})",
        canonical.display(),
        mount.mount_point.display(),
        mount.options.join(",")
    );
    if mount.is_nosuid() {
        return Err(InsecurePath::NosuidMount {
            path: canonical,
            mount_point: mount.mount_point,
        });
    }

    Ok(())
}

/// Find the mount holding `path` in a `/proc/self/mounts` style table.
///
/// Later entries shadow earlier ones, so the table is scanned from the end.
pub fn mount_for(path: &Path, table: &str) -> Option<MountEntry> {
    table.lines().rev().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return None;
        }
        let mount_point = PathBuf::from(unescape_octal(fields[1]));
        if !path.starts_with(&mount_point) {
            return None;
        }
        Some(MountEntry {
            mount_point,
            options: fields[3].split(',').map(str::to_string).collect(),
        })
    })
}

/// Decode the `\040`-style escapes the kernel uses for mount points.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            out.push(value as u8);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

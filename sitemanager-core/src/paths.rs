//! Path policy: pure mappings from a hostname to where its artifacts live.
//!
//! | Artifact            | Path                                                  |
//! |---------------------|-------------------------------------------------------|
//! | Socket              | `<socket_base_dir>/<hostname>.sock`                   |
//! | Static install      | `<static_base_dir>/<hostname>`                        |
//! | Service definition  | `<services_dir>/<sanitize(hostname)><extension>`      |
//!
//! None of these functions touch the filesystem.

use std::path::{Component, Path, PathBuf};

use crate::config::SystemConfig;
use crate::error::PathError;
use crate::types::Hostname;

pub fn socket_path(hostname: &Hostname, cfg: &SystemConfig) -> PathBuf {
    cfg.socket_base_dir.join(format!("{hostname}.sock"))
}

pub fn static_install_path(hostname: &Hostname, cfg: &SystemConfig) -> PathBuf {
    cfg.static_base_dir.join(hostname.as_str())
}

/// Replace `.` and `-` with `_`.
///
/// Not injective: `a.b` and `a-b` both map to `a_b`. Callers that install
/// several services must check for collisions themselves.
pub fn sanitize(hostname: &Hostname) -> String {
    hostname.as_str().replace(['.', '-'], "_")
}

/// Service name as the supervisor sees it (the file name without extension).
pub fn service_name(hostname: &Hostname) -> String {
    sanitize(hostname)
}

pub fn service_file_path(hostname: &Hostname, cfg: &SystemConfig) -> PathBuf {
    cfg.services_dir
        .join(format!("{}{}", sanitize(hostname), cfg.service_file_extension))
}

/// `path` relative to the webserver chroot.
///
/// Fails if `path` is not inside `httpd_chroot_dir`; this is a configuration
/// error and is never coerced.
pub fn chroot_relative(path: &Path, cfg: &SystemConfig) -> Result<PathBuf, PathError> {
    let outside = || PathError::OutsideChroot {
        path: path.to_path_buf(),
        chroot: cfg.httpd_chroot_dir.clone(),
    };
    if has_parent_refs(path) {
        return Err(outside());
    }
    path.strip_prefix(&cfg.httpd_chroot_dir)
        .map(Path::to_path_buf)
        .map_err(|_| outside())
}

/// True if `path` is a proper descendant of `base` and contains no `..`.
pub fn is_strictly_within(path: &Path, base: &Path) -> bool {
    if has_parent_refs(path) {
        return false;
    }
    match path.strip_prefix(base) {
        Ok(rest) => rest.components().next().is_some(),
        Err(_) => false,
    }
}

fn has_parent_refs(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

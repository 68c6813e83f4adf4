//! Installer: writes generated files, copies static trees, removes leftovers.
//!
//! ## `write_file_atomic` protocol
//!
//! 1. Render content (already done by caller).
//! 2. Write to `<path>.sitemanager.tmp`.
//! 3. Apply the requested permission mode to the temp file.
//! 4. Rename to the final path (atomic on POSIX). On failure the temp file
//!    is removed and any existing file is left untouched.
//!
//! Static trees are installed with full-replace semantics: an existing
//! destination is deleted before the copy, never merged.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use sitemanager_core::{
    paths::{is_strictly_within, service_file_path},
    Hostname, SiteInfo, SiteKind, SystemConfig,
};

use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Outcome of installing one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// A generated file was written.
    Written { path: PathBuf },
    /// A static tree was copied into place.
    Copied { source: PathBuf, dest: PathBuf, files: usize },
    /// `--dry-run` mode: the file *would* have been written.
    WouldWrite { path: PathBuf },
    /// `--dry-run` mode: the tree *would* have been copied.
    WouldCopy { source: PathBuf, dest: PathBuf },
}

impl InstallOutcome {
    pub fn path(&self) -> &Path {
        match self {
            InstallOutcome::Written { path } | InstallOutcome::WouldWrite { path } => path,
            InstallOutcome::Copied { dest, .. } | InstallOutcome::WouldCopy { dest, .. } => dest,
        }
    }
}

/// Outcome of removing one leftover artifact. Removal never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed { path: PathBuf },
    /// Nothing was there; someone already cleaned it up.
    AlreadyAbsent { path: PathBuf },
    /// The snapshot pointed somewhere this run must not delete.
    Refused { path: PathBuf, reason: String },
    Failed { path: PathBuf, error: String },
    /// `--dry-run` mode: the artifact *would* have been removed.
    WouldRemove { path: PathBuf },
}

impl RemovalOutcome {
    pub fn path(&self) -> &Path {
        match self {
            RemovalOutcome::Removed { path }
            | RemovalOutcome::AlreadyAbsent { path }
            | RemovalOutcome::Refused { path, .. }
            | RemovalOutcome::Failed { path, .. }
            | RemovalOutcome::WouldRemove { path } => path,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RemovalOutcome::Refused { .. } | RemovalOutcome::Failed { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// The on-disk footprint of one installed site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Artifact {
    ServiceFile(PathBuf),
    StaticTree(PathBuf),
}

impl Artifact {
    /// What installing `site` under `cfg` puts on disk.
    pub fn of(site: &SiteInfo, cfg: &SystemConfig) -> Self {
        match &site.kind {
            SiteKind::Dynamic { .. } => Artifact::ServiceFile(service_file_path(&site.hostname, cfg)),
            SiteKind::Static { install_path, .. } => Artifact::StaticTree(install_path.clone()),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Artifact::ServiceFile(p) | Artifact::StaticTree(p) => p,
        }
    }
}

// ---------------------------------------------------------------------------
// write_file_atomic
// ---------------------------------------------------------------------------

/// Atomically write `content` to `path`, optionally with permission `mode`.
pub fn write_file_atomic(
    path: &Path,
    content: &str,
    mode: Option<u32>,
    dry_run: bool,
) -> Result<InstallOutcome, SyncError> {
    let tmp = PathBuf::from(format!("{}.sitemanager.tmp", path.display()));
    write_file_atomic_with_tmp(path, content, mode, dry_run, &tmp)
}

fn write_file_atomic_with_tmp(
    path: &Path,
    content: &str,
    mode: Option<u32>,
    dry_run: bool,
    tmp: &Path,
) -> Result<InstallOutcome, SyncError> {
    if dry_run {
        info!("[dry-run] would write: {}", path.display());
        return Ok(InstallOutcome::WouldWrite {
            path: path.to_path_buf(),
        });
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }

    fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;
    if let Some(mode) = mode {
        if let Err(e) = set_mode(tmp, mode) {
            let _ = fs::remove_file(tmp);
            return Err(e);
        }
    }

    if let Err(e) = fs::rename(tmp, path) {
        let _ = fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    info!("wrote: {}", path.display());
    Ok(InstallOutcome::Written {
        path: path.to_path_buf(),
    })
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), SyncError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), SyncError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// copy_tree_replacing
// ---------------------------------------------------------------------------

/// Copy the tree at `source` to `dest`, deleting whatever `dest` held first.
///
/// Symlinks are recreated as symlinks, not followed.
pub fn copy_tree_replacing(
    source: &Path,
    dest: &Path,
    dry_run: bool,
) -> Result<InstallOutcome, SyncError> {
    if dry_run {
        info!("[dry-run] would copy: {} -> {}", source.display(), dest.display());
        return Ok(InstallOutcome::WouldCopy {
            source: source.to_path_buf(),
            dest: dest.to_path_buf(),
        });
    }

    // A symlinked build dir counts, as it does for discovery.
    match fs::metadata(source) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(io_err(
                source,
                std::io::Error::new(ErrorKind::InvalidInput, "copy source is not a directory"),
            ))
        }
        Err(e) => return Err(io_err(source, e)),
    }

    remove_path(dest).map_err(|e| io_err(dest, e))?;
    fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;

    let mut files = 0;
    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| SyncError::Walk {
            path: source.to_path_buf(),
            source: e,
        })?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .unwrap_or(entry.path());
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            files += 1;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| io_err(&target, e))?;
            files += 1;
        }
    }

    info!("copied {files} files: {} -> {}", source.display(), dest.display());
    Ok(InstallOutcome::Copied {
        source: source.to_path_buf(),
        dest: dest.to_path_buf(),
        files,
    })
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<(), SyncError> {
    let pointee = fs::read_link(link).map_err(|e| io_err(link, e))?;
    std::os::unix::fs::symlink(&pointee, target).map_err(|e| io_err(target, e))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<(), SyncError> {
    fs::copy(link, target).map_err(|e| io_err(target, e))?;
    Ok(())
}

/// Remove a file, symlink, or directory tree. Absent paths are fine.
fn remove_path(path: &Path) -> std::io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).map(|_| true),
        Ok(_) => fs::remove_file(path).map(|_| true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// remove_artifact
// ---------------------------------------------------------------------------

/// Best-effort removal of an artifact recorded in a previous snapshot.
///
/// Only paths strictly inside the configured services dir or static base
/// dir are touched; anything else is refused.
pub fn remove_artifact(
    hostname: &Hostname,
    artifact: &Artifact,
    cfg: &SystemConfig,
    dry_run: bool,
) -> RemovalOutcome {
    let path = artifact.path().to_path_buf();

    if let Err(e) = Hostname::parse(hostname.as_str()) {
        warn!("refusing to remove {}: {e}", path.display());
        return RemovalOutcome::Refused {
            path,
            reason: e.to_string(),
        };
    }
    let base = match artifact {
        Artifact::ServiceFile(_) => &cfg.services_dir,
        Artifact::StaticTree(_) => &cfg.static_base_dir,
    };
    if !is_strictly_within(&path, base) {
        let reason = format!("not inside {}", base.display());
        warn!("refusing to remove {}: {reason}", path.display());
        return RemovalOutcome::Refused { path, reason };
    }

    if dry_run {
        info!("[dry-run] would remove: {}", path.display());
        return RemovalOutcome::WouldRemove { path };
    }

    match remove_path(&path) {
        Ok(true) => {
            info!("removed stale {hostname}: {}", path.display());
            RemovalOutcome::Removed { path }
        }
        Ok(false) => RemovalOutcome::AlreadyAbsent { path },
        Err(e) => {
            warn!("could not remove {}: {e}", path.display());
            RemovalOutcome::Failed {
                path,
                error: e.to_string(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sitemanager_core::Profile;
    use tempfile::TempDir;

    fn staged(root: &Path) -> SystemConfig {
        SystemConfig::from_profile(Profile::OpenBsd).rooted_at(root)
    }

    #[test]
    fn write_creates_parents_and_sets_mode() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("etc").join("rc.d").join("api");
        let result = write_file_atomic(&path, "#!/bin/ksh\n", Some(0o555), false).unwrap();
        assert!(matches!(result, InstallOutcome::Written { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "#!/bin/ksh\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o555);
        }
    }

    #[test]
    fn write_truncates_existing_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("httpd.conf");
        fs::write(&path, "a much longer previous configuration\n").unwrap();
        write_file_atomic(&path, "short\n", None, false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "short\n");
    }

    #[test]
    fn dry_run_does_not_write_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.conf");
        let result = write_file_atomic(&path, "content", None, true).unwrap();
        assert!(matches!(result, InstallOutcome::WouldWrite { .. }));
        assert!(!path.exists(), "dry-run must not create files");
    }

    #[test]
    fn tmp_file_removed_after_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("clean.conf");
        write_file_atomic(&path, "data", None, false).unwrap();
        let tmp_path = PathBuf::from(format!("{}.sitemanager.tmp", path.display()));
        assert!(!tmp_path.exists(), ".sitemanager.tmp must be cleaned up");
    }

    #[test]
    #[cfg(unix)]
    fn rename_failure_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let readonly_dir = root.path().join("readonly");
        fs::create_dir_all(&readonly_dir).unwrap();

        let path = readonly_dir.join("httpd.conf");
        fs::write(&path, "original").unwrap();

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        let tmp_dir = TempDir::new().unwrap();
        let tmp_path = tmp_dir.path().join("httpd.conf.sitemanager.tmp");

        let result = write_file_atomic_with_tmp(&path, "new content", None, false, &tmp_path);

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        // root can rename into a read-only directory; only check cleanup then.
        if result.is_err() {
            assert_eq!(fs::read_to_string(&path).unwrap(), "original");
        }
        assert!(!tmp_path.exists(), ".sitemanager.tmp should be cleaned up");
    }

    #[test]
    fn copy_replaces_destination_instead_of_merging() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("build");
        fs::create_dir_all(src.join("css")).unwrap();
        fs::write(src.join("index.html"), "new").unwrap();
        fs::write(src.join("css").join("site.css"), "body{}").unwrap();

        let dest = tmp.path().join("htdocs").join("site");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("index.html"), "old").unwrap();
        fs::write(dest.join("leftover.html"), "stale").unwrap();

        let result = copy_tree_replacing(&src, &dest, false).unwrap();
        assert!(matches!(result, InstallOutcome::Copied { files: 2, .. }), "{result:?}");
        assert_eq!(fs::read_to_string(dest.join("index.html")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dest.join("css").join("site.css")).unwrap(), "body{}");
        assert!(!dest.join("leftover.html").exists(), "old contents must be gone");
    }

    #[test]
    fn copy_of_missing_source_fails() {
        let tmp = TempDir::new().unwrap();
        let err = copy_tree_replacing(&tmp.path().join("nope"), &tmp.path().join("dest"), false)
            .unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }), "got: {err}");
    }

    #[test]
    #[cfg(unix)]
    fn copy_preserves_symlinks() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("build");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink("real.txt", src.join("alias.txt")).unwrap();

        let dest = tmp.path().join("out");
        copy_tree_replacing(&src, &dest, false).unwrap();
        let link = fs::read_link(dest.join("alias.txt")).unwrap();
        assert_eq!(link, PathBuf::from("real.txt"));
    }

    #[test]
    #[cfg(unix)]
    fn copy_follows_symlinked_source_root() {
        let tmp = TempDir::new().unwrap();
        let dist = tmp.path().join("dist");
        fs::create_dir_all(dist.join("css")).unwrap();
        fs::write(dist.join("index.html"), "hi").unwrap();
        fs::write(dist.join("css").join("site.css"), "body{}").unwrap();
        let build = tmp.path().join("build");
        std::os::unix::fs::symlink(&dist, &build).unwrap();

        let dest = tmp.path().join("htdocs").join("site");
        let result = copy_tree_replacing(&build, &dest, false).unwrap();
        assert!(matches!(result, InstallOutcome::Copied { files: 2, .. }), "{result:?}");
        assert!(fs::symlink_metadata(&dest).unwrap().is_dir(), "dest is a real directory");
        assert_eq!(fs::read_to_string(dest.join("css").join("site.css")).unwrap(), "body{}");
    }

    #[test]
    fn remove_refuses_paths_outside_base() {
        let tmp = TempDir::new().unwrap();
        let cfg = staged(tmp.path());
        let outside = tmp.path().join("etc");
        fs::create_dir_all(&outside).unwrap();

        let outcome = remove_artifact(
            &Hostname::from("evil"),
            &Artifact::StaticTree(outside.clone()),
            &cfg,
            false,
        );
        assert!(matches!(outcome, RemovalOutcome::Refused { .. }), "{outcome:?}");
        assert!(outside.exists());
    }

    #[test]
    fn remove_refuses_traversal_hostnames() {
        let tmp = TempDir::new().unwrap();
        let cfg = staged(tmp.path());
        let outcome = remove_artifact(
            &Hostname::from("../x"),
            &Artifact::ServiceFile(cfg.services_dir.join("x")),
            &cfg,
            false,
        );
        assert!(outcome.is_failure());
    }

    #[test]
    fn remove_missing_artifact_is_already_absent() {
        let tmp = TempDir::new().unwrap();
        let cfg = staged(tmp.path());
        let outcome = remove_artifact(
            &Hostname::from("gone"),
            &Artifact::ServiceFile(cfg.services_dir.join("gone")),
            &cfg,
            false,
        );
        assert!(matches!(outcome, RemovalOutcome::AlreadyAbsent { .. }));
    }

    #[test]
    fn remove_static_tree_deletes_recursively() {
        let tmp = TempDir::new().unwrap();
        let cfg = staged(tmp.path());
        let tree = cfg.static_base_dir.join("docs");
        fs::create_dir_all(tree.join("a").join("b")).unwrap();
        fs::write(tree.join("a").join("b").join("c.html"), "").unwrap();

        let outcome =
            remove_artifact(&Hostname::from("docs"), &Artifact::StaticTree(tree.clone()), &cfg, false);
        assert!(matches!(outcome, RemovalOutcome::Removed { .. }));
        assert!(!tree.exists());
        assert!(cfg.static_base_dir.exists(), "base dir itself must survive");
    }
}

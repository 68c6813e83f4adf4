//! Site discovery for `sitemanager-detector`.
//!
//! `discover_sites(root, cfg)` lists the immediate children of a sites root
//! and classifies each one from its build output:
//!
//! ```text
//! <root>/<hostname>/build/        static site (asset tree)
//! <root>/<hostname>/build/main    dynamic site (executable entrypoint)
//! ```
//!
//! Children without a `build/` directory are skipped silently; children that
//! cannot be inspected are skipped with a warning. Only a failure to list the
//! root itself, or a path that falls outside the webserver chroot, is fatal.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sitemanager_core::{
    paths::{chroot_relative, socket_path, static_install_path},
    Hostname, PathError, SiteInfo, SiteKind, SystemConfig,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the build output directory inside each site directory.
pub const BUILD_DIR: &str = "build";
/// Presence of this file inside the build directory marks a dynamic site.
pub const ENTRYPOINT: &str = "main";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Errors from site discovery. Every variant aborts the run.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("cannot read sites root {path}: {source}")]
    ReadSitesRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("site {hostname}: {source}")]
    Path {
        hostname: Hostname,
        #[source]
        source: PathError,
    },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Discover every deployable site under `sites_root`.
///
/// Results are sorted by hostname so repeated runs over an unchanged tree
/// produce identical snapshots.
pub fn discover_sites(sites_root: &Path, cfg: &SystemConfig) -> Result<Vec<SiteInfo>, DetectError> {
    let read_root_err = |source| DetectError::ReadSitesRoot {
        path: sites_root.to_path_buf(),
        source,
    };
    let root = std::path::absolute(sites_root).map_err(read_root_err)?;
    let entries = fs::read_dir(&root).map_err(read_root_err)?;

    let mut children: Vec<(Hostname, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry in {}: {e}", root.display());
                continue;
            }
        };
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!("skipping non UTF-8 site directory {:?}", entry.file_name());
            continue;
        };
        match Hostname::parse(&name) {
            Ok(hostname) => children.push((hostname, entry.path())),
            Err(e) => warn!("skipping site directory: {e}"),
        }
    }
    children.sort_by(|a, b| a.0.cmp(&b.0));

    let mut sites = Vec::with_capacity(children.len());
    for (hostname, dir) in children {
        if let Some(site) = classify_site(&dir, hostname, cfg)? {
            sites.push(site);
        }
    }
    Ok(sites)
}

/// Classify one site directory.
///
/// Returns `Ok(None)` when the directory has no usable `build/` directory.
pub fn classify_site(
    site_dir: &Path,
    hostname: Hostname,
    cfg: &SystemConfig,
) -> Result<Option<SiteInfo>, DetectError> {
    let build_dir = site_dir.join(BUILD_DIR);
    match fs::metadata(&build_dir) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            warn!("{} is not a directory, skipping {hostname}", build_dir.display());
            return Ok(None);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("no build output for {hostname}, skipping");
            return Ok(None);
        }
        Err(e) => {
            warn!("cannot stat {}: {e}, skipping {hostname}", build_dir.display());
            return Ok(None);
        }
    }

    let entrypoint = build_dir.join(ENTRYPOINT);
    let path_err = |source| DetectError::Path {
        hostname: hostname.clone(),
        source,
    };

    let kind = if fs::metadata(&entrypoint).is_ok() {
        let socket = socket_path(&hostname, cfg);
        let socket_rel = chroot_relative(&socket, cfg).map_err(path_err)?;
        debug!("dynamic site detected: {hostname}");
        SiteKind::Dynamic {
            executable_path: entrypoint,
            socket_path: socket,
            socket_path_rel: socket_rel,
        }
    } else {
        let install = static_install_path(&hostname, cfg);
        let install_rel = chroot_relative(&install, cfg).map_err(path_err)?;
        debug!("static site detected: {hostname}");
        SiteKind::Static {
            source_path: build_dir,
            install_path: install,
            install_path_rel: install_rel,
        }
    };

    Ok(Some(SiteInfo { hostname, kind }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

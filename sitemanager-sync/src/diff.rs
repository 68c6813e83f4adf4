//! Dry-run unified diff support for `sitemanager diff`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use sitemanager_core::{paths, SystemConfig};
use sitemanager_detector::discover_sites;
use sitemanager_renderer::Renderer;

use crate::{error::io_err, reconciler::check_service_names, RunOptions, SyncError};

/// A single rendered file diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: PathBuf,
    pub unified_diff: String,
}

/// Render what a deploy would generate and compare it to current on-disk content.
///
/// Covers the webserver config and every service file. Static trees are not
/// diffed. No files are written.
pub fn diff_deployment(cfg: &SystemConfig, options: &RunOptions) -> Result<Vec<FileDiff>, SyncError> {
    let renderer = Renderer::with_user_templates(cfg.profile, options.templates_dir.as_deref())?;
    let sites = discover_sites(&options.sites_root, cfg)?;
    check_service_names(&sites)?;

    let mut rendered = Vec::new();
    for site in sites.iter().filter(|s| s.is_dynamic()) {
        rendered.push((
            paths::service_file_path(&site.hostname, cfg),
            renderer.render_service(site, cfg)?,
        ));
    }
    rendered.push((
        cfg.httpd_config_path.clone(),
        renderer.render_webserver_config(&sites, cfg)?,
    ));

    let mut diffs = Vec::new();
    for (path, content) in rendered {
        let content = normalize_line_endings(&content);
        let existing = read_existing_or_empty(&path)?;
        if existing == content {
            continue;
        }

        let old_header = format!("a{}", rooted(&path).display());
        let new_header = format!("b{}", rooted(&path).display());
        let unified = TextDiff::from_lines(&existing, &content)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string();

        diffs.push(FileDiff {
            path,
            unified_diff: unified,
        });
    }
    Ok(diffs)
}

fn rooted(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        Path::new("/").join(path)
    }
}

fn read_existing_or_empty(path: &Path) -> Result<String, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(normalize_line_endings(&content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(io_err(path, err)),
    }
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}

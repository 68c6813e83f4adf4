//! Compare the last snapshot with what discovery finds now.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;

use sitemanager_core::{Hostname, SiteInfo, SystemConfig};

use crate::installer::Artifact;

/// How a site relates to the last successful deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteState {
    /// Discovered now and installed by the last deploy.
    Installed,
    /// Discovered now, not yet deployed.
    New,
    /// Installed by the last deploy, gone from the sites root.
    Stale,
}

/// One row of `sitemanager status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteStatus {
    pub hostname: Hostname,
    pub kind: &'static str,
    pub state: SiteState,
    pub target: PathBuf,
}

/// Current sites first (in discovery order), then stale ones.
///
/// A site that switched kind shows up twice: `new` for its current artifact
/// and `stale` for the old one.
pub fn site_statuses(
    previous: &[SiteInfo],
    current: &[SiteInfo],
    cfg: &SystemConfig,
) -> Vec<SiteStatus> {
    let installed: HashSet<Artifact> = previous.iter().map(|s| Artifact::of(s, cfg)).collect();
    let wanted: HashSet<Artifact> = current.iter().map(|s| Artifact::of(s, cfg)).collect();

    let row = |site: &SiteInfo, artifact: Artifact, state| SiteStatus {
        hostname: site.hostname.clone(),
        kind: site.kind_label(),
        state,
        target: artifact.path().to_path_buf(),
    };

    let mut rows: Vec<SiteStatus> = current
        .iter()
        .map(|site| {
            let artifact = Artifact::of(site, cfg);
            let state = if installed.contains(&artifact) {
                SiteState::Installed
            } else {
                SiteState::New
            };
            row(site, artifact, state)
        })
        .collect();

    let mut seen = HashSet::new();
    for site in previous {
        let artifact = Artifact::of(site, cfg);
        if !wanted.contains(&artifact) && seen.insert(artifact.clone()) {
            rows.push(row(site, artifact, SiteState::Stale));
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitemanager_core::{paths, Profile, SiteKind};

    fn static_site(name: &str, cfg: &SystemConfig) -> SiteInfo {
        let hostname = Hostname::from(name);
        let install = paths::static_install_path(&hostname, cfg);
        SiteInfo {
            kind: SiteKind::Static {
                source_path: PathBuf::from(format!("/srv/{name}/build")),
                install_path_rel: paths::chroot_relative(&install, cfg).unwrap(),
                install_path: install,
            },
            hostname,
        }
    }

    fn dynamic_site(name: &str, cfg: &SystemConfig) -> SiteInfo {
        let hostname = Hostname::from(name);
        let socket = paths::socket_path(&hostname, cfg);
        SiteInfo {
            kind: SiteKind::Dynamic {
                executable_path: PathBuf::from(format!("/srv/{name}/build/main")),
                socket_path_rel: paths::chroot_relative(&socket, cfg).unwrap(),
                socket_path: socket,
            },
            hostname,
        }
    }

    #[test]
    fn classifies_installed_new_and_stale() {
        let cfg = SystemConfig::from_profile(Profile::OpenBsd);
        let previous = vec![static_site("keep", &cfg), static_site("gone", &cfg)];
        let current = vec![static_site("keep", &cfg), dynamic_site("fresh", &cfg)];

        let rows = site_statuses(&previous, &current, &cfg);
        let summary: Vec<(&str, SiteState)> =
            rows.iter().map(|r| (r.hostname.as_str(), r.state)).collect();
        assert_eq!(
            summary,
            vec![
                ("keep", SiteState::Installed),
                ("fresh", SiteState::New),
                ("gone", SiteState::Stale),
            ]
        );
        assert_eq!(rows[1].target, PathBuf::from("/etc/rc.d/fresh"));
    }

    #[test]
    fn kind_switch_is_new_plus_stale() {
        let cfg = SystemConfig::from_profile(Profile::OpenBsd);
        let rows = site_statuses(
            &[static_site("app", &cfg)],
            &[dynamic_site("app", &cfg)],
            &cfg,
        );
        let states: Vec<SiteState> = rows.iter().map(|r| r.state).collect();
        assert_eq!(states, vec![SiteState::New, SiteState::Stale]);
    }
}

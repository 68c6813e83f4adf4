//! Reconciliation run, the only entrypoint that changes the host.
//!
//! A run walks these phases in order, stopping at the first fatal error:
//!
//! ```text
//! Start -> Load -> Discover -> Remove -> Install -> Save
//! ```
//!
//! | Phase    | On error                                              |
//! |----------|-------------------------------------------------------|
//! | Load     | logged; previous state treated as empty               |
//! | Discover | fatal; nothing has been touched yet                   |
//! | Remove   | logged per artifact; run continues                    |
//! | Install  | fatal; old snapshot stays so the next run retries     |
//! | Save     | fatal                                                 |
//!
//! Removal only deletes artifacts of the previous snapshot that the current
//! site set does not install again; everything current is (re)installed.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use sitemanager_core::{paths, Hostname, SiteInfo, SiteKind, SystemConfig};
use sitemanager_detector::discover_sites;
use sitemanager_renderer::Renderer;

use crate::error::{StoreError, SyncError};
use crate::installer::{
    copy_tree_replacing, remove_artifact, write_file_atomic, Artifact, InstallOutcome,
    RemovalOutcome,
};
use crate::store::{self, Snapshot};

// ---------------------------------------------------------------------------
// Phases and results
// ---------------------------------------------------------------------------

/// Where a run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Load,
    Discover,
    Remove,
    Install,
    Save,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "start",
            Phase::Load => "load",
            Phase::Discover => "discover",
            Phase::Remove => "remove",
            Phase::Install => "install",
            Phase::Save => "save",
        };
        f.write_str(name)
    }
}

/// What the Load phase found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviousState {
    Loaded(Snapshot),
    /// No snapshot yet: first run.
    Missing,
    /// A snapshot exists but could not be used.
    Corrupt { reason: String },
}

impl PreviousState {
    /// Sites to consider for removal; empty unless a snapshot loaded.
    pub fn sites(&self) -> &[SiteInfo] {
        match self {
            PreviousState::Loaded(snapshot) => &snapshot.sites,
            PreviousState::Missing | PreviousState::Corrupt { .. } => &[],
        }
    }
}

/// Summary of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub previous: PreviousState,
    pub sites: Vec<SiteInfo>,
    pub removals: Vec<RemovalOutcome>,
    pub installs: Vec<InstallOutcome>,
    /// Where the new snapshot went; `None` on a dry run.
    pub snapshot_path: Option<PathBuf>,
    pub dry_run: bool,
}

/// A fatal error and the phase it ended the run in.
#[derive(Debug, Error)]
#[error("reconciliation failed during {phase}: {source}")]
pub struct RunFailure {
    pub phase: Phase,
    #[source]
    pub source: SyncError,
}

impl RunFailure {
    fn at(phase: Phase) -> impl FnOnce(SyncError) -> RunFailure {
        move |source| RunFailure { phase, source }
    }
}

/// Caller-supplied inputs for one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub sites_root: PathBuf,
    /// Directory of `.tera` files overriding the embedded templates.
    pub templates_dir: Option<PathBuf>,
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Drives one reconciliation run against a single [`SystemConfig`].
pub struct Reconciler<'a> {
    cfg: &'a SystemConfig,
    renderer: Renderer,
    sites_root: PathBuf,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    /// Parse templates up front so a broken template fails before anything is removed.
    pub fn new(cfg: &'a SystemConfig, options: &RunOptions) -> Result<Self, SyncError> {
        let renderer = Renderer::with_user_templates(cfg.profile, options.templates_dir.as_deref())?;
        Ok(Reconciler {
            cfg,
            renderer,
            sites_root: options.sites_root.clone(),
            dry_run: options.dry_run,
        })
    }

    /// Load phase. Never fails: a missing or unusable snapshot means "nothing to remove".
    pub fn load_previous(&self) -> PreviousState {
        let path = &self.cfg.snapshot_path;
        match store::load(path) {
            Ok(snapshot) => {
                info!("loaded snapshot with {} sites", snapshot.sites.len());
                PreviousState::Loaded(snapshot)
            }
            Err(StoreError::NotFound { .. }) => {
                info!("no snapshot at {}, treating as first run", path.display());
                PreviousState::Missing
            }
            Err(e) => {
                warn!("ignoring unusable snapshot: {e}");
                PreviousState::Corrupt {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Discover phase: current sites, checked for service-name collisions.
    pub fn discover(&self) -> Result<Vec<SiteInfo>, SyncError> {
        let sites = discover_sites(&self.sites_root, self.cfg)?;
        check_service_names(&sites)?;
        info!(
            "discovered {} sites in {}",
            sites.len(),
            self.sites_root.display()
        );
        Ok(sites)
    }

    /// Remove phase: delete previous artifacts the current set no longer installs.
    pub fn remove_stale(&self, previous: &[SiteInfo], current: &[SiteInfo]) -> Vec<RemovalOutcome> {
        let wanted: HashSet<Artifact> = current
            .iter()
            .map(|site| Artifact::of(site, self.cfg))
            .collect();

        let mut seen = HashSet::new();
        previous
            .iter()
            .map(|site| (site, Artifact::of(site, self.cfg)))
            .filter(|(_, artifact)| !wanted.contains(artifact))
            .filter(|(_, artifact)| seen.insert(artifact.clone()))
            .map(|(site, artifact)| remove_artifact(&site.hostname, &artifact, self.cfg, self.dry_run))
            .collect()
    }

    /// Install phase: service files, static trees, then the webserver config.
    pub fn install(&self, current: &[SiteInfo]) -> Result<Vec<InstallOutcome>, SyncError> {
        let mut installs = Vec::with_capacity(current.len() + 1);

        for site in current {
            let outcome = match &site.kind {
                SiteKind::Dynamic { .. } => {
                    let content = self.renderer.render_service(site, self.cfg)?;
                    let path = paths::service_file_path(&site.hostname, self.cfg);
                    write_file_atomic(
                        &path,
                        &content,
                        Some(self.cfg.service_file_mode),
                        self.dry_run,
                    )?
                }
                SiteKind::Static {
                    source_path,
                    install_path,
                    ..
                } => copy_tree_replacing(source_path, install_path, self.dry_run)?,
            };
            installs.push(outcome);
        }

        let conf = self.renderer.render_webserver_config(current, self.cfg)?;
        installs.push(write_file_atomic(
            &self.cfg.httpd_config_path,
            &conf,
            None,
            self.dry_run,
        )?);
        Ok(installs)
    }

    /// Save phase. Skipped on a dry run.
    pub fn save(&self, current: &[SiteInfo]) -> Result<Option<PathBuf>, SyncError> {
        if self.dry_run {
            return Ok(None);
        }
        let path = &self.cfg.snapshot_path;
        store::save(path, &Snapshot::new(current.to_vec()))?;
        info!("saved snapshot: {}", path.display());
        Ok(Some(path.clone()))
    }

    /// Run every phase in order.
    pub fn run(&self) -> Result<RunReport, RunFailure> {
        let previous = self.load_previous();
        let sites = self.discover().map_err(RunFailure::at(Phase::Discover))?;
        let removals = self.remove_stale(previous.sites(), &sites);
        let installs = self.install(&sites).map_err(RunFailure::at(Phase::Install))?;
        let snapshot_path = self.save(&sites).map_err(RunFailure::at(Phase::Save))?;

        let failed = removals.iter().filter(|r| r.is_failure()).count();
        if failed > 0 {
            warn!("{failed} stale artifacts could not be removed");
        }

        Ok(RunReport {
            previous,
            sites,
            removals,
            installs,
            snapshot_path,
            dry_run: self.dry_run,
        })
    }
}

/// Build a [`Reconciler`] and run it once.
pub fn run(cfg: &SystemConfig, options: &RunOptions) -> Result<RunReport, RunFailure> {
    Reconciler::new(cfg, options)
        .map_err(RunFailure::at(Phase::Start))?
        .run()
}

/// Fail if two dynamic sites sanitise to the same service name.
pub fn check_service_names(sites: &[SiteInfo]) -> Result<(), SyncError> {
    let mut by_name: BTreeMap<String, Vec<Hostname>> = BTreeMap::new();
    for site in sites.iter().filter(|s| s.is_dynamic()) {
        by_name
            .entry(paths::service_name(&site.hostname))
            .or_default()
            .push(site.hostname.clone());
    }
    match by_name.into_iter().find(|(_, hosts)| hosts.len() > 1) {
        Some((service_name, hostnames)) => Err(SyncError::ServiceNameCollision {
            service_name,
            hostnames,
        }),
        None => Ok(()),
    }
}

/// Path of the artifact `site` installs, for display.
pub fn install_target(site: &SiteInfo, cfg: &SystemConfig) -> PathBuf {
    Artifact::of(site, cfg).path().to_path_buf()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dynamic(name: &str) -> SiteInfo {
        SiteInfo {
            hostname: Hostname::from(name),
            kind: SiteKind::Dynamic {
                executable_path: PathBuf::from(format!("/srv/{name}/build/main")),
                socket_path: PathBuf::from(format!("/var/www/run/{name}.sock")),
                socket_path_rel: PathBuf::from(format!("run/{name}.sock")),
            },
        }
    }

    #[test]
    fn colliding_service_names_are_rejected() {
        let err = check_service_names(&[dynamic("a.b"), dynamic("a-b")]).unwrap_err();
        match err {
            SyncError::ServiceNameCollision {
                service_name,
                hostnames,
            } => {
                assert_eq!(service_name, "a_b");
                assert_eq!(hostnames.len(), 2);
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn distinct_service_names_pass() {
        check_service_names(&[dynamic("a.b"), dynamic("a.c")]).expect("no collision");
    }

    #[test]
    fn phase_display_is_lowercase() {
        assert_eq!(Phase::Install.to_string(), "install");
    }

    #[test]
    fn previous_state_without_snapshot_has_no_sites() {
        assert!(PreviousState::Missing.sites().is_empty());
        let corrupt = PreviousState::Corrupt {
            reason: "bad".to_string(),
        };
        assert!(corrupt.sites().is_empty());
    }
}

//! `sitemanager status`: discovered sites joined with the last snapshot.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};
use tracing::warn;

use sitemanager_core::{SiteInfo, SystemConfig};
use sitemanager_detector::discover_sites;
use sitemanager_sync::{
    status::{site_statuses, SiteState, SiteStatus},
    store, RunOptions, StoreError,
};

/// Arguments for `sitemanager status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, cfg: &SystemConfig, options: &RunOptions) -> Result<()> {
        let snapshot = load_snapshot(&cfg.snapshot_path);
        let current = discover_sites(&options.sites_root, cfg).with_context(|| {
            format!("failed to discover sites in {}", options.sites_root.display())
        })?;
        let rows = site_statuses(&snapshot.sites, &current, cfg);

        let report = StatusReport {
            profile: cfg.profile.to_string(),
            snapshot: SnapshotJson {
                path: cfg.snapshot_path.display().to_string(),
                state: snapshot.state,
                last_deploy_at: snapshot.modified.map(|t| t.to_rfc3339()),
                last_deploy_age: snapshot
                    .modified
                    .map_or_else(|| "never".to_string(), format_datetime_age),
            },
            sites: rows,
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(report);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Snapshot probe
// ---------------------------------------------------------------------------

struct SnapshotProbe {
    state: &'static str,
    sites: Vec<SiteInfo>,
    modified: Option<DateTime<Utc>>,
}

/// Read the snapshot the way a deploy would: missing or unusable means empty.
fn load_snapshot(path: &Path) -> SnapshotProbe {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    match store::load(path) {
        Ok(snapshot) => SnapshotProbe {
            state: "loaded",
            sites: snapshot.sites,
            modified,
        },
        Err(StoreError::NotFound { .. }) => SnapshotProbe {
            state: "missing",
            sites: Vec::new(),
            modified: None,
        },
        Err(e) => {
            warn!("ignoring unusable snapshot: {e}");
            SnapshotProbe {
                state: "corrupt",
                sites: Vec::new(),
                modified,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct StatusReport {
    profile: String,
    snapshot: SnapshotJson,
    sites: Vec<SiteStatus>,
}

#[derive(Serialize)]
struct SnapshotJson {
    path: String,
    state: &'static str,
    last_deploy_at: Option<String>,
    last_deploy_age: String,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "hostname")]
    hostname: String,
    #[tabled(rename = "kind")]
    kind: &'static str,
    #[tabled(rename = "state")]
    state: &'static str,
    #[tabled(rename = "target")]
    target: String,
}

fn print_table(report: StatusReport) {
    let count = |state: SiteState| report.sites.iter().filter(|s| s.state == state).count();
    let (new, stale) = (count(SiteState::New), count(SiteState::Stale));
    println!(
        "sitemanager v{} | {} profile | {} sites | {} new | {} stale | last deploy {}",
        env!("CARGO_PKG_VERSION"),
        report.profile,
        report.sites.len() - stale,
        new,
        stale,
        report.snapshot.last_deploy_age,
    );

    if report.snapshot.state == "corrupt" {
        println!(
            "{} snapshot at {} is unreadable; the next deploy starts fresh",
            "!".yellow().bold(),
            report.snapshot.path
        );
    }

    if report.sites.is_empty() {
        println!("No sites found.");
        return;
    }

    println!(
        "Indicators: {} INSTALLED  {} NEW  {} STALE",
        state_indicator(SiteState::Installed),
        state_indicator(SiteState::New),
        state_indicator(SiteState::Stale),
    );
    let rows: Vec<StatusTableRow> = report
        .sites
        .into_iter()
        .map(|row| StatusTableRow {
            hostname: row.hostname.to_string(),
            kind: row.kind,
            state: state_label(row.state),
            target: row.target.display().to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if new + stale > 0 {
        println!("Run 'sitemanager deploy' to bring the host up to date.");
    }
}

fn state_label(state: SiteState) -> &'static str {
    match state {
        SiteState::Installed => "INSTALLED",
        SiteState::New => "NEW",
        SiteState::Stale => "STALE",
    }
}

fn state_indicator(state: SiteState) -> String {
    match state {
        SiteState::Installed => "■".green().bold().to_string(),
        SiteState::New => "■".yellow().bold().to_string(),
        SiteState::Stale => "■".red().bold().to_string(),
    }
}

fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let seconds = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0);
    let age = match seconds {
        s if s < 60 => format!("{s}s"),
        s if s < 60 * 60 => format!("{}m", s / 60),
        s if s < 60 * 60 * 24 => format!("{}h", s / (60 * 60)),
        s => format!("{}d", s / (60 * 60 * 24)),
    };
    format!("{age} ago")
}

//! `sitemanager deploy`: one reconciliation run.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use sitemanager_core::SystemConfig;
use sitemanager_sync::{
    reconciler, InstallOutcome, PreviousState, RemovalOutcome, RunOptions, RunReport,
};

/// Arguments for `sitemanager deploy`.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Report what would be removed and installed without touching the host.
    #[arg(long)]
    pub dry_run: bool,
}

impl DeployArgs {
    pub fn run(self, cfg: &SystemConfig, options: &RunOptions) -> Result<()> {
        let report = reconciler::run(cfg, options).context("deploy failed")?;
        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &RunReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };

    match &report.previous {
        PreviousState::Missing => println!("{prefix}no previous snapshot; first deploy"),
        PreviousState::Corrupt { reason } => {
            println!("{prefix}{} previous snapshot ignored: {reason}", "!".yellow().bold())
        }
        PreviousState::Loaded(_) => {}
    }

    let failed = report.removals.iter().filter(|r| r.is_failure()).count();
    println!(
        "{prefix}✓ deployed {} sites ({} installed, {} removed{})",
        report.sites.len(),
        report.installs.len(),
        report
            .removals
            .iter()
            .filter(|r| matches!(r, RemovalOutcome::Removed { .. } | RemovalOutcome::WouldRemove { .. }))
            .count(),
        if failed > 0 {
            format!(", {failed} not removed")
        } else {
            String::new()
        }
    );

    for r in &report.removals {
        match r {
            RemovalOutcome::Removed { path } => println!("  ✗  {}", path.display()),
            RemovalOutcome::WouldRemove { path } => println!("  -  {}", path.display()),
            RemovalOutcome::AlreadyAbsent { path } => println!("  ·  {}", path.display()),
            RemovalOutcome::Refused { path, reason } => println!(
                "  {}  {} ({reason})",
                "!".yellow().bold(),
                path.display()
            ),
            RemovalOutcome::Failed { path, error } => println!(
                "  {}  {} ({error})",
                "!".red().bold(),
                path.display()
            ),
        }
    }

    for i in &report.installs {
        match i {
            InstallOutcome::Written { path } => println!("  ✎  {}", path.display()),
            InstallOutcome::Copied { dest, files, .. } => {
                println!("  ✎  {} ({files} files)", dest.display())
            }
            InstallOutcome::WouldWrite { path } => println!("  ~  {}", path.display()),
            InstallOutcome::WouldCopy { source, dest } => {
                println!("  ~  {} <- {}", dest.display(), source.display())
            }
        }
    }

    if let Some(path) = &report.snapshot_path {
        println!("{prefix}snapshot: {}", path.display());
    }
}

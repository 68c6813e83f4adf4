//! sitemanager: deploy a directory of sites onto a host webserver.
//!
//! # Usage
//!
//! ```text
//! sitemanager [--config <file>] [--profile openbsd|linux] [--sites-dir <dir>]
//!             [--templates-dir <dir>] [--state-file <file>] [--verbose] <command>
//!
//! sitemanager deploy [--dry-run]
//! sitemanager status [--json]
//! sitemanager diff
//! ```

mod commands;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{deploy::DeployArgs, diff::DiffArgs, status::StatusArgs};
use sitemanager_core::{load_config_at, Profile, SystemConfig};
use sitemanager_sync::RunOptions;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "sitemanager",
    version,
    about = "Install static and dynamic sites into a chrooted webserver",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the host with the sites directory.
    Deploy(DeployArgs),

    /// Show discovered sites against the last deploy.
    Status(StatusArgs),

    /// Show unified diff of the files deploy would generate.
    Diff(DiffArgs),
}

/// Flags shared by every subcommand.
#[derive(Args, Debug)]
struct GlobalArgs {
    /// YAML file overriding the profile's paths.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Preset to start from when the config file names none.
    #[arg(long, global = true, value_name = "PROFILE")]
    profile: Option<Profile>,

    /// Directory with one subdirectory per site.
    #[arg(long, global = true, default_value = "sites", value_name = "DIR")]
    sites_dir: PathBuf,

    /// Directory of `.tera` files overriding the built-in templates.
    #[arg(long, global = true, value_name = "DIR")]
    templates_dir: Option<PathBuf>,

    /// Snapshot location, overriding the configured one.
    #[arg(long, global = true, value_name = "FILE")]
    state_file: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl GlobalArgs {
    /// The single configuration every component of this run reads from.
    fn system_config(&self) -> Result<SystemConfig> {
        let profile = self.profile.unwrap_or_default();
        let mut cfg = match &self.config {
            Some(path) => load_config_at(path, profile)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => SystemConfig::from_profile(profile),
        };
        if let Some(state_file) = &self.state_file {
            cfg.snapshot_path = absolute(state_file)?;
        }
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }

    fn run_options(&self, dry_run: bool) -> RunOptions {
        RunOptions {
            sites_root: self.sites_dir.clone(),
            templates_dir: self.templates_dir.clone(),
            dry_run,
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("cannot resolve {}", path.display()))
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let cfg = cli.global.system_config()?;
    match cli.command {
        Commands::Deploy(args) => {
            let options = cli.global.run_options(args.dry_run);
            args.run(&cfg, &options)
        }
        Commands::Status(args) => args.run(&cfg, &cli.global.run_options(false)),
        Commands::Diff(args) => args.run(&cfg, &cli.global.run_options(false)),
    }
}

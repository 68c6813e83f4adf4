//! `sitemanager diff`: show unified diffs for what deploy would write.

use anyhow::{Context, Result};
use clap::Args;

use sitemanager_core::SystemConfig;
use sitemanager_sync::{diff_deployment, RunOptions};

/// Arguments for `sitemanager diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {}

impl DiffArgs {
    pub fn run(self, cfg: &SystemConfig, options: &RunOptions) -> Result<()> {
        let diffs = diff_deployment(cfg, options).context("diff failed")?;

        if diffs.is_empty() {
            println!("No differences.");
            return Ok(());
        }

        for diff in diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }

        Ok(())
    }
}

//! # sitemanager-sync
//!
//! Snapshot store, installer, and the reconciliation run that ties them together.
//!
//! Call [`reconciler::run`] to bring the host in line with a sites root, or
//! [`diff_deployment`] to see what a run would change in generated files.

pub mod diff;
pub mod error;
pub mod installer;
pub mod reconciler;
pub mod status;
pub mod store;

pub use diff::{diff_deployment, FileDiff};
pub use error::{StoreError, SyncError};
pub use installer::{InstallOutcome, RemovalOutcome};
pub use reconciler::{Phase, PreviousState, Reconciler, RunFailure, RunOptions, RunReport};
pub use store::{Snapshot, SNAPSHOT_VERSION};

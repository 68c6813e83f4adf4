//! Error types for sitemanager-sync.

use std::path::PathBuf;

use thiserror::Error;

use sitemanager_core::Hostname;
use sitemanager_detector::DetectError;
use sitemanager_renderer::RenderError;

/// Snapshot load/save failures.
///
/// `NotFound` and `Decode` stay distinct so callers can tell "first run"
/// apart from "snapshot present but corrupt".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot not found at {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode snapshot at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot at {path} has version {found}; this build reads up to {supported}")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("snapshot JSON error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// All errors that can abort a reconciliation run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the rendering engine.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Site discovery failed.
    #[error("discovery error: {0}")]
    Detect(#[from] DetectError),

    /// Snapshot persistence failed.
    #[error("snapshot error: {0}")]
    Store(#[from] StoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Walking a static asset tree failed.
    #[error("cannot walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// Two dynamic sites would install the same service file.
    #[error("hostnames {} all map to service name {service_name}", join_hostnames(.hostnames))]
    ServiceNameCollision {
        service_name: String,
        hostnames: Vec<Hostname>,
    },
}

fn join_hostnames(hostnames: &[Hostname]) -> String {
    hostnames
        .iter()
        .map(Hostname::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn store_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

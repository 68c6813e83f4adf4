//! Error types for sitemanager-core.

use std::path::PathBuf;

use thiserror::Error;

/// Path policy failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The absolute path does not live under the webserver chroot.
    #[error("{path} is not inside chroot {chroot}")]
    OutsideChroot { path: PathBuf, chroot: PathBuf },

    /// A site directory name that cannot be used as a single path component.
    #[error("invalid hostname {name:?}: {reason}")]
    InvalidHostname { name: String, reason: &'static str },
}

/// Errors from loading or validating a [`SystemConfig`](crate::SystemConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading the config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// YAML parse error on load, with file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config parsed but describes an impossible host layout.
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Path(#[from] PathError),
}

/// A persisted site record that does not describe exactly one kind of site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SiteRecordError {
    #[error("dynamic site {hostname} is missing {field}")]
    MissingDynamicField { hostname: String, field: &'static str },

    #[error("static site {hostname} is missing {field}")]
    MissingStaticField { hostname: String, field: &'static str },

    #[error("site {hostname} mixes dynamic and static fields")]
    MixedKinds { hostname: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

//! sitemanager core library: domain types, host layout config, path policy, errors.
//!
//! - [`types`]: [`Hostname`], [`SiteInfo`] and its flat [`SiteRecord`] form
//! - [`config`]: [`SystemConfig`] presets and YAML overrides
//! - [`paths`]: pure hostname → path mappings
//! - [`error`]: [`PathError`], [`ConfigError`], [`SiteRecordError`]

pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use config::{load_config_at, Profile, SystemConfig};
pub use error::{ConfigError, PathError, SiteRecordError};
pub use types::{Hostname, SiteInfo, SiteKind, SiteRecord};

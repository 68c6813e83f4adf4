//! Domain types for discovered sites.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! A [`SiteInfo`] is serialised through the flat [`SiteRecord`] shape so the
//! snapshot stays field-keyed and templates see plain keys.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PathError, SiteRecordError};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A site's routing name, taken verbatim from its directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hostname(pub String);

impl Hostname {
    /// Accept `name` only if it is usable as exactly one path component.
    pub fn parse(name: &str) -> Result<Self, PathError> {
        let reason = if name.is_empty() {
            Some("empty")
        } else if name == "." || name == ".." {
            Some("relative directory reference")
        } else if name.contains('/') || name.contains('\\') {
            Some("contains a path separator")
        } else if name.contains('\0') {
            Some("contains NUL")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(PathError::InvalidHostname {
                name: name.to_owned(),
                reason,
            }),
            None => Ok(Self(name.to_owned())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Hostname {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Hostname {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// SiteInfo
// ---------------------------------------------------------------------------

/// How a site is served, with the paths that only make sense for that kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteKind {
    /// Served by an executable bound to a Unix socket.
    Dynamic {
        executable_path: PathBuf,
        socket_path: PathBuf,
        /// `socket_path` relative to the webserver chroot.
        socket_path_rel: PathBuf,
    },
    /// Served straight from an installed file tree.
    Static {
        source_path: PathBuf,
        install_path: PathBuf,
        /// `install_path` relative to the webserver chroot.
        install_path_rel: PathBuf,
    },
}

/// One discovered site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SiteRecord", into = "SiteRecord")]
pub struct SiteInfo {
    pub hostname: Hostname,
    pub kind: SiteKind,
}

impl SiteInfo {
    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, SiteKind::Dynamic { .. })
    }

    pub fn kind_label(&self) -> &'static str {
        if self.is_dynamic() {
            "dynamic"
        } else {
            "static"
        }
    }

    /// Convert into the flat record used on disk and in templates.
    pub fn to_record(&self) -> SiteRecord {
        SiteRecord::from(self.clone())
    }
}

// ---------------------------------------------------------------------------
// SiteRecord
// ---------------------------------------------------------------------------

/// Flat, field-keyed form of a [`SiteInfo`].
///
/// Fields that do not apply to the site's kind are omitted when serialising.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub hostname: Hostname,
    pub is_dynamic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path_rel: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_files_source_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_files_install_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_files_install_path_rel: Option<PathBuf>,
}

impl From<SiteInfo> for SiteRecord {
    fn from(site: SiteInfo) -> Self {
        let mut record = SiteRecord {
            hostname: site.hostname,
            is_dynamic: false,
            executable_path: None,
            socket_path: None,
            socket_path_rel: None,
            static_files_source_path: None,
            static_files_install_path: None,
            static_files_install_path_rel: None,
        };
        match site.kind {
            SiteKind::Dynamic {
                executable_path,
                socket_path,
                socket_path_rel,
            } => {
                record.is_dynamic = true;
                record.executable_path = Some(executable_path);
                record.socket_path = Some(socket_path);
                record.socket_path_rel = Some(socket_path_rel);
            }
            SiteKind::Static {
                source_path,
                install_path,
                install_path_rel,
            } => {
                record.static_files_source_path = Some(source_path);
                record.static_files_install_path = Some(install_path);
                record.static_files_install_path_rel = Some(install_path_rel);
            }
        }
        record
    }
}

impl TryFrom<SiteRecord> for SiteInfo {
    type Error = SiteRecordError;

    fn try_from(r: SiteRecord) -> Result<Self, Self::Error> {
        let hostname = r.hostname.0.clone();
        let has_dynamic =
            r.executable_path.is_some() || r.socket_path.is_some() || r.socket_path_rel.is_some();
        let has_static = r.static_files_source_path.is_some()
            || r.static_files_install_path.is_some()
            || r.static_files_install_path_rel.is_some();

        let kind = if r.is_dynamic {
            if has_static {
                return Err(SiteRecordError::MixedKinds { hostname });
            }
            let missing = |field| SiteRecordError::MissingDynamicField {
                hostname: hostname.clone(),
                field,
            };
            SiteKind::Dynamic {
                executable_path: r.executable_path.ok_or_else(|| missing("executable_path"))?,
                socket_path: r.socket_path.ok_or_else(|| missing("socket_path"))?,
                socket_path_rel: r.socket_path_rel.ok_or_else(|| missing("socket_path_rel"))?,
            }
        } else {
            if has_dynamic {
                return Err(SiteRecordError::MixedKinds { hostname });
            }
            let missing = |field| SiteRecordError::MissingStaticField {
                hostname: hostname.clone(),
                field,
            };
            SiteKind::Static {
                source_path: r
                    .static_files_source_path
                    .ok_or_else(|| missing("static_files_source_path"))?,
                install_path: r
                    .static_files_install_path
                    .ok_or_else(|| missing("static_files_install_path"))?,
                install_path_rel: r
                    .static_files_install_path_rel
                    .ok_or_else(|| missing("static_files_install_path_rel"))?,
            }
        };

        Ok(SiteInfo {
            hostname: r.hostname,
            kind,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dynamic_site() -> SiteInfo {
        SiteInfo {
            hostname: Hostname::from("api.example.org"),
            kind: SiteKind::Dynamic {
                executable_path: PathBuf::from("/srv/sites/api.example.org/build/main"),
                socket_path: PathBuf::from("/var/www/run/api.example.org.sock"),
                socket_path_rel: PathBuf::from("run/api.example.org.sock"),
            },
        }
    }

    #[test]
    fn hostname_parse_accepts_plain_names() {
        assert_eq!(Hostname::parse("my.site-1").unwrap().as_str(), "my.site-1");
    }

    #[test]
    fn hostname_parse_rejects_traversal() {
        for bad in ["", ".", "..", "a/b", "a\\b", "a\0b"] {
            assert!(Hostname::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn dynamic_record_omits_static_fields() {
        let record = dynamic_site().to_record();
        assert!(record.is_dynamic);
        assert!(record.static_files_install_path.is_none());
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("static_files"));
    }

    #[test]
    fn record_with_both_kinds_is_rejected() {
        let mut record = dynamic_site().to_record();
        record.static_files_install_path = Some(PathBuf::from("/var/www/htdocs/x"));
        let err = SiteInfo::try_from(record).unwrap_err();
        assert!(matches!(err, SiteRecordError::MixedKinds { .. }));
    }

    #[test]
    fn static_record_missing_install_path_is_rejected() {
        let json = r#"{"hostname":"docs","is_dynamic":false,"static_files_source_path":"/s"}"#;
        let err = serde_json::from_str::<SiteInfo>(json).unwrap_err();
        assert!(err.to_string().contains("static_files_install_path"));
    }

    #[test]
    fn unknown_record_keys_are_ignored() {
        let json = r#"{
            "hostname": "api",
            "is_dynamic": true,
            "executable_path": "/s/api/build/main",
            "socket_path": "/var/www/run/api.sock",
            "socket_path_rel": "run/api.sock",
            "added_in_a_later_release": 42
        }"#;
        let site: SiteInfo = serde_json::from_str(json).unwrap();
        assert!(site.is_dynamic());
        assert_eq!(site.kind_label(), "dynamic");
    }
}

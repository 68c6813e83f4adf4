//! Snapshot store: the list of sites installed by the last successful run.
//!
//! Persists a versioned, pretty-printed JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "sites": [ { "hostname": "...", "is_dynamic": true, ... } ]
//! }
//! ```
//!
//! A bare JSON array of site records (the pre-versioned layout) still loads
//! and is reported as version 0. Writes use the same atomic `.tmp` + rename
//! pattern as every other generated file.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use sitemanager_core::SiteInfo;

use crate::error::{store_io_err, StoreError};

/// Newest snapshot layout this build understands.
pub const SNAPSHOT_VERSION: u32 = 1;

/// On-disk snapshot payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub version: u32,
    pub sites: Vec<SiteInfo>,
}

impl Snapshot {
    /// A current-version snapshot of `sites`.
    pub fn new(sites: Vec<SiteInfo>) -> Self {
        Snapshot {
            version: SNAPSHOT_VERSION,
            sites,
        }
    }
}

/// Load the snapshot at `path`.
///
/// Returns `StoreError::NotFound` if absent, `StoreError::Decode` if the
/// document is not a snapshot, and `StoreError::UnsupportedVersion` if it
/// was written by a newer build.
pub fn load(path: &Path) -> Result<Snapshot, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StoreError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(store_io_err(path, e)),
    };
    let decode = |source| StoreError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let value: serde_json::Value = serde_json::from_str(&contents).map_err(decode)?;
    if value.is_array() {
        let sites: Vec<SiteInfo> = serde_json::from_str(&contents).map_err(decode)?;
        return Ok(Snapshot { version: 0, sites });
    }

    let found = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0);
    if found > u64::from(SNAPSHOT_VERSION) {
        return Err(StoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: u32::try_from(found).unwrap_or(u32::MAX),
            supported: SNAPSHOT_VERSION,
        });
    }
    serde_json::from_str(&contents).map_err(decode)
}

/// Save `snapshot` to `path`, replacing any previous snapshot.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let Some(dir) = path.parent() else {
        return Err(store_io_err(
            path,
            std::io::Error::other("invalid snapshot path"),
        ));
    };

    // Ensure the snapshot directory exists.
    std::fs::create_dir_all(dir).map_err(|e| store_io_err(dir, e))?;

    let mut json = serde_json::to_string_pretty(snapshot)?;
    json.push('\n');
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| store_io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(store_io_err(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitemanager_core::{Hostname, SiteKind};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sites() -> Vec<SiteInfo> {
        vec![
            SiteInfo {
                hostname: Hostname::from("api.example.org"),
                kind: SiteKind::Dynamic {
                    executable_path: PathBuf::from("/srv/sites/api.example.org/build/main"),
                    socket_path: PathBuf::from("/var/www/run/api.example.org.sock"),
                    socket_path_rel: PathBuf::from("run/api.example.org.sock"),
                },
            },
            SiteInfo {
                hostname: Hostname::from("www.example.org"),
                kind: SiteKind::Static {
                    source_path: PathBuf::from("/srv/sites/www.example.org/build"),
                    install_path: PathBuf::from("/var/www/htdocs/www.example.org"),
                    install_path_rel: PathBuf::from("htdocs/www.example.org"),
                },
            },
        ]
    }

    #[test]
    fn missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = load(&tmp.path().join("snapshot.json")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn garbage_is_decode_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }), "got: {err}");
    }

    #[test]
    fn empty_list_is_distinct_from_missing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        save(&path, &Snapshot::new(vec![])).unwrap();
        let loaded = load(&path).unwrap();
        assert!(loaded.sites.is_empty());
        assert_eq!(loaded.version, SNAPSHOT_VERSION);
    }

    #[test]
    fn save_then_load_preserves_sites_and_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state").join("snapshot.json");
        save(&path, &Snapshot::new(sites())).unwrap();
        assert_eq!(load(&path).unwrap().sites, sites());
    }

    #[test]
    fn saved_document_is_indented_and_field_keyed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        save(&path, &Snapshot::new(sites())).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"version\": 1"), "{text}");
        assert!(text.contains("\"hostname\": \"api.example.org\""));
        assert!(text.contains("\"is_dynamic\": false"));
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        save(&path, &Snapshot::new(vec![])).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn legacy_bare_list_loads_as_version_zero() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        let legacy = serde_json::to_string(&sites()).unwrap();
        std::fs::write(&path, legacy).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.version, 0);
        assert_eq!(loaded.sites, sites());
    }

    #[test]
    fn newer_version_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        std::fs::write(&path, r#"{"version": 99, "sites": []}"#).unwrap();
        let err = load(&path).unwrap_err();
        assert!(
            matches!(err, StoreError::UnsupportedVersion { found: 99, .. }),
            "got: {err}"
        );
    }

    #[test]
    fn record_violating_site_invariant_is_decode_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"{"version": 1, "sites": [{"hostname": "x", "is_dynamic": true}]}"#,
        )
        .unwrap();
        assert!(matches!(load(&path).unwrap_err(), StoreError::Decode { .. }));
    }
}

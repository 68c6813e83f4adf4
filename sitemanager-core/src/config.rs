//! Host layout configuration.
//!
//! A [`SystemConfig`] is built once per run, either straight from a
//! [`Profile`] preset or from a YAML file that names a profile and overrides
//! some of its fields:
//!
//! ```yaml
//! profile: openbsd
//! static_base_dir: /var/www/sites
//! service_file_mode: "0550"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Target operating system preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// OpenBSD httpd(8) chrooted to `/var/www`, rc.d(8) scripts.
    #[default]
    OpenBsd,
    /// nginx include file plus systemd units.
    Linux,
}

impl Profile {
    pub fn all() -> &'static [Profile] {
        &[Profile::OpenBsd, Profile::Linux]
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::OpenBsd => write!(f, "openbsd"),
            Profile::Linux => write!(f, "linux"),
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openbsd" => Ok(Profile::OpenBsd),
            "linux" => Ok(Profile::Linux),
            other => Err(format!("unknown profile '{other}'; expected: openbsd, linux")),
        }
    }
}

// ---------------------------------------------------------------------------
// SystemConfig
// ---------------------------------------------------------------------------

/// Read-only description of where everything lives on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub profile: Profile,
    /// Root the webserver is chrooted to; relative paths in its config resolve here.
    pub httpd_chroot_dir: PathBuf,
    pub socket_base_dir: PathBuf,
    pub static_base_dir: PathBuf,
    pub services_dir: PathBuf,
    pub httpd_config_path: PathBuf,
    /// Appended to the sanitised hostname, e.g. `.service`. May be empty.
    pub service_file_extension: String,
    #[serde(with = "octal_mode")]
    pub service_file_mode: u32,
    /// Where the deployment snapshot is persisted between runs.
    pub snapshot_path: PathBuf,
}

impl SystemConfig {
    /// The built-in layout for `profile`.
    pub fn from_profile(profile: Profile) -> Self {
        match profile {
            Profile::OpenBsd => SystemConfig {
                profile,
                httpd_chroot_dir: PathBuf::from("/var/www"),
                socket_base_dir: PathBuf::from("/var/www/run"),
                static_base_dir: PathBuf::from("/var/www/htdocs"),
                services_dir: PathBuf::from("/etc/rc.d"),
                httpd_config_path: PathBuf::from("/etc/httpd.conf"),
                service_file_extension: String::new(),
                service_file_mode: 0o555,
                snapshot_path: PathBuf::from("/var/db/sitemanager/snapshot.json"),
            },
            Profile::Linux => SystemConfig {
                profile,
                httpd_chroot_dir: PathBuf::from("/"),
                socket_base_dir: PathBuf::from("/run/sitemanager"),
                static_base_dir: PathBuf::from("/srv/sitemanager/htdocs"),
                services_dir: PathBuf::from("/etc/systemd/system"),
                httpd_config_path: PathBuf::from("/etc/nginx/conf.d/sitemanager.conf"),
                service_file_extension: ".service".to_string(),
                service_file_mode: 0o644,
                snapshot_path: PathBuf::from("/var/lib/sitemanager/snapshot.json"),
            },
        }
    }

    /// Re-root every absolute path under `root`. Used to stage a whole host
    /// layout inside a scratch directory.
    pub fn rooted_at(&self, root: &Path) -> Self {
        let reroot = |p: &Path| match p.strip_prefix("/") {
            Ok(rel) => root.join(rel),
            Err(_) => root.join(p),
        };
        SystemConfig {
            profile: self.profile,
            httpd_chroot_dir: reroot(&self.httpd_chroot_dir),
            socket_base_dir: reroot(&self.socket_base_dir),
            static_base_dir: reroot(&self.static_base_dir),
            services_dir: reroot(&self.services_dir),
            httpd_config_path: reroot(&self.httpd_config_path),
            service_file_extension: self.service_file_extension.clone(),
            service_file_mode: self.service_file_mode,
            snapshot_path: reroot(&self.snapshot_path),
        }
    }

    /// Check that the layout is usable before any run touches the disk.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let absolute = [
            ("httpd_chroot_dir", &self.httpd_chroot_dir),
            ("socket_base_dir", &self.socket_base_dir),
            ("static_base_dir", &self.static_base_dir),
            ("services_dir", &self.services_dir),
            ("httpd_config_path", &self.httpd_config_path),
            ("snapshot_path", &self.snapshot_path),
        ];
        for (name, path) in absolute {
            if !path.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be absolute, got {}",
                    path.display()
                )));
            }
        }
        crate::paths::chroot_relative(&self.socket_base_dir, self)?;
        crate::paths::chroot_relative(&self.static_base_dir, self)?;
        if self.service_file_extension.contains('/') {
            return Err(ConfigError::Invalid(
                "service_file_extension must not contain '/'".to_string(),
            ));
        }
        if self.service_file_mode > 0o7777 {
            return Err(ConfigError::Invalid(format!(
                "service_file_mode {:o} is not a permission mode",
                self.service_file_mode
            )));
        }
        Ok(())
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self::from_profile(Profile::default())
    }
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// On-disk overrides. Every field except `profile` is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    profile: Option<Profile>,
    httpd_chroot_dir: Option<PathBuf>,
    socket_base_dir: Option<PathBuf>,
    static_base_dir: Option<PathBuf>,
    services_dir: Option<PathBuf>,
    httpd_config_path: Option<PathBuf>,
    service_file_extension: Option<String>,
    #[serde(default, with = "octal_mode::option")]
    service_file_mode: Option<u32>,
    snapshot_path: Option<PathBuf>,
}

impl ConfigFile {
    fn apply(self, fallback: Profile) -> SystemConfig {
        let mut cfg = SystemConfig::from_profile(self.profile.unwrap_or(fallback));
        if let Some(v) = self.httpd_chroot_dir {
            cfg.httpd_chroot_dir = v;
        }
        if let Some(v) = self.socket_base_dir {
            cfg.socket_base_dir = v;
        }
        if let Some(v) = self.static_base_dir {
            cfg.static_base_dir = v;
        }
        if let Some(v) = self.services_dir {
            cfg.services_dir = v;
        }
        if let Some(v) = self.httpd_config_path {
            cfg.httpd_config_path = v;
        }
        if let Some(v) = self.service_file_extension {
            cfg.service_file_extension = v;
        }
        if let Some(v) = self.service_file_mode {
            cfg.service_file_mode = v;
        }
        if let Some(v) = self.snapshot_path {
            cfg.snapshot_path = v;
        }
        cfg
    }
}

/// Parse a YAML config document. `fallback` is used when it names no profile.
pub fn parse_config(yaml: &str, fallback: Profile) -> Result<SystemConfig, serde_yaml::Error> {
    let file: ConfigFile = if yaml.trim().is_empty() {
        ConfigFile::default()
    } else {
        serde_yaml::from_str(yaml)?
    };
    Ok(file.apply(fallback))
}

/// Load and validate the config file at `path`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_config_at(path: &Path, fallback: Profile) -> Result<SystemConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let cfg = parse_config(&contents, fallback).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

/// Permission modes as octal strings (`"0644"`); bare integers are read as octal digits too.
mod octal_mode {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    fn parse<E: de::Error>(raw: Raw) -> Result<u32, E> {
        let text = match raw {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        };
        let digits = text.trim().trim_start_matches("0o");
        u32::from_str_radix(digits, 8)
            .map_err(|_| E::custom(format!("invalid octal mode {text:?}")))
    }

    pub fn serialize<S: Serializer>(mode: &u32, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{mode:04o}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        parse(Raw::deserialize(d)?)
    }

    pub mod option {
        use super::*;

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
            match Option::<Raw>::deserialize(d)? {
                Some(raw) => parse(raw).map(Some),
                None => Ok(None),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Profile::OpenBsd)]
    #[case(Profile::Linux)]
    fn presets_validate(#[case] profile: Profile) {
        SystemConfig::from_profile(profile).validate().expect("preset is valid");
    }

    #[test]
    fn profile_parse_is_case_insensitive() {
        assert_eq!("OpenBSD".parse::<Profile>().unwrap(), Profile::OpenBsd);
        assert!("windows".parse::<Profile>().is_err());
    }

    #[test]
    fn overrides_apply_on_top_of_profile() {
        let cfg = parse_config(
            "profile: linux\nstatic_base_dir: /srv/www\nservice_file_mode: \"0640\"\n",
            Profile::OpenBsd,
        )
        .unwrap();
        assert_eq!(cfg.profile, Profile::Linux);
        assert_eq!(cfg.static_base_dir, PathBuf::from("/srv/www"));
        assert_eq!(cfg.service_file_mode, 0o640);
        assert_eq!(cfg.services_dir, PathBuf::from("/etc/systemd/system"));
    }

    #[test]
    fn empty_document_uses_fallback_profile() {
        let cfg = parse_config("", Profile::Linux).unwrap();
        assert_eq!(cfg, SystemConfig::from_profile(Profile::Linux));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse_config("static_dir: /x\n", Profile::OpenBsd).is_err());
    }

    #[test]
    fn bare_integer_mode_is_octal() {
        let cfg = parse_config("service_file_mode: 555\n", Profile::Linux).unwrap();
        assert_eq!(cfg.service_file_mode, 0o555);
    }

    #[test]
    fn socket_dir_outside_chroot_is_invalid() {
        let mut cfg = SystemConfig::from_profile(Profile::OpenBsd);
        cfg.socket_base_dir = PathBuf::from("/run/sockets");
        assert!(matches!(cfg.validate(), Err(ConfigError::Path(_))));
    }

    #[test]
    fn relative_dirs_are_invalid() {
        let mut cfg = SystemConfig::from_profile(Profile::Linux);
        cfg.services_dir = PathBuf::from("etc/systemd/system");
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rooted_at_keeps_layout_valid() {
        let cfg = SystemConfig::from_profile(Profile::OpenBsd).rooted_at(Path::new("/tmp/stage"));
        assert_eq!(cfg.httpd_chroot_dir, PathBuf::from("/tmp/stage/var/www"));
        assert_eq!(cfg.services_dir, PathBuf::from("/tmp/stage/etc/rc.d"));
        cfg.validate().expect("rooted layout is valid");
    }

    #[test]
    fn mode_serialises_as_octal_string() {
        let cfg = SystemConfig::from_profile(Profile::OpenBsd);
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        assert!(yaml.contains("0555"), "{yaml}");
        let back: SystemConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, cfg);
    }
}

//! Tera rendering engine: [`TemplateKind`] and [`Renderer`].
//!
//! # Template mapping
//!
//! | Profile | Webserver config              | Service definition            |
//! |---------|-------------------------------|-------------------------------|
//! | OpenBSD | `openbsd/httpd.conf.tera`     | `openbsd/rc.d.tera`           |
//! | Linux   | `linux/nginx.conf.tera`       | `linux/systemd.service.tera`  |
//!
//! A user template directory may override any of these by relative name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tera::Tera;

use sitemanager_core::{Profile, SiteInfo, SystemConfig};

use crate::context::{ServiceContext, WebserverContext};
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Embedded templates, baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const TPLS: &[(&str, &str)] = &[
    ("openbsd/httpd.conf.tera", include_str!("templates/openbsd/httpd.conf.tera")),
    ("openbsd/rc.d.tera", include_str!("templates/openbsd/rc.d.tera")),
    ("linux/nginx.conf.tera", include_str!("templates/linux/nginx.conf.tera")),
    (
        "linux/systemd.service.tera",
        include_str!("templates/linux/systemd.service.tera"),
    ),
];

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .to_lowercase()
}

fn collect_template_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RenderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            collect_template_files(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut files = Vec::new();
    collect_template_files(dir, &mut files)?;
    let mut templates = Vec::new();
    for path in files {
        if path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path
            .strip_prefix(dir)
            .unwrap_or(path.as_path());
        let name = normalize_template_name(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        templates.push((name, contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert(
            normalize_template_name(Path::new(name)),
            (*content).to_string(),
        );
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    let items: Vec<(String, String)> = templates.into_iter().collect();
    tera.add_raw_templates(items)?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// TemplateKind
// ---------------------------------------------------------------------------

/// The two documents the compiler produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// One file routing every site.
    WebserverConfig,
    /// One file per dynamic site.
    ServiceDefinition,
}

impl TemplateKind {
    pub fn all() -> &'static [TemplateKind] {
        &[TemplateKind::WebserverConfig, TemplateKind::ServiceDefinition]
    }

    /// Template name for this document under `profile`.
    pub fn template_name(&self, profile: Profile) -> &'static str {
        match (self, profile) {
            (TemplateKind::WebserverConfig, Profile::OpenBsd) => "openbsd/httpd.conf.tera",
            (TemplateKind::ServiceDefinition, Profile::OpenBsd) => "openbsd/rc.d.tera",
            (TemplateKind::WebserverConfig, Profile::Linux) => "linux/nginx.conf.tera",
            (TemplateKind::ServiceDefinition, Profile::Linux) => "linux/systemd.service.tera",
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Tera-based engine for rendering templates with optional user overrides.
///
/// `user_template_dir` may contain `.tera` files that override embedded defaults.
/// Template names are normalised to lowercase and relative paths.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Construct a new [`TemplateEngine`], loading embedded templates plus any
    /// overrides found in `user_template_dir`.
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        let tera = build_tera(user_template_dir)?;
        Ok(TemplateEngine { tera })
    }

    pub fn render(&self, name: &str, ctx: &tera::Context) -> Result<String, RenderError> {
        let rendered = self.tera.render(name, ctx)?;
        Ok(rendered.replace("\r\n", "\n"))
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Renders the webserver config and service definitions for one profile.
///
/// Create once per run with [`Renderer::new`] and reuse.
pub struct Renderer {
    engine: TemplateEngine,
    profile: Profile,
}

impl Renderer {
    /// Construct a [`Renderer`] with embedded templates only.
    pub fn new(profile: Profile) -> Result<Self, RenderError> {
        Self::with_user_templates(profile, None)
    }

    /// Construct a [`Renderer`] whose templates may be overridden from `dir`.
    pub fn with_user_templates(profile: Profile, dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(Renderer {
            engine: TemplateEngine::new(dir)?,
            profile,
        })
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Render the webserver configuration covering every site in `sites`.
    pub fn render_webserver_config(
        &self,
        sites: &[SiteInfo],
        cfg: &SystemConfig,
    ) -> Result<String, RenderError> {
        let ctx = WebserverContext::new(sites, cfg).to_tera_context()?;
        self.engine
            .render(TemplateKind::WebserverConfig.template_name(self.profile), &ctx)
    }

    /// Render the service definition for a single dynamic site.
    pub fn render_service(&self, site: &SiteInfo, cfg: &SystemConfig) -> Result<String, RenderError> {
        let ctx = ServiceContext::new(site, cfg).to_tera_context()?;
        self.engine
            .render(TemplateKind::ServiceDefinition.template_name(self.profile), &ctx)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_new_succeeds_for_every_profile() {
        for profile in Profile::all() {
            Renderer::new(*profile).expect("embedded templates parse");
        }
    }

    #[test]
    fn every_template_name_is_embedded() {
        let embedded: Vec<&str> = TPLS.iter().map(|(name, _)| *name).collect();
        for profile in Profile::all() {
            for kind in TemplateKind::all() {
                assert!(
                    embedded.contains(&kind.template_name(*profile)),
                    "{kind:?} missing for {profile}"
                );
            }
        }
    }

    #[test]
    fn empty_site_list_renders() {
        let cfg = SystemConfig::from_profile(Profile::OpenBsd);
        let renderer = Renderer::new(Profile::OpenBsd).unwrap();
        let out = renderer.render_webserver_config(&[], &cfg).unwrap();
        assert!(out.contains("Generated by sitemanager"));
        assert!(!out.contains("server \""));
    }

    #[test]
    fn template_names_are_normalised() {
        assert_eq!(
            normalize_template_name(Path::new("OpenBSD\\httpd.conf.tera")),
            "openbsd/httpd.conf.tera"
        );
    }
}

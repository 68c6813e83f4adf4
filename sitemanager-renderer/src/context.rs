//! Template contexts: serializable rendering payloads built from [`SiteInfo`].
//!
//! Templates see each site as its flat [`SiteRecord`] (`site.hostname`,
//! `site.is_dynamic`, `site.socket_path_rel`, ...) plus the derived
//! `site.service_name`.

use serde::{Deserialize, Serialize};

use sitemanager_core::{paths, Profile, SiteInfo, SiteKind, SiteRecord, SystemConfig};

use crate::error::RenderError;

/// One site as seen by a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteCtx {
    #[serde(flatten)]
    pub record: SiteRecord,
    pub service_name: String,
}

impl SiteCtx {
    pub fn from_site(site: &SiteInfo) -> Self {
        SiteCtx {
            record: site.to_record(),
            service_name: paths::service_name(&site.hostname),
        }
    }
}

/// Generator info stamped into every rendered file.
///
/// Carries no timestamp: identical inputs render identical bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaCtx {
    pub version: String,
    pub profile: Profile,
}

impl MetaCtx {
    fn for_config(cfg: &SystemConfig) -> Self {
        MetaCtx {
            version: env!("CARGO_PKG_VERSION").to_string(),
            profile: cfg.profile,
        }
    }
}

/// Payload for the single webserver configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebserverContext {
    pub sites: Vec<SiteCtx>,
    pub dynamic_count: usize,
    pub static_count: usize,
    pub meta: MetaCtx,
}

impl WebserverContext {
    pub fn new(sites: &[SiteInfo], cfg: &SystemConfig) -> Self {
        let dynamic_count = sites.iter().filter(|s| s.is_dynamic()).count();
        WebserverContext {
            sites: sites.iter().map(SiteCtx::from_site).collect(),
            dynamic_count,
            static_count: sites.len() - dynamic_count,
            meta: MetaCtx::for_config(cfg),
        }
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}

/// Payload for one dynamic site's service definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceContext {
    pub site: SiteCtx,
    pub service_name: String,
    /// Directory holding the executable; the service runs from here.
    pub working_dir: String,
    pub meta: MetaCtx,
}

impl ServiceContext {
    pub fn new(site: &SiteInfo, cfg: &SystemConfig) -> Self {
        let working_dir = match &site.kind {
            SiteKind::Dynamic {
                executable_path, ..
            } => executable_path
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            SiteKind::Static { source_path, .. } => source_path.display().to_string(),
        };
        let site_ctx = SiteCtx::from_site(site);
        ServiceContext {
            service_name: site_ctx.service_name.clone(),
            site: site_ctx,
            working_dir,
            meta: MetaCtx::for_config(cfg),
        }
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}

//! # sitemanager-renderer
//!
//! Tera-based compiler that renders the webserver configuration and the
//! per-site service definitions from discovered [`SiteInfo`] data.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sitemanager_core::{SiteInfo, SystemConfig};
//! use sitemanager_renderer::Renderer;
//!
//! fn render_all(sites: &[SiteInfo], cfg: &SystemConfig) {
//!     if let Ok(renderer) = Renderer::new(cfg.profile) {
//!         if let Ok(conf) = renderer.render_webserver_config(sites, cfg) {
//!             println!("{} bytes of webserver config", conf.len());
//!         }
//!         for site in sites.iter().filter(|s| s.is_dynamic()) {
//!             let _ = renderer.render_service(site, cfg);
//!         }
//!     }
//! }
//! ```
//!
//! [`SiteInfo`]: sitemanager_core::SiteInfo

pub mod context;
pub mod engine;
pub mod error;

pub use context::{ServiceContext, SiteCtx, WebserverContext};
pub use engine::{Renderer, TemplateEngine, TemplateKind};
pub use error::RenderError;

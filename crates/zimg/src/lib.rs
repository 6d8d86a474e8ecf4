//! zimg: HTTP image storage and on-the-fly transformation service.
//!
//! Uploads are fingerprinted and stored content-addressed; fetches resolve
//! through three tiers (hot cache, materialized rendition file, render from
//! origin) and materialize what they render.
//!
//! Module map:
//! - [`config`]: YAML configuration and resolved [`config::Settings`]
//! - [`multipart`]: binary-safe multipart/form-data parsing
//! - [`upload`]: the save pipeline (dedupe, origin write, JPEG baseline)
//! - [`fetch`]: the three-tier read pipeline and render policy
//! - [`serve`]: axum router, middleware, and the HTTP handlers

pub mod config;
pub mod fetch;
pub mod multipart;
pub mod serve;
pub mod upload;

use zimg_store::HotCache;

/// Shared per-process state, created once at startup and threaded through
/// the handlers.
pub struct App {
    pub settings: config::Settings,
    pub cache: HotCache,
}

impl App {
    pub fn new(settings: config::Settings) -> Self {
        let cache = HotCache::new(settings.cache_max_size, settings.cache_total_size);
        App { settings, cache }
    }
}

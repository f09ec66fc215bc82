//! Staged build pipeline for Kiln.
//!
//! A build is a fixed sequence of [`Stage`]s driven by a [`Manager`]. All the
//! actual work happens in [`Plugin`]s: named sets of handlers keyed by stage,
//! invoked in registration order. The default set (see [`plugins::defaults`])
//! turns a content directory of markdown files into a static site.
//!
//! # Architecture
//!
//! ```text
//! Configure ─► Validate ─► Glob ─► Load ─► Transform ─► Render ─► Collect ─► Write ─► Cleanup
//!                                  │         │            │          │
//!                                  └─────────┴────────────┘          └─► dry runs stop here
//!                                   per-record, optionally parallel
//! ```
//!
//! Nothing touches the output directory before [`Stage::Write`], so
//! `run_to(Stage::Collect)` is a complete dry run.

mod html;
mod manager;
mod plugin;
pub mod plugins;
mod stage;
mod state;

use std::sync::Arc;

use kiln_cache::BuildCache;
use kiln_config::Config;

pub use html::escape_html;
pub use manager::{Manager, PipelineError};
pub use plugin::{Handler, Plugin, PluginError, StageContext};
pub use stage::Stage;
pub use state::{BuildState, Feed, OutputContents, OutputFile, Post, SearchEntry, SiteSettings};

/// Version string guarding the persistent cache tier.
pub const CACHE_VERSION: &str = concat!("kiln-", env!("CARGO_PKG_VERSION"));

/// Create a manager with the default plugins and configured concurrency.
///
/// # Errors
///
/// Never fails for a fresh manager; the `Result` mirrors
/// [`Manager::register_plugins`].
pub fn default_manager(
    config: Arc<Config>,
    cache: Arc<BuildCache>,
) -> Result<Manager, PipelineError> {
    let plugins = plugins::defaults(&config);
    let concurrency = config.build_resolved.concurrency;
    let mut manager = Manager::new(config, cache);
    manager.set_concurrency(concurrency);
    manager.register_plugins(plugins)?;
    Ok(manager)
}

/// Open the build cache described by the configuration.
#[must_use]
pub fn open_cache(config: &Config) -> BuildCache {
    BuildCache::with_external(config.cache_resolved.dir.clone(), CACHE_VERSION)
}

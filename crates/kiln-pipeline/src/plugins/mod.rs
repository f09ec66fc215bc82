//! Default plugin set.
//!
//! Registration order matters only within a stage; [`defaults`] registers
//! them so that Collect-stage plugins contributing pages (`feeds`,
//! `search_index`) run before `collect` checks the final file list.

mod collect;
mod configure;
mod discover;
mod feeds;
mod load;
mod markdown;
mod search;
mod templates;
#[cfg(test)]
mod testutil;
mod write;

use kiln_config::Config;

use crate::plugin::Plugin;

pub use write::{OLD_SUFFIX, STAGING_SUFFIX, sibling};

/// Names of the default plugins, in registration order.
pub const DEFAULT_PLUGINS: [&str; 11] = [
    "config",
    "validate",
    "glob",
    "load",
    "markdown",
    "templates",
    "feeds",
    "search_index",
    "collect",
    "write",
    "cleanup",
];

/// Build the default plugin set for `config`.
///
/// In fast mode (`build.fast`) the feed and search index plugins are left out.
#[must_use]
pub fn defaults(config: &Config) -> Vec<Plugin> {
    let fast = config.build_resolved.fast;
    let mut plugins = vec![
        configure::config_plugin(),
        configure::validate_plugin(),
        discover::plugin(),
        load::plugin(),
        markdown::plugin(),
        templates::plugin(),
    ];
    if !fast && config.plugins.feeds.enabled {
        plugins.push(feeds::plugin(config.plugins.feeds.per_tag));
    }
    if !fast && config.plugins.search_index.enabled {
        plugins.push(search::plugin(config.plugins.search_index.filename.clone()));
    }
    plugins.push(collect::plugin());
    plugins.push(write::write_plugin());
    plugins.push(write::cleanup_plugin());
    plugins
}

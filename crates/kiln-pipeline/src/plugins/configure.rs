//! `config` and `validate` plugins.

use std::sync::Arc;

use crate::plugin::{Plugin, PluginError};
use crate::stage::Stage;
use crate::state::SiteSettings;

/// Warning recorded when `site.license` is unset.
pub(crate) const LICENSE_WARNING: &str =
    "no license configured; set `site.license` in kiln.toml to state how your content may be reused";

/// Snapshot the configuration into [`SiteSettings`].
pub(super) fn config_plugin() -> Plugin {
    Plugin::new("config").on(Stage::Configure, |ctx| {
        let config = Arc::clone(&ctx.state.config);
        ctx.state.site = SiteSettings {
            title: config.site.title.clone(),
            base_url: config.site.base_url.trim_end_matches('/').to_owned(),
            description: config.site.description.clone(),
            license: config
                .site
                .license
                .clone()
                .filter(|license| !license.trim().is_empty()),
            content_dir: config.build_resolved.content_dir.clone(),
            output_dir: config.build_resolved.output_dir.clone(),
        };
        tracing::debug!(
            content_dir = %ctx.state.site.content_dir.display(),
            output_dir = %ctx.state.site.output_dir.display(),
            "Configured"
        );
        Ok(())
    })
}

/// Reject unusable layouts; warn about a missing license.
pub(super) fn validate_plugin() -> Plugin {
    Plugin::new("validate").on(Stage::Validate, |ctx| {
        let site = &ctx.state.site;
        if !site.content_dir.is_dir() {
            return Err(PluginError::Invalid(format!(
                "content directory {} does not exist",
                site.content_dir.display()
            )));
        }
        if site.content_dir == site.output_dir || site.content_dir.starts_with(&site.output_dir) {
            return Err(PluginError::Invalid(format!(
                "output directory {} would overwrite content directory {}",
                site.output_dir.display(),
                site.content_dir.display()
            )));
        }

        if site.license.is_none() {
            ctx.state.license_warning = Some(LICENSE_WARNING.to_owned());
            ctx.warn(LICENSE_WARNING);
        }
        Ok(())
    })
}

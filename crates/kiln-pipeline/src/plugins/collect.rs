//! `collect` plugin: gathers everything the Write stage will produce.

use std::path::Path;

use crate::plugin::{Plugin, PluginError};
use crate::stage::Stage;
use crate::state::OutputFile;

use super::templates::render_not_found;

pub(super) fn plugin() -> Plugin {
    Plugin::new("collect").on(Stage::Collect, |ctx| {
        let state = &mut *ctx.state;
        let content_dir = state.site.content_dir.clone();

        let pages = state
            .posts
            .iter()
            .map(|post| OutputFile::bytes(post.output_path(), post.page.as_bytes()));
        state.files.extend(pages);

        for asset in &state.assets {
            let relative = asset.strip_prefix(&content_dir).unwrap_or(asset);
            state.files.push(OutputFile::copy(relative, asset.clone()));
        }

        let not_found = Path::new("404.html");
        if !state.files.iter().any(|f| f.path == not_found) {
            state
                .files
                .push(OutputFile::bytes(not_found, render_not_found(&state.site)));
        }

        state.files.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(pair) = state.files.windows(2).find(|w| w[0].path == w[1].path) {
            return Err(PluginError::Invalid(format!(
                "two outputs would be written to {}",
                pair[0].path.display()
            )));
        }

        tracing::info!(files = state.files.len(), "Output collected");
        Ok(())
    })
}

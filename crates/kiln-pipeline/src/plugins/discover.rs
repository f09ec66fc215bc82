//! `glob` plugin: content discovery by filesystem walking.

use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::plugin::{Plugin, PluginError};
use crate::stage::Stage;

use super::write::{OLD_SUFFIX, STAGING_SUFFIX, sibling};

/// Files found under the content directory.
#[derive(Debug, Default)]
struct Discovered {
    /// Files matching a content pattern.
    content: Vec<PathBuf>,
    /// Everything else, copied verbatim.
    assets: Vec<PathBuf>,
}

pub(super) fn plugin() -> Plugin {
    Plugin::new("glob").on(Stage::Glob, |ctx| {
        let patterns = ctx
            .state
            .config
            .build_resolved
            .patterns
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| PluginError::Invalid(format!("invalid pattern `{p}`: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let site = &ctx.state.site;
        let excluded = excluded_dirs(&site.output_dir);
        let mut found = Discovered::default();
        walk(&site.content_dir, &site.content_dir, &patterns, &excluded, &mut found)?;

        found.content.sort();
        found.content.dedup();
        found.assets.sort();

        tracing::info!(
            content = found.content.len(),
            assets = found.assets.len(),
            "Content discovered"
        );
        if found.content.is_empty() {
            let message = format!(
                "no content files matched {:?}",
                ctx.state.config.build_resolved.patterns
            );
            ctx.warn(message);
        }
        ctx.state.paths = found.content;
        ctx.state.assets = found.assets;
        Ok(())
    })
}

/// The output directory and its staging siblings are never content.
fn excluded_dirs(output_dir: &Path) -> Vec<PathBuf> {
    vec![
        output_dir.to_path_buf(),
        sibling(output_dir, STAGING_SUFFIX),
        sibling(output_dir, OLD_SUFFIX),
    ]
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}

fn walk(
    root: &Path,
    dir: &Path,
    patterns: &[Pattern],
    excluded: &[PathBuf],
    found: &mut Discovered,
) -> Result<(), PluginError> {
    let entries = fs::read_dir(dir).map_err(|e| PluginError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PluginError::io(dir, e))?;
        let path = entry.path();
        if is_hidden(&path) || excluded.iter().any(|ex| path.starts_with(ex)) {
            continue;
        }
        let file_type = entry.file_type().map_err(|e| PluginError::io(&path, e))?;
        if file_type.is_dir() {
            walk(root, &path, patterns, excluded, found)?;
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(&path);
        let relative = relative.to_string_lossy().replace('\\', "/");
        if patterns.iter().any(|p| p.matches(&relative)) {
            found.content.push(path);
        } else {
            found.assets.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::configure::config_plugin;
    use crate::plugins::testutil::Fixture;
    use pretty_assertions::assert_eq;

    fn discover(fx: &Fixture) -> crate::Manager {
        let mut m = fx.manager(vec![config_plugin(), plugin()]);
        m.run_to(Stage::Glob).unwrap();
        m
    }

    #[test]
    fn test_matches_patterns_recursively_and_sorted() {
        let fx = Fixture::new();
        fx.write("b.md", "b").write("a.md", "a").write("nested/deep/c.md", "c");

        let m = discover(&fx);
        let content = fx.content_dir();
        assert_eq!(
            m.paths(),
            [
                content.join("a.md"),
                content.join("b.md"),
                content.join("nested/deep/c.md"),
            ]
        );
    }

    #[test]
    fn test_non_matching_files_are_assets() {
        let fx = Fixture::new();
        fx.write("post.md", "x").write("img/photo.png", "png");

        let m = discover(&fx);
        assert_eq!(m.paths().len(), 1);
        assert_eq!(m.assets(), [fx.content_dir().join("img/photo.png")]);
    }

    #[test]
    fn test_hidden_entries_skipped() {
        let fx = Fixture::new();
        fx.write(".draft.md", "x")
            .write(".git/config.md", "x")
            .write("visible.md", "x");

        let m = discover(&fx);
        assert_eq!(m.paths(), [fx.content_dir().join("visible.md")]);
    }

    #[test]
    fn test_output_dir_inside_content_skipped() {
        let fx = Fixture::new().with_config("[build]\noutput_dir = \"content/public\"\n");
        fx.write("post.md", "x").write("public/old/index.md", "x");

        let m = discover(&fx);
        assert_eq!(m.paths(), [fx.content_dir().join("post.md")]);
    }

    #[test]
    fn test_invalid_pattern_fails() {
        let fx = Fixture::new().with_config("[build]\npatterns = [\"[\"]\n");
        let mut m = fx.manager(vec![config_plugin(), plugin()]);

        let err = m.run_to(Stage::Glob).unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));
    }

    #[test]
    fn test_no_content_warns() {
        let fx = Fixture::new();
        let m = discover(&fx);
        assert!(m.warnings()[0].contains("no content files"));
    }
}

//! `load` plugin: reads content files into [`Post`] records.
//!
//! A content file is an optional YAML frontmatter block fenced by `---`
//! lines, followed by the markdown body:
//!
//! ```text
//! ---
//! title: Hello
//! date: 2024-05-01
//! tags: [rust, notes]
//! ---
//! # Hello
//!
//! Body text.
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::html::slugify;
use crate::plugin::{Plugin, PluginError};
use crate::stage::Stage;
use crate::state::Post;

/// Frontmatter fields understood by the default plugins.
///
/// Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Frontmatter {
    title: Option<String>,
    slug: Option<String>,
    description: Option<String>,
    date: Option<String>,
    tags: Vec<String>,
    draft: bool,
}

pub(super) fn plugin() -> Plugin {
    Plugin::new("load").on(Stage::Load, |ctx| {
        let content_dir = ctx.state.site.content_dir.clone();
        let posts = ctx.try_map(&ctx.state.paths, |path| load_post(&content_dir, path))?;

        let include_drafts = ctx.state.config.build_resolved.drafts;
        let mut slugs: HashMap<String, PathBuf> = HashMap::new();
        let mut loaded = Vec::with_capacity(posts.len());
        for post in posts {
            if post.draft && !include_drafts {
                ctx.warn(format!("skipping draft {}", post.source.display()));
                continue;
            }
            if let Some(first) = slugs.insert(post.slug.clone(), post.source.clone()) {
                return Err(PluginError::content(
                    &post.source,
                    format!("slug `{}` is already used by {}", post.slug, first.display()),
                ));
            }
            loaded.push(post);
        }

        tracing::info!(posts = loaded.len(), "Content loaded");
        ctx.state.posts = loaded;
        Ok(())
    })
}

fn load_post(content_dir: &Path, path: &Path) -> Result<Post, PluginError> {
    let text = fs::read_to_string(path).map_err(|e| PluginError::io(path, e))?;
    let source = path.strip_prefix(content_dir).unwrap_or(path).to_path_buf();
    parse_post(source, &text)
}

/// Build a post from file contents. `source` is relative to the content directory.
fn parse_post(source: PathBuf, text: &str) -> Result<Post, PluginError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let (meta, body) = if text.starts_with("---") {
        let (yaml, body) = split_frontmatter(text)
            .ok_or_else(|| PluginError::content(&source, "unterminated frontmatter block"))?;
        (parse_frontmatter(&source, yaml)?, body)
    } else {
        (Frontmatter::default(), text)
    };

    let slug = match meta.slug.as_deref() {
        Some(slug) => slug_from_segments(slug.split('/')),
        None => slug_from_path(&source),
    };
    let title = meta
        .title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| first_heading(body).map(str::to_owned))
        .unwrap_or_else(|| {
            source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

    Ok(Post {
        slug,
        title,
        description: meta.description.unwrap_or_default(),
        date: meta.date,
        tags: meta.tags,
        draft: meta.draft,
        body: body.to_owned(),
        source,
        ..Post::default()
    })
}

/// Split `---` fenced frontmatter from the body. `None` when unterminated.
fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn parse_frontmatter(source: &Path, yaml: &str) -> Result<Frontmatter, PluginError> {
    let trimmed = yaml.trim();
    if trimmed.is_empty() {
        return Ok(Frontmatter::default());
    }
    serde_yaml::from_str(trimmed)
        .map_err(|e| PluginError::content(source, format!("invalid frontmatter: {e}")))
}

fn first_heading(body: &str) -> Option<&str> {
    body.lines()
        .find_map(|line| line.trim_start().strip_prefix("# "))
        .map(str::trim)
        .filter(|title| !title.is_empty())
}

/// `guides/Getting Started.md` → `guides/getting-started`; `index` files map
/// to their directory.
fn slug_from_path(source: &Path) -> String {
    let without_ext = source.with_extension("");
    let text = without_ext.to_string_lossy().replace('\\', "/");
    let mut segments: Vec<&str> = text.split('/').collect();
    if segments.last().is_some_and(|s| s.eq_ignore_ascii_case("index")) {
        segments.pop();
    }
    slug_from_segments(segments)
}

fn slug_from_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments
        .into_iter()
        .map(slugify)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

//! Build state accumulated by pipeline stages.

use std::path::PathBuf;
use std::sync::Arc;

use kiln_cache::BuildCache;
use kiln_config::Config;
use serde::{Deserialize, Serialize};

/// Settings derived from the configuration during [`Stage::Configure`](crate::Stage::Configure).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SiteSettings {
    pub title: String,
    /// Base URL without a trailing slash (empty for root-relative links).
    pub base_url: String,
    pub description: String,
    pub license: Option<String>,
    pub content_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// A parsed content record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Post {
    /// Source path relative to the content directory.
    pub source: PathBuf,
    /// URL slug without leading or trailing slashes (`""` for the site root).
    pub slug: String,
    pub title: String,
    pub description: String,
    /// Publication date as written in frontmatter (`YYYY-MM-DD` sorts correctly).
    pub date: Option<String>,
    pub tags: Vec<String>,
    pub draft: bool,
    /// Markdown body with frontmatter removed.
    pub body: String,
    /// Body rendered to HTML by the Transform stage.
    pub html: String,
    /// Full page produced by the Render stage.
    pub page: String,
}

impl Post {
    /// Root-relative URL of the rendered page.
    #[must_use]
    pub fn url(&self) -> String {
        if self.slug.is_empty() {
            "/".to_owned()
        } else {
            format!("/{}/", self.slug)
        }
    }

    /// Output path of the rendered page, relative to the output directory.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        if self.slug.is_empty() {
            PathBuf::from("index.html")
        } else {
            PathBuf::from(&self.slug).join("index.html")
        }
    }
}

/// A computed list of posts, rendered as an index page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Feed {
    /// Feed identifier (`home`, `tags/<tag>`).
    pub name: String,
    pub title: String,
    /// Output path of the feed page, relative to the output directory.
    pub path: PathBuf,
    /// Indices into [`BuildState::posts`], newest first.
    pub posts: Vec<usize>,
}

/// One entry of the JSON search index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
}

/// Contents of a collected output file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputContents {
    /// Generated bytes.
    Bytes(Vec<u8>),
    /// Copy of a source file (absolute path).
    Copy(PathBuf),
}

/// A file the Write stage will produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputFile {
    /// Path relative to the output directory.
    pub path: PathBuf,
    pub contents: OutputContents,
}

impl OutputFile {
    pub fn bytes(path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: OutputContents::Bytes(bytes.into()),
        }
    }

    pub fn copy(path: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contents: OutputContents::Copy(source.into()),
        }
    }
}

/// State owned by one [`Manager`](crate::Manager) and mutated only by stages.
pub struct BuildState {
    pub config: Arc<Config>,
    pub cache: Arc<BuildCache>,
    pub site: SiteSettings,
    /// Content files matched by the configured patterns (absolute, sorted).
    pub paths: Vec<PathBuf>,
    /// Other files under the content directory, copied verbatim.
    pub assets: Vec<PathBuf>,
    pub posts: Vec<Post>,
    pub feeds: Vec<Feed>,
    pub files: Vec<OutputFile>,
    /// Non-fatal problems, in the order they were found.
    pub warnings: Vec<String>,
    /// Set when no content license is configured.
    pub license_warning: Option<String>,
    /// Number of files the Write stage produced.
    pub written: usize,
}

impl BuildState {
    pub(crate) fn new(config: Arc<Config>, cache: Arc<BuildCache>) -> Self {
        Self {
            config,
            cache,
            site: SiteSettings::default(),
            paths: Vec::new(),
            assets: Vec::new(),
            posts: Vec::new(),
            feeds: Vec::new(),
            files: Vec::new(),
            warnings: Vec::new(),
            license_warning: None,
            written: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_post_paths() {
        let post = Post::default();
        assert_eq!(post.url(), "/");
        assert_eq!(post.output_path(), PathBuf::from("index.html"));
    }

    #[test]
    fn test_nested_post_paths() {
        let post = Post {
            slug: "guides/setup".to_owned(),
            ..Post::default()
        };
        assert_eq!(post.url(), "/guides/setup/");
        assert_eq!(
            post.output_path(),
            PathBuf::from("guides/setup/index.html")
        );
    }
}

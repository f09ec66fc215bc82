//! Per-plugin configuration.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Configuration for the built-in plugins.
///
/// Third-party data that has no typed section lands in `extra`, keyed by
/// plugin name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Index and tag feed pages.
    pub feeds: FeedsConfig,
    /// JSON search index consumed by `/_search`.
    pub search_index: SearchIndexConfig,
    /// Untyped settings for plugins without a dedicated section.
    pub extra: BTreeMap<String, toml::Table>,
}

/// Feed plugin configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub enabled: bool,
    /// Emit one feed page per tag.
    pub per_tag: bool,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_tag: true,
        }
    }
}

/// Search index plugin configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchIndexConfig {
    pub enabled: bool,
    /// File name of the index, relative to the output directory.
    pub filename: String,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filename: "search-index.json".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_tables_preserved() {
        let toml = r#"
[feeds]
per_tag = false

[extra.webmentions]
endpoint = "https://example.com/wm"
"#;
        let config: PluginsConfig = toml::from_str(toml).unwrap();
        assert!(config.feeds.enabled);
        assert!(!config.feeds.per_tag);
        assert_eq!(config.search_index.filename, "search-index.json");
        assert_eq!(
            config.extra["webmentions"]["endpoint"].as_str(),
            Some("https://example.com/wm")
        );
    }
}

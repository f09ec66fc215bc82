//! Configuration management for Kiln.
//!
//! Parses `kiln.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `site.base_url`
//! - `server.host`

mod expand;
mod plugins;

use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

pub use plugins::{FeedsConfig, PluginsConfig, SearchIndexConfig};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Clone, Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override content directory.
    pub content_dir: Option<PathBuf>,
    /// Override output directory.
    pub output_dir: Option<PathBuf>,
    /// Override watch flag for `serve`.
    pub watch: Option<bool>,
    /// Skip expensive plugins.
    pub fast: Option<bool>,
}

/// Configuration filename to search for.
pub const CONFIG_FILENAME: &str = "kiln.toml";

/// Upper bound for `build.concurrency`.
const MAX_CONCURRENCY: usize = 256;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Site metadata.
    pub site: SiteConfig,
    /// Build configuration (paths are relative strings from TOML).
    build: BuildConfigRaw,
    /// Cache configuration (paths are relative strings from TOML).
    cache: CacheConfigRaw,
    /// Development server configuration.
    pub server: ServerConfig,
    /// Per-plugin configuration.
    pub plugins: PluginsConfig,

    /// Resolved build configuration (set after loading).
    #[serde(skip)]
    pub build_resolved: BuildConfig,
    /// Resolved cache configuration (set after loading).
    #[serde(skip)]
    pub cache_resolved: CacheConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
    /// Directory relative paths were resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Site metadata.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Site title, used in page titles and feeds.
    pub title: String,
    /// Absolute base URL of the published site.
    pub base_url: String,
    /// Short site description.
    pub description: String,
    /// Content license. A missing license produces a build warning.
    pub license: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Kiln Site".to_owned(),
            base_url: String::new(),
            description: String::new(),
            license: None,
        }
    }
}

/// Raw build configuration as parsed from TOML (paths as strings).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct BuildConfigRaw {
    content_dir: Option<String>,
    output_dir: Option<String>,
    patterns: Option<Vec<String>>,
    concurrency: Option<usize>,
    drafts: Option<bool>,
}

/// Resolved build configuration with absolute paths.
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    /// Directory holding content files.
    pub content_dir: PathBuf,
    /// Directory the site artifact is written to.
    pub output_dir: PathBuf,
    /// Glob patterns (relative to `content_dir`) selecting content files.
    pub patterns: Vec<String>,
    /// Parallel per-record workers within a stage (`0` or `1` = serial).
    pub concurrency: usize,
    /// Whether draft posts are published.
    pub drafts: bool,
    /// Skip expensive plugins (feeds, search index).
    pub fast: bool,
}

/// Raw cache configuration as parsed from TOML (paths as strings).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct CacheConfigRaw {
    dir: Option<String>,
    external_dirs: Option<Vec<String>>,
}

/// Resolved cache configuration with absolute paths.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Root of the persistent cache tier.
    pub dir: PathBuf,
    /// Directories holding expensive externally-fetched data.
    ///
    /// Only removed by a full clean. Always includes `dir`.
    pub external_dirs: Vec<PathBuf>,
}

/// Development server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Rebuild automatically on file changes.
    pub watch: bool,
    /// Quiet period before a burst of changes triggers a rebuild.
    pub debounce_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
            watch: true,
            debounce_ms: 300,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`KILN_HOST`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `kiln.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(content_dir) = &settings.content_dir {
            self.build_resolved.content_dir.clone_from(content_dir);
        }
        if let Some(output_dir) = &settings.output_dir {
            self.build_resolved.output_dir.clone_from(output_dir);
        }
        if let Some(watch) = settings.watch {
            self.server.watch = watch;
        }
        if let Some(fast) = settings.fast {
            self.build_resolved.fast = fast;
        }
    }

    /// Directory the configuration was loaded from, or the current directory.
    #[must_use]
    pub fn root_dir(&self) -> PathBuf {
        self.config_path
            .as_ref()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default()
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    #[must_use]
    pub fn default_with_base(base: &Path) -> Self {
        let mut config = Self {
            site: SiteConfig::default(),
            build: BuildConfigRaw::default(),
            cache: CacheConfigRaw::default(),
            server: ServerConfig::default(),
            plugins: PluginsConfig::default(),
            build_resolved: BuildConfig::default(),
            cache_resolved: CacheConfig::default(),
            config_path: None,
            base_dir: PathBuf::new(),
        };
        config.resolve_paths(base);
        config
    }

    /// Parse configuration from a TOML string, resolving paths against `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing, expansion or validation fails.
    pub fn from_toml_str(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_env_vars()?;
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config_dir = path.parent().unwrap_or(Path::new("."));
        let mut config = Self::from_toml_str(&content, config_dir)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Checks that all required fields are properly set and contain valid values.
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_site()?;
        self.validate_build()?;
        self.validate_cache()?;
        self.validate_server()?;
        Ok(())
    }

    fn validate_site(&self) -> Result<(), ConfigError> {
        if !self.site.base_url.is_empty() {
            require_http_url(&self.site.base_url, "site.base_url")?;
        }
        Ok(())
    }

    fn validate_build(&self) -> Result<(), ConfigError> {
        let build = &self.build_resolved;
        if build.patterns.is_empty() {
            return Err(ConfigError::Validation(
                "build.patterns cannot be empty".to_owned(),
            ));
        }
        if build.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::Validation(format!(
                "build.concurrency cannot exceed {MAX_CONCURRENCY}"
            )));
        }
        if build.content_dir == build.output_dir {
            return Err(ConfigError::Validation(
                "build.output_dir must differ from build.content_dir".to_owned(),
            ));
        }
        Ok(())
    }

    /// The cache directory is wiped on version changes, so it must not hold
    /// anything else the project owns.
    fn validate_cache(&self) -> Result<(), ConfigError> {
        let cache_dir = normalize(&self.cache_resolved.dir);
        let protected = [
            (&self.base_dir, "the project directory"),
            (&self.build_resolved.content_dir, "build.content_dir"),
            (&self.build_resolved.output_dir, "build.output_dir"),
        ];
        for (dir, name) in protected {
            if normalize(dir).starts_with(&cache_dir) {
                return Err(ConfigError::Validation(format!(
                    "cache.dir cannot be or contain {name}"
                )));
            }
        }
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 is technically valid (OS assigns a random port), but it's
        // unlikely to be intentional in a config file
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.site.base_url = expand::expand_env(&self.site.base_url, "site.base_url")?;
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        self.build_resolved = BuildConfig {
            content_dir: resolve(self.build.content_dir.as_deref(), "content"),
            output_dir: resolve(self.build.output_dir.as_deref(), "public"),
            patterns: self
                .build
                .patterns
                .clone()
                .unwrap_or_else(|| vec!["**/*.md".to_owned()]),
            concurrency: self.build.concurrency.unwrap_or(0),
            drafts: self.build.drafts.unwrap_or(false),
            fast: false,
        };

        let cache_dir = resolve(self.cache.dir.as_deref(), ".kiln/cache");
        let mut external_dirs = vec![cache_dir.clone()];
        for dir in self.cache.external_dirs.iter().flatten() {
            let dir = config_dir.join(dir);
            if !external_dirs.contains(&dir) {
                external_dirs.push(dir);
            }
        }
        self.cache_resolved = CacheConfig {
            dir: cache_dir,
            external_dirs,
        };
        self.base_dir = config_dir.to_path_buf();
    }
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

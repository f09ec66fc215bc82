//! Temporary site fixtures for plugin tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_cache::BuildCache;
use kiln_config::Config;
use tempfile::TempDir;

use crate::{Manager, Plugin};

/// A temporary project directory with a `content/` folder.
pub(crate) struct Fixture {
    tmp: TempDir,
    config: Arc<Config>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("content")).unwrap();
        let config = Config::from_toml_str("", tmp.path()).unwrap();
        Self {
            tmp,
            config: Arc::new(config),
        }
    }

    /// Replace the configuration with `toml`, resolved against the fixture root.
    pub(crate) fn with_config(mut self, toml: &str) -> Self {
        self.config = Arc::new(Config::from_toml_str(toml, self.tmp.path()).unwrap());
        self
    }

    pub(crate) fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub(crate) fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    pub(crate) fn content_dir(&self) -> PathBuf {
        self.config.build_resolved.content_dir.clone()
    }

    pub(crate) fn output_dir(&self) -> PathBuf {
        self.config.build_resolved.output_dir.clone()
    }

    /// Write a file relative to the content directory.
    pub(crate) fn write(&self, rel: &str, contents: &str) -> &Self {
        let path = self.content_dir().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
        self
    }

    pub(crate) fn manager(&self, plugins: Vec<Plugin>) -> Manager {
        let mut m = Manager::new(self.config(), Arc::new(BuildCache::in_memory()));
        m.register_plugins(plugins).unwrap();
        m
    }

    /// Manager with the full default plugin set.
    pub(crate) fn default_manager(&self) -> Manager {
        crate::default_manager(self.config(), Arc::new(BuildCache::in_memory())).unwrap()
    }
}

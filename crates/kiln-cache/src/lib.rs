//! Build cache for Kiln.
//!
//! A [`BuildCache`] has two tiers:
//!
//! - an in-memory map that lives as long as the pipeline manager owning it,
//! - an optional file-backed external tier for expensive data (remote
//!   fetches, image metadata) that survives across builds.
//!
//! Neither tier evicts. Entries leave only through [`BuildCache::clean`]
//! (or a cache version bump, which wipes the external tier on open).
//!
//! # Example
//!
//! ```
//! use kiln_cache::BuildCache;
//! use serde_json::json;
//!
//! let cache = BuildCache::in_memory();
//! cache.set("markdown:abc", json!("<p>hi</p>"));
//! assert_eq!(cache.get("markdown:abc"), Some(json!("<p>hi</p>")));
//!
//! let scoped = cache.scoped("feeds");
//! scoped.set("home", json!(3));
//! assert_eq!(cache.get("feeds:home"), Some(json!(3)));
//! ```

mod file;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use file::FileTier;

/// Cache error.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// I/O error while persisting or purging.
    #[error("cache I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Value could not be converted to or from JSON.
    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// How much [`BuildCache::clean`] removes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanLevel {
    /// In-memory entries and generated artifacts. Cheap, always safe.
    Artifacts,
    /// Everything in [`CleanLevel::Artifacts`] plus every external cache
    /// directory. Forces remote data to be fetched again.
    All,
}

/// What a [`BuildCache::clean`] call removed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Number of in-memory entries dropped.
    pub memory_entries: usize,
    /// Directories that existed and were removed.
    pub removed_dirs: Vec<PathBuf>,
}

/// Process-scoped key/value store with an optional persistent tier.
#[derive(Default)]
pub struct BuildCache {
    memory: RwLock<HashMap<String, Value>>,
    external: Option<FileTier>,
}

impl BuildCache {
    /// Create a cache with no external tier.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Create a cache whose external tier lives in `dir`.
    ///
    /// `version` guards the tier: opening it with a different version wipes it.
    #[must_use]
    pub fn with_external(dir: PathBuf, version: &str) -> Self {
        Self {
            memory: RwLock::default(),
            external: Some(FileTier::new(dir, version)),
        }
    }

    /// Directory backing the external tier, if any.
    pub fn external_dir(&self) -> Option<&Path> {
        self.external.as_ref().map(FileTier::root)
    }

    /// Look up `key`, falling back to the external tier on a memory miss.
    ///
    /// External hits are promoted into memory.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.memory.read().unwrap().get(key) {
            return Some(value.clone());
        }
        let value = self.external.as_ref()?.get(key)?;
        self.memory
            .write()
            .unwrap()
            .insert(key.to_owned(), value.clone());
        Some(value)
    }

    /// Store `value` in memory only.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.memory.write().unwrap().insert(key.into(), value);
    }

    /// Store `value` in memory and persist it in the external tier.
    ///
    /// Without an external tier this behaves like [`BuildCache::set`].
    pub fn set_external(&self, key: impl Into<String>, value: Value) -> Result<(), CacheError> {
        let key = key.into();
        if let Some(tier) = &self.external {
            tier.set(&key, &value).map_err(|source| CacheError::Io {
                path: tier.root().to_path_buf(),
                source,
            })?;
        }
        self.set(key, value);
        Ok(())
    }

    /// Typed lookup. Values that fail to deserialize count as misses.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        serde_json::from_value(self.get(key)?).ok()
    }

    /// Typed store into memory.
    pub fn set_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<(), CacheError> {
        self.set(key, serde_json::to_value(value)?);
        Ok(())
    }

    /// Whether `key` is present in memory.
    pub fn contains(&self, key: &str) -> bool {
        self.memory.read().unwrap().contains_key(key)
    }

    /// Number of in-memory entries.
    pub fn len(&self) -> usize {
        self.memory.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View of the cache with every key prefixed by `namespace:`.
    pub fn scoped<'a>(&'a self, namespace: &'a str) -> ScopedCache<'a> {
        ScopedCache {
            cache: self,
            namespace,
        }
    }

    /// Purge cached state.
    ///
    /// `artifact_dirs` (typically the output directory) are removed at every
    /// level; `external_dirs` only at [`CleanLevel::All`]. Missing directories
    /// are skipped.
    pub fn clean(
        &self,
        level: CleanLevel,
        artifact_dirs: &[PathBuf],
        external_dirs: &[PathBuf],
    ) -> Result<CleanReport, CacheError> {
        let memory_entries = {
            let mut memory = self.memory.write().unwrap();
            let count = memory.len();
            memory.clear();
            count
        };

        let mut removed_dirs = Vec::new();
        let external: &[PathBuf] = match level {
            CleanLevel::Artifacts => &[],
            CleanLevel::All => external_dirs,
        };
        for dir in artifact_dirs.iter().chain(external) {
            if remove_dir(dir)? {
                removed_dirs.push(dir.clone());
            }
        }

        tracing::info!(
            ?level,
            memory_entries,
            removed = removed_dirs.len(),
            "Cache cleaned"
        );
        Ok(CleanReport {
            memory_entries,
            removed_dirs,
        })
    }
}

/// Remove a directory tree, returning whether it existed.
fn remove_dir(dir: &Path) -> Result<bool, CacheError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(CacheError::Io {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Namespaced view returned by [`BuildCache::scoped`].
///
/// Plugins use their own name as namespace so keys cannot collide.
#[derive(Clone, Copy)]
pub struct ScopedCache<'a> {
    cache: &'a BuildCache,
    namespace: &'a str,
}

impl ScopedCache<'_> {
    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.cache.get(&self.key(key))
    }

    pub fn set(&self, key: &str, value: Value) {
        self.cache.set(self.key(key), value);
    }

    pub fn set_external(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.cache.set_external(self.key(key), value)
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.cache.get_as(&self.key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_get_missing_key() {
        let cache = BuildCache::in_memory();
        assert_eq!(cache.get("nope"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_overwrites() {
        let cache = BuildCache::in_memory();
        cache.set("k", json!(1));
        cache.set("k", json!(2));
        assert_eq!(cache.get("k"), Some(json!(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_typed_access() {
        let cache = BuildCache::in_memory();
        cache.set_as("tags", &vec!["rust", "web"]).unwrap();

        let tags: Vec<String> = cache.get_as("tags").unwrap();
        assert_eq!(tags, vec!["rust".to_owned(), "web".to_owned()]);
        assert_eq!(cache.get_as::<u32>("tags"), None);
    }

    #[test]
    fn test_scoped_keys_do_not_collide() {
        let cache = BuildCache::in_memory();
        cache.scoped("feeds").set("home", json!("a"));
        cache.scoped("search").set("home", json!("b"));

        assert_eq!(cache.scoped("feeds").get("home"), Some(json!("a")));
        assert_eq!(cache.scoped("search").get("home"), Some(json!("b")));
        assert_eq!(cache.get("home"), None);
    }

    #[test]
    fn test_external_survives_new_instance() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ext");

        let first = BuildCache::with_external(dir.clone(), "v1");
        first.set_external("remote:post", json!({"t": 1})).unwrap();
        first.set("memory-only", json!(true));

        let second = BuildCache::with_external(dir, "v1");
        assert_eq!(second.get("remote:post"), Some(json!({"t": 1})));
        assert_eq!(second.get("memory-only"), None);
    }

    #[test]
    fn test_external_hit_promoted_to_memory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ext");
        BuildCache::with_external(dir.clone(), "v1")
            .set_external("k", json!(7))
            .unwrap();

        let cache = BuildCache::with_external(dir, "v1");
        assert!(!cache.contains("k"));
        cache.get("k");
        assert!(cache.contains("k"));
    }

    #[test]
    fn test_set_external_without_tier_is_memory_only() {
        let cache = BuildCache::in_memory();
        cache.set_external("k", json!(1)).unwrap();
        assert_eq!(cache.get("k"), Some(json!(1)));
        assert!(cache.external_dir().is_none());
    }

    #[test]
    fn test_clean_artifacts_keeps_external() {
        let tmp = TempDir::new().unwrap();
        let ext = tmp.path().join("ext");
        let out = tmp.path().join("public");
        fs::create_dir_all(out.join("posts")).unwrap();

        let cache = BuildCache::with_external(ext.clone(), "v1");
        cache.set_external("remote", json!(1)).unwrap();
        cache.set("local", json!(2));

        let report = cache
            .clean(CleanLevel::Artifacts, &[out.clone()], &[ext.clone()])
            .unwrap();

        assert_eq!(report.memory_entries, 2);
        assert_eq!(report.removed_dirs, vec![out.clone()]);
        assert!(!out.exists());
        assert!(ext.exists());
        assert_eq!(cache.get("local"), None);
        // Still served from disk.
        assert_eq!(cache.get("remote"), Some(json!(1)));
    }

    #[test]
    fn test_clean_all_removes_external() {
        let tmp = TempDir::new().unwrap();
        let ext = tmp.path().join("ext");
        let images = tmp.path().join("images");
        fs::create_dir_all(&images).unwrap();

        let cache = BuildCache::with_external(ext.clone(), "v1");
        cache.set_external("remote", json!(1)).unwrap();

        let missing = tmp.path().join("never-created");
        let report = cache
            .clean(CleanLevel::All, &[missing], &[ext.clone(), images.clone()])
            .unwrap();

        assert_eq!(report.removed_dirs, vec![ext.clone(), images.clone()]);
        assert!(!ext.exists());
        assert!(!images.exists());
        assert_eq!(cache.get("remote"), None);
    }
}

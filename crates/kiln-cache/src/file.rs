//! File-backed external cache tier.
//!
//! [`FileTier`] stores one JSON document per key under its root directory.
//! Keys are hex-encoded into file names so namespaced keys such as
//! `markdown:abc` or `remote/https://…` never escape the root.
//!
//! ```text
//! {root}/
//! +-- VERSION            # contains the cache version string
//! +-- 6d61726b...        # one entry per key
//! ```
//!
//! On construction, [`FileTier`] validates the `VERSION` file in the root.
//! A mismatching version wipes the directory and recreates it. A missing or
//! empty directory is initialized. A non-empty directory without a `VERSION`
//! file is not ours: it is left untouched and the tier stays disabled.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

/// Persistent key/value tier rooted at a directory on disk.
pub(crate) struct FileTier {
    root: PathBuf,
    version: String,
    enabled: bool,
}

impl FileTier {
    /// Open the tier at `root`, validating the cache version.
    ///
    /// Errors during validation are logged but never fatal.
    pub(crate) fn new(root: PathBuf, version: &str) -> Self {
        let enabled = validate_version(&root, version);
        Self {
            root,
            version: version.to_owned(),
            enabled,
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(hex::encode(key.as_bytes()))
    }

    /// Read an entry. Missing or unreadable entries are misses.
    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        if !self.enabled {
            return None;
        }
        let bytes = fs::read(self.entry_path(key)).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key, error = %e, "discarding corrupt cache entry");
                None
            }
        }
    }

    /// Persist an entry, replacing any previous value.
    ///
    /// A disabled tier accepts the write and keeps nothing.
    pub(crate) fn set(&self, key: &str, value: &Value) -> std::io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let version_file = self.root.join("VERSION");
        if !version_file.exists() {
            fs::create_dir_all(&self.root)?;
            fs::write(version_file, &self.version)?;
        }
        let bytes = serde_json::to_vec(value)?;
        // Write-then-rename so a crash never leaves a half-written entry.
        let path = self.entry_path(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(tmp, path)
    }
}

/// Validate the cache version, wiping the directory on mismatch.
///
/// Returns whether the tier may use `root`.
fn validate_version(root: &Path, version: &str) -> bool {
    let version_file = root.join("VERSION");

    match fs::read_to_string(&version_file) {
        Ok(stored) if stored == version => {
            tracing::debug!("cache version matches: {version}");
            return true;
        }
        Ok(stored) => {
            tracing::info!(
                "cache version mismatch (stored={stored}, current={version}), wiping cache"
            );
            if let Err(e) = fs::remove_dir_all(root) {
                tracing::warn!("failed to remove cache directory: {e}");
            }
        }
        Err(_) if is_empty_or_missing(root) => {
            tracing::info!("no cache VERSION file found, initializing cache");
        }
        Err(_) => {
            tracing::warn!(
                path = %root.display(),
                "cache directory is not empty and has no VERSION file, external cache disabled"
            );
            return false;
        }
    }

    if let Err(e) = fs::create_dir_all(root) {
        tracing::warn!("failed to create cache directory: {e}");
        return false;
    }
    if let Err(e) = fs::write(&version_file, version) {
        tracing::warn!("failed to write cache VERSION file: {e}");
        return false;
    }
    true
}

fn is_empty_or_missing(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(e) => e.kind() == std::io::ErrorKind::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_set_and_get() {
        let tmp = TempDir::new().unwrap();
        let tier = FileTier::new(tmp.path().join("cache"), "v1");

        tier.set("remote:feed", &json!({"items": [1, 2]})).unwrap();
        assert_eq!(tier.get("remote:feed"), Some(json!({"items": [1, 2]})));
    }

    #[test]
    fn test_missing_key_is_miss() {
        let tmp = TempDir::new().unwrap();
        let tier = FileTier::new(tmp.path().join("cache"), "v1");
        assert_eq!(tier.get("nope"), None);
    }

    #[test]
    fn test_keys_with_separators_stay_inside_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let tier = FileTier::new(root.clone(), "v1");

        tier.set("../../escape", &json!(1)).unwrap();

        assert_eq!(tier.get("../../escape"), Some(json!(1)));
        assert!(!tmp.path().join("escape").exists());
        let entries = fs::read_dir(&root).unwrap().count();
        assert_eq!(entries, 2, "VERSION plus one entry");
    }

    #[test]
    fn test_corrupt_entry_is_miss() {
        let tmp = TempDir::new().unwrap();
        let tier = FileTier::new(tmp.path().join("cache"), "v1");
        fs::write(tier.entry_path("bad"), b"{not json").unwrap();
        assert_eq!(tier.get("bad"), None);
    }

    #[test]
    fn test_version_match_keeps_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");

        FileTier::new(root.clone(), "v1")
            .set("key", &json!("kept"))
            .unwrap();

        let reopened = FileTier::new(root, "v1");
        assert_eq!(reopened.get("key"), Some(json!("kept")));
    }

    #[test]
    fn test_version_mismatch_wipes_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");

        FileTier::new(root.clone(), "v1")
            .set("key", &json!("stale"))
            .unwrap();

        let reopened = FileTier::new(root.clone(), "v2");
        assert_eq!(reopened.get("key"), None);
        assert_eq!(fs::read_to_string(root.join("VERSION")).unwrap(), "v2");
    }

    #[test]
    fn test_set_recreates_removed_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let tier = FileTier::new(root.clone(), "v1");

        fs::remove_dir_all(&root).unwrap();
        tier.set("key", &json!(true)).unwrap();

        assert_eq!(tier.get("key"), Some(json!(true)));
        let reopened = FileTier::new(root, "v1");
        assert_eq!(reopened.get("key"), Some(json!(true)));
    }

    #[test]
    fn test_foreign_directory_left_untouched() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("content");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("post.md"), "# Hello").unwrap();

        let tier = FileTier::new(root.clone(), "v1");
        tier.set("key", &json!(1)).unwrap();

        assert_eq!(fs::read_to_string(root.join("post.md")).unwrap(), "# Hello");
        assert!(!root.join("VERSION").exists());
        assert_eq!(tier.get("key"), None);
        assert_eq!(fs::read_dir(&root).unwrap().count(), 1);
    }

    #[test]
    fn test_empty_directory_initialized() {
        let tmp = TempDir::new().unwrap();

        let tier = FileTier::new(tmp.path().to_path_buf(), "v1");
        tier.set("key", &json!(1)).unwrap();

        assert_eq!(fs::read_to_string(tmp.path().join("VERSION")).unwrap(), "v1");
        assert_eq!(tier.get("key"), Some(json!(1)));
    }
}

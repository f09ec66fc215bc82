//! CLI command implementations.

pub(crate) mod build;
pub(crate) mod serve;

pub(crate) use build::BuildArgs;
pub(crate) use serve::ServeArgs;

use std::path::Path;

use crate::error::CliError;

/// Keep an initialized cache directory out of version control.
///
/// Runs after the cache is opened, since opening may wipe the directory.
/// Directories without a cache `VERSION` file are left alone.
pub(crate) fn ignore_cache_dir(cache_dir: &Path) -> Result<(), CliError> {
    if !cache_dir.join("VERSION").exists() {
        return Ok(());
    }

    let gitignore_path = cache_dir.join(".gitignore");
    if !gitignore_path.exists() {
        std::fs::write(&gitignore_path, "# Automatically created by kiln\n*\n")?;
    }

    Ok(())
}

//! `write` and `cleanup` plugins.
//!
//! Output is written into a staging directory next to the output directory
//! and swapped into place with two renames, so a failed build never leaves a
//! half-written site behind:
//!
//! ```text
//! public.kiln-staging/  --write-->  complete tree
//! public/               --rename->  public.kiln-old/
//! public.kiln-staging/  --rename->  public/
//! public.kiln-old/      --remove
//! ```

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::plugin::{Plugin, PluginError};
use crate::stage::Stage;
use crate::state::{OutputContents, OutputFile};

/// Suffix of the directory a build is written into before the swap.
pub const STAGING_SUFFIX: &str = ".kiln-staging";
/// Suffix the previous output is renamed to while the swap happens.
pub const OLD_SUFFIX: &str = ".kiln-old";

/// `public` + `.kiln-staging` -> `public.kiln-staging`, in the same parent.
pub fn sibling(output_dir: &Path, suffix: &str) -> PathBuf {
    let mut name = output_dir.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    output_dir.with_file_name(name)
}

pub(super) fn write_plugin() -> Plugin {
    Plugin::new("write").on(Stage::Write, |ctx| {
        let output_dir = ctx.state.site.output_dir.clone();
        let staging = sibling(&output_dir, STAGING_SUFFIX);

        remove_dir_if_exists(&staging)?;
        fs::create_dir_all(&staging).map_err(|e| PluginError::io(&staging, e))?;

        let result = ctx
            .try_map(&ctx.state.files, |file| write_file(&staging, file))
            .and_then(|_| swap_into_place(&staging, &output_dir));
        if let Err(err) = result {
            if let Err(e) = fs::remove_dir_all(&staging) {
                tracing::warn!(path = %staging.display(), error = %e, "Failed to remove staging directory");
            }
            return Err(err);
        }

        ctx.state.written = ctx.state.files.len();
        tracing::info!(
            files = ctx.state.written,
            output = %output_dir.display(),
            "Output written"
        );
        Ok(())
    })
}

pub(super) fn cleanup_plugin() -> Plugin {
    Plugin::new("cleanup").on(Stage::Cleanup, |ctx| {
        let output_dir = &ctx.state.site.output_dir;
        for suffix in [STAGING_SUFFIX, OLD_SUFFIX] {
            remove_dir_if_exists(&sibling(output_dir, suffix))?;
        }

        tracing::info!(
            posts = ctx.state.posts.len(),
            files = ctx.state.written,
            warnings = ctx.state.warnings.len(),
            "Build complete"
        );
        Ok(())
    })
}

fn write_file(root: &Path, file: &OutputFile) -> Result<(), PluginError> {
    let is_relative = file
        .path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !is_relative || file.path.as_os_str().is_empty() {
        return Err(PluginError::Invalid(format!(
            "output path {} escapes the output directory",
            file.path.display()
        )));
    }

    let target = root.join(&file.path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| PluginError::io(parent, e))?;
    }
    match &file.contents {
        OutputContents::Bytes(bytes) => {
            fs::write(&target, bytes).map_err(|e| PluginError::io(&target, e))
        }
        OutputContents::Copy(source) => fs::copy(source, &target)
            .map(|_| ())
            .map_err(|e| PluginError::io(source, e)),
    }
}

/// Replace `output_dir` with `staging`. On failure the previous output is restored.
fn swap_into_place(staging: &Path, output_dir: &Path) -> Result<(), PluginError> {
    if !output_dir.exists() {
        return fs::rename(staging, output_dir).map_err(|e| PluginError::io(output_dir, e));
    }

    let old = sibling(output_dir, OLD_SUFFIX);
    remove_dir_if_exists(&old)?;
    fs::rename(output_dir, &old).map_err(|e| PluginError::io(output_dir, e))?;
    if let Err(e) = fs::rename(staging, output_dir) {
        if let Err(restore) = fs::rename(&old, output_dir) {
            tracing::error!(path = %old.display(), error = %restore, "Failed to restore previous output");
        }
        return Err(PluginError::io(output_dir, e));
    }
    remove_dir_if_exists(&old)
}

fn remove_dir_if_exists(path: &Path) -> Result<(), PluginError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PluginError::io(path, e)),
    }
}

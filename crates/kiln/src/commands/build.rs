//! `kiln build` command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use kiln_cache::CleanLevel;
use kiln_config::{CliSettings, Config};
use kiln_pipeline::Stage;

use super::ignore_cache_dir;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the build command.
#[derive(Args)]
pub(crate) struct BuildArgs {
    /// Path to configuration file (default: auto-discover kiln.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Purge the in-memory cache and the output directory before building.
    #[arg(long)]
    clean: bool,

    /// Like --clean, and also purge external cache directories.
    #[arg(long, conflicts_with = "clean")]
    clean_all: bool,

    /// Run up to the collect stage and list what would be written.
    #[arg(long, conflicts_with_all = ["clean", "clean_all"])]
    dry_run: bool,

    /// Skip expensive plugins (feeds, search index).
    #[arg(long)]
    fast: bool,

    /// Enable verbose output (stage timings and plugin logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl BuildArgs {
    /// Execute the build command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or any stage fails.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            fast: self.fast.then_some(true),
            ..CliSettings::default()
        };
        let config = Arc::new(Config::load(self.config.as_deref(), Some(&cli_settings))?);

        let cache = Arc::new(kiln_pipeline::open_cache(&config));
        if let Some(level) = self.clean_level() {
            let report = cache.clean(
                level,
                std::slice::from_ref(&config.build_resolved.output_dir),
                &config.cache_resolved.external_dirs,
            )?;
            for dir in &report.removed_dirs {
                output.info(&format!("Removed {}", dir.display()));
            }
        }
        ignore_cache_dir(&config.cache_resolved.dir)?;

        let mut manager = kiln_pipeline::default_manager(Arc::clone(&config), cache)?;
        let start = Instant::now();

        if self.dry_run {
            manager.run_to(Stage::Collect)?;
            output.warnings(manager.warnings());
            output.highlight(&format!(
                "Dry run: {} files would be written to {}",
                manager.files().len(),
                config.build_resolved.output_dir.display()
            ));
            for file in manager.files() {
                output.item(&file.path.display().to_string());
            }
            return Ok(());
        }

        manager.run()?;
        output.warnings(manager.warnings());
        output.success(&format!(
            "Built {} posts into {} files in {:.2?}",
            manager.posts().len(),
            manager.written(),
            start.elapsed()
        ));
        output.info(&format!(
            "Output: {}",
            config.build_resolved.output_dir.display()
        ));
        Ok(())
    }

    /// Resolve the clean level from --clean/--clean-all.
    fn clean_level(&self) -> Option<CleanLevel> {
        if self.clean_all {
            Some(CleanLevel::All)
        } else if self.clean {
            Some(CleanLevel::Artifacts)
        } else {
            None
        }
    }
}

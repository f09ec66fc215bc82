//! `kiln serve` command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use kiln_config::{CliSettings, Config};
use kiln_server::live_reload::{
    BuildStatus, Cancellation, PipelineRebuilder, RebuildOutcome, Rebuilder,
};
use kiln_server::{SHUTDOWN_GRACE, ServerConfig, run_server};

use super::ignore_cache_dir;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover kiln.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Rebuild on file changes (default: enabled).
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    watch: Option<bool>,

    /// Disable rebuilding on file changes.
    #[arg(long, conflicts_with = "watch")]
    no_watch: bool,

    /// Skip expensive plugins (feeds, search index).
    #[arg(long)]
    fast: bool,

    /// Enable verbose output (stage timings and plugin logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    /// A failing initial build is reported and served as an error status.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let watch = self.watch_override();
        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            watch,
            fast: self.fast.then_some(true),
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        // Rebuilds reload the config from the same file even if the working
        // directory changes.
        let rebuilder = Arc::new(PipelineRebuilder::new(
            config.config_path.clone(),
            cli_settings,
        ));

        output.info("Building site...");
        let initial = match rebuilder.rebuild(&Cancellation::never()) {
            RebuildOutcome::Success { warning } => {
                output.success("Initial build complete");
                if let Some(warning) = &warning {
                    output.warning(&format!("Warning: {warning}"));
                }
                BuildStatus::success(warning)
            }
            RebuildOutcome::Failed { message, warning } => {
                output.error(&format!("Initial build failed: {message}"));
                BuildStatus::error(message, warning)
            }
            RebuildOutcome::Cancelled => BuildStatus::building(),
        };
        ignore_cache_dir(&config.cache_resolved.dir)?;

        output.highlight(&format!(
            "Serving {} at http://{}:{}",
            config.build_resolved.output_dir.display(),
            config.server.host,
            config.server.port
        ));
        if config.server.watch {
            output.info(&format!(
                "Watching {} for changes",
                config.build_resolved.content_dir.display()
            ));
        } else {
            output.info("Watching: disabled");
        }

        let server_config = ServerConfig::from(&config);
        let runtime = tokio::runtime::Runtime::new()?;
        let result = runtime.block_on(run_server(
            server_config,
            initial,
            rebuilder,
            shutdown_signal(),
        ));
        // A rebuild still running on a blocking thread must not hold up exit.
        runtime.shutdown_timeout(SHUTDOWN_GRACE);

        result?;
        Ok(())
    }

    /// Resolve the watch override from --watch/--no-watch.
    pub(crate) fn watch_override(&self) -> Option<bool> {
        self.no_watch.then_some(false).or(self.watch)
    }
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

//! Pipeline manager: owns stage order, plugins and build state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use kiln_cache::BuildCache;
use kiln_config::Config;

use crate::plugin::{Plugin, PluginError, StageContext};
use crate::stage::Stage;
use crate::state::{BuildState, Feed, OutputFile, Post, SiteSettings};

/// Error returned by [`Manager`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A plugin handler failed; remaining stages of the call were skipped.
    #[error("{stage} stage failed in plugin `{plugin}`: {source}")]
    Stage {
        stage: Stage,
        plugin: String,
        #[source]
        source: PluginError,
    },
    /// Plugins were registered after the first stage ran.
    #[error("plugins must be registered before the first stage runs")]
    PluginsAfterStart,
    /// The worker pool for parallel record processing could not be built.
    #[error("failed to start {threads} worker threads: {message}")]
    ThreadPool { threads: usize, message: String },
}

impl PipelineError {
    /// Stage that failed, for stage errors.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Convert Duration to milliseconds as f64.
fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Drives resumable, idempotent stage execution.
///
/// A manager is built for one build: the dev server constructs a fresh one
/// for every rebuild so configuration edits take effect. It is not meant to
/// be shared; [`Manager::run_to`] takes `&mut self`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use kiln_cache::BuildCache;
/// use kiln_config::Config;
/// use kiln_pipeline::{Manager, Stage, plugins};
///
/// let config = Arc::new(Config::default());
/// let mut manager = Manager::new(Arc::clone(&config), Arc::new(BuildCache::in_memory()));
/// manager.register_plugins(plugins::defaults(&config))?;
///
/// // Dry run: nothing is written before the Write stage.
/// manager.run_to(Stage::Collect)?;
/// for file in manager.files() {
///     println!("{}", file.path.display());
/// }
/// # Ok::<(), kiln_pipeline::PipelineError>(())
/// ```
pub struct Manager {
    plugins: Vec<Plugin>,
    state: BuildState,
    /// Last stage that completed successfully.
    reached: Option<Stage>,
    concurrency: usize,
    pool: Option<rayon::ThreadPool>,
}

impl Manager {
    #[must_use]
    pub fn new(config: Arc<Config>, cache: Arc<BuildCache>) -> Self {
        Self {
            plugins: Vec::new(),
            state: BuildState::new(config, cache),
            reached: None,
            concurrency: 0,
            pool: None,
        }
    }

    /// Register plugins. Handlers run in registration order within a stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PluginsAfterStart`] once any stage has run.
    pub fn register_plugins(
        &mut self,
        plugins: impl IntoIterator<Item = Plugin>,
    ) -> Result<(), PipelineError> {
        if self.reached.is_some() {
            return Err(PipelineError::PluginsAfterStart);
        }
        self.plugins.extend(plugins);
        Ok(())
    }

    /// Bound parallel per-record processing within a stage.
    ///
    /// `0` and `1` run records serially. Takes effect at the next stage.
    pub fn set_concurrency(&mut self, n: usize) {
        if n != self.concurrency {
            self.concurrency = n;
            self.pool = None;
        }
    }

    /// Run every stage that has not completed yet, up to and including `target`.
    ///
    /// Stages already reached are skipped, so repeated or increasing calls are
    /// equivalent to a single call with the largest target. On failure the
    /// remaining stages are skipped and the failed stage stays unreached;
    /// state written before the failure is kept.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Stage`] naming the failed stage and plugin.
    pub fn run_to(&mut self, target: Stage) -> Result<(), PipelineError> {
        self.ensure_pool()?;

        let pending: Vec<Stage> = Stage::ALL
            .into_iter()
            .filter(|stage| self.reached.is_none_or(|reached| *stage > reached))
            .filter(|stage| *stage <= target)
            .collect();

        for stage in pending {
            self.run_stage(stage)?;
            self.reached = Some(stage);
        }
        Ok(())
    }

    /// Run the whole pipeline.
    ///
    /// # Errors
    ///
    /// See [`Manager::run_to`].
    pub fn run(&mut self) -> Result<(), PipelineError> {
        self.run_to(Stage::Cleanup)
    }

    fn run_stage(&mut self, stage: Stage) -> Result<(), PipelineError> {
        let start = Instant::now();
        let pool = self.pool.as_ref();

        for plugin in &self.plugins {
            let Some(handler) = plugin.handler(stage) else {
                continue;
            };
            let mut ctx = StageContext::new(stage, &mut self.state, plugin.name(), pool);
            handler(&mut ctx).map_err(|source| PipelineError::Stage {
                stage,
                plugin: plugin.name().to_owned(),
                source,
            })?;
        }

        tracing::info!(
            stage = %stage,
            elapsed_ms = elapsed_ms(start),
            "Stage complete"
        );
        Ok(())
    }

    fn ensure_pool(&mut self) -> Result<(), PipelineError> {
        if self.concurrency > 1 && self.pool.is_none() {
            let threads = self.concurrency;
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("kiln-worker-{i}"))
                .build()
                .map_err(|e| PipelineError::ThreadPool {
                    threads,
                    message: e.to_string(),
                })?;
            self.pool = Some(pool);
        }
        Ok(())
    }

    /// Last stage that completed, if any.
    pub fn last_stage(&self) -> Option<Stage> {
        self.reached
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    pub fn cache(&self) -> &BuildCache {
        &self.state.cache
    }

    pub fn site(&self) -> &SiteSettings {
        &self.state.site
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.state.paths
    }

    pub fn assets(&self) -> &[PathBuf] {
        &self.state.assets
    }

    pub fn posts(&self) -> &[Post] {
        &self.state.posts
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.state.feeds
    }

    pub fn files(&self) -> &[OutputFile] {
        &self.state.files
    }

    pub fn warnings(&self) -> &[String] {
        &self.state.warnings
    }

    pub fn license_warning(&self) -> Option<&str> {
        self.state.license_warning.as_deref()
    }

    /// Number of files produced by the Write stage.
    pub fn written(&self) -> usize {
        self.state.written
    }
}

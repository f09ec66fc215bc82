//! Plugins: named sets of stage-keyed handlers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use crate::stage::Stage;
use crate::state::BuildState;

/// Error returned by a plugin handler.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// I/O error on a specific path.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A content record could not be processed.
    #[error("{}: {message}", path.display())]
    Content { path: PathBuf, message: String },
    /// The build configuration is unusable.
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Cache(#[from] kiln_cache::CacheError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PluginError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn content(path: &Path, message: impl Into<String>) -> Self {
        Self::Content {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Stage handler. Receives the stage context and mutates the build state.
pub type Handler = Arc<dyn Fn(&mut StageContext<'_>) -> Result<(), PluginError> + Send + Sync>;

/// A named unit of stage-keyed behavior.
///
/// Built once with [`Plugin::new`] and [`Plugin::on`], then immutable.
///
/// ```
/// use kiln_pipeline::{Plugin, Stage};
///
/// let plugin = Plugin::new("word_count").on(Stage::Transform, |ctx| {
///     let words: usize = ctx.state.posts.iter().map(|p| p.body.split_whitespace().count()).sum();
///     ctx.cache().set("total", words.into());
///     Ok(())
/// });
/// assert!(plugin.handles(Stage::Transform));
/// ```
#[derive(Clone)]
pub struct Plugin {
    name: String,
    handlers: BTreeMap<Stage, Handler>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: BTreeMap::new(),
        }
    }

    /// Register `handler` for `stage`, replacing any earlier one.
    #[must_use]
    pub fn on<F>(mut self, stage: Stage, handler: F) -> Self
    where
        F: Fn(&mut StageContext<'_>) -> Result<(), PluginError> + Send + Sync + 'static,
    {
        self.handlers.insert(stage, Arc::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handles(&self, stage: Stage) -> bool {
        self.handlers.contains_key(&stage)
    }

    pub(crate) fn handler(&self, stage: Stage) -> Option<&Handler> {
        self.handlers.get(&stage)
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("stages", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// What a handler sees while its stage runs.
pub struct StageContext<'a> {
    pub stage: Stage,
    pub state: &'a mut BuildState,
    plugin: &'a str,
    pool: Option<&'a rayon::ThreadPool>,
}

impl<'a> StageContext<'a> {
    pub(crate) fn new(
        stage: Stage,
        state: &'a mut BuildState,
        plugin: &'a str,
        pool: Option<&'a rayon::ThreadPool>,
    ) -> Self {
        Self {
            stage,
            state,
            plugin,
            pool,
        }
    }

    /// Name of the plugin whose handler is running.
    pub fn plugin(&self) -> &str {
        self.plugin
    }

    /// Cache view namespaced by the running plugin's name.
    pub fn cache(&self) -> kiln_cache::ScopedCache<'_> {
        self.state.cache.scoped(self.plugin)
    }

    /// Record a non-fatal warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(stage = %self.stage, plugin = self.plugin, "{message}");
        self.state.warnings.push(message);
    }

    /// Map `f` over `items`, in parallel when the manager has a worker pool.
    ///
    /// Results keep input order. If any call fails, no result is returned, so
    /// callers that apply results afterwards update all records or none.
    pub fn try_map<T, U, F>(&self, items: &[T], f: F) -> Result<Vec<U>, PluginError>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> Result<U, PluginError> + Sync + Send,
    {
        match self.pool {
            Some(pool) => pool.install(|| items.par_iter().map(&f).collect()),
            None => items.iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_registers_stages() {
        let plugin = Plugin::new("p")
            .on(Stage::Load, |_| Ok(()))
            .on(Stage::Write, |_| Ok(()));

        assert_eq!(plugin.name(), "p");
        assert!(plugin.handles(Stage::Load));
        assert!(plugin.handles(Stage::Write));
        assert!(!plugin.handles(Stage::Render));
    }

    #[test]
    fn test_debug_lists_stages() {
        let plugin = Plugin::new("p").on(Stage::Glob, |_| Ok(()));
        let debug = format!("{plugin:?}");
        assert!(debug.contains("\"p\""));
        assert!(debug.contains("Glob"));
    }
}

//! Pipeline-backed [`Rebuilder`].

use std::path::PathBuf;
use std::sync::Arc;

use kiln_config::{CliSettings, Config};

use super::coordinator::{Cancellation, RebuildOutcome, Rebuilder};

/// Reloads configuration from disk and runs a fresh pipeline.
///
/// Configuration is reloaded on every rebuild so edits to `kiln.toml` take
/// effect without restarting the server. Each rebuild gets a fresh in-memory
/// cache tier; the external tier on disk is shared.
#[derive(Clone, Debug)]
pub struct PipelineRebuilder {
    config_path: Option<PathBuf>,
    cli: CliSettings,
}

impl PipelineRebuilder {
    #[must_use]
    pub fn new(config_path: Option<PathBuf>, cli: CliSettings) -> Self {
        Self { config_path, cli }
    }
}

impl Rebuilder for PipelineRebuilder {
    fn rebuild(&self, cancel: &Cancellation) -> RebuildOutcome {
        if cancel.is_cancelled() {
            return RebuildOutcome::Cancelled;
        }

        let config = match Config::load(self.config_path.as_deref(), Some(&self.cli)) {
            Ok(config) => Arc::new(config),
            Err(e) => {
                return RebuildOutcome::Failed {
                    message: e.to_string(),
                    warning: None,
                };
            }
        };
        let cache = Arc::new(kiln_pipeline::open_cache(&config));
        let mut manager = match kiln_pipeline::default_manager(config, cache) {
            Ok(manager) => manager,
            Err(e) => {
                return RebuildOutcome::Failed {
                    message: e.to_string(),
                    warning: None,
                };
            }
        };

        if cancel.is_cancelled() {
            return RebuildOutcome::Cancelled;
        }

        let result = manager.run();
        let warning = manager.license_warning().map(str::to_owned);

        if cancel.is_cancelled() {
            return RebuildOutcome::Cancelled;
        }

        match result {
            Ok(()) => RebuildOutcome::Success { warning },
            Err(e) => RebuildOutcome::Failed {
                message: e.to_string(),
                warning,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::sync::watch;

    fn project(config: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("kiln.toml");
        fs::write(&config_path, config).unwrap();
        fs::create_dir_all(tmp.path().join("content")).unwrap();
        fs::write(tmp.path().join("content/hello.md"), "# Hello\n\nWorld.\n").unwrap();
        (tmp, config_path)
    }

    fn rebuilder(config_path: &Path) -> PipelineRebuilder {
        PipelineRebuilder::new(Some(config_path.to_path_buf()), CliSettings::default())
    }

    #[test]
    fn test_rebuild_writes_output() {
        let (tmp, config_path) = project("[site]\nlicense = \"MIT\"\n");

        let outcome = rebuilder(&config_path).rebuild(&Cancellation::never());

        assert_eq!(outcome, RebuildOutcome::Success { warning: None });
        assert!(tmp.path().join("public/hello/index.html").exists());
    }

    #[test]
    fn test_rebuild_reports_license_warning() {
        let (_tmp, config_path) = project("");

        let outcome = rebuilder(&config_path).rebuild(&Cancellation::never());

        assert!(matches!(outcome, RebuildOutcome::Success { warning: Some(_) }));
    }

    #[test]
    fn test_rebuild_picks_up_config_edits() {
        let (_tmp, config_path) = project("");
        let rebuilder = rebuilder(&config_path);
        assert!(matches!(
            rebuilder.rebuild(&Cancellation::never()),
            RebuildOutcome::Success { .. }
        ));

        fs::write(&config_path, "[build]\npatterns = []\n").unwrap();
        let outcome = rebuilder.rebuild(&Cancellation::never());

        let RebuildOutcome::Failed { message, .. } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(message.contains("build.patterns"));
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_output() {
        let (tmp, config_path) = project("");
        let rebuilder = rebuilder(&config_path);
        rebuilder.rebuild(&Cancellation::never());
        let page = tmp.path().join("public/hello/index.html");
        let before = fs::read_to_string(&page).unwrap();

        fs::write(tmp.path().join("content/broken.md"), "---\ntitle: [\n---\n").unwrap();
        let outcome = rebuilder.rebuild(&Cancellation::never());

        assert!(matches!(outcome, RebuildOutcome::Failed { .. }));
        assert_eq!(fs::read_to_string(&page).unwrap(), before);
    }

    #[test]
    fn test_cancelled_before_start() {
        let (tmp, config_path) = project("");
        let (_tx, rx) = watch::channel(true);

        let outcome = rebuilder(&config_path).rebuild(&Cancellation::new(rx));

        assert_eq!(outcome, RebuildOutcome::Cancelled);
        assert!(!tmp.path().join("public").exists());
    }
}

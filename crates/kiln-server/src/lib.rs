//! Development server for Kiln.
//!
//! Serves the latest completed build over HTTP, watches the content
//! directory, rebuilds on change and streams build status to browsers:
//!
//! - `GET /__livereload`: WebSocket status stream
//! - `GET /__livereload.js`: client script injected into every HTML page
//! - `POST /_search`: search over the prebuilt JSON index
//! - everything else: static files from the output directory
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum router ──► static files (output directory)
//!    ▲                  │
//!    │                  └─► /__livereload ◄── StatusBroadcaster
//!    │                                             ▲
//!    └──────── reload ◄────────────────────────────┤
//!                                                  │
//! notify ──► watcher ──► RebuildCoordinator ───────┘
//!                               │
//!                               └─► Rebuilder (blocking thread, one at a time)
//! ```
//!
//! # Shutdown
//!
//! Once the shutdown future resolves: status streams are closed first, then
//! HTTP connections get [`SHUTDOWN_GRACE`] to finish, then background tasks
//! are cancelled and given [`SHUTDOWN_GRACE`] to stop. Nothing waits longer.

mod app;
mod error;
pub mod live_reload;
mod middleware;
mod search;
mod state;
mod static_files;

use std::future::{Future, IntoFuture};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kiln_config::Config;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

pub use error::ServerError;
use live_reload::{
    BuildStatus, Cancellation, EventFilter, RebuildCoordinator, Rebuilder, StatusBroadcaster,
};
use state::AppState;

/// Bound on each shutdown phase.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Filtered watch events buffered for the coordinator.
const EVENT_QUEUE: usize = 256;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Content directory to watch.
    pub content_dir: PathBuf,
    /// Output directory to serve.
    pub output_dir: PathBuf,
    /// Config file to watch alongside content.
    pub config_file: Option<PathBuf>,
    /// Search index file inside the output directory.
    pub search_index: PathBuf,
    /// Rebuild on file changes.
    pub watch: bool,
    /// Quiet period before a burst of changes triggers a rebuild.
    pub debounce: Duration,
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        let output_dir = config.build_resolved.output_dir.clone();
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            content_dir: config.build_resolved.content_dir.clone(),
            search_index: output_dir.join(&config.plugins.search_index.filename),
            output_dir,
            config_file: config.config_path.clone(),
            watch: config.server.watch,
            debounce: Duration::from_millis(config.server.debounce_ms),
        }
    }
}

/// Run the server until `shutdown` resolves.
///
/// `initial` is the status of the build that produced the current output.
/// With watching enabled, `rebuilder` runs after every accepted change.
///
/// # Errors
///
/// Returns an error if the address cannot be bound, the watcher cannot be
/// started, or the HTTP server fails.
pub async fn run_server<R: Rebuilder>(
    config: ServerConfig,
    initial: BuildStatus,
    rebuilder: Arc<R>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| ServerError::Bind {
            addr: format!("{}:{}", config.host, config.port),
            source,
        })?;

    let broadcaster = Arc::new(StatusBroadcaster::new(initial));
    let (cancel, cancel_rx) = watch::channel(false);
    let mut tasks = Vec::new();
    if config.watch {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let filter = EventFilter::new(
            config.content_dir.clone(),
            &config.output_dir,
            config.config_file.clone(),
        );
        tasks.push(live_reload::spawn_watcher(
            filter,
            events_tx,
            Cancellation::new(cancel_rx.clone()),
        )?);
        let coordinator =
            RebuildCoordinator::new(rebuilder, Arc::clone(&broadcaster), config.debounce);
        tasks.push(tokio::spawn(
            coordinator.run(events_rx, Cancellation::new(cancel_rx)),
        ));
    }

    let state = Arc::new(AppState {
        output_dir: config.output_dir,
        search_index: config.search_index,
        broadcaster,
    });
    let background = Background { cancel, tasks };
    serve(listener, state, background, shutdown).await
}

/// Tasks running next to the HTTP server.
struct Background {
    cancel: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Background {
    /// Cancel every task and wait a bounded time for them to stop.
    async fn stop(self) {
        self.cancel.send_replace(true);
        let join = async {
            for task in self.tasks {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, join).await.is_err() {
            tracing::warn!("Background tasks did not stop in time");
        }
    }
}

async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    background: Background,
    shutdown: impl Future<Output = ()>,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Serving");
    }

    let broadcaster = Arc::clone(&state.broadcaster);
    let (stop, stopped) = oneshot::channel::<()>();
    let mut server = tokio::spawn(
        axum::serve(listener, app::create_router(state))
            .with_graceful_shutdown(async move {
                let _ = stopped.await;
            })
            .into_future(),
    );

    let finished = tokio::select! {
        () = shutdown => {
            tracing::info!("Shutdown signal received, stopping server...");
            None
        }
        result = &mut server => Some(result),
    };

    broadcaster.shutdown();

    let _ = stop.send(());
    let finished = match finished {
        Some(result) => Some(result),
        None => match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(result) => Some(result),
            Err(_) => {
                tracing::warn!("In-flight requests did not finish in time");
                server.abort();
                None
            }
        },
    };

    background.stop().await;

    match finished {
        Some(Ok(result)) => result.map_err(ServerError::Io),
        Some(Err(e)) => {
            tracing::error!(error = %e, "Server task failed");
            Ok(())
        }
        None => Ok(()),
    }
}

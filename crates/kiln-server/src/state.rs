//! Application state.
//!
//! Shared state for all request handlers.

use std::path::PathBuf;
use std::sync::Arc;

use crate::live_reload::StatusBroadcaster;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Directory the latest completed build lives in.
    pub(crate) output_dir: PathBuf,
    /// JSON search index written by the build.
    pub(crate) search_index: PathBuf,
    /// Build status hub for the status stream.
    pub(crate) broadcaster: Arc<StatusBroadcaster>,
}

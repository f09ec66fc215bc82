//! Live rebuild system for development mode.
//!
//! ```text
//! notify ──► watcher ──► RebuildCoordinator ──► Rebuilder (blocking thread)
//!                               │
//!                               └──► StatusBroadcaster ──► WebSocket clients
//! ```

mod broadcaster;
mod coordinator;
mod rebuild;
mod status;
mod watcher;
mod websocket;

pub use broadcaster::{StatusBroadcaster, Subscription};
pub use coordinator::{Cancellation, DEFAULT_DEBOUNCE, RebuildCoordinator, RebuildOutcome, Rebuilder};
pub use rebuild::PipelineRebuilder;
pub use status::{BuildStatus, CONNECTED, RELOAD, STATUS_PREFIX, Status};
pub use watcher::{EventFilter, WatchEvent, WatchEventKind};
pub(crate) use watcher::spawn as spawn_watcher;
pub(crate) use websocket::ws_handler;

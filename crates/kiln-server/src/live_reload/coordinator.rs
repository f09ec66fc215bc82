//! Rebuild coordinator.
//!
//! Turns filtered filesystem events into pipeline rebuilds:
//!
//! ```text
//!            event (resets debounce)
//!           ┌──────┐
//!           ▼      │
//!  Idle ──────────►│ debounce expires
//!   ▲               ▼
//!   │  done      Building ── event ──► pending = true
//!   └───────────────┤
//!                   └── done with pending ──► Building (no wait)
//! ```
//!
//! At most one rebuild runs at a time. Events during a rebuild are never
//! dropped: they set `pending`, which triggers exactly one follow-up rebuild.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::broadcaster::StatusBroadcaster;
use super::status::BuildStatus;
use super::watcher::WatchEvent;

/// Default quiet period before a rebuild starts.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Cooperative cancellation flag shared with background tasks.
#[derive(Clone, Debug)]
pub struct Cancellation(watch::Receiver<bool>);

impl Cancellation {
    pub fn new(receiver: watch::Receiver<bool>) -> Self {
        Self(receiver)
    }

    /// A flag that is never raised.
    #[must_use]
    pub fn never() -> Self {
        let (_, receiver) = watch::channel(false);
        Self(receiver)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once cancellation is requested or the sender is gone.
    pub async fn cancelled(&mut self) {
        loop {
            let cancelled = *self.0.borrow_and_update();
            if cancelled || self.0.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Result of one rebuild.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RebuildOutcome {
    Success { warning: Option<String> },
    Failed { message: String, warning: Option<String> },
    /// Stopped at a cancellation checkpoint; nothing to report.
    Cancelled,
}

impl RebuildOutcome {
    /// Status to publish for this outcome.
    #[must_use]
    pub fn status(&self) -> Option<BuildStatus> {
        match self {
            Self::Success { warning } => Some(BuildStatus::success(warning.clone())),
            Self::Failed { message, warning } => {
                Some(BuildStatus::error(message.clone(), warning.clone()))
            }
            Self::Cancelled => None,
        }
    }
}

/// Reconstructs a pipeline and runs it to completion.
///
/// Called on a blocking thread. Implementations check `cancel` between
/// steps; a running stage is never interrupted.
pub trait Rebuilder: Send + Sync + 'static {
    fn rebuild(&self, cancel: &Cancellation) -> RebuildOutcome;
}

/// Debounces events and runs single-flight rebuilds.
pub struct RebuildCoordinator<R: Rebuilder> {
    rebuilder: Arc<R>,
    broadcaster: Arc<StatusBroadcaster>,
    debounce: Duration,
    building: Arc<AtomicBool>,
    pending: Arc<AtomicBool>,
}

impl<R: Rebuilder> RebuildCoordinator<R> {
    pub fn new(rebuilder: Arc<R>, broadcaster: Arc<StatusBroadcaster>, debounce: Duration) -> Self {
        Self {
            rebuilder,
            broadcaster,
            debounce,
            building: Arc::new(AtomicBool::new(false)),
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Process events until cancelled or the event channel closes.
    pub async fn run(self, mut events: mpsc::Receiver<WatchEvent>, mut cancel: Cancellation) {
        let (done_tx, mut done_rx) = mpsc::channel::<RebuildOutcome>(1);
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                Some(outcome) = done_rx.recv() => {
                    self.finish(&outcome);
                    if self.pending.swap(false, Ordering::AcqRel) {
                        tracing::debug!("Changes arrived during rebuild, rebuilding again");
                        self.start(&done_tx, &cancel);
                    }
                }

                event = events.recv() => {
                    let Some(event) = event else { break };
                    tracing::debug!(path = %event.path.display(), kind = ?event.kind, "Change detected");
                    if self.building.load(Ordering::Acquire) {
                        self.pending.store(true, Ordering::Release);
                    } else {
                        deadline = Some(Instant::now() + self.debounce);
                    }
                }

                () = sleep_until(deadline), if deadline.is_some() => {
                    deadline = None;
                    self.start(&done_tx, &cancel);
                }
            }
        }
        tracing::debug!("Rebuild coordinator stopped");
    }

    /// Start a rebuild unless one is running, in which case mark it pending.
    fn start(&self, done: &mpsc::Sender<RebuildOutcome>, cancel: &Cancellation) {
        if self
            .building
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.pending.store(true, Ordering::Release);
            return;
        }

        self.broadcaster.publish(BuildStatus::building());
        tracing::info!("Rebuilding");

        let rebuilder = Arc::clone(&self.rebuilder);
        let cancel = cancel.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || rebuilder.rebuild(&cancel))
                .await
                .unwrap_or_else(|e| RebuildOutcome::Failed {
                    message: format!("rebuild panicked: {e}"),
                    warning: None,
                });
            let _ = done.send(outcome).await;
        });
    }

    fn finish(&self, outcome: &RebuildOutcome) {
        self.building.store(false, Ordering::Release);
        match outcome {
            RebuildOutcome::Success { .. } => tracing::info!("Rebuild succeeded"),
            RebuildOutcome::Failed { message, .. } => {
                tracing::warn!(error = %message, "Rebuild failed, keeping previous output");
            }
            RebuildOutcome::Cancelled => tracing::debug!("Rebuild cancelled"),
        }
        if let Some(status) = outcome.status() {
            let succeeded = matches!(outcome, RebuildOutcome::Success { .. });
            self.broadcaster.publish(status);
            if succeeded {
                self.broadcaster.reload();
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

//! Filesystem watcher.
//!
//! Directories are watched one level at a time so new directories can be
//! added as they appear and the output directory is never watched. Raw
//! `notify` events are filtered here; only changes that can affect a build
//! reach the coordinator.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use kiln_pipeline::plugins::{OLD_SUFFIX, STAGING_SUFFIX, sibling};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::coordinator::Cancellation;

/// Raw events buffered between the notify thread and the reader task.
const RAW_EVENT_QUEUE: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
    Removed,
}

/// A filtered filesystem change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

/// Decides which paths can affect a build.
#[derive(Clone, Debug)]
pub struct EventFilter {
    content_dir: PathBuf,
    /// Output directory plus its staging siblings.
    ignored_dirs: Vec<PathBuf>,
    config_file: Option<PathBuf>,
}

impl EventFilter {
    pub fn new(content_dir: PathBuf, output_dir: &Path, config_file: Option<PathBuf>) -> Self {
        let ignored_dirs = vec![
            output_dir.to_path_buf(),
            sibling(output_dir, STAGING_SUFFIX),
            sibling(output_dir, OLD_SUFFIX),
        ];
        Self {
            content_dir,
            ignored_dirs,
            config_file,
        }
    }

    fn is_ignored_dir(&self, path: &Path) -> bool {
        self.ignored_dirs.iter().any(|dir| path.starts_with(dir))
    }

    pub fn accepts(&self, path: &Path) -> bool {
        if self.is_ignored_dir(path) || is_temp_file(path) {
            return false;
        }
        if self.config_file.as_deref() == Some(path) {
            return true;
        }
        match path.strip_prefix(&self.content_dir) {
            Ok(relative) => !relative
                .components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with('.')),
            Err(_) => false,
        }
    }
}

/// Editor swap, backup and hidden files.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
        // Vim probes directory writability with this file.
        || name == "4913"
}

fn classify(kind: &EventKind) -> Option<WatchEventKind> {
    match kind {
        EventKind::Create(_) => Some(WatchEventKind::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(WatchEventKind::Modified),
        EventKind::Remove(_) => Some(WatchEventKind::Removed),
        _ => None,
    }
}

/// Start watching and spawn the reader task forwarding filtered events.
///
/// The watcher lives as long as the returned task.
///
/// # Errors
///
/// Returns an error if the platform watcher cannot be created or the content
/// directory cannot be watched.
pub fn spawn(
    filter: EventFilter,
    events: mpsc::Sender<WatchEvent>,
    mut cancel: Cancellation,
) -> Result<JoinHandle<()>, notify::Error> {
    let (raw_tx, mut raw_rx) = mpsc::channel::<notify::Result<Event>>(RAW_EVENT_QUEUE);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        // The notify callback runs on its own thread.
        let _ = raw_tx.blocking_send(res);
    })?;

    watcher.watch(&filter.content_dir, RecursiveMode::NonRecursive)?;
    let mut watched = 1;
    watched += watch_subdirs(&mut watcher, &filter, &filter.content_dir);
    if let Some(parent) = filter.config_file.as_deref().and_then(Path::parent)
        && !parent.starts_with(&filter.content_dir)
    {
        match watcher.watch(parent, RecursiveMode::NonRecursive) {
            Ok(()) => watched += 1,
            Err(e) => {
                tracing::warn!(path = %parent.display(), error = %e, "Cannot watch config directory");
            }
        }
    }
    tracing::info!(directories = watched, root = %filter.content_dir.display(), "Watching for changes");

    let watcher = Arc::new(Mutex::new(watcher));
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                raw = raw_rx.recv() => {
                    let Some(raw) = raw else { break };
                    match raw {
                        Ok(event) => {
                            for change in translate(&event, &filter, &watcher) {
                                if events.send(change).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "Watcher error"),
                    }
                }
            }
        }
        tracing::debug!("Watcher stopped");
    }))
}

/// Filter a raw event, adding watches for new directories.
///
/// Files already inside a new directory are reported as created, since they
/// may have appeared before the directory was watched.
fn translate(
    event: &Event,
    filter: &EventFilter,
    watcher: &Mutex<RecommendedWatcher>,
) -> Vec<WatchEvent> {
    let Some(kind) = classify(&event.kind) else {
        return Vec::new();
    };

    let mut changes = Vec::new();
    for path in &event.paths {
        if !filter.accepts(path) {
            continue;
        }
        if kind != WatchEventKind::Removed && path.is_dir() {
            let mut watcher = watcher.lock().unwrap();
            match watcher.watch(path, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    let added = watch_subdirs(&mut watcher, filter, path);
                    tracing::debug!(path = %path.display(), nested = added, "Watching new directory");
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Cannot watch directory"),
            }
            changes.extend(existing_files(filter, path).into_iter().map(|path| WatchEvent {
                path,
                kind: WatchEventKind::Created,
            }));
        }
        changes.push(WatchEvent {
            path: path.clone(),
            kind,
        });
    }
    changes
}

/// Accepted files anywhere below `dir`.
fn existing_files(filter: &EventFilter, dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !filter.accepts(&path) {
            continue;
        }
        match entry.file_type() {
            Ok(t) if t.is_dir() => files.extend(existing_files(filter, &path)),
            Ok(_) => files.push(path),
            Err(_) => {}
        }
    }
    files
}

/// Watch every visible subdirectory of `dir`. Returns how many were added.
fn watch_subdirs(watcher: &mut RecommendedWatcher, filter: &EventFilter, dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut added = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !entry.file_type().is_ok_and(|t| t.is_dir()) || !filter.accepts(&path) {
            continue;
        }
        match watcher.watch(&path, RecursiveMode::NonRecursive) {
            Ok(()) => added += 1 + watch_subdirs(watcher, filter, &path),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Cannot watch directory"),
        }
    }
    added
}

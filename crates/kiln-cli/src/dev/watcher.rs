//! File system watcher with debouncing for development mode.
//!
//! Watches the project root recursively and filters out changes that can
//! never affect a build: the output and cache directories, `node_modules`,
//! hidden files and editor swap files.

use crate::error::{CliError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Directory names ignored wherever they appear.
const IGNORED_DIRS: &[&str] = &["node_modules", "target"];

/// File change event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    /// Get the path affected by this change.
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }
}

/// Recursive watcher feeding a channel of [`FileChange`]s.
///
/// Changes arrive as fast as the OS reports them; [`next_batch`] turns them
/// into debounced rebuild triggers.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Watch `root`, skipping everything under `ignored` (absolute paths).
    pub fn new(root: PathBuf, ignored: Vec<PathBuf>) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        if !root.exists() {
            return Err(CliError::FileNotFound(root));
        }

        let (tx, rx) = mpsc::channel(256);
        let filter_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "file watcher error");
                    return;
                }
            };
            for path in &event.paths {
                if should_ignore(path, &filter_root, &ignored) {
                    continue;
                }
                let change = match event.kind {
                    EventKind::Create(_) => FileChange::Created(path.clone()),
                    EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };
                // The receiver is gone once the server shuts down.
                let _ = tx.blocking_send(change);
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    /// Get the root directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Wait for the next change, then keep collecting until the watcher has
/// been quiet for `debounce`. Returns `None` once the watcher is gone.
///
/// Each path appears once in the batch, in first-seen order.
pub async fn next_batch(
    rx: &mut mpsc::Receiver<FileChange>,
    debounce: Duration,
) -> Option<Vec<FileChange>> {
    let first = rx.recv().await?;
    let mut batch = vec![first];
    loop {
        match tokio::time::timeout(debounce, rx.recv()).await {
            Ok(Some(change)) => {
                if !batch.iter().any(|c| c.path() == change.path()) {
                    batch.push(change);
                }
            }
            Ok(None) | Err(_) => return Some(batch),
        }
    }
}

/// Whether a change at `path` can be skipped.
pub fn should_ignore(path: &Path, root: &Path, ignored: &[PathBuf]) -> bool {
    let Ok(rel_path) = path.strip_prefix(root) else {
        return true;
    };
    if ignored.iter().any(|dir| path.starts_with(dir)) {
        return true;
    }

    for component in rel_path.components() {
        let Some(name) = component.as_os_str().to_str() else {
            continue;
        };
        if name.starts_with('.') && name != "." && name != ".." {
            return true;
        }
        if IGNORED_DIRS.contains(&name) {
            return true;
        }
    }

    let file_name = rel_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    file_name.ends_with('~') || file_name.ends_with(".swp") || file_name.ends_with(".tmp")
}

//! Debounced filesystem watching.
//!
//! A `notify` watcher feeds raw events into a channel; a tokio task
//! coalesces bursts into one batched refresh per quiet window. Paths the
//! editor just wrote are dropped via the project's suppression map, and a
//! broken watch stream falls back to re-watching plus a full re-discovery.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use docweaver_types::{Dialect, EngineError};

use crate::project::Project;

/// Events for the same path inside this window coalesce into one refresh.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(250);

#[derive(Debug)]
enum WatchMessage {
    Changed(PathBuf),
    /// The underlying watch stream reported an error; re-watch and rebuild.
    Resync,
}

/// Paths inside dot-directories or dependency trees never reach the index.
fn in_ignored_dir(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            name.starts_with('.') || name == "venv" || name == "node_modules"
        }
        _ => false,
    })
}

fn is_relevant(project_root: &Path, path: &Path) -> bool {
    if Dialect::from_path(path).is_none() {
        return false;
    }
    match path.strip_prefix(project_root) {
        Ok(rel) => !in_ignored_dir(rel),
        Err(_) => false,
    }
}

/// Start watching the project directory. The returned handle keeps the
/// debounce task alive; dropping it stops forwarding.
pub fn spawn(project: Arc<Project>) -> Result<JoinHandle<()>, EngineError> {
    let (tx, rx) = mpsc::unbounded_channel();

    let event_tx = tx.clone();
    let root = project.root().to_path_buf();
    let event_root = root.clone();
    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            match result {
                Ok(event) => {
                    for path in event.paths {
                        if is_relevant(&event_root, &path) {
                            let _ = event_tx.send(WatchMessage::Changed(path));
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("watch stream error: {err}");
                    let _ = event_tx.send(WatchMessage::Resync);
                }
            }
        })
        .map_err(|err| EngineError::InvalidArgument(format!("cannot create watcher: {err}")))?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|err| EngineError::InvalidArgument(format!("cannot watch {}: {err}", root.display())))?;

    Ok(tokio::spawn(run_debounce(project, watcher, rx)))
}

async fn run_debounce(
    project: Arc<Project>,
    mut watcher: RecommendedWatcher,
    mut rx: mpsc::UnboundedReceiver<WatchMessage>,
) {
    let root = project.root().to_path_buf();
    while let Some(first) = rx.recv().await {
        let mut batch: Vec<PathBuf> = Vec::new();
        let mut resync = false;
        collect(&project, first, &mut batch, &mut resync);

        // Quiet-window debounce: keep absorbing until no event arrives for
        // a full window.
        while let Ok(Some(message)) = timeout(DEBOUNCE_WINDOW, rx.recv()).await {
            collect(&project, message, &mut batch, &mut resync);
        }

        if resync {
            let _ = watcher.unwatch(&root);
            if let Err(err) = watcher.watch(&root, RecursiveMode::Recursive) {
                tracing::warn!("re-watch failed: {err}");
            }
            if let Err(err) = project.refresh_full() {
                tracing::warn!("full refresh after watch error failed: {err}");
            }
            continue;
        }
        if batch.is_empty() {
            continue;
        }
        tracing::debug!("refreshing {} changed path(s)", batch.len());
        if let Err(err) = project.refresh_paths(&batch) {
            tracing::warn!("refresh failed: {err}");
        }
    }
}

fn collect(
    project: &Project,
    message: WatchMessage,
    batch: &mut Vec<PathBuf>,
    resync: &mut bool,
) {
    match message {
        WatchMessage::Changed(path) => {
            if project.is_suppressed(&path) {
                tracing::debug!("suppressed self-edit echo for {}", path.display());
                return;
            }
            if !batch.contains(&path) {
                batch.push(path);
            }
        }
        WatchMessage::Resync => *resync = true,
    }
}

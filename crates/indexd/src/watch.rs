use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use library::Indexer;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Watches the library paths and asks the indexer for a rescan once changes
/// settle for `debounce`. Events under `ignored` (the daemon's own files) are
/// dropped.
pub fn start_watcher(
    indexer: Arc<Indexer>,
    roots: &[PathBuf],
    ignored: Vec<PathBuf>,
    debounce: Duration,
) -> Option<RecommendedWatcher> {
    match setup_watcher(indexer, roots, ignored, debounce) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            warn!("Failed to start watcher: {}", err);
            None
        }
    }
}

fn setup_watcher(
    indexer: Arc<Indexer>,
    roots: &[PathBuf],
    ignored: Vec<PathBuf>,
    debounce: Duration,
) -> Result<RecommendedWatcher, Box<dyn std::error::Error>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        NotifyConfig::default(),
    )?;

    let mut watching = 0usize;
    for root in roots {
        match watcher.watch(root, RecursiveMode::Recursive) {
            Ok(()) => {
                info!(
                    "Watching {} for changes (debounce {}s)",
                    root.display(),
                    debounce.as_secs()
                );
                watching += 1;
            }
            Err(err) => warn!("Can't watch {}: {}", root.display(), err),
        }
    }
    if watching == 0 {
        return Err("no watchable library paths".into());
    }

    tokio::spawn(async move {
        watch_loop(indexer, rx, ignored, debounce).await;
    });

    Ok(watcher)
}

async fn watch_loop(
    indexer: Arc<Indexer>,
    mut rx: UnboundedReceiver<Event>,
    ignored: Vec<PathBuf>,
    debounce: Duration,
) {
    loop {
        let event = match rx.recv().await {
            Some(event) => event,
            None => break,
        };
        if !is_relevant_event(&event, &ignored) {
            continue;
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => {
                    debug!("library change detected; scheduling rescan");
                    indexer.schedule_rescan();
                    break;
                }
                maybe_event = rx.recv() => {
                    if maybe_event.is_none() {
                        return;
                    }
                }
            }
        }
    }
}

fn is_relevant_event(event: &Event, ignored: &[PathBuf]) -> bool {
    let kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    kind && event
        .paths
        .iter()
        .any(|path| !ignored.iter().any(|own| is_own_file(path, own)))
}

const SQLITE_SIDECARS: [&str; 3] = ["-wal", "-shm", "-journal"];

/// True for anything under `own`, or for SQLite's journal files next to it.
fn is_own_file(path: &Path, own: &Path) -> bool {
    if path.starts_with(own) {
        return true;
    }
    if path.parent() != own.parent() {
        return false;
    }
    let name = path.file_name().and_then(|name| name.to_str());
    let own_name = own.file_name().and_then(|name| name.to_str());
    let (Some(name), Some(own_name)) = (name, own_name) else {
        return false;
    };
    name.strip_prefix(own_name)
        .map_or(false, |suffix| SQLITE_SIDECARS.contains(&suffix))
}

//! Watches option and relation data for changes and turns them into hooks.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event as FsEvent, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::reconciler::{Event, RelationEventKind};
use crate::relation::store::LOCAL_BAG_FILE;

/// A watcher that monitors the options file and relation directory.
pub struct ConfigWatcher {
    options_file: PathBuf,
    relations_dir: PathBuf,
    event_tx: mpsc::UnboundedSender<Event>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher feeding the given event queue.
    pub fn new(
        options_file: &Path,
        relations_dir: &Path,
        event_tx: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            options_file: options_file.to_path_buf(),
            relations_dir: relations_dir.to_path_buf(),
            event_tx,
        }
    }

    /// Start watching in a background thread.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.event_tx.clone();
        let options_file = self.options_file.clone();
        let relations_dir = self.relations_dir.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<FsEvent>| match res {
                Ok(event) => {
                    for hook in classify(&event, &options_file, &relations_dir) {
                        tracing::debug!(hook = %hook, "Change detected");
                        let _ = tx.send(hook);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        std::fs::create_dir_all(&self.relations_dir).map_err(notify::Error::io)?;
        if let Some(parent) = self.options_file.parent() {
            std::fs::create_dir_all(parent).map_err(notify::Error::io)?;
            // Watch the parent so replacing the file is seen as well as editing it.
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }
        watcher.watch(&self.relations_dir, RecursiveMode::Recursive)?;

        tracing::info!(
            options_file = ?self.options_file,
            relations_dir = ?self.relations_dir,
            "Config watcher started"
        );
        Ok(watcher)
    }
}

/// Map one filesystem event to the hooks it implies.
fn classify(event: &FsEvent, options_file: &Path, relations_dir: &Path) -> Vec<Event> {
    if !(event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove()) {
        return Vec::new();
    }

    let mut hooks = Vec::new();
    for path in &event.paths {
        let hook = if path == options_file {
            Some(Event::ConfigChanged)
        } else if let Ok(relative) = path.strip_prefix(relations_dir) {
            relation_hook(relative, event.kind.is_remove())
        } else {
            None
        };

        if let Some(hook) = hook {
            if !hooks.contains(&hook) {
                hooks.push(hook);
            }
        }
    }
    hooks
}

/// `<endpoint>/<remote-app>/...` → relation hook for that endpoint.
///
/// Writes to our own bag (and the hidden temp files staging them) are
/// ignored; they are the output of a pass, not an input.
fn relation_hook(relative: &Path, removed: bool) -> Option<Event> {
    let name = relative.file_name().and_then(|n| n.to_str())?;
    if name == LOCAL_BAG_FILE || name.starts_with('.') {
        return None;
    }
    let mut components = relative.components();
    let endpoint = components.next()?.as_os_str().to_str()?.to_string();
    let relation_dir_removed = removed && components.clone().count() == 1;
    let kind = if relation_dir_removed {
        RelationEventKind::Broken
    } else {
        RelationEventKind::Changed
    };
    Some(Event::Relation { endpoint, kind })
}

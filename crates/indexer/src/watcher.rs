use crate::error::{IndexerError, Result};
use crate::reconciler::SemanticIndex;
use crate::source::{Document, STATE_DIR_NAME};
use log::{debug, warn};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period after the last filesystem event before dispatching.
    pub debounce: Duration,
    /// Upper bound since the first undelivered event.
    pub max_batch_wait: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(750),
            max_batch_wait: Duration::from_secs(3),
        }
    }
}

enum WatcherCommand {
    Shutdown,
}

/// Bridges filesystem notifications into the index's single-document
/// event operations.
///
/// Events are debounced and deduplicated per path, then applied in arrival
/// order through `on_document_modified` / `on_document_deleted`; creations
/// and renames surface through the same two operations (a rename is a
/// removal of one path and a modification of another). Dispatch failures
/// are logged, never fatal — the next full reconciliation repairs anything
/// missed.
pub struct NoteWatcher {
    command_tx: mpsc::Sender<WatcherCommand>,
    _watcher: RecommendedWatcher,
}

impl NoteWatcher {
    pub fn start(
        index: Arc<SemanticIndex>,
        root: impl AsRef<Path>,
        config: WatcherConfig,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(4);

        let watcher = create_fs_watcher(&root, event_tx)?;
        tokio::spawn(dispatch_loop(index, root, config, event_rx, command_rx));

        Ok(Self {
            command_tx,
            _watcher: watcher,
        })
    }

    pub async fn stop(&self) {
        let _ = self.command_tx.send(WatcherCommand::Shutdown).await;
    }
}

fn create_fs_watcher(
    root: &Path,
    sender: mpsc::Sender<notify::Result<Event>>,
) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = sender.blocking_send(res);
        },
        NotifyConfig::default(),
    )
    .map_err(|e| IndexerError::Other(format!("watcher init failed: {e}")))?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| IndexerError::Other(format!("failed to watch {}: {e}", root.display())))?;
    Ok(watcher)
}

async fn dispatch_loop(
    index: Arc<SemanticIndex>,
    root: PathBuf,
    config: WatcherConfig,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
    mut command_rx: mpsc::Receiver<WatcherCommand>,
) {
    let mut pending = PendingChanges::new(config.debounce, config.max_batch_wait);

    loop {
        let deadline = pending.next_deadline();

        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) => handle_event(&root, event, &mut pending),
                    // Watcher gone; nothing further will arrive.
                    None => break,
                }
            }
            command = command_rx.recv() => {
                match command {
                    Some(WatcherCommand::Shutdown) | None => break,
                }
            }
            () = async {
                if let Some(deadline) = deadline {
                    time::sleep_until(deadline).await;
                }
            }, if deadline.is_some() => {
                let changes = pending.take();
                dispatch_changes(&index, &root, changes).await;
            }
        }
    }
}

fn handle_event(root: &Path, event: notify::Result<Event>, pending: &mut PendingChanges) {
    match event {
        Ok(event) => {
            for path in event.paths {
                if is_relevant_path(root, &path) {
                    if let Ok(relative) = path.strip_prefix(root) {
                        pending.record(relative.to_string_lossy().replace('\\', "/"));
                    }
                }
            }
        }
        Err(err) => warn!("Watcher error: {err}"),
    }
}

async fn dispatch_changes(index: &Arc<SemanticIndex>, root: &Path, changes: Vec<String>) {
    for relative in changes {
        let absolute = root.join(&relative);
        // Existence at dispatch time decides the operation; a rename shows
        // up as a removal of one path and a modification of another.
        let result = match tokio::fs::read_to_string(&absolute).await {
            Ok(body) => {
                debug!("Dispatching change for {relative}");
                index
                    .on_document_modified(&Document::new(relative.clone(), body))
                    .await
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("Dispatching removal for {relative}");
                index.on_document_deleted(&relative).await
            }
            Err(err) => {
                warn!("Failed to read {relative}: {err}");
                continue;
            }
        };
        if let Err(err) = result {
            warn!("Failed to apply change for {relative}: {err}");
        }
    }
}

fn is_relevant_path(root: &Path, path: &Path) -> bool {
    const IGNORED: &[&str] = &[".git", STATE_DIR_NAME];

    if path.extension().map_or(true, |ext| ext != "md") {
        return false;
    }

    if let Ok(relative) = path.strip_prefix(root) {
        if relative
            .components()
            .any(|c| IGNORED.iter().any(|ignore| c.as_os_str() == *ignore))
        {
            return false;
        }
        return true;
    }
    false
}

/// Per-path deduplicated event buffer with the debounce deadline math.
struct PendingChanges {
    debounce: Duration,
    max_batch: Duration,
    changes: BTreeSet<String>,
    last_event: Option<Instant>,
    first_event: Option<Instant>,
}

impl PendingChanges {
    const fn new(debounce: Duration, max_batch: Duration) -> Self {
        Self {
            debounce,
            max_batch,
            changes: BTreeSet::new(),
            last_event: None,
            first_event: None,
        }
    }

    fn record(&mut self, relative_path: String) {
        let now = Instant::now();
        self.changes.insert(relative_path);
        self.last_event = Some(now);
        self.first_event.get_or_insert(now);
    }

    fn next_deadline(&self) -> Option<Instant> {
        if self.changes.is_empty() {
            return None;
        }

        let quiet = self.last_event.map(|last| last + self.debounce);
        let forced = self.first_event.map(|first| first + self.max_batch);
        match (quiet, forced) {
            (Some(q), Some(f)) => Some(q.min(f)),
            (q, f) => q.or(f),
        }
    }

    fn take(&mut self) -> Vec<String> {
        self.last_event = None;
        self.first_event = None;
        std::mem::take(&mut self.changes).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_events_means_no_deadline() {
        let pending = PendingChanges::new(Duration::from_millis(100), Duration::from_secs(3));
        assert!(pending.next_deadline().is_none());
    }

    #[test]
    fn recorded_event_produces_deadline() {
        let mut pending = PendingChanges::new(Duration::from_millis(100), Duration::from_secs(3));
        pending.record("a.md".to_string());
        assert!(pending.next_deadline().is_some());
    }

    #[test]
    fn duplicate_paths_collapse() {
        let mut pending = PendingChanges::new(Duration::from_millis(100), Duration::from_secs(3));
        pending.record("a.md".to_string());
        pending.record("a.md".to_string());
        pending.record("b.md".to_string());
        assert_eq!(pending.take(), vec!["a.md".to_string(), "b.md".to_string()]);
        assert!(pending.next_deadline().is_none());
    }

    #[test]
    fn irrelevant_paths_are_filtered() {
        let root = Path::new("/vault");
        assert!(is_relevant_path(root, Path::new("/vault/note.md")));
        assert!(!is_relevant_path(root, Path::new("/vault/photo.png")));
        assert!(!is_relevant_path(
            root,
            Path::new("/vault/.notedex/index.json")
        ));
        assert!(!is_relevant_path(root, Path::new("/vault/.git/config.md")));
        assert!(!is_relevant_path(root, Path::new("/elsewhere/note.md")));
    }
}

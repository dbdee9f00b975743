use crate::store::SharedStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Quiet period after the last mark before a write fires.
    pub quiet_period: Duration,
    /// Upper bound since the first mark; guarantees a write even while
    /// marks keep arriving.
    pub max_wait: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_secs(30),
            max_wait: Duration::from_secs(60),
        }
    }
}

enum WriterMessage {
    Mark,
    Flush(oneshot::Sender<()>),
}

/// Collapses bursts of store mutations into one write per quiet period.
///
/// High-frequency mutation sources (a note being saved repeatedly) call
/// [`DebouncedWriter::mark`] after each in-memory mutation; the spawned
/// task rewrites the database file once marks stop arriving, or at the
/// max-wait bound if they never do.
#[derive(Clone)]
pub struct DebouncedWriter {
    tx: mpsc::Sender<WriterMessage>,
    writes: Arc<AtomicUsize>,
}

impl DebouncedWriter {
    #[must_use]
    pub fn spawn(store: SharedStore, config: WriterConfig) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let writes = Arc::new(AtomicUsize::new(0));
        tokio::spawn(write_loop(store, config, rx, Arc::clone(&writes)));
        Self { tx, writes }
    }

    /// Record that the store changed. Never blocks; if the queue is full a
    /// mark is already pending and the upcoming write covers this one too.
    pub fn mark(&self) {
        let _ = self.tx.try_send(WriterMessage::Mark);
    }

    /// Force any pending write to happen now and wait for it.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WriterMessage::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Number of completed writes; exposed for health reporting.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

async fn write_loop(
    store: SharedStore,
    config: WriterConfig,
    mut rx: mpsc::Receiver<WriterMessage>,
    writes: Arc<AtomicUsize>,
) {
    let mut dirty = false;
    let mut first_mark: Option<Instant> = None;
    let mut last_mark: Option<Instant> = None;

    loop {
        let deadline = next_deadline(dirty, first_mark, last_mark, &config);

        tokio::select! {
            message = rx.recv() => {
                match message {
                    Some(WriterMessage::Mark) => {
                        dirty = true;
                        let now = Instant::now();
                        last_mark = Some(now);
                        first_mark.get_or_insert(now);
                    }
                    Some(WriterMessage::Flush(ack)) => {
                        if dirty {
                            persist(&store, &writes).await;
                            dirty = false;
                            first_mark = None;
                            last_mark = None;
                        }
                        let _ = ack.send(());
                    }
                    None => {
                        // Writer handle dropped; do not lose a pending write.
                        if dirty {
                            persist(&store, &writes).await;
                        }
                        break;
                    }
                }
            }
            () = async {
                if let Some(deadline) = deadline {
                    time::sleep_until(deadline).await;
                }
            }, if deadline.is_some() => {
                persist(&store, &writes).await;
                dirty = false;
                first_mark = None;
                last_mark = None;
            }
        }
    }
}

fn next_deadline(
    dirty: bool,
    first_mark: Option<Instant>,
    last_mark: Option<Instant>,
    config: &WriterConfig,
) -> Option<Instant> {
    if !dirty {
        return None;
    }

    let quiet = last_mark.map(|last| last + config.quiet_period);
    let forced = first_mark.map(|first| first + config.max_wait);
    match (quiet, forced) {
        (Some(q), Some(f)) => Some(q.min(f)),
        (q, f) => q.or(f),
    }
}

async fn persist(store: &SharedStore, writes: &AtomicUsize) {
    let guard = store.read().await;
    match guard.save().await {
        Ok(()) => {
            writes.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => log::error!("Debounced write failed: {err}"),
    }
}

use crate::error::Result;
use crate::hash::content_fingerprint;
use crate::source::Document;
use notedex_md_chunker::chunk_markdown;
use notedex_vector_store::{
    BatchScheduler, Chunk, DebouncedWriter, FileEntry, IndexStore, PendingText, SearchHit,
    SharedStore, Vector, WriterConfig,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex, RwLock};

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileStats {
    pub documents: usize,
    pub unchanged: usize,
    pub updated: usize,
    pub excluded: usize,
    pub failed_documents: usize,
    pub failed_chunk_batches: usize,
    pub time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SemanticIndexConfig {
    pub database_path: PathBuf,
    pub exclusion_prefix: Option<String>,
    pub writer: WriterConfig,
}

impl SemanticIndexConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            exclusion_prefix: None,
            writer: WriterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RunState {
    running: bool,
    last: Option<ReconcileStats>,
}

/// The incremental semantic index: change detection, staged embedding
/// acquisition, durable storage, and retrieval over one note collection.
///
/// All mutations are serialized through one run guard, so there is at most
/// one in-flight reconciliation at a time and live-edit events never
/// interleave with a full pass.
pub struct SemanticIndex {
    store: SharedStore,
    scheduler: BatchScheduler,
    writer: DebouncedWriter,
    exclusion: RwLock<Option<String>>,
    run_guard: Mutex<()>,
    run_state: watch::Sender<RunState>,
}

impl SemanticIndex {
    /// Read the database file (once) and start the debounced writer.
    pub async fn initialize(config: SemanticIndexConfig, scheduler: BatchScheduler) -> Arc<Self> {
        let store: SharedStore = Arc::new(RwLock::new(
            IndexStore::open(&config.database_path).await,
        ));
        let writer = DebouncedWriter::spawn(Arc::clone(&store), config.writer);
        let (run_state, _) = watch::channel(RunState::default());

        Arc::new(Self {
            store,
            scheduler,
            writer,
            exclusion: RwLock::new(normalize_prefix(
                config.exclusion_prefix.as_deref().unwrap_or(""),
            )),
            run_guard: Mutex::new(()),
            run_state,
        })
    }

    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    #[must_use]
    pub fn writer(&self) -> &DebouncedWriter {
        &self.writer
    }

    /// Bring the stored index in line with the given document snapshot.
    ///
    /// If a run is already in flight, awaits that run and returns its stats
    /// instead of starting another.
    pub async fn reconcile_all(&self, documents: &[Document]) -> Result<ReconcileStats> {
        let Ok(guard) = self.run_guard.try_lock() else {
            log::debug!("Reconciliation already in flight; awaiting it");
            return Ok(self.await_current_run().await);
        };

        self.run_state.send_modify(|state| state.running = true);
        let result = self.run_reconciliation(documents).await;
        self.run_state.send_modify(|state| {
            state.running = false;
            if let Ok(stats) = &result {
                state.last = Some(stats.clone());
            }
        });
        drop(guard);
        result
    }

    async fn await_current_run(&self) -> ReconcileStats {
        let mut rx = self.run_state.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                if !state.running {
                    return state.last.clone().unwrap_or_default();
                }
            }
            if rx.changed().await.is_err() {
                return ReconcileStats::default();
            }
        }
    }

    async fn run_reconciliation(&self, documents: &[Document]) -> Result<ReconcileStats> {
        let started = Instant::now();
        let mut stats = ReconcileStats {
            documents: documents.len(),
            ..ReconcileStats::default()
        };
        let exclusion = self.exclusion.read().await.clone();

        // Diff phase: hash every live document against its stored entry.
        let mut snapshot: HashMap<String, FileEntry> = HashMap::new();
        let mut to_reembed: Vec<(String, String)> = Vec::new();
        let mut to_rechunk: Vec<String> = Vec::new();
        let mut bodies: HashMap<&str, &str> = HashMap::new();
        {
            let store = self.store.read().await;
            for doc in documents {
                if is_excluded(&doc.path, exclusion.as_deref()) {
                    stats.excluded += 1;
                    continue;
                }
                bodies.insert(doc.path.as_str(), doc.body.as_str());

                let hash = content_fingerprint(&doc.body);
                match store.get(&doc.path) {
                    Some(entry)
                        if entry.content_hash == hash && entry.document_embedding.is_some() =>
                    {
                        // The document embedding is valid either way; an
                        // incomplete chunk set only needs the chunk phase.
                        snapshot.insert(doc.path.clone(), entry.clone());
                        let incomplete = entry.has_missing_chunk_embeddings()
                            || (entry.chunks.is_empty() && !doc.body.trim().is_empty());
                        if incomplete {
                            to_rechunk.push(doc.path.clone());
                        } else {
                            stats.unchanged += 1;
                        }
                    }
                    _ => to_reembed.push((doc.path.clone(), hash)),
                }
            }
        }

        // Persist the carried-forward snapshot before any network call so a
        // crash mid-run never loses already-good data. Entries for deleted
        // or excluded paths drop out here.
        {
            let mut store = self.store.write().await;
            store.replace_all(snapshot);
            store.save().await?;
        }

        if to_reembed.is_empty() && to_rechunk.is_empty() {
            stats.time_ms = elapsed_ms(started);
            log::info!(
                "Reconciliation finished with nothing to update ({} unchanged)",
                stats.unchanged
            );
            return Ok(stats);
        }

        log::info!(
            "Reconciling {} documents: {} to re-embed, {} to re-chunk, {} unchanged",
            documents.len(),
            to_reembed.len(),
            to_rechunk.len(),
            stats.unchanged
        );

        // Document-level phase: count-bounded batches, persisting after
        // each so partial progress survives interruption. An entry written
        // here intentionally has an empty chunk list until the chunk phase
        // completes; the diff phase of the next run picks that state up.
        let mut updated_paths: Vec<String> = to_rechunk;
        let hash_by_path: HashMap<String, String> = to_reembed.iter().cloned().collect();
        let units: Vec<PendingText> = to_reembed
            .iter()
            .map(|(path, _)| PendingText::new(path.clone(), bodies[path.as_str()]))
            .collect();

        for batch in self.scheduler.group_by_count(&units) {
            let results = self.scheduler.submit(&batch).await;
            let mut store = self.store.write().await;
            for (unit, embedding) in batch.iter().zip(results) {
                match embedding {
                    Some(vector) => {
                        store.upsert(
                            unit.path.clone(),
                            FileEntry {
                                content_hash: hash_by_path[&unit.path].clone(),
                                document_embedding: Some(vector),
                                chunks: Vec::new(),
                            },
                        );
                        updated_paths.push(unit.path.clone());
                    }
                    None => stats.failed_documents += 1,
                }
            }
            store.save().await?;
        }

        // Chunk-level phase, pooled across all updated documents.
        stats.failed_chunk_batches = self.embed_chunks_for(&updated_paths, &bodies).await;
        self.store.read().await.save().await?;

        stats.updated = updated_paths.len();
        stats.time_ms = elapsed_ms(started);
        log::info!("Reconciliation completed: {stats:?}");
        Ok(stats)
    }

    /// Chunk the given documents, embed every chunk text in token-budget
    /// batches, and attach the grouped results as each document's chunk
    /// list (replacing any placeholder). Returns the number of batches that
    /// failed permanently; their chunks keep absent embeddings.
    async fn embed_chunks_for(
        &self,
        paths: &[String],
        bodies: &HashMap<&str, &str>,
    ) -> usize {
        let mut chunk_lists: HashMap<String, Vec<Chunk>> = HashMap::new();
        let mut units: Vec<PendingText> = Vec::new();
        let mut unit_slots: Vec<(String, usize)> = Vec::new();

        for path in paths {
            let Some(body) = bodies.get(path.as_str()) else {
                continue;
            };
            let chunks = chunk_markdown(body, path);
            if chunks.is_empty() {
                if !body.trim().is_empty() {
                    log::warn!("No chunks produced for {path}; entry keeps an empty passage list");
                }
                chunk_lists.insert(path.clone(), Vec::new());
                continue;
            }
            let mut list = Vec::with_capacity(chunks.len());
            for (idx, chunk) in chunks.iter().enumerate() {
                units.push(PendingText::new(path.clone(), chunk.embedding_text()));
                unit_slots.push((path.clone(), idx));
                list.push(Chunk {
                    contents: chunk.content.clone(),
                    embedding: None,
                });
            }
            chunk_lists.insert(path.clone(), list);
        }

        let mut failed_batches = 0usize;
        let mut cursor = 0usize;
        for batch in self.scheduler.group_by_token_budget(units) {
            let results = self.scheduler.submit(&batch).await;
            if !batch.is_empty() && results.iter().all(Option::is_none) {
                failed_batches += 1;
            }
            for (offset, embedding) in results.into_iter().enumerate() {
                let (path, idx) = &unit_slots[cursor + offset];
                if let Some(vector) = embedding {
                    if let Some(list) = chunk_lists.get_mut(path) {
                        list[*idx].embedding = Some(vector);
                    }
                }
            }
            cursor += batch.len();
        }

        let mut store = self.store.write().await;
        for (path, list) in chunk_lists {
            if !store.set_chunks(&path, list) {
                log::debug!("Skipping chunk attach for {path}: entry no longer present");
            }
        }
        failed_batches
    }

    /// A note appeared. No-op when it is excluded or already indexed with
    /// matching content.
    pub async fn on_document_added(&self, document: &Document) -> Result<()> {
        let _guard = self.run_guard.lock().await;
        self.apply_document_change(document).await
    }

    /// A note's content changed (or may have); re-embeds only on hash
    /// mismatch or a previously incomplete entry.
    pub async fn on_document_modified(&self, document: &Document) -> Result<()> {
        let _guard = self.run_guard.lock().await;
        self.apply_document_change(document).await
    }

    /// A note was removed; drops its entry.
    pub async fn on_document_deleted(&self, path: &str) -> Result<()> {
        let _guard = self.run_guard.lock().await;
        let removed = self.store.write().await.remove(path);
        if removed.is_some() {
            log::info!("Removed {path} from index");
            self.writer.mark();
        }
        Ok(())
    }

    /// A note moved: delete under the old path, recreate under the new one.
    pub async fn on_document_renamed(&self, old_path: &str, document: &Document) -> Result<()> {
        let _guard = self.run_guard.lock().await;
        if self.store.write().await.remove(old_path).is_some() {
            self.writer.mark();
        }
        self.apply_document_change(document).await
    }

    async fn apply_document_change(&self, document: &Document) -> Result<()> {
        let exclusion = self.exclusion.read().await.clone();
        if is_excluded(&document.path, exclusion.as_deref()) {
            return Ok(());
        }

        let hash = content_fingerprint(&document.body);
        {
            let store = self.store.read().await;
            if let Some(entry) = store.get(&document.path) {
                let current = entry.content_hash == hash
                    && entry.document_embedding.is_some()
                    && !entry.has_missing_chunk_embeddings()
                    && !(entry.chunks.is_empty() && !document.body.trim().is_empty());
                if current {
                    log::debug!("No change for {}; skipping", document.path);
                    return Ok(());
                }
            }
        }

        self.regenerate_document(document, hash).await
    }

    /// Steps 4-5 of a full run at single-item granularity, persisting
    /// through the debounced writer.
    async fn regenerate_document(&self, document: &Document, hash: String) -> Result<()> {
        let unit = PendingText::new(document.path.clone(), document.body.clone());
        let mut results = self.scheduler.submit(&[unit]).await;
        let Some(Some(vector)) = results.pop() else {
            log::warn!(
                "Document embedding failed for {}; a later run will retry it",
                document.path
            );
            return Ok(());
        };

        {
            let mut store = self.store.write().await;
            store.upsert(
                document.path.clone(),
                FileEntry {
                    content_hash: hash,
                    document_embedding: Some(vector),
                    chunks: Vec::new(),
                },
            );
        }
        self.writer.mark();

        let mut bodies: HashMap<&str, &str> = HashMap::new();
        bodies.insert(document.path.as_str(), document.body.as_str());
        let paths = vec![document.path.clone()];
        self.embed_chunks_for(&paths, &bodies).await;
        self.writer.mark();
        Ok(())
    }

    /// Replace the exclusion prefix, purge matching entries from the store,
    /// and persist. Returns the number of purged entries; callers follow up
    /// with a fresh `reconcile_all` so future indexing skips the prefix
    /// too.
    pub async fn set_exclusion_path(&self, prefix: &str) -> Result<usize> {
        let normalized = normalize_prefix(prefix);
        *self.exclusion.write().await = normalized.clone();
        let Some(prefix) = normalized else {
            return Ok(0);
        };

        let mut store = self.store.write().await;
        let removed = store.remove_prefix(&prefix);
        if removed > 0 {
            store.save().await?;
            log::info!("Exclusion prefix {prefix:?}: purged {removed} entries");
        }
        Ok(removed)
    }

    /// Rank stored documents (and chunks) against the query vectors.
    pub async fn search(
        &self,
        query_vectors: &[Vector],
        result_count: usize,
        relevance_threshold: f32,
        include_all_chunks: bool,
    ) -> Vec<SearchHit> {
        self.store
            .read()
            .await
            .search(query_vectors, result_count, relevance_threshold, include_all_chunks)
    }
}

fn is_excluded(path: &str, prefix: Option<&str>) -> bool {
    prefix.is_some_and(|p| path.starts_with(p))
}

fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_normalization_trims_and_drops_empty() {
        assert_eq!(normalize_prefix("  private/  "), Some("private/".to_string()));
        assert_eq!(normalize_prefix("   "), None);
        assert_eq!(normalize_prefix(""), None);
    }

    #[test]
    fn exclusion_is_a_prefix_match() {
        assert!(is_excluded("private/a.md", Some("private/")));
        assert!(!is_excluded("public/a.md", Some("private/")));
        assert!(!is_excluded("private/a.md", None));
    }
}

use crate::error::Result;
use crate::types::{Chunk, DatabaseFile, FileEntry, DATABASE_VERSION};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Store shared between the reconciler, the debounced writer, and readers.
pub type SharedStore = Arc<RwLock<IndexStore>>;

/// The authoritative path → entry mapping, with its on-disk database file.
///
/// All mutation is whole-entry replacement: an entry is either fully swapped
/// or left untouched, so readers never observe a half-updated entry.
pub struct IndexStore {
    entries: HashMap<String, FileEntry>,
    path: PathBuf,
}

impl IndexStore {
    /// Read the database file once at startup.
    ///
    /// A missing file yields an empty store; a file that cannot be read or
    /// parsed is logged and also yields an empty store. Losing a corrupt
    /// index is preferable to failing startup — the next reconciliation
    /// rebuilds it.
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<DatabaseFile>(&raw) {
                Ok(db) => {
                    log::info!(
                        "Loaded {} entries from {} (version {})",
                        db.embeddings.len(),
                        path.display(),
                        db.version
                    );
                    db.embeddings.into_iter().collect()
                }
                Err(err) => {
                    log::warn!(
                        "Failed to parse database {}: {err}; starting with an empty store",
                        path.display()
                    );
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                log::warn!(
                    "Failed to read database {}: {err}; starting with an empty store",
                    path.display()
                );
                HashMap::new()
            }
        };

        Self { entries, path }
    }

    /// Create an empty store that will persist to `path`.
    pub fn empty(path: impl AsRef<Path>) -> Self {
        Self {
            entries: HashMap::new(),
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Serialize the full store and rewrite the database file.
    pub async fn save(&self) -> Result<()> {
        let db = DatabaseFile {
            version: DATABASE_VERSION,
            embeddings: self
                .entries
                .iter()
                .map(|(path, entry)| (path.clone(), entry.clone()))
                .collect(),
        };
        let data = serde_json::to_string(&db)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, data).await?;
        log::debug!("Saved {} entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Insert or fully replace the entry for `path`.
    pub fn upsert(&mut self, path: impl Into<String>, entry: FileEntry) {
        self.entries.insert(path.into(), entry);
    }

    /// Replace the chunk list of an existing entry. Returns `false` when no
    /// entry exists for `path`.
    pub fn set_chunks(&mut self, path: &str, chunks: Vec<Chunk>) -> bool {
        match self.entries.get_mut(path) {
            Some(entry) => {
                entry.chunks = chunks;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<FileEntry> {
        self.entries.remove(path)
    }

    /// Remove every entry whose path starts with `prefix`; returns the
    /// number of removed entries.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| !path.starts_with(prefix));
        before - self.entries.len()
    }

    /// Swap in a freshly built snapshot, dropping everything else.
    pub fn replace_all(&mut self, entries: HashMap<String, FileEntry>) {
        self.entries = entries;
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &FileEntry)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn database_path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn entry(hash: &str, embedding: Option<Vec<f32>>, chunks: Vec<Chunk>) -> FileEntry {
        FileEntry {
            content_hash: hash.to_string(),
            document_embedding: embedding,
            chunks,
        }
    }

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path().join("index.json")).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = IndexStore::open(&path).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn save_and_reopen_round_trips_every_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");

        let mut store = IndexStore::empty(&path);
        store.upsert(
            "a.md",
            entry(
                "hash-a",
                Some(vec![0.1, 0.2]),
                vec![
                    Chunk {
                        contents: "first".to_string(),
                        embedding: Some(vec![0.3, 0.4]),
                    },
                    Chunk {
                        contents: "second".to_string(),
                        embedding: None,
                    },
                ],
            ),
        );
        store.upsert("b.md", entry("hash-b", None, vec![]));
        store.save().await.unwrap();

        let reloaded = IndexStore::open(&path).await;
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("a.md"), store.get("a.md"));
        assert_eq!(reloaded.get("b.md"), store.get("b.md"));
    }

    #[tokio::test]
    async fn remove_prefix_purges_matching_paths_only() {
        let dir = TempDir::new().unwrap();
        let mut store = IndexStore::empty(dir.path().join("index.json"));
        store.upsert("private/diary.md", entry("h1", None, vec![]));
        store.upsert("private/plans.md", entry("h2", None, vec![]));
        store.upsert("public/readme.md", entry("h3", None, vec![]));

        let removed = store.remove_prefix("private/");
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains("public/readme.md"));
    }
}

use crate::error::{IndexerError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Directory holding the database and configuration, skipped during scans.
pub const STATE_DIR_NAME: &str = ".notedex";

/// A note as observed right now: its path within the collection and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: String,
    pub body: String,
}

impl Document {
    pub fn new(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            body: body.into(),
        }
    }
}

/// Where notes come from.
///
/// Injected into every component that needs it; nothing in the index
/// reaches for process-wide state.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<Document>>;
}

/// Markdown files under a root directory, honoring gitignore rules and
/// skipping hidden directories (including the index's own state dir).
pub struct FsDocumentSource {
    root: PathBuf,
}

impl FsDocumentSource {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(IndexerError::InvalidPath(format!(
                "not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn normalize_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut normalized = relative.to_string_lossy().to_string();
        if normalized.contains('\\') {
            normalized = normalized.replace('\\', "/");
        }
        normalized
    }
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn enumerate(&self) -> Result<Vec<Document>> {
        let root = self.root.clone();
        let files = tokio::task::spawn_blocking(move || {
            let mut files: Vec<PathBuf> = Vec::new();
            for entry in ignore::WalkBuilder::new(&root).build().flatten() {
                let path = entry.path();
                let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
                if is_file
                    && path.extension().is_some_and(|ext| ext == "md")
                    && !path
                        .components()
                        .any(|c| c.as_os_str() == STATE_DIR_NAME)
                {
                    files.push(path.to_path_buf());
                }
            }
            files.sort();
            files
        })
        .await
        .map_err(|err| IndexerError::Other(format!("scan task panicked: {err}")))?;

        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            match tokio::fs::read_to_string(&file).await {
                Ok(body) => documents.push(Document::new(self.normalize_path(&file), body)),
                Err(err) => log::warn!("Failed to read {}: {err}", file.display()),
            }
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn enumerates_markdown_files_with_relative_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.md"), "alpha").unwrap();
        std::fs::write(dir.path().join("sub/b.md"), "beta").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not markdown").unwrap();

        let source = FsDocumentSource::new(dir.path()).unwrap();
        let docs = source.enumerate().await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0], Document::new("a.md", "alpha"));
        assert_eq!(docs[1], Document::new("sub/b.md", "beta"));
    }

    #[tokio::test]
    async fn skips_the_state_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(STATE_DIR_NAME)).unwrap();
        std::fs::write(dir.path().join(STATE_DIR_NAME).join("leak.md"), "x").unwrap();
        std::fs::write(dir.path().join("real.md"), "y").unwrap();

        let source = FsDocumentSource::new(dir.path()).unwrap();
        let docs = source.enumerate().await.unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].path, "real.md");
    }

    #[test]
    fn rejects_missing_roots() {
        assert!(FsDocumentSource::new("/definitely/not/a/real/dir").is_err());
    }
}

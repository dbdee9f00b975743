//! # Notedex Search
//!
//! Query-side engine: embeds a query (optionally expanded with a
//! hypothetical answering passage), then ranks the stored collection by
//! best-case cosine similarity.

mod error;

pub use error::{Result, SearchError};

use notedex_indexer::SemanticIndex;
use notedex_vector_store::{BatchScheduler, ChatMessage, CompletionClient, SearchHit};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub result_count: usize,
    pub relevance_threshold: f32,
    /// Score every chunk as its own result instead of treating chunk hits
    /// as a fallback for documents without a usable embedding.
    pub include_all_chunks: bool,
    /// Expand the query with a hypothetical answering passage before
    /// retrieval.
    pub expand_query: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            result_count: 10,
            relevance_threshold: 0.01,
            include_all_chunks: false,
            expand_query: true,
        }
    }
}

/// Turns query text into query vectors and runs retrieval against the
/// index.
///
/// The expansion step asks the completion provider for a passage that
/// could plausibly answer the query and embeds it alongside the raw query;
/// retrieval scores every candidate by its best vector, so either facet
/// can justify a match. Expansion failures degrade to the raw query with a
/// warning — they never fail the search.
pub struct QueryEngine {
    index: Arc<SemanticIndex>,
    scheduler: BatchScheduler,
    completion: Option<Arc<dyn CompletionClient>>,
}

impl QueryEngine {
    pub fn new(
        index: Arc<SemanticIndex>,
        scheduler: BatchScheduler,
        completion: Option<Arc<dyn CompletionClient>>,
    ) -> Self {
        Self {
            index,
            scheduler,
            completion,
        }
    }

    pub async fn search(&self, query: &str, options: &QueryOptions) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        log::debug!("Query: '{query}' (limit {})", options.result_count);
        let mut query_vectors = vec![self.scheduler.embed_query(query).await?];

        if options.expand_query {
            if let Some(expansion) = self.hypothetical_answer(query).await {
                log::debug!("Expanded query with a {}-char passage", expansion.len());
                match self.scheduler.embed_query(&expansion).await {
                    Ok(vector) => query_vectors.push(vector),
                    Err(err) => {
                        log::warn!("Failed to embed expansion: {err}; using the raw query only");
                    }
                }
            }
        }

        Ok(self
            .index
            .search(
                &query_vectors,
                options.result_count,
                options.relevance_threshold,
                options.include_all_chunks,
            )
            .await)
    }

    async fn hypothetical_answer(&self, query: &str) -> Option<String> {
        let completion = self.completion.as_ref()?;
        let messages = [
            ChatMessage::system(
                "You help retrieve notes from a personal knowledge base by imagining what the \
                 note being searched for might say.",
            ),
            ChatMessage::user(format!(
                "Write a short passage that could plausibly appear in a note answering this \
                 question. Respond with the passage only.\n\n{query}"
            )),
        ];

        match completion.complete(&messages).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(err) => {
                log::warn!("Query expansion failed: {err}; using the raw query only");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use notedex_indexer::SemanticIndexConfig;
    use notedex_vector_store::{
        BatchConfig, EmbeddingClient, FileEntry, Throttler, Vector, VectorStoreError,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Maps the raw query to [1, 0] and anything else to [0, 1].
    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingClient for AxisEmbedder {
        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> notedex_vector_store::Result<Vec<Vector>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t == "where do we keep the keys" {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    struct FixedCompletion(&'static str);

    #[async_trait]
    impl CompletionClient for FixedCompletion {
        async fn complete(&self, _messages: &[ChatMessage]) -> notedex_vector_store::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingCompletion;

    #[async_trait]
    impl CompletionClient for FailingCompletion {
        async fn complete(&self, _messages: &[ChatMessage]) -> notedex_vector_store::Result<String> {
            Err(VectorStoreError::Provider {
                status: 500,
                message: "down".to_string(),
            })
        }
    }

    fn scheduler() -> BatchScheduler {
        BatchScheduler::new(
            Arc::new(AxisEmbedder),
            Arc::new(Throttler::new(1_000, Duration::from_secs(1))),
            BatchConfig::default(),
        )
    }

    async fn index_with_entry(dir: &TempDir, embedding: Vector) -> Arc<SemanticIndex> {
        let index = SemanticIndex::initialize(
            SemanticIndexConfig::new(dir.path().join("index.json")),
            scheduler(),
        )
        .await;
        index.store().write().await.upsert(
            "keys.md",
            FileEntry {
                content_hash: "h".to_string(),
                document_embedding: Some(embedding),
                chunks: vec![],
            },
        );
        index
    }

    #[tokio::test]
    async fn empty_queries_are_rejected() {
        let dir = TempDir::new().unwrap();
        let index = index_with_entry(&dir, vec![1.0, 0.0]).await;
        let engine = QueryEngine::new(index, scheduler(), None);

        let result = engine.search("   ", &QueryOptions::default()).await;
        assert!(matches!(result, Err(SearchError::EmptyQuery)));
    }

    #[tokio::test]
    async fn expansion_vector_can_justify_a_match_on_its_own() {
        let dir = TempDir::new().unwrap();
        // The stored note only resembles the hypothetical answer, not the
        // raw query.
        let index = index_with_entry(&dir, vec![0.0, 1.0]).await;
        let engine = QueryEngine::new(
            Arc::clone(&index),
            scheduler(),
            Some(Arc::new(FixedCompletion("the keys are in the hall drawer"))),
        );

        let expanded = engine
            .search("where do we keep the keys", &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(expanded.len(), 1);
        assert!((expanded[0].score - 1.0).abs() < 1e-6);

        let raw_only = engine
            .search(
                "where do we keep the keys",
                &QueryOptions {
                    expand_query: false,
                    ..QueryOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(raw_only.is_empty());
    }

    #[tokio::test]
    async fn completion_failure_degrades_to_the_raw_query() {
        let dir = TempDir::new().unwrap();
        let index = index_with_entry(&dir, vec![1.0, 0.0]).await;
        let engine = QueryEngine::new(index, scheduler(), Some(Arc::new(FailingCompletion)));

        let hits = engine
            .search("where do we keep the keys", &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "keys.md");
    }
}

use crate::embeddings::EmbeddingClient;
use crate::error::{Result, VectorStoreError};
use crate::throttle::Throttler;
use crate::types::Vector;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Per-text truncation bound in characters, held well below the
    /// provider's token ceiling at roughly four characters per token.
    pub max_input_len: usize,
    /// Batch size when embedding whole documents.
    pub document_batch_size: usize,
    /// Estimated-token ceiling per batch when embedding chunks.
    pub chunk_token_budget: usize,
    /// Wall-clock bound on a single provider call.
    pub request_timeout: Duration,
    /// Total attempts per batch, including the first.
    pub max_attempts: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_input_len: 28_000,
            document_batch_size: 50,
            chunk_token_budget: 7_500,
            request_timeout: Duration::from_secs(60),
            max_attempts: 3,
        }
    }
}

/// A text awaiting an embedding, tagged with the note it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingText {
    pub path: String,
    pub text: String,
}

impl PendingText {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Groups pending texts into provider batches and submits them with
/// throttling, a per-call timeout, and retry with exponential backoff.
///
/// A batch that fails after all retries yields `None` for each of its
/// items; the caller persists what succeeded and moves on — a later run
/// retries exactly the incomplete subset.
pub struct BatchScheduler {
    client: Arc<dyn EmbeddingClient>,
    throttler: Arc<Throttler>,
    config: BatchConfig,
}

impl BatchScheduler {
    pub fn new(
        client: Arc<dyn EmbeddingClient>,
        throttler: Arc<Throttler>,
        config: BatchConfig,
    ) -> Self {
        Self {
            client,
            throttler,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Estimated token cost of a text, at about four characters per token.
    #[must_use]
    pub fn estimate_tokens(text: &str) -> usize {
        text.len() / 4 + 1
    }

    /// Fixed-size batches for whole-document embedding; small enough that
    /// progress can be persisted between batches.
    #[must_use]
    pub fn group_by_count(&self, units: &[PendingText]) -> Vec<Vec<PendingText>> {
        units
            .chunks(self.config.document_batch_size)
            .map(<[PendingText]>::to_vec)
            .collect()
    }

    /// Pack chunk texts greedily in input order until the running token
    /// estimate would exceed the budget. An oversized single item still
    /// forms its own batch.
    #[must_use]
    pub fn group_by_token_budget(&self, units: Vec<PendingText>) -> Vec<Vec<PendingText>> {
        let budget = self.config.chunk_token_budget;
        let mut batches = Vec::new();
        let mut current: Vec<PendingText> = Vec::new();
        let mut current_tokens = 0usize;

        for unit in units {
            let cost = Self::estimate_tokens(&unit.text);
            if !current.is_empty() && current_tokens + cost > budget {
                batches.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            current_tokens += cost;
            current.push(unit);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    /// Submit one batch as a single provider call.
    ///
    /// Results align positionally with `batch`. A permanent failure logs a
    /// warning and fills the whole batch with `None` — never fatal to the
    /// surrounding run.
    pub async fn submit(&self, batch: &[PendingText]) -> Vec<Option<Vector>> {
        if batch.is_empty() {
            return Vec::new();
        }

        let texts: Vec<String> = batch
            .iter()
            .map(|unit| truncate_input(&unit.text, self.config.max_input_len))
            .collect();

        match self.call_with_retry(&texts).await {
            Ok(vectors) => vectors.into_iter().map(Some).collect(),
            Err(err) => {
                log::warn!(
                    "Embedding batch of {} texts failed permanently: {err}",
                    batch.len()
                );
                vec![None; batch.len()]
            }
        }
    }

    /// Embed one query text through the same throttle/timeout/retry
    /// decoration. Unlike index batches, failure propagates — a search
    /// cannot proceed without its query vector.
    pub async fn embed_query(&self, text: &str) -> Result<Vector> {
        let truncated = truncate_input(text, self.config.max_input_len);
        let mut vectors = self.call_with_retry(&[truncated]).await?;
        vectors.pop().ok_or_else(|| {
            VectorStoreError::EmbeddingError("provider returned no vector for query".to_string())
        })
    }

    async fn call_with_retry(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let mut attempt = 0u32;
        loop {
            // Every attempt is a real provider request and consumes a
            // throttle token.
            self.throttler.acquire().await;

            let outcome =
                tokio::time::timeout(self.config.request_timeout, self.client.embed_batch(texts))
                    .await;
            let err = match outcome {
                Ok(Ok(vectors)) => {
                    if vectors.len() == texts.len() {
                        return Ok(vectors);
                    }
                    VectorStoreError::EmbeddingError(format!(
                        "provider returned {} vectors for {} texts",
                        vectors.len(),
                        texts.len()
                    ))
                }
                Ok(Err(err)) => err,
                Err(_) => VectorStoreError::Timeout(self.config.request_timeout),
            };

            attempt += 1;
            if attempt >= self.config.max_attempts || !err.is_transient() {
                return Err(err);
            }

            let delay = backoff_delay(attempt);
            log::warn!(
                "Embedding request failed (attempt {attempt}/{}): {err}; retrying in {delay:?}",
                self.config.max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(500 * (1 << attempt.min(5)))
}

/// Silently cut a text down to the configured bound, respecting char
/// boundaries. Irreversible for the call, by contract.
fn truncate_input(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut cut = max_len;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unit(path: &str, text: &str) -> PendingText {
        PendingText::new(path, text)
    }

    fn scheduler(client: Arc<dyn EmbeddingClient>, config: BatchConfig) -> BatchScheduler {
        let throttler = Arc::new(Throttler::new(1_000, Duration::from_secs(1)));
        BatchScheduler::new(client, throttler, config)
    }

    /// Fails with the given status until `failures` calls have happened.
    struct FlakyClient {
        failures: usize,
        status: u16,
        calls: AtomicUsize,
    }

    impl FlakyClient {
        fn new(failures: usize, status: u16) -> Self {
            Self {
                failures,
                status,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingClient for FlakyClient {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(VectorStoreError::Provider {
                    status: self.status,
                    message: "induced failure".to_string(),
                });
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[test]
    fn count_grouping_slices_in_order() {
        let units: Vec<PendingText> = (0..7).map(|i| unit(&format!("n{i}.md"), "x")).collect();
        let scheduler = scheduler(
            Arc::new(FlakyClient::new(0, 0)),
            BatchConfig {
                document_batch_size: 3,
                ..BatchConfig::default()
            },
        );

        let batches = scheduler.group_by_count(&units);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[2].len(), 1);
        assert_eq!(batches[0][0].path, "n0.md");
        assert_eq!(batches[2][0].path, "n6.md");
    }

    #[test]
    fn token_budget_grouping_closes_full_batches() {
        // ~26 tokens each against a budget of 60: two per batch.
        let text = "a".repeat(100);
        let units: Vec<PendingText> = (0..5).map(|i| unit(&format!("n{i}.md"), &text)).collect();
        let scheduler = scheduler(
            Arc::new(FlakyClient::new(0, 0)),
            BatchConfig {
                chunk_token_budget: 60,
                ..BatchConfig::default()
            },
        );

        let batches = scheduler.group_by_token_budget(units);
        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
    }

    #[test]
    fn oversized_item_forms_its_own_batch() {
        let scheduler = scheduler(
            Arc::new(FlakyClient::new(0, 0)),
            BatchConfig {
                chunk_token_budget: 10,
                ..BatchConfig::default()
            },
        );
        let units = vec![
            unit("small.md", "tiny"),
            unit("huge.md", &"b".repeat(400)),
            unit("other.md", "tiny"),
        ];

        let batches = scheduler.group_by_token_budget(units);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1][0].path, "huge.md");
        assert_eq!(batches[1].len(), 1);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_input("hello", 10), "hello");
        assert_eq!(truncate_input("hello", 3), "hel");
        // 'é' is two bytes; cutting inside it must back off.
        let text = "aé";
        assert_eq!(truncate_input(text, 2), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let client = Arc::new(FlakyClient::new(2, 503));
        let scheduler = scheduler(client.clone(), BatchConfig::default());

        let results = scheduler.submit(&[unit("a.md", "text")]).await;
        assert_eq!(results, vec![Some(vec![1.0, 0.0])]);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fail_the_whole_batch() {
        let client = Arc::new(FlakyClient::new(usize::MAX, 503));
        let scheduler = scheduler(client.clone(), BatchConfig::default());

        let results = scheduler
            .submit(&[unit("a.md", "one"), unit("b.md", "two")])
            .await;
        assert_eq!(results, vec![None, None]);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let client = Arc::new(FlakyClient::new(usize::MAX, 400));
        let scheduler = scheduler(client.clone(), BatchConfig::default());

        let results = scheduler.submit(&[unit("a.md", "text")]).await;
        assert_eq!(results, vec![None]);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn query_embedding_propagates_failure() {
        let client = Arc::new(FlakyClient::new(usize::MAX, 400));
        let scheduler = scheduler(client, BatchConfig::default());
        assert!(scheduler.embed_query("anything").await.is_err());
    }
}

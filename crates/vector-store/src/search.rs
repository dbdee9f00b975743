use crate::store::IndexStore;
use crate::types::{SearchHit, Vector};
use ndarray::ArrayView1;

/// Cosine similarity between two vectors.
///
/// Returns `None` for mismatched lengths or zero-norm inputs; such
/// candidates are skipped rather than scored.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let denom = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if denom == 0.0 {
        return None;
    }
    Some(a.dot(&b) / denom)
}

/// Best-case score of a candidate against every query vector.
///
/// The maximum is taken rather than an average so that any single query
/// facet (the raw question, a hypothetical answer) can justify a match on
/// its own.
fn best_score(candidate: &[f32], query_vectors: &[Vector]) -> Option<f32> {
    query_vectors
        .iter()
        .filter_map(|query| cosine_similarity(candidate, query))
        .fold(None, |best, score| {
            Some(best.map_or(score, |b: f32| b.max(score)))
        })
}

impl IndexStore {
    /// Rank every stored document (and optionally every chunk) against the
    /// query vectors.
    ///
    /// Each entry with a document embedding contributes one whole-document
    /// candidate. Chunk candidates are added for every entry when
    /// `include_all_chunks` is set, and otherwise only for entries without
    /// a usable document embedding, so chunk hits stay a fallback rather
    /// than near-duplicates of the document hit. Candidates are sorted
    /// descending (ties broken by path, then chunk text), truncated to
    /// `result_count`, and only then filtered to scores strictly above
    /// `relevance_threshold` — at most `result_count` items are ever
    /// considered, even if more would pass.
    #[must_use]
    pub fn search(
        &self,
        query_vectors: &[Vector],
        result_count: usize,
        relevance_threshold: f32,
        include_all_chunks: bool,
    ) -> Vec<SearchHit> {
        if query_vectors.is_empty() {
            return Vec::new();
        }

        let mut hits = Vec::new();
        for (path, entry) in self.entries() {
            let document_score = entry
                .document_embedding
                .as_deref()
                .and_then(|embedding| best_score(embedding, query_vectors));

            if let Some(score) = document_score {
                hits.push(SearchHit {
                    path: path.clone(),
                    chunk: None,
                    score,
                });
            }

            if include_all_chunks || document_score.is_none() {
                for chunk in &entry.chunks {
                    let Some(embedding) = chunk.embedding.as_deref() else {
                        continue;
                    };
                    if let Some(score) = best_score(embedding, query_vectors) {
                        hits.push(SearchHit {
                            path: path.clone(),
                            chunk: Some(chunk.contents.clone()),
                            score,
                        });
                    }
                }
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
                .then_with(|| a.chunk.cmp(&b.chunk))
        });
        hits.truncate(result_count);
        hits.retain(|hit| hit.score > relevance_threshold);
        hits
    }
}

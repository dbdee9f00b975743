//! # Notedex Vector Store
//!
//! Persistent embedding storage and similarity search for a note
//! collection, plus the embedding acquisition pipeline that fills it.
//!
//! ## Architecture
//!
//! ```text
//! PendingText[]
//!     │
//!     ├──> Batch Scheduler (count / token-budget grouping)
//!     │      ├─> Throttler (requests per window)
//!     │      └─> Embedding provider (HTTP, timeout + retry)
//!     │
//!     └──> Index Store (path → FileEntry)
//!            ├─> Similarity search (max cosine over query vectors)
//!            └─> Database file (full-rewrite JSON, debounced)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use notedex_vector_store::IndexStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = IndexStore::open("index.json").await;
//!     let hits = store.search(&[vec![0.1, 0.9]], 10, 0.01, false);
//!     for hit in hits {
//!         println!("{}: {:.3}", hit.path, hit.score);
//!     }
//! }
//! ```

mod batch;
mod embeddings;
mod error;
mod search;
mod store;
mod throttle;
mod types;
mod writer;

pub use batch::{BatchConfig, BatchScheduler, PendingText};
pub use embeddings::{
    ChatMessage, ChatRole, CompletionClient, EmbeddingClient, OpenAiClient, OpenAiConfig,
};
pub use error::{Result, VectorStoreError};
pub use search::cosine_similarity;
pub use store::{IndexStore, SharedStore};
pub use throttle::Throttler;
pub use types::{Chunk, DatabaseFile, FileEntry, SearchHit, Vector, DATABASE_VERSION};
pub use writer::{DebouncedWriter, WriterConfig};

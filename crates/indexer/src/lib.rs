//! # Notedex Indexer
//!
//! Incremental reconciliation between a live note collection and the
//! persistent embedding index.
//!
//! ## Pipeline
//!
//! ```text
//! Document snapshot
//!     │
//!     ├──> Diff phase (content fingerprints vs stored entries)
//!     │      └─> unchanged kept, changed/new queued
//!     │
//!     ├──> Document phase (count-bounded embedding batches)
//!     │      └─> entries persisted between batches
//!     │
//!     └──> Chunk phase (pooled, token-budget batches)
//!            └─> chunk lists attached, store persisted
//! ```
//!
//! Live create/modify/delete/rename events run the same logic at
//! single-document granularity and persist through the debounced writer.
//!
//! ## Example
//!
//! ```no_run
//! use notedex_indexer::{DocumentSource, FsDocumentSource, SemanticIndex, SemanticIndexConfig};
//! use notedex_vector_store::{BatchConfig, BatchScheduler, OpenAiClient, OpenAiConfig, Throttler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Arc::new(OpenAiClient::new(OpenAiConfig::default())?);
//!     let scheduler = BatchScheduler::new(
//!         client,
//!         Arc::new(Throttler::conservative()),
//!         BatchConfig::default(),
//!     );
//!     let index = SemanticIndex::initialize(
//!         SemanticIndexConfig::new("vault/.notedex/index.json"),
//!         scheduler,
//!     )
//!     .await;
//!
//!     let source = FsDocumentSource::new("vault")?;
//!     let stats = index.reconcile_all(&source.enumerate().await?).await?;
//!     println!("updated {} of {} documents", stats.updated, stats.documents);
//!     Ok(())
//! }
//! ```

mod error;
mod hash;
mod reconciler;
mod source;
mod watcher;

pub use error::{IndexerError, Result};
pub use hash::content_fingerprint;
pub use reconciler::{ReconcileStats, SemanticIndex, SemanticIndexConfig};
pub use source::{Document, DocumentSource, FsDocumentSource, STATE_DIR_NAME};
pub use watcher::{NoteWatcher, WatcherConfig};

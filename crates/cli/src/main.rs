mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::CliConfig;
use notedex_indexer::{
    DocumentSource, FsDocumentSource, NoteWatcher, SemanticIndex, SemanticIndexConfig,
    WatcherConfig, STATE_DIR_NAME,
};
use notedex_search::{QueryEngine, QueryOptions};
use notedex_vector_store::{
    BatchConfig, BatchScheduler, CompletionClient, EmbeddingClient, OpenAiClient, OpenAiConfig,
    SearchHit, Throttler,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "notedex", version, about = "Semantic search over a markdown note collection")]
struct Cli {
    /// Root directory of the note collection
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile the index with the current note set
    Index {
        /// Print stats as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search the indexed collection
    Search {
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        results: usize,
        /// Minimum relevance score (strictly greater than)
        #[arg(long, default_value_t = 0.01)]
        threshold: f32,
        /// Score every chunk as its own result
        #[arg(long)]
        all_chunks: bool,
        /// Skip the hypothetical-answer query expansion
        #[arg(long)]
        no_expand: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Index once, then keep the index in sync with filesystem changes
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = config::load(&cli.root)?;
    log::debug!("Configuration loaded for {}", cli.root.display());

    let client = build_client(&config)?;
    let throttler = Arc::new(Throttler::new(
        config.index.requests_per_minute,
        Duration::from_secs(60),
    ));
    let batch = BatchConfig {
        document_batch_size: config.index.document_batch_size,
        chunk_token_budget: config.index.chunk_token_budget,
        ..BatchConfig::default()
    };

    let mut index_config =
        SemanticIndexConfig::new(cli.root.join(STATE_DIR_NAME).join("index.json"));
    index_config.exclusion_prefix = config.index.exclusion_prefix.clone();

    let index = SemanticIndex::initialize(
        index_config,
        BatchScheduler::new(
            Arc::clone(&client) as Arc<dyn EmbeddingClient>,
            Arc::clone(&throttler),
            batch.clone(),
        ),
    )
    .await;

    match cli.command {
        Command::Index { json } => run_index(&cli.root, &index, json).await,
        Command::Search {
            query,
            results,
            threshold,
            all_chunks,
            no_expand,
            json,
        } => {
            let engine = QueryEngine::new(
                Arc::clone(&index),
                BatchScheduler::new(client.clone() as Arc<dyn EmbeddingClient>, throttler, batch),
                Some(client as Arc<dyn CompletionClient>),
            );
            let options = QueryOptions {
                result_count: results,
                relevance_threshold: threshold,
                include_all_chunks: all_chunks,
                expand_query: !no_expand,
            };
            run_search(&engine, &query, &options, json).await
        }
        Command::Watch => run_watch(&cli.root, &index).await,
    }
}

fn build_client(config: &CliConfig) -> anyhow::Result<Arc<OpenAiClient>> {
    let api_key = std::env::var(&config.provider.api_key_env).with_context(|| {
        format!(
            "no API key found in the {} environment variable",
            config.provider.api_key_env
        )
    })?;
    let client = OpenAiClient::new(OpenAiConfig {
        base_url: config.provider.base_url.clone(),
        api_key,
        embedding_model: config.provider.embedding_model.clone(),
        completion_model: config.provider.completion_model.clone(),
        ..OpenAiConfig::default()
    })?;
    Ok(Arc::new(client))
}

async fn run_index(root: &Path, index: &Arc<SemanticIndex>, json: bool) -> anyhow::Result<()> {
    let source = FsDocumentSource::new(root)?;
    let documents = source.enumerate().await?;
    let stats = index.reconcile_all(&documents).await?;
    index.writer().flush().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "Indexed {} documents in {}ms: {} updated, {} unchanged, {} excluded",
            stats.documents, stats.time_ms, stats.updated, stats.unchanged, stats.excluded
        );
        if stats.failed_documents > 0 || stats.failed_chunk_batches > 0 {
            eprintln!(
                "{} documents and {} chunk batches failed to embed; run again to retry them",
                stats.failed_documents, stats.failed_chunk_batches
            );
        }
    }
    Ok(())
}

async fn run_search(
    engine: &QueryEngine,
    query: &str,
    options: &QueryOptions,
    json: bool,
) -> anyhow::Result<()> {
    let hits = engine.search(query, options).await?;

    if json {
        let rows: Vec<serde_json::Value> = hits.iter().map(hit_json).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results above threshold {}", options.relevance_threshold);
        return Ok(());
    }
    for hit in &hits {
        match &hit.chunk {
            Some(chunk) => println!("{:.3}  {}  \u{201c}{}\u{201d}", hit.score, hit.path, snippet(chunk)),
            None => println!("{:.3}  {}", hit.score, hit.path),
        }
    }
    Ok(())
}

fn hit_json(hit: &SearchHit) -> serde_json::Value {
    serde_json::json!({
        "path": hit.path,
        "chunk": hit.chunk,
        "score": hit.score,
    })
}

fn snippet(text: &str) -> String {
    const MAX: usize = 120;
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() <= MAX {
        return flat;
    }
    let mut cut = MAX;
    while cut > 0 && !flat.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &flat[..cut])
}

async fn run_watch(root: &Path, index: &Arc<SemanticIndex>) -> anyhow::Result<()> {
    run_index(root, index, false).await?;

    let watcher = NoteWatcher::start(Arc::clone(index), root, WatcherConfig::default())?;
    println!("Watching {} for changes (Ctrl-C to stop)", root.display());

    tokio::signal::ctrl_c().await?;
    watcher.stop().await;
    index.writer().flush().await;
    println!("Stopped; index flushed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippets_collapse_whitespace_and_bound_length() {
        assert_eq!(snippet("a  b\nc"), "a b c");
        let long = "word ".repeat(60);
        let out = snippet(&long);
        assert!(out.chars().count() <= 121);
        assert!(out.ends_with('…'));
    }
}

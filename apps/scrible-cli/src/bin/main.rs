use std::path::{Path, PathBuf};
use std::slice;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scrible_core::traits::LlmClient;
use scrible_core::types::IngestReport;
use scrible_core::{resolve_with_base, Settings};
use scrible_rag::{discover_documents, OpenAiCompatibleClient, RagSystem};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scrible", version, about = "Local document ingestion, semantic search and question answering")]
struct Cli {
    /// Snapshot directory (defaults to data.snapshot_dir)
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest every .txt/.md/.srt/.vtt file under a directory
    Ingest {
        /// Defaults to data.raw_dir
        dir: Option<PathBuf>,
        /// Ingest at most this many files
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Rank chunks by similarity to a query
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Answer a question from the indexed documents
    Ask {
        question: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Remove a document and its chunks
    Remove { doc_id: String },
    /// Show index statistics
    Stats,
}

fn open_system(settings: &Settings, base: &Path, index_dir: &Path) -> anyhow::Result<RagSystem> {
    let embedder = scrible_embed::from_settings(&settings.embedding, base)?;
    let llm = OpenAiCompatibleClient::from_settings(&settings.llm, Duration::from_secs(settings.timeouts.llm_secs))?
        .map(|c| Arc::new(c) as Arc<dyn LlmClient>);
    if llm.is_none() {
        tracing::info!("no llm.base_url configured, answers use source excerpts");
    }
    Ok(RagSystem::open(settings.clone(), embedder, index_dir)?.with_llm(llm))
}

async fn ingest(system: &RagSystem, dir: &Path, limit: Option<usize>, index_dir: &Path) -> anyhow::Result<()> {
    let mut sources = discover_documents(dir);
    if let Some(limit) = limit {
        println!("🔢 Limiting ingestion to {limit} files");
        sources.truncate(limit);
    }
    println!("Data directory: {} ({} files)", dir.display(), sources.len());

    let pb = ProgressBar::new(sources.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );

    let (mut completed, mut failed, mut chunks) = (0usize, 0usize, 0usize);
    for source in &sources {
        pb.set_message(source.name.clone());
        for report in system.ingest(slice::from_ref(source)).await {
            match report {
                IngestReport::Completed { chunks_created, .. } => {
                    completed += 1;
                    chunks += chunks_created;
                }
                IngestReport::Failed { doc_id, error } => {
                    failed += 1;
                    pb.println(format!("❌ {doc_id}: {error}"));
                }
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    let stats = system.save(index_dir)?;
    println!("\n✅ Ingestion finished: {completed} documents, {chunks} chunks added, {failed} failed");
    println!("📊 Index now holds {} chunks from {} documents", stats.total_chunks, stats.total_documents);
    println!("💾 Snapshot written to {}", index_dir.display());
    Ok(())
}

async fn search(system: &RagSystem, query: &str, k: usize) -> anyhow::Result<()> {
    let results = system.search(query, k).await?;
    println!("🔍 Found {} results for: \"{}\"", results.len(), query);
    for (i, r) in results.iter().enumerate() {
        println!("\n  {}. score={:.4}  doc={}  chunk={}  type={}", i + 1, r.similarity_score, r.document_name, r.chunk_index, r.document_type);
        println!("     📝 Content: {}", r.content);
    }
    Ok(())
}

async fn ask(system: &RagSystem, question: &str, k: usize) -> anyhow::Result<()> {
    let answer = system.answer(question, k).await?;
    println!("💬 {}\n", answer.answer);
    println!("Confidence: {:.2}", answer.confidence);
    for s in &answer.sources {
        println!("  📄 {} ({}) similarity={:.4}\n     {}", s.document, s.document_type, s.similarity, s.excerpt);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let base = PathBuf::from(".");
    let settings = Settings::load_from(&base).map_err(|e| {
        eprintln!("Error loading config: {e:#}");
        e
    })?;
    let index_dir = cli.index_dir.clone().unwrap_or_else(|| resolve_with_base(&base, &settings.data.snapshot_dir));
    let system = open_system(&settings, &base, &index_dir)?;

    match cli.command {
        Command::Ingest { dir, limit } => {
            let dir = dir.unwrap_or_else(|| resolve_with_base(&base, &settings.data.raw_dir));
            ingest(&system, &dir, limit, &index_dir).await?;
        }
        Command::Search { query, limit } => search(&system, &query, limit.unwrap_or(settings.retrieval.default_k)).await?,
        Command::Ask { question, limit } => ask(&system, &question, limit.unwrap_or(settings.retrieval.answer_k)).await?,
        Command::Remove { doc_id } => {
            let removed = system.remove_document(&doc_id)?;
            system.save(&index_dir)?;
            println!("🗑️  Removed {removed} chunks of {doc_id}");
        }
        Command::Stats => {
            let stats = system.stats()?;
            println!("📊 Index statistics\n===================");
            println!("Chunks:     {}", stats.total_chunks);
            println!("Documents:  {}", stats.total_documents);
            match stats.embedding_dimension {
                Some(dim) => println!("Dimension:  {dim}"),
                None => println!("Dimension:  (empty index)"),
            }
            println!("Index type: {}", stats.index_type);
            println!("Snapshot:   {}", index_dir.display());
        }
    }
    Ok(())
}

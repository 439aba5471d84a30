use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use hybridtm::config::HtmConfig;
use hybridtm::embedding::model2vec::Model2VecEmbedder;
use hybridtm::embedding::Embedder;
use hybridtm::engine::Engine;
use hybridtm::ingest::importer::run_import;
use hybridtm::ingest::progress::StderrProgress;
use hybridtm::ingest::tmx::{ingest_tmx, TmxOptions};
use hybridtm::ingest::xliff::{ingest_xliff, XliffOptions};
use hybridtm::store::lance::LanceVectorStore;
use hybridtm::store::VectorStore;

#[derive(Debug, Parser)]
#[command(name = "hybridtm")]
#[command(version)]
#[command(about = "Hybrid lexical + vector translation-memory engine over XLIFF/TMX")]
struct Cli {
    /// Path to the LanceDB directory used for this engine instance. Defaults
    /// to a `hybridtm` directory under the platform data dir.
    #[arg(long)]
    db: Option<PathBuf>,

    /// HuggingFace Hub repo id (or local path) for the Model2Vec embedding model.
    #[arg(long, default_value = "minishlab/potion-base-8M")]
    embed_model: String,

    /// Optional JSON config file (see `HtmConfig`). Missing/unparsable falls back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest an XLIFF 2.x or TMX 1.4b file into the store.
    Ingest {
        /// Path to a `.xlf`/`.xliff` or `.tmx` file.
        file: PathBuf,
    },
    /// Monolingual semantic search.
    Search {
        query: String,
        #[arg(long)]
        language: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Case-insensitive substring search with full language mapping.
    Concordance {
        fragment: String,
        #[arg(long)]
        language: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Bilingual translation search with target pairing and ranking.
    TranslationSearch {
        query: String,
        #[arg(long)]
        src_lang: String,
        #[arg(long)]
        tgt_lang: String,
        #[arg(long, default_value_t = 40)]
        min_score: u8,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

/// Falls back to the current directory when the platform has no known data
/// dir (e.g. a stripped-down container).
fn default_db_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("hybridtm").join("store")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = cli
        .config
        .as_deref()
        .map(HtmConfig::load_or_default)
        .unwrap_or_default();

    let embedder = Model2VecEmbedder::from_pretrained(&cli.embed_model).context("failed to load embedding model")?;
    let dim = embedder.probe_dimension().context("failed to probe embedding dimension")?;

    let db_dir = cli.db.clone().unwrap_or_else(default_db_dir);
    let db_path = db_dir.to_string_lossy().to_string();
    let store = match LanceVectorStore::open_or_create(&db_path, dim).await {
        Ok(store) => store,
        Err(e) => anyhow::bail!("failed to open vector store at {db_path}: {e}"),
    };

    let engine = Engine::new(embedder, store, db_path.clone());

    match cli.cmd {
        Command::Ingest { file } => run_ingest(&engine, &file, &cfg).await?,
        Command::Search { query, language, limit } => {
            let hits = engine.semantic_search(&query, &language, limit, None).await?;
            for hit in hits {
                println!("{}\t{}", hit.id, hit.pure_text);
            }
        }
        Command::Concordance { fragment, language, limit } => {
            let mappings = engine.concordance_search(&fragment, &language, limit, None).await?;
            for mapping in mappings {
                println!("{}", serde_json::to_string(&mapping)?);
            }
        }
        Command::TranslationSearch {
            query,
            src_lang,
            tgt_lang,
            min_score,
            limit,
        } => {
            let matches = engine
                .semantic_translation_search(&query, &src_lang, &tgt_lang, min_score, limit, None)
                .await?;
            for m in matches {
                println!("[rank {:.1}, hybrid semantic={} fuzzy={}] {} -> {}", m.rank, m.semantic, m.fuzzy, m.source_element, m.target_element);
            }
        }
    }

    Ok(())
}

async fn run_ingest<E: Embedder, S: VectorStore>(engine: &Engine<E, S>, file: &PathBuf, cfg: &HtmConfig) -> Result<()> {
    let extension = file.extension().and_then(|e| e.to_str()).unwrap_or_default().to_lowercase();

    let output = match extension.as_str() {
        "tmx" => ingest_tmx(file, &TmxOptions::from(cfg))?,
        "xlf" | "xliff" => ingest_xliff(file, &XliffOptions::from(cfg))?,
        other => anyhow::bail!("unrecognized bilingual file extension: .{other}"),
    };

    // Bypasses `store_lang_entry`'s per-row idempotence check — file
    // ingestion is a bulk delete-then-insert path.
    let processed = run_import(
        &output.jsonl_path,
        output.entry_count,
        cfg.batch_size,
        engine.embedder(),
        engine.store(),
        &StderrProgress::new(),
    )
    .await?;
    eprintln!("imported {processed} entries from {}", file.display());
    Ok(())
}

use chrono::Utc;
use clap::{Parser, Subcommand};
use knowledge_search_core::{
    AugmenterConfig, HttpAugmenter, KnowledgeBase, KnowledgeOptions, SearchQuery,
    DEFAULT_MAX_CHUNK_CHARS,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "knowledge-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding documents.json and the uploads folder
    #[arg(long, env = "KNOWLEDGE_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Maximum characters per chunk; longer single sentences stay whole
    #[arg(long, env = "KNOWLEDGE_MAX_CHUNK_CHARS", default_value_t = DEFAULT_MAX_CHUNK_CHARS)]
    max_chunk_chars: usize,

    /// OpenAI-compatible base URL used to generate answers from search results
    #[arg(long, env = "KNOWLEDGE_AUGMENT_URL")]
    augment_url: Option<String>,

    /// Model name sent to the answer endpoint
    #[arg(long, env = "KNOWLEDGE_AUGMENT_MODEL", default_value = "gpt-4o-mini")]
    augment_model: String,

    /// Bearer token for the answer endpoint
    #[arg(long, env = "KNOWLEDGE_AUGMENT_API_KEY", hide_env_values = true)]
    augment_api_key: Option<String>,

    /// Seconds to wait for a generated answer
    #[arg(long, env = "KNOWLEDGE_AUGMENT_TIMEOUT_SECS", default_value = "30")]
    augment_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one document or every supported document in a folder.
    Ingest {
        /// Document to ingest.
        #[arg(long, conflicts_with = "folder", required_unless_present = "folder")]
        file: Option<PathBuf>,
        /// Folder to ingest recursively.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Category label stored with the document.
        #[arg(long, default_value = "general")]
        category: String,
        /// Declared media type; inferred from the extension when omitted.
        #[arg(long, requires = "file")]
        media_type: Option<String>,
    },
    /// List stored documents.
    List,
    /// Delete a document and its stored upload.
    Delete {
        /// Document id as shown by `list`.
        #[arg(long)]
        id: String,
    },
    /// Rank stored chunks against a query.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of chunks to return.
        #[arg(long, default_value = "5")]
        limit: usize,
        /// Only search documents in this category.
        #[arg(long)]
        category: Option<String>,
        /// Print the response as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let options = KnowledgeOptions {
        data_dir: cli.data_dir.clone(),
        max_chunk_chars: cli.max_chunk_chars,
    };
    let mut kb = KnowledgeBase::new(&options)?;

    if let Some(endpoint) = &cli.augment_url {
        let config = AugmenterConfig {
            endpoint: endpoint.clone(),
            model: cli.augment_model.clone(),
            api_key: cli.augment_api_key.clone(),
            timeout: Duration::from_secs(cli.augment_timeout_secs),
        };
        match HttpAugmenter::new(&config) {
            Ok(augmenter) => kb = kb.with_augmenter(augmenter, config.timeout),
            Err(error) => warn!(%error, endpoint = %endpoint, "answer augmentation disabled"),
        }
    }

    info!(
        version = app_version,
        data_dir = %options.data_dir.display(),
        started_at = %Utc::now().to_rfc3339(),
        "knowledge-search boot"
    );

    match cli.command {
        Command::Ingest {
            file,
            folder,
            category,
            media_type,
        } => {
            if let Some(folder) = folder {
                let report = kb.ingest_folder(&folder, &category).await?;

                if !report.skipped_files.is_empty() {
                    warn!(
                        "skipped_files={} for folder={}",
                        report.skipped_files.len(),
                        folder.display()
                    );
                    for skipped in &report.skipped_files {
                        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped document");
                    }
                }

                println!(
                    "{} documents ingested ({} chunks) at {}",
                    report.receipts.len(),
                    report.chunk_count(),
                    Utc::now().to_rfc3339()
                );
            } else if let Some(file) = file {
                let receipt = kb
                    .ingest_file(&file, &category, media_type.as_deref())
                    .await?;
                println!(
                    "ingested id={} filename={} chunks={}",
                    receipt.id, receipt.filename, receipt.chunk_count
                );
            }
        }
        Command::List => {
            let documents = kb.list().await?;
            if documents.is_empty() {
                println!("no documents");
            }
            for document in documents {
                println!(
                    "{} [{}] {} chunks={} created_at={}",
                    document.id,
                    document.category,
                    document.filename,
                    document.chunks.len(),
                    document.created_at.to_rfc3339()
                );
            }
        }
        Command::Delete { id } => {
            kb.delete(&id).await?;
            println!("deleted {id}");
        }
        Command::Search {
            query,
            limit,
            category,
            json,
        } => {
            let mut search_query = SearchQuery::new(query).with_limit(limit);
            if let Some(category) = category {
                search_query = search_query.with_category(category);
            }

            let response = kb.search(&search_query).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }

            println!("query: {}", response.query);
            if response.results.is_empty() {
                println!("no matching chunks");
            }
            for result in &response.results {
                println!(
                    "[{}] score={} category={}",
                    result.filename, result.score, result.category
                );
                println!("  {}", result.content);
            }
            if !response.sources.is_empty() {
                println!("sources: {}", response.sources.join(", "));
            }
            if let Some(answer) = &response.answer {
                println!("answer:\n{answer}");
            }
        }
    }

    Ok(())
}

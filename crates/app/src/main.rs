use chrono::Utc;
use clap::{Parser, Subcommand};
use manual_qa_core::{
    build_language_model, corpus_stats, process_and_index, ChatAnswer, ChunkingConfig, Embedder,
    HashEmbedder, HttpEmbedder, LlmConfig, LlmProvider, ManualChatbot, OcrClient, QaOptions,
    QdrantStore, QueryFilter, StoreOptions, VectorStoreManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "manual-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection holding the manual chunks
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "officina_manuali")]
    collection: String,

    /// LLM provider: anthropic or openai
    #[arg(long, env = "LLM_PROVIDER", default_value = "anthropic")]
    llm_provider: String,

    /// Chat model name; defaults to a provider-appropriate model
    #[arg(long, env = "LLM_MODEL")]
    llm_model: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, default_value = "")]
    anthropic_api_key: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    openai_api_key: String,

    /// OpenAI-compatible embeddings endpoint
    #[arg(long, env = "EMBEDDING_ENDPOINT", default_value = "https://api.openai.com")]
    embedding_endpoint: String,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-ada-002")]
    embedding_model: String,

    /// Use the local hashing embedder instead of the HTTP embedding
    /// service (offline runs and smoke tests)
    #[arg(long, default_value_t = false)]
    offline_embedder: bool,

    /// Number of chunks retrieved per question
    #[arg(long, default_value = "5")]
    retrieval_k: usize,

    /// Minimum similarity score; 0 disables the threshold
    #[arg(long, default_value = "0.7")]
    similarity_threshold: f32,

    /// Overall answer deadline in seconds; 0 disables the deadline
    #[arg(long, default_value = "0")]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a folder of PDF manuals into the vector index.
    Ingest {
        /// Folder scanned recursively for `BRAND_MODEL_YEAR_TYPE.pdf` files.
        #[arg(long)]
        folder: String,
        /// Re-read low-text (scanned) PDFs through the OCR endpoint.
        #[arg(long, default_value_t = false)]
        use_ocr: bool,
    },
    /// Ask a single question, optionally scoped to brand/model/year.
    Ask {
        question: String,
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        year: Option<String>,
        /// Omit source citations from the output.
        #[arg(long, default_value_t = false)]
        no_sources: bool,
    },
    /// Interactive session with conversation memory.
    Chat {
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Show vector index statistics.
    Stats,
    /// Show the on-disk corpus inventory grouped by brand.
    Corpus {
        #[arg(long)]
        folder: String,
    },
    /// Remove every vector from the index. Requires --confirm.
    DeleteAll {
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
    /// Remove vectors matching the given metadata. Requires --confirm.
    DeleteFilter {
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

fn build_filter(brand: Option<String>, model: Option<String>, year: Option<String>) -> QueryFilter {
    let mut filter = QueryFilter::new();
    if let Some(brand) = brand {
        filter = filter.brand(brand.to_uppercase());
    }
    if let Some(model) = model {
        filter = filter.model(model);
    }
    if let Some(year) = year {
        filter = filter.year(year);
    }
    filter
}

impl Cli {
    fn embedder(&self) -> Arc<dyn Embedder> {
        if self.offline_embedder {
            Arc::new(HashEmbedder::default())
        } else {
            Arc::new(HttpEmbedder::new(
                &self.embedding_endpoint,
                &self.openai_api_key,
                &self.embedding_model,
            ))
        }
    }

    fn store(&self) -> VectorStoreManager<QdrantStore> {
        let index = QdrantStore::new(&self.qdrant_url, &self.collection);
        let options = StoreOptions {
            retrieval_k: self.retrieval_k,
            similarity_threshold: self.similarity_threshold,
            ..StoreOptions::default()
        };
        VectorStoreManager::with_options(index, self.embedder(), options)
    }

    fn llm_config(&self) -> anyhow::Result<LlmConfig> {
        let provider: LlmProvider = self.llm_provider.parse()?;
        let (api_key, default_model) = match provider {
            LlmProvider::Anthropic => (&self.anthropic_api_key, "claude-sonnet-4-5"),
            LlmProvider::OpenAi => (&self.openai_api_key, "gpt-4-turbo-preview"),
        };

        Ok(LlmConfig {
            provider,
            api_key: api_key.clone(),
            model: self
                .llm_model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
        })
    }

    fn qa_options(&self) -> QaOptions {
        QaOptions {
            retrieval_k: self.retrieval_k,
            similarity_threshold: (self.similarity_threshold > 0.0)
                .then_some(self.similarity_threshold),
            answer_timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            ..QaOptions::default()
        }
    }

    fn chatbot(&self, with_memory: bool) -> anyhow::Result<ManualChatbot<QdrantStore>> {
        let llm = build_language_model(&self.llm_config()?)?;
        let store = self.store();
        Ok(if with_memory {
            ManualChatbot::with_memory(llm, store, self.qa_options())
        } else {
            ManualChatbot::new(llm, store, self.qa_options())
        })
    }
}

fn print_answer(response: &ChatAnswer) {
    println!("{}\n", response.answer);

    for source in &response.sources {
        let year = if source.year == "N/A" {
            String::new()
        } else {
            format!(" ({})", source.year)
        };
        println!(
            "{}. {} {}{} - pagina {}",
            source.index, source.brand, source.model, year, source.page
        );
        println!("   {}", source.filename);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "manual-qa boot"
    );

    match &cli.command {
        Command::Ingest { folder, use_ocr } => {
            let manager = cli.store();
            let ocr = OcrClient::from_env();
            let report = process_and_index(
                &manager,
                std::path::Path::new(folder),
                *use_ocr,
                ocr.as_ref(),
                &ChunkingConfig::default(),
            )
            .await
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            for skipped in &report.skipped {
                println!(
                    "skipped {}: {}",
                    skipped.path.display(),
                    skipped.reason
                );
            }
            println!(
                "{} chunks indexed from {} manuals ({} via ocr, {} skipped)",
                report.chunks_indexed,
                report.files_processed,
                report.ocr_files,
                report.skipped.len()
            );
        }
        Command::Ask {
            question,
            brand,
            model,
            year,
            no_sources,
        } => {
            let mut chatbot = cli.chatbot(false)?;
            let filter = build_filter(brand.clone(), model.clone(), year.clone());
            let filter = (!filter.is_empty()).then_some(&filter);
            let response = chatbot.ask(question, filter, !no_sources).await;
            print_answer(&response);
        }
        Command::Chat { brand, model } => {
            let mut chatbot = cli.chatbot(true)?;
            let filter = build_filter(brand.clone(), model.clone(), None);
            let filter = (!filter.is_empty()).then_some(&filter);

            println!("manual-qa chat: ':clear' resets the session, ':exit' quits");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut stdout = tokio::io::stdout();

            loop {
                stdout.write_all(b"> ").await?;
                stdout.flush().await?;

                let Some(line) = lines.next_line().await? else {
                    break;
                };
                let question = line.trim();

                match question {
                    "" => continue,
                    ":exit" => break,
                    ":clear" => {
                        chatbot.clear_memory();
                        println!("session cleared");
                    }
                    _ => {
                        let response = chatbot.ask(question, filter, true).await;
                        print_answer(&response);
                    }
                }
            }
        }
        Command::Stats => {
            let manager = cli.store();
            let stats = manager
                .stats()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("collection: {}", cli.collection);
            println!("vectors:    {}", stats.total_vector_count);
            println!("dimension:  {}", stats.dimension);
        }
        Command::Corpus { folder } => {
            let stats = corpus_stats(std::path::Path::new(folder));
            println!("manuals: {}", stats.total_manuals);
            for (brand, count) in &stats.by_brand {
                println!("  {brand}: {count}");
            }
        }
        Command::DeleteAll { confirm } => {
            let manager = cli.store();
            manager
                .delete_all(*confirm)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("all vectors deleted");
        }
        Command::DeleteFilter {
            brand,
            model,
            year,
            confirm,
        } => {
            let filter = build_filter(brand.clone(), model.clone(), year.clone());
            if filter.is_empty() {
                anyhow::bail!("delete-filter needs at least one of --brand/--model/--year");
            }
            let manager = cli.store();
            manager
                .delete_by_filter(&filter, *confirm)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("matching vectors deleted");
        }
    }

    Ok(())
}

mod display;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pagebot_ai::{CompletionClient, OpenAiCompatProvider, RetryPolicy};
use pagebot_core::PipelineConfig;
use pagebot_core::config::{DEFAULT_MODEL, DEFAULT_STATUS_PROPERTY};
use pagebot_host::{AppState, Outcome, Pipeline};
use pagebot_notion::http::{DEFAULT_BASE_URL, NOTION_VERSION};
use pagebot_notion::{DocumentStore, NotionClient};
use pagebot_store::FileCache;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "pagebot",
    version,
    about = "Extracts merchant offers from Notion pages when they are marked ready"
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server.
    Serve {
        /// Address to bind the HTTP server to (host:port).
        #[arg(long, env = "PAGEBOT_BIND", default_value = "127.0.0.1:5000")]
        bind: SocketAddr,
    },
    /// Run the extraction for one page, without a webhook.
    Extract { page_id: String },
    /// Print a page's properties and content.
    Show { page_id: String },
}

#[derive(Args)]
struct Settings {
    /// Notion integration token.
    #[arg(long, env = "NOTION_INTERNAL_INTEGRATION_SECRET", hide_env_values = true)]
    notion_api_key: String,

    #[arg(long, env = "NOTION_BASE_URL", default_value = DEFAULT_BASE_URL)]
    notion_base_url: String,

    #[arg(long, env = "NOTION_VERSION", default_value = NOTION_VERSION)]
    notion_version: String,

    /// Shared secret used to verify webhook signatures.
    #[arg(long, env = "NOTION_INTEGRATION_SECRET", hide_env_values = true)]
    webhook_secret: Option<String>,

    /// Select property holding the processing status.
    #[arg(long, env = "PAGEBOT_STATUS_PROPERTY", default_value = DEFAULT_STATUS_PROPERTY)]
    status_property: String,

    /// Base URL of an OpenAI-compatible chat completions API.
    #[arg(
        long,
        env = "LLM_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta/openai"
    )]
    llm_base_url: String,

    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    #[arg(long, env = "LLM_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Seconds before a completion request times out.
    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value_t = 120)]
    llm_timeout_secs: u64,

    /// Directory holding cached completions.
    #[arg(long, env = "PAGEBOT_CACHE_DIR", default_value = "cache")]
    cache_dir: PathBuf,

    /// Attempts per completion when rate limited.
    #[arg(long, env = "PAGEBOT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Base backoff in seconds; doubled after each rate-limited attempt.
    #[arg(long, env = "PAGEBOT_BACKOFF_SECS", default_value_t = 5)]
    backoff_secs: u64,
}

impl Settings {
    fn notion(&self) -> NotionClient {
        NotionClient::new(self.notion_api_key.clone(), &self.notion_base_url)
            .with_version(self.notion_version.clone())
    }

    fn completions(&self) -> Result<CompletionClient> {
        let api_key = self
            .llm_api_key
            .as_deref()
            .context("LLM_API_KEY is required to run extractions")?;
        let provider = OpenAiCompatProvider::new(
            api_key,
            &self.llm_base_url,
            Duration::from_secs(self.llm_timeout_secs),
        )
        .context("building completion provider")?;
        let cache = FileCache::open(&self.cache_dir)
            .with_context(|| format!("opening cache dir {}", self.cache_dir.display()))?;
        let retry = RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: Duration::from_secs(self.backoff_secs),
        };
        Ok(CompletionClient::new(Arc::new(provider), Arc::new(cache)).with_retry(retry))
    }

    fn pipeline(&self) -> Result<Pipeline> {
        let config = PipelineConfig::new(self.model.clone())
            .with_status_property(self.status_property.clone());
        Ok(Pipeline::new(
            Arc::new(self.notion()),
            Arc::new(self.completions()?),
            config,
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    info!("pagebot v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { bind } => {
            let pipeline = Arc::new(cli.settings.pipeline()?);
            if cli.settings.webhook_secret.is_none() {
                tracing::warn!("NOTION_INTEGRATION_SECRET not set; signed webhooks will be refused");
            }
            let state = AppState::new(pipeline, cli.settings.webhook_secret.clone());
            pagebot_host::serve(bind, state).await
        }
        Commands::Extract { page_id } => extract(&cli.settings, &page_id).await,
        Commands::Show { page_id } => show(&cli.settings, &page_id).await,
    }
}

async fn extract(settings: &Settings, page_id: &str) -> Result<()> {
    let pipeline = settings.pipeline()?;
    let result = pipeline.process_page(page_id).await;

    let summary = pipeline.completions().history().summary();
    match &result {
        Ok(Outcome::Completed { result: extraction, .. }) => {
            println!("Extracted: {}", extraction.to_pretty_json()?);
        }
        Ok(Outcome::Skipped(status)) => println!("Skipped: page status is {status}"),
        Ok(Outcome::Lost) => println!("Skipped: page was claimed by another worker"),
        Ok(Outcome::Ignored) => println!("Ignored"),
        Err(e) => println!("Failed: {e}"),
    }
    println!(
        "Completions: {} call(s), ${:.6}, {:.2}s",
        summary.calls, summary.total_cost_dollars, summary.total_duration_seconds
    );

    result
        .map(|_| ())
        .with_context(|| format!("extracting page {page_id}"))
}

async fn show(settings: &Settings, page_id: &str) -> Result<()> {
    let notion = settings.notion();
    let page = notion
        .get_page(page_id)
        .await
        .with_context(|| format!("fetching page {page_id}"))?;
    let blocks = notion
        .get_page_content(page_id)
        .await
        .with_context(|| format!("fetching content of {page_id}"))?;
    display::print_page(&page, &blocks, &settings.status_property);
    Ok(())
}

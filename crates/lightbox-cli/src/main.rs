use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lightbox_client::{
    DomIdentityResolver, GraphqlClient, GraphqlConfig, HtmlDocument, HtmlElement, Pipeline,
};
use lightbox_core::{ExtractionOptions, IdentityResolver, OrchestratorConfig, ServiceConfig};

#[derive(Parser)]
#[command(name = "lightbox", version, about = "Tweet media extraction for gallery viewers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the media gallery for a clicked element
    Extract {
        /// HTML snapshot of the page
        #[arg(long)]
        html: PathBuf,

        /// CSS selector of the clicked element (first match wins)
        #[arg(short, long)]
        selector: String,

        /// URL the snapshot was taken from
        #[arg(short, long, env = "LIGHTBOX_PAGE_URL")]
        page_url: Option<String>,

        /// Skip the GraphQL strategy and use the DOM strategies only
        #[arg(long, default_value_t = false)]
        no_api: bool,

        /// Per-extraction timeout before the DOM-only fallback
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Retries for the tweet lookup
        #[arg(long)]
        max_retries: Option<u32>,

        /// Run the extraction this many times (later runs hit the cache)
        #[arg(long, default_value_t = 1)]
        repeat: usize,
    },

    /// Print the tweet identity resolved for an element
    Identify {
        /// HTML snapshot of the page
        #[arg(long)]
        html: PathBuf,

        /// CSS selector of the element
        #[arg(short, long)]
        selector: String,

        /// URL the snapshot was taken from
        #[arg(short, long, env = "LIGHTBOX_PAGE_URL")]
        page_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lightbox=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            html,
            selector,
            page_url,
            no_api,
            timeout_ms,
            max_retries,
            repeat,
        } => {
            let options = ExtractionOptions {
                timeout_ms,
                max_retries,
            };
            cmd_extract(&html, &selector, page_url.as_deref(), no_api, &options, repeat).await?;
        }
        Commands::Identify {
            html,
            selector,
            page_url,
        } => {
            cmd_identify(&html, &selector, page_url.as_deref())?;
        }
    }

    Ok(())
}

/// Parse the snapshot and pick the element `selector` points at.
fn load_element(path: &Path, selector: &str, page_url: Option<&str>) -> Result<HtmlElement> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read HTML snapshot: {}", path.display()))?;
    let doc = HtmlDocument::parse_with_url(&source, page_url);
    doc.select_first(selector)
        .map_err(|e| anyhow::anyhow!(e))?
        .with_context(|| format!("No element matches selector '{selector}'"))
}

async fn cmd_extract(
    html: &Path,
    selector: &str,
    page_url: Option<&str>,
    no_api: bool,
    options: &ExtractionOptions,
    repeat: usize,
) -> Result<()> {
    let element = load_element(html, selector, page_url)?;

    let orchestrator_config =
        OrchestratorConfig::from_env().context("Invalid orchestrator configuration")?;
    let mut service_config = ServiceConfig::from_env().context("Invalid service configuration")?;
    if no_api {
        service_config.api_enabled = false;
    }

    let mut pipeline = Pipeline::new(orchestrator_config, service_config.clone());
    if service_config.api_enabled {
        let graphql = GraphqlConfig::from_env().context("Invalid GraphQL configuration")?;
        let client = GraphqlClient::new(graphql).context("Failed to create HTTP client")?;
        pipeline = pipeline.lookup(client);
    }
    let service = pipeline.build();

    for run in 1..=repeat.max(1) {
        let result = service
            .extract(&element, options)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        tracing::info!(
            run,
            success = result.success,
            strategy = %result.metadata.strategy,
            media = result.media_items.len(),
            cache_hit = ?result.metadata.cache_hit,
            "Extraction finished"
        );
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    service.dispose();
    Ok(())
}

fn cmd_identify(html: &Path, selector: &str, page_url: Option<&str>) -> Result<()> {
    let element = load_element(html, selector, page_url)?;
    let tweet = DomIdentityResolver::new().resolve(&element);

    if tweet.is_none() {
        tracing::info!("No tweet identity found for '{}'", selector);
    }
    println!("{}", serde_json::to_string_pretty(&tweet)?);
    Ok(())
}

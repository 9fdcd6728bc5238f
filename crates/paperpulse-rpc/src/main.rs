//! PaperPulse RPC Server - chat events endpoint for paper digests.
//!
//! Receives message events over HTTP, acknowledges them right away and
//! posts the digests back as follow-up replies.

mod handler;
mod responder;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use paperpulse_core::cache::default_db_path;
use paperpulse_core::{
    ArxivClient, CacheBackend, DeeplCredentials, DeeplTranslator, MemoryCache, Pipeline,
    Responder, SqliteCache, TwitterCredentials, TwitterSearch,
};
use responder::{LogResponder, WebhookResponder};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "paperpulse-rpc")]
#[command(about = "Chat events endpoint for PaperPulse paper digests")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "3000", env = "PORT")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Cache database file (defaults to the user cache directory)
    #[arg(long, env = "PAPERPULSE_CACHE_DB")]
    cache_db: Option<PathBuf>,

    /// Keep the cache in memory instead of on disk
    #[arg(long, conflicts_with = "cache_db")]
    memory_cache: bool,

    /// URL that receives follow-up replies as JSON (logged when unset)
    #[arg(long, env = "PAPERPULSE_REPLY_URL")]
    reply_url: Option<String>,
}

fn open_cache(args: &Args) -> Result<Arc<dyn CacheBackend>> {
    if args.memory_cache {
        info!("Using in-memory cache");
        return Ok(Arc::new(MemoryCache::new()));
    }
    let path = match &args.cache_db {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    info!("Cache database: {}", path.display());
    let cache = SqliteCache::open(&path)
        .with_context(|| format!("failed to open cache at {}", path.display()))?;
    Ok(Arc::new(cache))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting PaperPulse RPC Server");

    let credentials = TwitterCredentials::from_env()
        .context("set TWITTER_BEARER_TOKEN, or TWITTER_API_KEY and TWITTER_API_SECRET_KEY")?;
    let search = TwitterSearch::new(credentials)?;
    let arxiv = ArxivClient::new()?;

    let mut builder = Pipeline::builder(Arc::new(search), Arc::new(arxiv))
        .with_cache_backend(open_cache(&args)?);

    let deepl = DeeplCredentials::from_env();
    if deepl.is_empty() {
        warn!("No DeepL keys configured, summaries will not be translated");
    } else {
        builder = builder.with_translator(Arc::new(DeeplTranslator::new(deepl)?));
    }
    let pipeline = builder.build()?;

    let responder: Arc<dyn Responder> = match &args.reply_url {
        Some(url) => Arc::new(WebhookResponder::new(url.clone())?),
        None => Arc::new(LogResponder),
    };

    let state = server::AppState {
        pipeline: Arc::new(pipeline),
        responder,
    };
    let addr = server::start_server(state, &args.host, args.port).await?;

    info!("RPC server running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}

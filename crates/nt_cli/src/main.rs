use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nt_core::{EventKind, Location, RequestContext};
use nt_service::{ArticleService, DEFAULT_TRENDING_LIMIT};
use nt_trending::TrendingCache;
use nt_web::AppState;
use tracing::info;
#[cfg(not(feature = "redis"))]
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod config;

use config::Settings;

#[derive(Parser, Debug)]
#[command(name = "nt", author, version, about = "Contextual news retrieval", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    settings: Settings,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: IpAddr,
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
        /// JSON file to load before serving
        #[arg(long)]
        load: Option<String>,
    },
    /// Load articles from a JSON file
    Load {
        file: String,
    },
    /// Answer a free-text query
    Query {
        text: String,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// Show trending articles around a point
    Trending {
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, default_value_t = DEFAULT_TRENDING_LIMIT)]
        limit: usize,
    },
    /// Record a view or click
    Record {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        article_id: String,
        #[arg(long, default_value = "view")]
        event_type: EventKind,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
}

fn init_tracing(level: &str) {
    // RUST_LOG wins over --log-level when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn create_cache(settings: &Settings) -> Result<TrendingCache> {
    let ttl = settings.cache_ttl.0;
    match settings.redis_url.as_deref() {
        Some(url) => redis_cache(url, ttl).await,
        None => Ok(TrendingCache::in_memory(ttl)),
    }
}

#[cfg(feature = "redis")]
async fn redis_cache(url: &str, ttl: Duration) -> Result<TrendingCache> {
    let store = nt_trending::RedisCacheStore::connect(url)
        .await
        .context("failed to connect to Redis")?;
    info!("🗄️ Trending cache backed by Redis");
    Ok(TrendingCache::new(Arc::new(store), ttl))
}

#[cfg(not(feature = "redis"))]
async fn redis_cache(url: &str, ttl: Duration) -> Result<TrendingCache> {
    warn!(redis_url = url, "Built without the redis feature; using the in-process trending cache");
    Ok(TrendingCache::in_memory(ttl))
}

async fn build_service(settings: &Settings) -> Result<ArticleService> {
    let storage = nt_storage::create_storage(&settings.database_url)
        .await
        .context("failed to open storage")?;

    let config = settings.inference_config();
    let dimensions = config.dimensions()?;
    let model = nt_inference::create_model(Some(config)).await?;
    info!(model = model.name(), dimensions, "🧠 Inference model initialized");

    let cache = create_cache(settings).await?;
    Ok(ArticleService::new(storage, model, dimensions, cache))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn public(articles: Vec<nt_core::Article>) -> Vec<nt_core::Article> {
    articles.into_iter().map(nt_core::Article::without_embedding).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.settings.validate()?;
    init_tracing(&cli.settings.log_level);

    let service = build_service(&cli.settings).await?;
    let timeout = cli.settings.request_timeout.0;

    match cli.command {
        Commands::Serve { host, port, load } => {
            if let Some(file) = load {
                let stats = service.load_from_json(&file).await?;
                info!(file = %file, stored = stats.success_count, failed = stats.error_count, "Preloaded articles");
            }
            let state = AppState::new(Arc::new(service)).with_request_timeout(timeout);
            nt_web::serve(state, SocketAddr::new(host, port)).await?;
        }
        Commands::Load { file } => {
            let stats = service.load_from_json(&file).await?;
            print_json(&stats)?;
            if stats.is_rejected() {
                anyhow::bail!("{} rejected: {} validation errors", file, stats.validation_errors.len());
            }
        }
        Commands::Query { text, lat, lon } => {
            let location = match (lat, lon) {
                (Some(lat), Some(lon)) => Some(Location::new(lat, lon)?),
                _ => None,
            };
            let ctx = RequestContext::with_timeout(timeout);
            let articles = service.process_query(&ctx, &text, location).await?;
            print_json(&public(articles))?;
        }
        Commands::Trending { lat, lon, limit } => {
            let ctx = RequestContext::with_timeout(timeout);
            let articles = service.trending(&ctx, Location::new(lat, lon)?, limit).await?;
            print_json(&public(articles))?;
        }
        Commands::Record {
            user_id,
            article_id,
            event_type,
            lat,
            lon,
        } => {
            let event = service
                .record_interaction(&user_id, &article_id, event_type, Location::new(lat, lon)?)
                .await?;
            print_json(&event)?;
        }
    }

    Ok(())
}

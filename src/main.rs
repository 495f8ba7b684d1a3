//! Data-quality backend
//!
//! Client-record validation and anomaly reporting over the primary store
//! and the legacy core-banking store, with demo data as the last resort.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dataquality_backend::{
    api,
    availability::AvailabilityManager,
    config::AppConfig,
    gateway::Gateway,
    rules::{CustomRegistry, RuleBook, RuleCatalog},
    service::DataQualityService,
    store::{LegacyStore, SqliteStore},
};

#[derive(Parser, Debug)]
#[command(name = "dataquality")]
#[command(about = "Client data-quality rule engine and anomaly reporting API")]
struct Args {
    /// HTTP bind address
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// JSON rule catalog (built-in catalog when absent)
    #[arg(long, env = "RULES_PATH")]
    rules: Option<PathBuf>,

    /// Start even when the legacy store is unreachable
    #[arg(long)]
    allow_degraded: bool,

    /// Skip warming the cache at startup
    #[arg(long)]
    no_prefetch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let mut config = AppConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.rules.is_some() {
        config.rules_path = args.rules;
    }
    if args.allow_degraded {
        config.probe.allow_degraded = true;
    }

    info!("🚀 Data-quality backend starting");

    let catalog = match &config.rules_path {
        Some(path) => RuleCatalog::load(path, CustomRegistry::builtin())
            .with_context(|| format!("Failed to load rule catalog {}", path.display()))?,
        None => RuleCatalog::builtin().context("Built-in rule catalog is invalid")?,
    };
    info!("📚 {} validation rules loaded", catalog.rules().len());

    let primary = Arc::new(SqliteStore::new(config.primary_db_path.clone()));
    let legacy = Arc::new(
        LegacyStore::from_connection_string(&config.legacy_dsn).context("Invalid LEGACY_DSN")?,
    );
    info!("🏛️ Legacy store configured: {}", legacy.dsn());

    let availability = Arc::new(AvailabilityManager::new(
        primary,
        legacy.clone(),
        config.probe.clone(),
    ));
    availability
        .startup()
        .await
        .context("Refusing to start")?;

    let gateway = Gateway::new(config.gateway.clone(), availability);
    let sweeper = gateway.spawn_sweeper();

    let service = Arc::new(DataQualityService::new(
        Arc::new(RuleBook::new(catalog)),
        gateway.clone(),
    ));
    if !args.no_prefetch {
        let warm = service.clone();
        tokio::spawn(async move { warm.prefetch().await });
    }

    let app = api::create_router(service.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🌐 Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let aborted = service.shutdown();
    sweeper.abort();
    legacy.close();
    info!("👋 Shut down ({} in-flight fetches aborted)", aborted);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown requested");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dataquality_backend=debug,dataquality=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

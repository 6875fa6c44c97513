use chrono::Utc;
use lead_directory_api::config::Config;
use lead_directory_api::db::Database;
use lead_directory_api::handlers::AppState;
use lead_directory_api::repository::{InMemoryLeadRepository, LeadRepository, PgLeadRepository};
use lead_directory_api::routes;
use lead_directory_api::seed::SeedData;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Picks the storage backend.
///
/// With `DATABASE_URL` the Postgres tables are used (and `SEED_FILE`, if set,
/// is imported into them). Otherwise the directory lives in memory, seeded
/// from `SEED_FILE` or the built-in demo dataset.
async fn build_repository(config: &Config) -> anyhow::Result<Arc<dyn LeadRepository>> {
    if let Some(ref url) = config.database_url {
        let db = Database::new(url).await?;
        tracing::info!("Database connection pool established");

        let repo = PgLeadRepository::new(db.pool.clone());
        if let Some(ref path) = config.seed_file {
            let data = SeedData::from_file(path)?;
            let inserted = repo
                .import(&data)
                .await
                .map_err(|e| anyhow::anyhow!("seed import failed: {}", e))?;
            tracing::info!("Imported {} seed record(s) from {}", inserted, path.display());
        }
        return Ok(Arc::new(repo));
    }

    let data = match config.seed_file {
        Some(ref path) => {
            tracing::info!("Loading seed file {}", path.display());
            SeedData::from_file(path)?
        }
        None => {
            tracing::info!("No SEED_FILE, using built-in demo dataset");
            SeedData::demo(Utc::now())?
        }
    };

    tracing::info!(
        "In-memory directory ready: {} lead(s), {} session(s)",
        data.leads.len(),
        data.sessions.len()
    );

    Ok(Arc::new(InMemoryLeadRepository::new(data)))
}

/// Main entry point for the application.
///
/// Initializes tracing, loads configuration, builds the repository and
/// serves the router with rate limiting, CORS and request tracing.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_directory_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    let repo = build_repository(&config).await?;

    if config.stats_cache_ttl_secs > 0 {
        tracing::info!(
            "Stats cache initialized ({}s TTL)",
            config.stats_cache_ttl_secs
        );
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let base_path = config.base_path.clone();
    let app_state = Arc::new(AppState::new(repo, config));
    let app = routes::build_rate_limited_router(app_state)?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {} (API under {})", addr, base_path);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geowatch::config::Config;
use geowatch::db::Database;
use geowatch::ingest::Ingestor;
use geowatch::routes::{self, AppState};
use geowatch::scheduler::{interval_from_minutes, spawn_scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geowatch=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("GEOWATCH_CONFIG").unwrap_or_else(|_| "geowatch.toml".to_string());
    let config = Config::load_with_env(&config_path)?;
    info!(
        "Loaded configuration: {} seed sources, {} keywords",
        config.sources.len(),
        config.keywords.len()
    );
    if config.admin_token.is_none() {
        warn!("ADMIN_TOKEN not set, admin actions are disabled");
    }

    // Initialize database
    let db = Database::new(&config.database_url).await?;
    db.initialize().await?;
    let seeded = db.seed_sources(&config.sources).await?;
    if seeded > 0 {
        info!("Seeded {} default sources", seeded);
    }
    info!("Database initialized");

    let db = Arc::new(db);
    let ingestor = Arc::new(Ingestor::from_config(db.clone(), &config)?);

    // Start background ingestion
    let scheduler = spawn_scheduler(
        ingestor.clone(),
        interval_from_minutes(config.refresh_interval),
    );

    let state = Arc::new(AppState {
        db: db.clone(),
        ingestor,
        admin_token: config.admin_token.clone(),
    });
    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Server starting on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.abort();
    db.close().await;
    info!("Shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

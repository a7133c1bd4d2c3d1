//! Library lending server
//!
//! REST API server coordinating loans, queues and outstanding requests.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use library_lending::{
    api,
    config::{AppConfig, LoggingConfig, StoreBackend, StoreConfig, DatabaseConfig},
    repository::{memory::CatalogSeed, MemoryStore, Repository},
    services::Services,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.logging);

    tracing::info!("Starting lending server v{}", env!("CARGO_PKG_VERSION"));

    let repository = open_repository(&config.store, &config.database).await?;
    let notifier = Services::notifier_for(&config.email);
    let services = Services::new(repository, notifier, &config.lending);

    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("library_lending={},tower_http=debug", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn open_repository(
    store: &StoreConfig,
    database: &DatabaseConfig,
) -> anyhow::Result<Repository> {
    match store.backend {
        StoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(database.max_connections)
                .min_connections(database.min_connections)
                .connect(&database.url)
                .await
                .context("Failed to connect to database")?;

            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;

            tracing::info!("Database migrations completed");

            Ok(Repository::new(pool))
        }
        StoreBackend::Memory => {
            let seed = match &store.seed {
                Some(path) => {
                    let raw = std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read catalog seed {}", path))?;
                    serde_json::from_str::<CatalogSeed>(&raw)
                        .with_context(|| format!("Invalid catalog seed {}", path))?
                }
                None => CatalogSeed::default(),
            };

            tracing::info!(
                users = seed.users.len(),
                documents = seed.documents.len(),
                copies = seed.copies.len(),
                "Using in-memory store"
            );

            Ok(Repository::in_memory(MemoryStore::from_seed(seed)))
        }
    }
}

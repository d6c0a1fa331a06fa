use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use olympus_shared::config::AppConfig;
use olympus_shared::database::{ConnectionPool, MigrationRunner};
use olympus_shared::events::{EventConfig, EventPublisher};

mod health;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("configuration loaded, environment={}", config.monitoring.environment);

    let db = Arc::new(ConnectionPool::new(config.database_pool_config()).await?);
    info!("database connection pool established");

    let migrator = MigrationRunner::new(db.pool().clone(), None);
    if let Err(e) = migrator.run().await {
        tracing::warn!("migration run skipped or failed: {}", e);
    }

    let event_publisher = match EventPublisher::new(EventConfig {
        redis_url: config.redis.url.clone(),
        max_retries: config.redis.retry_attempts,
        retry_delay: std::time::Duration::from_millis(config.redis.retry_delay),
        ..EventConfig::default()
    })
    .await
    {
        Ok(publisher) => {
            info!("event publisher connected");
            Arc::new(Mutex::new(publisher))
        }
        Err(e) => {
            tracing::warn!("event publisher unavailable, events will not be broadcast: {}", e);
            return Err(anyhow::anyhow!("event publisher initialization failed: {e}"));
        }
    };

    let engine_config = olympus_engine::config::RentalEngineConfig::load().unwrap_or_default();
    let engine = Arc::new(olympus_engine::RentalEngine::new(
        db.pool().clone(),
        event_publisher,
        engine_config,
    ));
    // Application entry points (batch jobs, schedulers, etc.) reach the
    // domain through `engine`; there is no HTTP surface for it per the
    // external contract.
    let _ = engine;

    health::init();
    let health_state = health::HealthState { db: db.clone() };

    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/live", get(health::liveness_check))
        .layer(TraceLayer::new_for_http())
        .with_state(health_state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.monitoring.health_check_port));
    info!("health endpoints listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

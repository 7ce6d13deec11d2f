//! Flash-sale server.
//!
//! Wires the Postgres repository, the Redis (or in-process) active-sales
//! cache, the allocation engine and the lifecycle scheduler, then serves
//! the HTTP API.
//!
//! # Usage
//!
//! ```bash
//! # Start infrastructure
//! docker compose up -d
//!
//! # Run server
//! cargo run --bin server
//! ```

use flash_sale_core::{
    ActiveSalesCache, AllocationEngine, EmptyCatalog, InMemoryActiveSalesCache,
    LifecycleScheduler, LogOnlyDispatcher, ReservePolicy, SystemClock,
};
use flash_sale_postgres::PostgresSaleRepository;
use flash_sale_redis::RedisActiveSalesCache;
use flash_sale_web::{AppState, Config, router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,flash_sale=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(
        postgres = %config.postgres.url,
        redis_enabled = config.redis.enabled,
        per_buyer_cap = config.engine.per_buyer_cap,
        "Configuration loaded"
    );

    // Prometheus scrape endpoint on its own port.
    let metrics_addr: SocketAddr =
        format!("{}:{}", config.server.metrics_host, config.server.metrics_port).parse()?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()?;
    tracing::info!(%metrics_addr, "Metrics exporter listening");

    // System of record.
    let repository =
        PostgresSaleRepository::connect(&config.postgres.url, config.postgres.max_connections)
            .await?;
    repository.migrate().await?;
    tracing::info!("Database migrated");

    // Active-sales cache: Redis when configured, in-process otherwise.
    let cache: Arc<dyn ActiveSalesCache> = if config.redis.enabled {
        Arc::new(RedisActiveSalesCache::new(&config.redis.url, config.engine.cache_ttl()).await?)
    } else {
        Arc::new(InMemoryActiveSalesCache::new(config.engine.cache_ttl()))
    };

    let engine = AllocationEngine::new(
        Arc::new(repository),
        cache,
        Arc::new(LogOnlyDispatcher),
        Arc::new(EmptyCatalog),
        Arc::new(SystemClock),
        ReservePolicy {
            per_buyer_cap: config.engine.per_buyer_cap,
            lock_timeout: config.engine.lock_timeout(),
        },
    );

    // Lifecycle transitions run in the background for the life of the
    // process; state lives in the database, so restarts just catch up.
    let scheduler = LifecycleScheduler::new(engine.clone(), config.engine.scheduler_tick());
    tokio::spawn(scheduler.run());
    tracing::info!(
        tick_secs = config.engine.scheduler_tick_secs,
        "Lifecycle scheduler started"
    );

    let app = router(AppState::new(engine));
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Flash-sale server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}

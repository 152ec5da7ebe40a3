use actix_web::middleware::from_fn;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod domain;
mod error;
mod http;
mod metrics;
mod notify;
mod session;
mod storage;
mod store;
mod utils;

use config::Config;
use metrics::Metrics;
use notify::NotificationClient;
use session::SessionStore;
use storage::ObjectStorage;
use store::{CatalogStore, OrderStore, UserStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging with environment-based filtering; override with
    // RUST_LOG, e.g. RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,formulab=debug")),
        )
        .init();

    tracing::info!("🚀 Starting formulab order service");

    let config = Config::load()?;

    tracing::info!("Connecting to Postgres...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    tracing::info!("Connecting to Redis session store...");
    let sessions = SessionStore::connect(&config.redis.url, config.redis.session_ttl_seconds)
        .await
        .map_err(|err| anyhow::anyhow!("redis connection failed: {err}"))?;

    let storage = ObjectStorage::connect(&config.s3).await;
    let notifier = NotificationClient::new(&config.notification)?;

    let catalog = CatalogStore::new(pool.clone());
    let orders = OrderStore::new(pool.clone());
    let users = UserStore::new(pool.clone());

    let metrics = web::Data::new(Metrics::new()?);
    tracing::info!(
        metric_families = metrics.registry().gather().len(),
        "📊 Metrics registry created"
    );

    let bind_addr = (config.server.host.clone(), config.server.port);
    tracing::info!(host = %config.server.host, port = config.server.port, "Listening");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(catalog.clone()))
            .app_data(web::Data::new(orders.clone()))
            .app_data(web::Data::new(users.clone()))
            .app_data(web::Data::new(sessions.clone()))
            .app_data(web::Data::new(storage.clone()))
            .app_data(web::Data::new(notifier.clone()))
            .app_data(metrics.clone())
            .wrap(from_fn(metrics::track_http))
            .configure(http::routes)
    })
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}

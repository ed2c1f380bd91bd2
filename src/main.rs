//! Perde Storefront - curtain shop backend

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use perde_storefront::services::{IframeGateway, LocalMediaStore, LogNotifier, NatsNotifier, Notifier};
use perde_storefront::storage::{Collections, PgDocumentStore};
use perde_storefront::{api, AppState, Backends, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let pool = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await.context("connecting to Postgres")?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let notifier: Arc<dyn Notifier> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsNotifier::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, email triggers will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };
    if config.payment.merchant_id.is_empty() {
        tracing::warn!("payment gateway credentials missing, checkout will answer 503");
    }

    tokio::fs::create_dir_all(&config.media_dir).await.context("creating media directory")?;
    let backends = Backends {
        db: Collections::new(Arc::new(PgDocumentStore::new(pool))),
        notifier,
        payments: Arc::new(IframeGateway::new(config.payment.clone())),
        media: Arc::new(LocalMediaStore::new(&config.media_dir, &config.media_base_url)),
        shipping: config.shipping.clone(),
    };
    let state = AppState::new(backends, &config.admin_token, &config.public_base_url);
    let app = api::router(state, &config.media_dir);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("🚀 Perde storefront listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}

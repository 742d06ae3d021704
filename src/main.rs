use anyhow::Result;
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tavola::config::AppConfig;
use tavola::services::{cleanup_service::spawn_scheduler, CleanupService, WebhookService};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "tavola=info,tower_http=info,sqlx=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().await?;

    sqlx::migrate!("./migrations")
        .run(&config.database_pool)
        .await?;

    let cleanup = CleanupService::new(
        config.database_pool.clone(),
        config.instance_id.clone(),
        WebhookService::new(config.cleanup_webhook_url.clone()),
    );
    spawn_scheduler(Arc::new(cleanup));

    let addr: SocketAddr = config.server_address().parse()?;
    let app = tavola::create_app(config);

    tracing::info!("Starting tavola auth server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

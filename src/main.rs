//! Storefront - catalogue, carts and orders over HTTP

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::http::{router, AppState};
use storefront::publisher::{EventPublisher, LogPublisher, NatsPublisher};
use storefront::services::Services;
use storefront::store::{MemoryStore, PgStore, Store};
use storefront::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            info!("using postgres store");
            Arc::new(store)
        }
        None => {
            info!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let publisher: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => Arc::new(NatsPublisher::connect(url).await?),
        None => Arc::new(LogPublisher),
    };

    let services = Services::new(store, publisher, &config);
    if let Some(admin) = &config.admin {
        let user = services.accounts.ensure_admin(admin).await?;
        info!(user_id = %user.id, username = %user.username, "admin account ready");
    }

    let app = router(AppState::new(services));
    let addr = config.bind_addr();
    info!("storefront listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}

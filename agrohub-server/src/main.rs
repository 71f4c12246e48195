use std::sync::Arc;

use agrohub::{Marketplace, MarketplaceConfig, TracingCodeSender};
use agrohub_postgres::PostgresMarketStore;
use agrohub_server::config::ServerConfig;
use agrohub_server::telemetry::init_tracing;
use agrohub_server::{build_router, serve, AppState};
use anyhow::{anyhow, Context};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the real environment still applies.
    let _ = dotenvy::dotenv();

    let config = ServerConfig::from_env().context("invalid configuration")?;
    init_tracing(config.log_format).map_err(|error| anyhow!(error))?;
    config.log_summary();

    let store = PostgresMarketStore::with_config(config.database_url.clone(), config.postgres.clone())
        .await
        .context("cannot connect to postgres")?;
    store.migrate().await.context("cannot migrate the database")?;
    let entries = store.expiring_store();

    let marketplace = Marketplace::new(
        Arc::new(store),
        Arc::new(entries),
        Arc::new(TracingCodeSender),
        MarketplaceConfig {
            session_ttl: config.session_ttl,
            admin_pepper: config.admin_pepper.clone(),
            ..MarketplaceConfig::default()
        },
    );

    if let Some(admin) = &config.admin {
        marketplace
            .accounts
            .ensure_admin(admin.username.clone(), &admin.password)
            .await
            .context("cannot create the admin account")?;
    }

    info!("[server.start] marketplace ready");
    serve(config.bind_address, build_router(AppState::new(marketplace)))
        .await
        .context("server failed")
}

use std::sync::Arc;

use anyhow::Context;

use keystone_auth::{AuthService, LogOnlyDelivery};
use keystone_infra::{PostgresCredentialStore, Settings, TokenSweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    keystone_observability::init();

    let settings = Settings::from_env().context("failed to load configuration")?;
    let database_url = settings
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set")?;

    let store = PostgresCredentialStore::connect(database_url, settings.db_max_connections)
        .await
        .context("failed to connect to Postgres")?;
    store.migrate().await.context("failed to apply schema")?;

    let service = AuthService::new(Arc::new(store), settings.auth.clone(), Arc::new(LogOnlyDelivery))
        .context("failed to build auth service")?;

    let sweeper = TokenSweeper::new(settings.sweep_interval).spawn(service.tokens().clone());
    tracing::info!(
        sweep_interval_secs = settings.sweep_interval.as_secs(),
        "keystone started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("shutting down");
    sweeper.shutdown().await;
    Ok(())
}

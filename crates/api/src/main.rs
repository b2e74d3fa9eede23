use std::sync::Arc;

use anyhow::Context;

use stockroom_api::app::{self, services};
use stockroom_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    stockroom_observability::init(config.log_format);

    let services = services::build_services(&config).await?;
    let app = app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        backend = ?config.backend,
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

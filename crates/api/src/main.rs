use anyhow::Context;

use bootnet_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bootnet_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(?config, "starting bootnet-api");

    let app = bootnet_api::app::build_app_from_config(&config)
        .await
        .context("failed to wire services")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

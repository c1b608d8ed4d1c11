use anyhow::Context;

use emr_api::{build_app, telemetry, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = Config::from_env()?;
    let state = AppState::open(&config).context("opening database")?;
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "emr-api listening");

    axum::serve(listener, app).await?;
    Ok(())
}

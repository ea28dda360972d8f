mod error;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use healthchat_core::config::HealthchatConfig;
use healthchat_core::proxy::UpstreamProxy;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub proxy: UpstreamProxy,
    pub config: HealthchatConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "healthchat_web=info,tower_http=info".into()),
        )
        .init();

    let config = HealthchatConfig::load(Some(&std::env::current_dir()?)).unwrap_or_else(|e| {
        tracing::warn!("failed to load config, using defaults: {e}");
        HealthchatConfig::default_config()
    });

    let proxy = UpstreamProxy::new(&config.upstream.base_url)
        .context("invalid upstream.base_url")?;
    tracing::info!("forwarding /api/proxy/* to {}", proxy.base_url());

    let state = Arc::new(AppState {
        proxy,
        config: config.clone(),
    });

    let app = routes::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.web.host, config.web.port);
    tracing::info!("healthchat-web listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing::info;

use crate::client::token_clients::TokenClients;
use crate::config::settings::SettingsConfig;
use crate::observability::metrics::get_metrics;
use crate::observability::routes::MetricsState;
use crate::server::admin;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub clients: Arc<TokenClients>,
}

impl AppState {
    pub fn new(clients: Arc<TokenClients>) -> Self {
        Self {
            metrics_state: MetricsState::new(get_metrics().registry.clone()),
            clients,
        }
    }
}

/// Admin routes plus the metrics endpoint when enabled.
pub fn router(settings_config: &SettingsConfig, clients: Arc<TokenClients>) -> Router {
    let state = AppState::new(clients);
    Router::new()
        .merge(state.metrics_state.router(&settings_config.metrics))
        .merge(admin::router())
        .with_state(state)
}

/// Serves the admin API on the configured address until the process stops.
pub async fn start(settings_config: &SettingsConfig, clients: Arc<TokenClients>) -> Result<()> {
    let app = router(settings_config, clients);

    let bind_addr = format!("{}:{}", settings_config.server.host, settings_config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind admin server to {}", bind_addr))?;
    info!("admin server listening on {}", bind_addr);

    get_metrics().up.set(1);
    axum::serve(listener, app).await.context("admin server failed")?;
    Ok(())
}

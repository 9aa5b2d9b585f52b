//! Admin endpoints: health, circuit breaker inspection and overrides, token status.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde_json::{json, Value};
use tracing::info;

use crate::cache::token::TokenStatus;
use crate::resilience::circuit_breaker::CircuitBreakerSnapshot;
use crate::server::server::AppState;
use crate::utils::constants::HEALTH_PATH;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route("/circuit-breakers", get(list_breakers))
        .route("/circuit-breakers/{name}/{action}", post(breaker_action))
        .route("/tokens", get(tokens))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn list_breakers(State(state): State<AppState>) -> Json<Vec<CircuitBreakerSnapshot>> {
    Json(state.clients.breakers().snapshots())
}

async fn breaker_action(
    State(state): State<AppState>,
    Path((name, action)): Path<(String, String)>,
) -> Result<Json<CircuitBreakerSnapshot>, (StatusCode, Json<Value>)> {
    let breaker = state.clients.breakers().get(&name).ok_or_else(|| {
        (StatusCode::NOT_FOUND, Json(json!({"error": format!("unknown circuit breaker '{}'", name)})))
    })?;

    match action.as_str() {
        "open" => breaker.force_open(),
        "close" => breaker.force_closed(),
        "half-open" => breaker.force_half_open(),
        "reset" => breaker.reset(),
        other => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("unknown action '{}', expected open|close|half-open|reset", other)})),
            ))
        }
    }
    info!("circuit breaker '{}' overridden via admin api: {}", name, action);
    Ok(Json(breaker.snapshot()))
}

async fn tokens(State(state): State<AppState>) -> Json<Vec<TokenStatus>> {
    Json(state.clients.token_statuses())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::Client;
    use serde_json::Value;

    use crate::client::token_clients::TokenClients;
    use crate::config::loader::parse_config;
    use crate::server::server::router;
    use crate::tests::common::{build_reqwest_client, spawn_axum};

    const CONFIG: &str = r#"
settings:
  metrics: { is_enabled: true, path: /metrics }
  server: { host: 127.0.0.1, port: "0" }
providers:
  authService:
    token_url: "http://127.0.0.1:9/oauth2/token"
"#;

    async fn spawn_admin() -> (String, Client) {
        let config = parse_config(CONFIG.to_owned()).await.unwrap();
        let clients = Arc::new(TokenClients::build(&config, Client::new()).unwrap());
        let (_handle, addr) = spawn_axum(router(&config.settings, clients)).await;
        (format!("http://{}", addr), build_reqwest_client())
    }

    #[tokio::test]
    async fn health_and_metrics() {
        let (base, client) = spawn_admin().await;

        let health: Value = client.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(health["status"], "ok");

        let metrics = client.get(format!("{}/metrics", base)).send().await.unwrap();
        assert!(metrics.status().is_success());
        assert!(metrics.text().await.unwrap().contains("tokenclient_circuit_breaker_state"));
    }

    #[tokio::test]
    async fn breaker_can_be_inspected_and_overridden() {
        let (base, client) = spawn_admin().await;

        let list: Value = client.get(format!("{}/circuit-breakers", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(list[0]["name"], "authService");
        assert_eq!(list[0]["state"], "CLOSED");

        let opened: Value = client
            .post(format!("{}/circuit-breakers/authService/open", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(opened["state"], "OPEN");

        let reset: Value = client
            .post(format!("{}/circuit-breakers/authService/reset", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reset["state"], "CLOSED");
        assert_eq!(reset["buffered_calls"], 0);
    }

    #[tokio::test]
    async fn unknown_breaker_or_action_is_rejected() {
        let (base, client) = spawn_admin().await;

        let missing = client.post(format!("{}/circuit-breakers/nope/open", base)).send().await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        let bad_action = client.post(format!("{}/circuit-breakers/authService/explode", base)).send().await.unwrap();
        assert_eq!(bad_action.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tokens_report_without_values() {
        let (base, client) = spawn_admin().await;

        let tokens: Value = client.get(format!("{}/tokens", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(tokens[0]["provider"], "authService");
        assert_eq!(tokens[0]["cached"], false);
        assert!(tokens[0]["expires_at"].is_null());
    }
}

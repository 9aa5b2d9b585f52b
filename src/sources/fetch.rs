//! Token fetcher
//!
//! Exchanges client credentials for a token at the configured endpoint.

use http::StatusCode;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::resilience::error::PipelineError;
use crate::sources::request::TokenRequestSpec;

/// Token as issued by the endpoint, before it is placed in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

pub trait FetchToken: Send + Sync + 'static {
    fn fetch_token(
        &self,
        spec: &TokenRequestSpec,
    ) -> impl std::future::Future<Output = Result<TokenGrant, PipelineError>> + Send;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct HttpTokenFetcher {
    client: Client,
}

impl HttpTokenFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl FetchToken for HttpTokenFetcher {
    async fn fetch_token(&self, spec: &TokenRequestSpec) -> Result<TokenGrant, PipelineError> {
        let headers = spec
            .resolve_headers()
            .map_err(|e| PipelineError::fetch_failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

        let mut request = self.client.post(&spec.token_url).form(&spec.form_params());
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(transport_failure)?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::fetch_failed(status, format!("token endpoint responded {}", status)));
        }

        let body = response.text().await.map_err(transport_failure)?;
        if body.trim().is_empty() {
            return Err(PipelineError::fetch_failed(
                StatusCode::INTERNAL_SERVER_ERROR,
                "token endpoint returned an empty body",
            ));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            PipelineError::fetch_failed(StatusCode::INTERNAL_SERVER_ERROR, format!("invalid token response: {}", e))
        })?;
        let access_token = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                PipelineError::fetch_failed(StatusCode::INTERNAL_SERVER_ERROR, "token response has no access_token")
            })?;

        debug!("token endpoint {} answered {}", spec.token_url, status);
        Ok(TokenGrant {
            access_token,
            token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_owned()),
            expires_in: parsed.expires_in.unwrap_or(spec.default_expires_in),
        })
    }
}

fn transport_failure(err: reqwest::Error) -> PipelineError {
    let status = err.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    PipelineError::fetch_failed(status, format!("token request failed: {}", err))
}

use reqwest::{Client, Method, Request, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::error::ClientError;
use crate::helpers::time::get_instant;
use crate::interceptor::bearer::BearerInterceptor;
use crate::observability::metrics::get_metrics;
use crate::sources::fetch::{FetchToken, HttpTokenFetcher};

/// HTTP client for one downstream service. Every request carries the bound
/// provider's bearer token.
pub struct ServiceClient<F: FetchToken = HttpTokenFetcher> {
    name: String,
    base_url: Url,
    interceptor: BearerInterceptor<F>,
    http: Client,
}

impl<F: FetchToken> ServiceClient<F> {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        interceptor: BearerInterceptor<F>,
        http: Client,
    ) -> Result<Self, ClientError> {
        // a trailing slash keeps the last segment when joining relative paths
        let normalized = if base_url.ends_with('/') {
            base_url.to_owned()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        Ok(Self { name: name.into(), base_url, interceptor, http })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn interceptor(&self) -> &BearerInterceptor<F> {
        &self.interceptor
    }

    pub fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// Sends a prepared request through the interceptor. The response is returned whatever its status.
    pub async fn send(&self, request: Request) -> Result<Response, ClientError> {
        let metrics = get_metrics();
        let start = get_instant();
        let method = request.method().clone();
        let url = request.url().clone();

        let outcome = self.interceptor.intercept(request, &self.http).await;

        let status_label = match &outcome {
            Ok(response) => response.status().as_u16().to_string(),
            Err(ClientError::Auth(_)) => "auth_error".to_owned(),
            Err(_) => "error".to_owned(),
        };
        metrics
            .downstream_requests
            .with_label_values(&[self.name.as_str(), status_label.as_str()])
            .inc();
        metrics
            .downstream_duration
            .with_label_values(&[self.name.as_str()])
            .observe(start.elapsed().as_secs_f64());

        match &outcome {
            Ok(response) => debug!("'{}' {} {} -> {}", self.name, method, url, response.status()),
            Err(e) => warn!("'{}' {} {} failed: {}", self.name, method, url, e),
        }
        outcome
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let request = self.http.get(self.url(path)?).build()?;
        let response = self.ensure_success(self.send(request).await?).await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http.post(self.url(path)?).json(body).build()?;
        let response = self.ensure_success(self.send(request).await?).await?;
        Ok(response.json::<T>().await?)
    }

    /// Returns the status of a successful delete.
    pub async fn delete(&self, path: &str) -> Result<http::StatusCode, ClientError> {
        let request = self.http.request(Method::DELETE, self.url(path)?).build()?;
        let response = self.ensure_success(self.send(request).await?).await?;
        Ok(response.status())
    }

    async fn ensure_success(&self, response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status { service: self.name.clone(), status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use http::StatusCode;
    use httpmock::Method::{DELETE, GET, POST};
    use httpmock::MockServer;
    use serde_json::{json, Value};

    use crate::cache::token_manager::TokenManager;
    use crate::helpers::time::ManualClock;
    use crate::sources::request::TokenRequestSpec;
    use crate::tests::common::{pipeline_with, ScriptedFetcher};

    fn client_for(server: &MockServer, fetcher: Arc<ScriptedFetcher>) -> ServiceClient<ScriptedFetcher> {
        let manager = TokenManager::new(
            "service_client_test",
            TokenRequestSpec::new("http://auth.local/oauth2/token"),
            pipeline_with("service_client_test_cb", fetcher),
            Arc::new(ManualClock::starting_now()),
            Duration::seconds(30),
        );
        ServiceClient::new(
            "productService",
            &server.url("/api"),
            BearerInterceptor::new(Arc::new(manager)),
            Client::new(),
        )
        .unwrap()
    }

    #[test]
    fn joins_paths_under_the_base_path() {
        let fetcher = Arc::new(ScriptedFetcher::tokens(&[]));
        let manager = TokenManager::new(
            "join_test",
            TokenRequestSpec::new("http://auth.local/oauth2/token"),
            pipeline_with("join_test_cb", fetcher),
            Arc::new(ManualClock::starting_now()),
            Duration::seconds(30),
        );
        let client = ServiceClient::new(
            "searchService",
            "http://search.local/api",
            BearerInterceptor::new(Arc::new(manager)),
            Client::new(),
        )
        .unwrap();

        assert_eq!(client.url("/search?q=a").unwrap().as_str(), "http://search.local/api/search?q=a");
        assert_eq!(client.url("items/1").unwrap().as_str(), "http://search.local/api/items/1");
    }

    #[tokio::test]
    async fn get_json_sends_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/products/1").header("authorization", "Bearer tok1");
                then.status(200).json_body(json!({"id": 1, "name": "lamp"}));
            })
            .await;
        let client = client_for(&server, Arc::new(ScriptedFetcher::tokens(&[("tok1", 3600)])));

        let product: Value = client.get_json("/products/1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(product["name"], "lamp");
    }

    #[tokio::test]
    async fn post_json_round_trips_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/search").json_body(json!({"q": "lamp"}));
                then.status(200).json_body(json!({"hits": 3}));
            })
            .await;
        let client = client_for(&server, Arc::new(ScriptedFetcher::tokens(&[("tok1", 3600)])));

        let result: Value = client.post_json("search", &json!({"q": "lamp"})).await.unwrap();
        assert_eq!(result["hits"], 3);
    }

    #[tokio::test]
    async fn non_success_becomes_status_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/api/products/9");
                then.status(404).body("no such product");
            })
            .await;
        let client = client_for(&server, Arc::new(ScriptedFetcher::tokens(&[("tok1", 3600)])));

        match client.delete("/products/9").await.unwrap_err() {
            ClientError::Status { service, status, body } => {
                assert_eq!(service, "productService");
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body, "no such product");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn token_failure_is_an_auth_error() {
        let server = MockServer::start_async().await;
        let client = client_for(&server, Arc::new(ScriptedFetcher::new(vec![Err(StatusCode::SERVICE_UNAVAILABLE)])));

        let err = client.get_json::<Value>("/products").await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(ref e) if e.status == StatusCode::SERVICE_UNAVAILABLE));
    }
}

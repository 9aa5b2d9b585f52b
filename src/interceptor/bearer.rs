use std::future::Future;
use std::sync::Arc;

use http::header::AUTHORIZATION;
use http::{HeaderValue, StatusCode};
use reqwest::{Client, Request, Response};
use tracing::{debug, warn};

use crate::cache::token_manager::TokenManager;
use crate::client::error::ClientError;
use crate::sources::fetch::{FetchToken, HttpTokenFetcher};

/// Whatever actually sends the request once the interceptor is done with it.
pub trait Next: Send + Sync {
    fn run(&self, request: Request) -> impl Future<Output = Result<Response, reqwest::Error>> + Send;
}

impl Next for Client {
    async fn run(&self, request: Request) -> Result<Response, reqwest::Error> {
        self.execute(request).await
    }
}

/// Puts the provider's bearer token on outgoing requests and drops the cached
/// token when the downstream answers 401.
pub struct BearerInterceptor<F: FetchToken = HttpTokenFetcher> {
    tokens: Arc<TokenManager<F>>,
    /// requests to this path go out untouched
    token_path: Option<String>,
}

impl<F: FetchToken> Clone for BearerInterceptor<F> {
    fn clone(&self) -> Self {
        Self {
            tokens: self.tokens.clone(),
            token_path: self.token_path.clone(),
        }
    }
}

impl<F: FetchToken> BearerInterceptor<F> {
    pub fn new(tokens: Arc<TokenManager<F>>) -> Self {
        let token_path = tokens.spec().token_path();
        Self { tokens, token_path }
    }

    pub fn tokens(&self) -> &Arc<TokenManager<F>> {
        &self.tokens
    }

    fn is_token_request(&self, request: &Request) -> bool {
        self.token_path.as_deref() == Some(request.url().path())
    }

    /// Sends `request` through `next` with `Authorization: Bearer <token>`.
    ///
    /// A token failure is returned before anything is sent. A 401 response
    /// invalidates the token it was sent with; the request itself is not repeated.
    pub async fn intercept<N: Next>(&self, mut request: Request, next: &N) -> Result<Response, ClientError> {
        if self.is_token_request(&request) {
            debug!("'{}' passing token endpoint request {} through", self.tokens.provider(), request.url());
            return Ok(next.run(request).await?);
        }

        let token = self.tokens.get_valid_token().await?;
        let mut value =
            HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| ClientError::InvalidHeader(e.to_string()))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        let url = request.url().clone();
        let response = next.run(request).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("{} rejected the '{}' token with 401, invalidating", url, self.tokens.provider());
            self.tokens.invalidate_if(&token).await;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Duration;
    use reqwest::{Method, Url};

    use crate::helpers::time::ManualClock;
    use crate::sources::request::TokenRequestSpec;
    use crate::tests::common::{pipeline_with, ScriptedFetcher};

    /// Records what it was asked to send and answers with a fixed status.
    struct Recorder {
        status: StatusCode,
        seen: Mutex<Vec<(String, Option<String>)>>,
    }

    impl Recorder {
        fn answering(status: StatusCode) -> Self {
            Self { status, seen: Mutex::new(Vec::new()) }
        }

        fn seen(&self) -> Vec<(String, Option<String>)> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Next for Recorder {
        async fn run(&self, request: Request) -> Result<Response, reqwest::Error> {
            let auth = request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            self.seen.lock().unwrap().push((request.url().path().to_owned(), auth));
            let response = http::Response::builder().status(self.status).body(String::new()).unwrap();
            Ok(Response::from(response))
        }
    }

    fn interceptor(fetcher: Arc<ScriptedFetcher>) -> BearerInterceptor<ScriptedFetcher> {
        let manager = TokenManager::new(
            "interceptor_test",
            TokenRequestSpec::new("http://auth.local/oauth2/token"),
            pipeline_with("interceptor_test_cb", fetcher),
            Arc::new(ManualClock::starting_now()),
            Duration::seconds(30),
        );
        BearerInterceptor::new(Arc::new(manager))
    }

    fn get(url: &str) -> Request {
        Request::new(Method::GET, Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn injects_bearer_token() {
        let fetcher = Arc::new(ScriptedFetcher::tokens(&[("tok1", 3600)]));
        let interceptor = interceptor(fetcher.clone());
        let next = Recorder::answering(StatusCode::OK);

        let response = interceptor.intercept(get("http://api.local/products/1"), &next).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(next.seen(), vec![("/products/1".to_owned(), Some("Bearer tok1".to_owned()))]);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn token_endpoint_requests_pass_untouched() {
        let fetcher = Arc::new(ScriptedFetcher::tokens(&[("tok1", 3600)]));
        let interceptor = interceptor(fetcher.clone());
        let next = Recorder::answering(StatusCode::OK);

        interceptor.intercept(get("http://auth.local/oauth2/token"), &next).await.unwrap();

        assert_eq!(next.seen(), vec![("/oauth2/token".to_owned(), None)]);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn unauthorized_invalidates_without_retry() {
        let fetcher = Arc::new(ScriptedFetcher::tokens(&[("tok1", 3600), ("tok2", 3600)]));
        let interceptor = interceptor(fetcher.clone());
        let rejecting = Recorder::answering(StatusCode::UNAUTHORIZED);

        let response = interceptor.intercept(get("http://api.local/products"), &rejecting).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(rejecting.seen().len(), 1);
        assert!(!interceptor.tokens().status().cached);

        let accepting = Recorder::answering(StatusCode::OK);
        interceptor.intercept(get("http://api.local/products"), &accepting).await.unwrap();
        assert_eq!(accepting.seen(), vec![("/products".to_owned(), Some("Bearer tok2".to_owned()))]);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn token_failure_stops_the_request() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Err(StatusCode::BAD_REQUEST)]));
        let interceptor = interceptor(fetcher);
        let next = Recorder::answering(StatusCode::OK);

        let err = interceptor.intercept(get("http://api.local/products"), &next).await.unwrap_err();

        assert!(matches!(err, ClientError::Auth(ref e) if e.status == StatusCode::BAD_REQUEST));
        assert!(next.seen().is_empty());
    }

    #[tokio::test]
    async fn late_unauthorized_keeps_refreshed_token() {
        let fetcher = Arc::new(ScriptedFetcher::tokens(&[("tok1", 3600), ("tok2", 3600)]));
        let interceptor = interceptor(fetcher.clone());
        let rejecting = Recorder::answering(StatusCode::UNAUTHORIZED);

        interceptor.intercept(get("http://api.local/products"), &rejecting).await.unwrap();
        // another caller refreshes before the next rejection of tok1 lands
        assert_eq!(interceptor.tokens().get_valid_token().await.unwrap(), "tok2");
        assert!(!interceptor.tokens().invalidate_if("tok1").await);

        let accepting = Recorder::answering(StatusCode::OK);
        interceptor.intercept(get("http://api.local/products"), &accepting).await.unwrap();
        assert_eq!(accepting.seen(), vec![("/products".to_owned(), Some("Bearer tok2".to_owned()))]);
        assert_eq!(fetcher.calls(), 2);
    }
}

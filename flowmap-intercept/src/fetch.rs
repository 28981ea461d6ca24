// Promise-style request interface and its interception decorator.

use crate::error::{InterceptError, Result};
use crate::observation::{DEFAULT_METHOD, Observation, ObservationSink, SourceKind};
use reqwest::Client;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// Per-call options, the equivalent of the second argument to `fetch`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub method: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub options: RequestOptions,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, options: RequestOptions) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, RequestOptions::default())
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.options.method = Some(method.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.options.body = Some(body.into());
        self
    }

    /// The method the call will use, `GET` unless the options say otherwise.
    pub fn method(&self) -> &str {
        self.options.method.as_deref().unwrap_or(DEFAULT_METHOD)
    }
}

/// What the interceptor needs to read off a settled response.
pub trait HasStatus {
    fn status_code(&self) -> u16;

    fn transfer_size(&self) -> Option<u64> {
        None
    }
}

impl HasStatus for reqwest::Response {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }

    fn transfer_size(&self) -> Option<u64> {
        self.content_length()
    }
}

/// A promise-style request capability: one call, one settled result.
pub trait FetchTransport: Send + Sync {
    type Response: HasStatus + Send;
    type Error: Display + Send;

    fn fetch(
        &self,
        request: FetchRequest,
    ) -> impl Future<Output = std::result::Result<Self::Response, Self::Error>> + Send;
}

/// Decorator that reports every call made through `inner` to a sink.
///
/// The result of the wrapped call is returned untouched, success or failure,
/// whether or not the sink is recording.
pub struct InterceptedFetch<T, S> {
    inner: T,
    sink: S,
}

impl<T, S> InterceptedFetch<T, S> {
    pub fn new(inner: T, sink: S) -> Self {
        Self { inner, sink }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T, S> FetchTransport for InterceptedFetch<T, S>
where
    T: FetchTransport,
    S: ObservationSink,
{
    type Response = T::Response;
    type Error = T::Error;

    async fn fetch(
        &self,
        request: FetchRequest,
    ) -> std::result::Result<Self::Response, Self::Error> {
        let url = request.url.clone();
        let method = request.method().to_string();
        let started = Instant::now();

        let outcome = self.inner.fetch(request).await;

        if !self.sink.is_recording() {
            debug!("Monitoring off, not recording {} {}", method, url);
            return outcome;
        }

        let observation = match &outcome {
            Ok(response) => {
                let mut observation = Observation::new(url, method, SourceKind::PromiseRequest);
                observation.status = response.status_code();
                observation.transfer_size = response.transfer_size();
                observation
            }
            Err(error) => Observation::with_error(
                url,
                method,
                SourceKind::PromiseRequest,
                error.to_string(),
            ),
        };
        self.sink.observe(observation.finished(started));

        outcome
    }
}

/// `reqwest`-backed promise-style transport.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(30)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Flowmap/0.1 (https://github.com/trapdoorsec/flowmap)")
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn build_request(
        client: &Client,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::RequestBuilder> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| InterceptError::Other(format!("Invalid method {}: {}", method, e)))?;

        let mut builder = client.request(method, url);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        Ok(builder)
    }
}

impl FetchTransport for ReqwestTransport {
    type Response = reqwest::Response;
    type Error = InterceptError;

    async fn fetch(&self, request: FetchRequest) -> Result<reqwest::Response> {
        let method = request.method().to_string();
        let FetchRequest { url, options } = request;
        let builder =
            Self::build_request(&self.client, &method, &url, &options.headers, options.body)?;

        debug!("Fetching {} {}", method, url);
        Ok(builder.send().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::testing::CollectingSink;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct StubResponse(u16);

    impl HasStatus for StubResponse {
        fn status_code(&self) -> u16 {
            self.0
        }
    }

    /// Settles with a fixed status, or fails for URLs containing "down".
    #[derive(Default)]
    struct StubTransport {
        calls: AtomicUsize,
    }

    impl FetchTransport for StubTransport {
        type Response = StubResponse;
        type Error = String;

        async fn fetch(&self, request: FetchRequest) -> std::result::Result<StubResponse, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.url.contains("down") {
                Err("connection refused".to_string())
            } else {
                Ok(StubResponse(201))
            }
        }
    }

    #[test]
    fn test_request_method_defaults_to_get() {
        assert_eq!(FetchRequest::get("https://example.com").method(), "GET");
        assert_eq!(
            FetchRequest::get("https://example.com")
                .with_method("POST")
                .method(),
            "POST"
        );
    }

    #[tokio::test]
    async fn test_success_is_recorded_and_returned_unchanged() {
        let sink = CollectingSink::recording();
        let fetch = InterceptedFetch::new(StubTransport::default(), sink.clone());

        let response = fetch
            .fetch(FetchRequest::get("https://api.example.com/z").with_method("PUT"))
            .await;

        assert_eq!(response, Ok(StubResponse(201)));
        let seen = sink.observations();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "https://api.example.com/z");
        assert_eq!(seen[0].method, "PUT");
        assert_eq!(seen[0].status, 201);
        assert_eq!(seen[0].source_kind, SourceKind::PromiseRequest);
        assert!(seen[0].error.is_none());
        assert!(seen[0].duration_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_propagated() {
        let sink = CollectingSink::recording();
        let fetch = InterceptedFetch::new(StubTransport::default(), sink.clone());

        let response = fetch.fetch(FetchRequest::get("https://down.example.com/")).await;

        assert_eq!(response, Err("connection refused".to_string()));
        let seen = sink.observations();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].status, 0);
        assert_eq!(seen[0].error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_not_recording_still_forwards_the_call() {
        let sink = Arc::new(CollectingSink::default());
        let fetch = InterceptedFetch::new(StubTransport::default(), sink.clone());

        let response = fetch.fetch(FetchRequest::get("https://example.com/")).await;

        assert_eq!(response, Ok(StubResponse(201)));
        assert_eq!(fetch.inner().calls.load(Ordering::SeqCst), 1);
        assert!(sink.observations().is_empty());
    }
}

//! HTTP client with connection pooling and async operations

use crate::config::HttpClientConfig;
use crate::error::HttpResult;
use crate::request::RequestBuilder;
use crate::response::{from_reqwest, HttpResponse, StreamingResponse};
use couchbridge_common::HttpMethod;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Async HTTP client with connection pooling
///
/// Cloning is cheap; all clones share the same connection pool.
///
/// # Example
///
/// ```ignore
/// use couchbridge_http::{HttpClient, HttpClientConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = HttpClientConfig::new()
///         .base_url("http://localhost:5984")
///         .timeout(Duration::from_secs(30));
///
///     let client = HttpClient::new(config)?;
///
///     let response = client.get("/_up").await?;
///     println!("Status: {}, Latency: {}ms", response.status_code, response.latency_ms);
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<HttpClientInner>,
}

struct HttpClientInner {
    client: reqwest::Client,
    /// Same settings without the total deadline, for long-lived feeds
    unbounded: reqwest::Client,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: HttpClientConfig) -> HttpResult<Self> {
        // one jar for both clients so an `AuthSession` cookie reaches the feeds too
        let jar = config
            .cookie_store
            .then(|| Arc::new(reqwest::cookie::Jar::default()));

        let client = client_builder(&config, jar.clone())
            .timeout(config.timeout)
            .build()?;
        let unbounded = client_builder(&config, jar).build()?;

        Ok(Self {
            inner: Arc::new(HttpClientInner {
                client,
                unbounded,
                config,
            }),
        })
    }

    /// Create a client with default configuration
    pub fn default_client() -> HttpResult<Self> {
        Self::new(HttpClientConfig::default())
    }

    /// Get the base URL
    pub fn base_url(&self) -> Option<&str> {
        self.inner.config.base_url.as_deref()
    }

    /// Get the configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.inner.config
    }

    /// Execute a request and buffer the whole response body
    pub async fn execute(&self, request: RequestBuilder) -> HttpResult<HttpResponse> {
        let start = Instant::now();
        let method = request.method;
        let path = request.url.clone();

        let client = self.client_for(&request);
        let reqwest_builder =
            request.build_reqwest(client, self.inner.config.base_url.as_deref())?;

        let response = reqwest_builder.send().await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let response = from_reqwest(response, latency_ms).await?;
        debug!(
            method = %method,
            path = %path,
            status = response.status_code,
            latency_ms,
            "HTTP request completed"
        );
        Ok(response)
    }

    /// Execute a request and hand back the body as a stream
    pub async fn execute_streaming(&self, request: RequestBuilder) -> HttpResult<StreamingResponse> {
        let start = Instant::now();
        let method = request.method;
        let path = request.url.clone();

        let client = self.client_for(&request);
        let reqwest_builder =
            request.build_reqwest(client, self.inner.config.base_url.as_deref())?;

        let response = reqwest_builder.send().await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let response = StreamingResponse::new(response, latency_ms);
        debug!(
            method = %method,
            path = %path,
            status = response.status_code,
            latency_ms,
            "HTTP stream opened"
        );
        Ok(response)
    }

    fn client_for(&self, request: &RequestBuilder) -> &reqwest::Client {
        if request.no_timeout && request.timeout.is_none() {
            &self.inner.unbounded
        } else {
            &self.inner.client
        }
    }

    /// Send a bare GET request
    pub async fn get(&self, url: &str) -> HttpResult<HttpResponse> {
        self.execute(RequestBuilder::new(HttpMethod::Get, url)).await
    }

    /// Start a request for `execute` or `execute_streaming`
    pub fn request(&self, method: HttpMethod, url: &str) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }
}

fn client_builder(
    config: &HttpClientConfig,
    jar: Option<Arc<reqwest::cookie::Jar>>,
) -> reqwest::ClientBuilder {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout)
        .tcp_keepalive(config.tcp_keepalive)
        .user_agent(&config.user_agent)
        .gzip(config.gzip)
        .brotli(config.brotli)
        // CouchDB answers with redirects only for misconfigured proxies
        .redirect(reqwest::redirect::Policy::none());

    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }
    if config.danger_accept_invalid_certs {
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.inner.config.base_url)
            .field("timeout", &self.inner.config.timeout)
            .finish()
    }
}

//! Request dispatch shared by every CouchDB handle
//!
//! `Remote` owns the pooled HTTP client, the credentials and the cache of
//! databases known to exist. Every handle (`Database`, `Document`, ...) keeps
//! a clone of it, so all of them share a single connection pool.

use crate::config::CouchConfig;
use couchbridge_common::{CouchError, HttpMethod, Result};
use couchbridge_http::{Auth, HttpClient, HttpResponse, RequestBuilder, StreamingResponse};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Query string parameters in request order
pub(crate) type Params = Vec<(String, String)>;

#[derive(Clone)]
pub(crate) struct Remote {
    inner: Arc<RemoteInner>,
}

struct RemoteInner {
    http: HttpClient,
    auth: Auth,
    server: String,
    known_databases: RwLock<HashSet<String>>,
}

impl Remote {
    pub(crate) fn new(config: CouchConfig) -> Result<Self> {
        let http_config = config.http.clone().base_url(config.server.clone());
        let http = HttpClient::new(http_config)?;
        let server = http.base_url().unwrap_or_default().to_string();

        Ok(Self {
            inner: Arc::new(RemoteInner {
                http,
                auth: config.credentials.into_auth(),
                server,
                known_databases: RwLock::new(HashSet::new()),
            }),
        })
    }

    /// Server URL without trailing slash
    pub(crate) fn server(&self) -> &str {
        &self.inner.server
    }

    /// Start a request with the session credentials attached
    pub(crate) fn builder(&self, method: HttpMethod, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, path).auth(self.inner.auth.clone())
    }

    /// Send a request and translate non-success statuses into `CouchError`
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<HttpResponse> {
        let method = request.method;
        let path = request.url.clone();
        let response = self.inner.http.execute(request).await?;
        check_status(method, &path, response)
    }

    /// Send a request whose body is consumed as a stream
    pub(crate) async fn send_streaming(&self, request: RequestBuilder) -> Result<StreamingResponse> {
        let method = request.method;
        let path = request.url.clone();
        let response = self.inner.http.execute_streaming(request).await?;
        if response.is_success() {
            return Ok(response);
        }
        let buffered = response.into_buffered().await?;
        Err(status_error(method, &path, &buffered))
    }

    pub(crate) async fn get(&self, path: &str, params: Params) -> Result<Value> {
        let request = self.builder(HttpMethod::Get, path).query_pairs(params);
        Ok(self.send(request).await?.json()?)
    }

    pub(crate) async fn put(&self, path: &str, body: Option<Value>, params: Params) -> Result<Value> {
        let mut request = self.builder(HttpMethod::Put, path).query_pairs(params);
        if let Some(body) = body {
            request = request.json_value(body);
        }
        Ok(self.send(request).await?.json()?)
    }

    pub(crate) async fn post(&self, path: &str, body: Value, params: Params) -> Result<Value> {
        let request = self
            .builder(HttpMethod::Post, path)
            .query_pairs(params)
            .json_value(body);
        Ok(self.send(request).await?.json()?)
    }

    pub(crate) async fn delete(&self, path: &str, params: Params) -> Result<Value> {
        let request = self.builder(HttpMethod::Delete, path).query_pairs(params);
        Ok(self.send(request).await?.json()?)
    }

    pub(crate) async fn head(&self, path: &str) -> Result<HttpResponse> {
        self.send(self.builder(HttpMethod::Head, path)).await
    }

    /// HEAD the path, mapping 404 to `false`
    pub(crate) async fn exists(&self, path: &str) -> Result<bool> {
        match self.head(path).await {
            Ok(_) => Ok(true),
            Err(CouchError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn is_known_database(&self, id: &str) -> bool {
        self.inner.known_databases.read().contains(id)
    }

    pub(crate) fn remember_database(&self, id: &str) {
        self.inner.known_databases.write().insert(id.to_string());
    }

    pub(crate) fn forget_database(&self, id: &str) {
        self.inner.known_databases.write().remove(id);
    }
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("server", &self.inner.server)
            .field("auth", &self.inner.auth)
            .finish()
    }
}

/// Translate an error response into the `CouchError` taxonomy
///
/// CouchDB reports failures as `{"error": "...", "reason": "..."}`; both are
/// folded into the message when present.
pub(crate) fn check_status(method: HttpMethod, path: &str, response: HttpResponse) -> Result<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }
    Err(status_error(method, path, &response))
}

fn status_error(method: HttpMethod, path: &str, response: &HttpResponse) -> CouchError {
    let status = response.status_code;
    let body = response.json().unwrap_or(Value::Null);
    let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
    let mut message = format!(
        "The request ({} {}) returned an error '{}' ({})",
        method, path, error, status
    );
    if let Some(reason) = body.get("reason").and_then(Value::as_str) {
        message.push_str(&format!(": '{}'", reason));
    }

    CouchError::from_status(status, message)
}

/// Replace the error for one specific status with an endpoint-specific one
pub(crate) trait OnStatus<T> {
    fn on_status(self, status: u16, f: impl FnOnce(CouchError) -> CouchError) -> Result<T>;
}

impl<T> OnStatus<T> for Result<T> {
    fn on_status(self, status: u16, f: impl FnOnce(CouchError) -> CouchError) -> Result<T> {
        match self {
            Err(e) if e.status_code() == Some(status) => Err(f(e)),
            other => other,
        }
    }
}

/// Percent-encode a document id for use as a path segment
///
/// The `_design/` and `_local/` prefixes are part of the path syntax and stay
/// unencoded.
pub(crate) fn quote_id(id: &str) -> String {
    for prefix in ["_design/", "_local/"] {
        if let Some(rest) = id.strip_prefix(prefix) {
            return format!("{}{}", prefix, urlencoding::encode(rest));
        }
    }
    urlencoding::encode(id).into_owned()
}

/// Encode a value as a JSON query parameter (`key`, `startkey`, ...)
pub(crate) fn json_param(value: &Value) -> String {
    value.to_string()
}

pub(crate) fn bool_param(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

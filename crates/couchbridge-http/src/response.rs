//! HTTP response types

use crate::error::{HttpError, HttpResult};
use bytes::Bytes;
use couchbridge_common::http::{HttpResponseLike, HttpStatus};
use futures::{Stream, StreamExt};
use std::collections::HashMap;

/// Buffered HTTP response with built-in latency measurement
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status_code: u16,

    /// Response headers (lowercase names)
    pub headers: HashMap<String, String>,

    /// Response body as bytes
    pub body: Vec<u8>,

    /// Request latency in milliseconds
    pub latency_ms: u64,

    /// Final URL
    pub url: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    /// Parse the body as JSON
    ///
    /// An empty body (HEAD requests) yields `Value::Null`.
    pub fn json(&self) -> HttpResult<serde_json::Value> {
        if self.body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| HttpError::Json(format!("Failed to parse JSON: {}", e)))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Consume the response, returning the body
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Header lookup; names are stored lowercase
    pub fn header(&self, name: &str) -> Option<&str> {
        HttpResponseLike::header(self, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        HttpResponseLike::content_type(self)
    }
}

impl HttpResponseLike for HttpResponse {
    fn status_code(&self) -> u16 {
        self.status_code
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    fn body_bytes(&self) -> &[u8] {
        &self.body
    }
}

/// Builder for creating HttpResponse (used in tests)
#[derive(Debug)]
pub struct HttpResponseBuilder {
    status_code: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    latency_ms: u64,
    url: String,
}

impl HttpResponseBuilder {
    pub fn new() -> Self {
        Self {
            status_code: 200,
            headers: HashMap::new(),
            body: Vec::new(),
            latency_ms: 0,
            url: String::new(),
        }
    }

    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = code;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = value.to_string().into_bytes();
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn build(self) -> HttpResponse {
        HttpResponse {
            status_code: self.status_code,
            headers: self.headers,
            body: self.body,
            latency_ms: self.latency_ms,
            url: self.url,
        }
    }
}

impl Default for HttpResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Response whose body has not been read yet
///
/// Used for CouchDB's continuous change feed, which keeps the connection open
/// and emits one JSON object per line.
#[derive(Debug)]
pub struct StreamingResponse {
    /// HTTP status code
    pub status_code: u16,

    /// Response headers (lowercase names)
    pub headers: HashMap<String, String>,

    /// Final URL
    pub url: String,

    /// Time until the response head arrived, in milliseconds
    pub latency_ms: u64,

    inner: reqwest::Response,
}

impl StreamingResponse {
    pub(crate) fn new(inner: reqwest::Response, latency_ms: u64) -> Self {
        Self {
            status_code: inner.status().as_u16(),
            headers: collect_headers(inner.headers()),
            url: inner.url().to_string(),
            latency_ms,
            inner,
        }
    }

    pub fn is_success(&self) -> bool {
        HttpStatus(self.status_code).is_success()
    }

    /// Stream the body chunk by chunk
    pub fn bytes_stream(self) -> impl Stream<Item = HttpResult<Bytes>> + Send {
        self.inner.bytes_stream().map(|chunk| chunk.map_err(HttpError::from))
    }

    /// Read the remaining body into a buffered response
    pub async fn into_buffered(self) -> HttpResult<HttpResponse> {
        from_reqwest(self.inner, self.latency_ms).await
    }
}

fn collect_headers(map: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for (name, value) in map.iter() {
        if let Ok(v) = value.to_str() {
            headers.insert(name.as_str().to_lowercase(), v.to_string());
        }
    }
    headers
}

/// Convert reqwest Response to HttpResponse
pub async fn from_reqwest(
    response: reqwest::Response,
    latency_ms: u64,
) -> HttpResult<HttpResponse> {
    let status_code = response.status().as_u16();
    let url = response.url().to_string();
    let headers = collect_headers(response.headers());

    // Read body
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
        latency_ms,
        url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_status_checks() {
        let response = HttpResponseBuilder::new().status_code(201).build();
        assert!(response.is_success());
        assert!(!response.is_client_error());

        let response = HttpResponseBuilder::new().status_code(409).build();
        assert!(!response.is_success());
        assert!(response.is_client_error());

        let response = HttpResponseBuilder::new().status_code(500).build();
        assert!(response.is_server_error());
    }

    #[test]
    fn test_response_json() {
        let response = HttpResponseBuilder::new()
            .body(br#"{"ok": true, "id": "foo", "rev": "1-abc"}"#.to_vec())
            .build();

        let json = response.json().unwrap();
        assert_eq!(json["id"], "foo");
        assert_eq!(json["rev"], "1-abc");
    }

    #[test]
    fn test_empty_body_is_null() {
        let response = HttpResponseBuilder::new().build();
        assert_eq!(response.json().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn test_response_header_case_insensitive() {
        let response = HttpResponseBuilder::new()
            .header("ETag", "\"2-def\"")
            .build();

        assert_eq!(response.header("etag"), Some("\"2-def\""));
        assert_eq!(response.header("ETAG"), Some("\"2-def\""));
        assert_eq!(HttpResponseLike::etag(&response), Some("2-def"));
    }
}

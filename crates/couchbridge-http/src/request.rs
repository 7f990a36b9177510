//! Request builder

use crate::error::{HttpError, HttpResult};
use couchbridge_common::HttpMethod;
use std::collections::HashMap;
use std::time::Duration;

/// Request body variants
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    None,
    /// JSON document, sent with `Content-Type: application/json`
    Json(serde_json::Value),
    /// Raw bytes with an explicit content type (attachments)
    Bytes {
        data: Vec<u8>,
        content_type: String,
    },
}

/// Authentication attached to a request
#[derive(Clone, Default)]
pub enum Auth {
    #[default]
    None,
    Basic {
        username: String,
        password: Option<String>,
    },
    /// CouchDB session cookie value (the part after `AuthSession=`)
    Cookie(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => write!(f, "None"),
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Auth::Cookie(_) => write!(f, "Cookie([REDACTED])"),
        }
    }
}

/// Builder for a single HTTP request
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub query_params: Vec<(String, String)>,
    pub body: RequestBody,
    pub auth: Auth,
    /// Per-request timeout; `None` falls back to the client timeout
    pub timeout: Option<Duration>,
    /// Send through the client without a total deadline (long-lived streams)
    pub no_timeout: bool,
}

impl RequestBuilder {
    /// Create a new request for a path relative to the client base URL
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            query_params: Vec::new(),
            body: RequestBody::None,
            auth: Auth::None,
            timeout: None,
            no_timeout: false,
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    /// Append several query parameters, keeping their order
    pub fn query_pairs<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query_params
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set a JSON body
    pub fn json_value(mut self, value: serde_json::Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    /// Set a raw body with its content type
    pub fn bytes(mut self, data: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.body = RequestBody::Bytes {
            data,
            content_type: content_type.into(),
        };
        self
    }

    /// Set authentication
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    /// Set a per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Let the request run without a deadline
    ///
    /// Connect timeout and TCP keep-alive still apply. An explicit
    /// [`timeout`](Self::timeout) takes precedence.
    pub fn without_timeout(mut self) -> Self {
        self.no_timeout = true;
        self
    }

    /// Resolve the target URL against the base URL
    pub fn full_url(&self, base_url: Option<&str>) -> HttpResult<url::Url> {
        let raw = if self.url.starts_with("http://") || self.url.starts_with("https://") {
            self.url.clone()
        } else {
            match base_url {
                Some(base) => format!("{}{}", base.trim_end_matches('/'), self.url),
                None => {
                    return Err(HttpError::InvalidRequest(format!(
                        "Relative URL '{}' without a base URL",
                        self.url
                    )))
                }
            }
        };
        Ok(url::Url::parse(&raw)?)
    }

    /// Convert into a reqwest request builder
    pub(crate) fn build_reqwest(
        self,
        client: &reqwest::Client,
        base_url: Option<&str>,
    ) -> HttpResult<reqwest::RequestBuilder> {
        let url = self.full_url(base_url)?;
        let method = to_reqwest_method(self.method)?;

        let mut builder = client.request(method, url);

        if !self.query_params.is_empty() {
            builder = builder.query(&self.query_params);
        }

        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match self.auth {
            Auth::None => builder,
            Auth::Basic { username, password } => builder.basic_auth(username, password),
            Auth::Cookie(cookie) => {
                builder.header(reqwest::header::COOKIE, format!("AuthSession={}", cookie))
            }
        };

        builder = match self.body {
            RequestBody::None => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Bytes { data, content_type } => builder
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(data),
        };

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(builder)
    }
}

fn to_reqwest_method(method: HttpMethod) -> HttpResult<reqwest::Method> {
    Ok(match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Copy => reqwest::Method::from_bytes(b"COPY")
            .map_err(|e| HttpError::InvalidRequest(e.to_string()))?,
    })
}

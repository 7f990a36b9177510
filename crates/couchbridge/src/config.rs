//! Session configuration

use couchbridge_http::{Auth, HttpClientConfig};
use std::time::Duration;

/// Server used when neither the config nor the environment names one
pub const DEFAULT_SERVER: &str = "http://localhost:5984";

/// How the session authenticates against CouchDB
#[derive(Clone, Default)]
pub enum Credentials {
    /// Anonymous access (admin party or public databases)
    #[default]
    None,
    /// HTTP Basic authentication
    Basic { user: String, password: String },
    /// Session cookie obtained from `POST /_session`
    Cookie(String),
}

impl Credentials {
    pub(crate) fn into_auth(self) -> Auth {
        match self {
            Credentials::None => Auth::None,
            Credentials::Basic { user, password } => Auth::Basic {
                username: user,
                password: Some(password),
            },
            Credentials::Cookie(cookie) => Auth::Cookie(cookie),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::None => write!(f, "None"),
            Credentials::Basic { user, .. } => write!(f, "Basic({})", user),
            Credentials::Cookie(_) => write!(f, "Cookie([REDACTED])"),
        }
    }
}

/// Configuration for a `CouchDB` session
///
/// # Example
///
/// ```ignore
/// use couchbridge::CouchConfig;
/// use std::time::Duration;
///
/// let config = CouchConfig::new("http://localhost:5984")
///     .basic_auth("admin", "secret")
///     .timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server URL, e.g. "http://localhost:5984"
    pub server: String,

    /// Authentication used for every request of the session
    pub credentials: Credentials,

    /// Transport settings (timeouts, pool sizes, user agent)
    pub http: HttpClientConfig,
}

impl Default for CouchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER)
    }
}

impl CouchConfig {
    /// Create a config for the given server with default transport settings
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            credentials: Credentials::None,
            http: HttpClientConfig::default(),
        }
    }

    /// Build a config from `COUCHDB_HOST`, `COUCHDB_USER` and `COUCHDB_PASS`
    ///
    /// The host defaults to [`DEFAULT_SERVER`]; without a user the session is
    /// anonymous; a missing password is treated as empty.
    pub fn from_env() -> Self {
        let server = std::env::var("COUCHDB_HOST").unwrap_or_else(|_| DEFAULT_SERVER.to_string());
        let config = Self::new(server);
        match std::env::var("COUCHDB_USER") {
            Ok(user) => {
                let password = std::env::var("COUCHDB_PASS").unwrap_or_default();
                config.basic_auth(user, password)
            }
            Err(_) => config,
        }
    }

    /// Authenticate with user name and password
    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Credentials::Basic {
            user: user.into(),
            password: password.into(),
        };
        self
    }

    /// Authenticate with an `AuthSession` cookie value
    pub fn cookie(mut self, cookie: impl Into<String>) -> Self {
        self.credentials = Credentials::Cookie(cookie.into());
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.timeout(timeout);
        self
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.connect_timeout(timeout);
        self
    }

    /// Set max idle connections kept in the pool
    pub fn pool_max_idle(mut self, max: usize) -> Self {
        self.http = self.http.pool_max_idle_per_host(max);
        self
    }

    /// Set the User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.http = self.http.user_agent(user_agent);
        self
    }

    /// Replace the transport settings wholesale
    pub fn http_config(mut self, http: HttpClientConfig) -> Self {
        self.http = http;
        self
    }
}

//! Transport settings

use std::time::Duration;

/// Settings of the pooled transport shared by one CouchDB session
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Server root every request path is joined to, without trailing slash
    pub base_url: Option<String>,

    /// Upper bound for one request, body included
    ///
    /// Streamed change feeds opt out of it per request.
    pub timeout: Duration,

    pub connect_timeout: Duration,

    /// Idle keep-alive connections kept per host
    pub pool_max_idle_per_host: usize,

    /// How long an idle connection stays in the pool
    pub pool_idle_timeout: Duration,

    /// TCP keep-alive probe interval; `None` disables probing
    pub tcp_keepalive: Option<Duration>,

    pub user_agent: String,

    /// Keep `Set-Cookie` responses (the `AuthSession` cookie of `_session`)
    /// and send them back on later requests
    pub cookie_store: bool,

    /// Accept self-signed server certificates
    pub danger_accept_invalid_certs: bool,

    /// Advertise and decode gzip responses
    pub gzip: bool,

    /// Advertise and decode brotli responses
    pub brotli: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Some(Duration::from_secs(60)),
            user_agent: format!("couchbridge/{}", env!("CARGO_PKG_VERSION")),
            cookie_store: false,
            danger_accept_invalid_certs: false,
            gzip: true,
            brotli: true,
        }
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A trailing slash is dropped so that paths can always start with `/`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.base_url = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    pub fn tcp_keepalive(mut self, interval: Option<Duration>) -> Self {
        self.tcp_keepalive = interval;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn cookie_store(mut self, enabled: bool) -> Self {
        self.cookie_store = enabled;
        self
    }

    /// Only for development servers with self-signed certificates
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }

    /// Toggle gzip and brotli together
    pub fn compression(mut self, enabled: bool) -> Self {
        self.gzip = enabled;
        self.brotli = enabled;
        self
    }
}

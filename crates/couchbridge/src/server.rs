//! CouchDB server session

use crate::config::CouchConfig;
use crate::database::Database;
use crate::remote::{bool_param, quote_id, OnStatus, Params, Remote};
use couchbridge_common::{CouchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument};

/// Meta information returned by `GET /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Always "Welcome"
    pub couchdb: String,
    pub version: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub vendor: Option<Value>,
    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// User context reported by `GET /_session`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    /// `None` for anonymous sessions
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Response of `GET /_session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub ok: bool,
    #[serde(rename = "userCtx")]
    pub user_ctx: UserContext,
    #[serde(default)]
    pub info: Option<Value>,
}

/// Options for `PUT /{db}`
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptions {
    /// Create a partitioned database
    pub partitioned: Option<bool>,
    /// Number of shards
    pub q: Option<u32>,
    /// Number of replicas
    pub n: Option<u32>,
}

impl DatabaseOptions {
    pub fn partitioned(mut self, partitioned: bool) -> Self {
        self.partitioned = Some(partitioned);
        self
    }

    pub fn shards(mut self, q: u32) -> Self {
        self.q = Some(q);
        self
    }

    pub fn replicas(mut self, n: u32) -> Self {
        self.n = Some(n);
        self
    }

    fn to_params(&self) -> Params {
        let mut params = Params::new();
        if let Some(partitioned) = self.partitioned {
            params.push(("partitioned".to_string(), bool_param(partitioned)));
        }
        if let Some(q) = self.q {
            params.push(("q".to_string(), q.to_string()));
        }
        if let Some(n) = self.n {
            params.push(("n".to_string(), n.to_string()));
        }
        params
    }
}

/// A session with one CouchDB server
///
/// The session owns one pooled HTTP client; every `Database` and `Document`
/// obtained from it shares that pool. Cloning the session is cheap.
///
/// # Example
///
/// ```ignore
/// use couchbridge::{CouchConfig, CouchDB};
///
/// #[tokio::main]
/// async fn main() -> couchbridge::Result<()> {
///     let couchdb = CouchDB::new(CouchConfig::from_env())?;
///     let db = couchdb.create("config", true).await?;
///
///     let mut doc = db.create("settings", true, None).await?;
///     doc.set("theme", "dark");
///     doc.save().await?;
///
///     couchdb.close();
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CouchDB {
    remote: Remote,
}

impl CouchDB {
    /// Open a session with the given configuration
    ///
    /// No request is sent; use [`CouchDB::check_credentials`] to verify the
    /// connection.
    pub fn new(config: CouchConfig) -> Result<Self> {
        info!(server = %config.server, credentials = ?config.credentials, "Opening CouchDB session");
        Ok(Self {
            remote: Remote::new(config)?,
        })
    }

    /// Open a session with Basic authentication
    pub fn connect(server: &str, user: &str, password: &str) -> Result<Self> {
        Self::new(CouchConfig::new(server).basic_auth(user, password))
    }

    /// Server URL of this session
    pub fn server(&self) -> &str {
        self.remote.server()
    }

    #[cfg(test)]
    pub(crate) fn remote(&self) -> &Remote {
        &self.remote
    }

    /// Verify the credentials of the session
    #[instrument(skip(self))]
    pub async fn check_credentials(&self) -> Result<()> {
        self.session().await.map(|_| ())
    }

    /// Return the user context of the session
    pub async fn session(&self) -> Result<SessionInfo> {
        let json = self
            .remote
            .get("/_session", Params::new())
            .await
            .on_status(401, |_| CouchError::Unauthorized("Invalid credentials".to_string()))?;
        Ok(serde_json::from_value(json)?)
    }

    /// Return the meta information about the server
    pub async fn info(&self) -> Result<ServerInfo> {
        let json = self.remote.get("/", Params::new()).await?;
        Ok(serde_json::from_value(json)?)
    }

    /// Return the names of all databases on the server
    pub async fn keys(&self) -> Result<Vec<String>> {
        let json = self.remote.get("/_all_dbs", Params::new()).await?;
        Ok(serde_json::from_value(json)?)
    }

    /// Create a database on the server
    ///
    /// Fails with `PreconditionFailed` if the database already exists, unless
    /// `exists_ok` is set.
    pub async fn create(&self, id: &str, exists_ok: bool) -> Result<Database> {
        self.create_with(id, exists_ok, &DatabaseOptions::default())
            .await
    }

    /// Create a database with sharding/partitioning options
    #[instrument(skip(self, options), fields(db = %id))]
    pub async fn create_with(
        &self,
        id: &str,
        exists_ok: bool,
        options: &DatabaseOptions,
    ) -> Result<Database> {
        let path = format!("/{}", quote_id(id));
        let result = self
            .remote
            .put(&path, None, options.to_params())
            .await
            .on_status(412, |_| {
                CouchError::PreconditionFailed(format!("The database '{}' does already exist.", id))
            });

        match result {
            Ok(_) => info!("Database created"),
            Err(CouchError::PreconditionFailed(_)) if exists_ok => {}
            Err(e) => return Err(e),
        }

        self.remote.remember_database(id);
        Ok(Database::new(self.remote.clone(), id))
    }

    /// Return a handle for an existing database
    ///
    /// Databases created or verified through this session are cached, and
    /// asking for them again performs no request.
    pub async fn database(&self, id: &str) -> Result<Database> {
        if self.remote.is_known_database(id) {
            return Ok(Database::new(self.remote.clone(), id));
        }

        let db = Database::new(self.remote.clone(), id);
        if !db.exists().await? {
            return Err(CouchError::NotFound(format!(
                "The database '{}' does not exist.",
                id
            )));
        }

        self.remote.remember_database(id);
        Ok(db)
    }

    /// Close the session
    ///
    /// Pooled connections are released once the last handle derived from
    /// this session is dropped.
    pub fn close(self) {
        info!(server = %self.remote.server(), "Closing CouchDB session");
    }
}

impl std::fmt::Debug for CouchDB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouchDB")
            .field("remote", &self.remote)
            .finish()
    }
}

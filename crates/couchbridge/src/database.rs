//! Database handles

use crate::bulk::BulkOperation;
use crate::changes::{self, ChangeEvent, ChangesQuery};
use crate::design::DesignDocument;
use crate::document::Document;
use crate::find::{FindQuery, FindRequest};
use crate::remote::{quote_id, OnStatus, Params, Remote};
use crate::security::SecurityDocument;
use crate::view::{View, ViewQuery};
use couchbridge_common::{CouchError, Result};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

/// Response of `GET /{db}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub db_name: String,
    #[serde(default)]
    pub doc_count: u64,
    #[serde(default)]
    pub doc_del_count: u64,
    #[serde(default)]
    pub update_seq: Value,
    #[serde(default)]
    pub purge_seq: Value,
    #[serde(default)]
    pub compact_running: bool,
    #[serde(default)]
    pub sizes: Option<Value>,
    #[serde(default)]
    pub props: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response of `POST /{db}/_index`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResult {
    /// "created" or "exists"
    pub result: String,
    pub id: String,
    pub name: String,
}

/// Response of `POST /{db}/_purge`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeResult {
    #[serde(default)]
    pub purge_seq: Option<Value>,
    #[serde(default)]
    pub purged: Map<String, Value>,
}

/// Selection of documents for [`Database::docs`]
#[derive(Debug, Clone, Default)]
pub struct DocsOptions {
    /// Only these documents, in this order
    pub ids: Option<Vec<String>>,
    /// Return empty proxies for ids that do not exist
    pub create: bool,
    /// Only documents whose id starts with this prefix
    pub prefix: Option<String>,
    /// Include `_design/` documents
    pub include_ddocs: bool,
    /// Further `_all_docs` parameters
    pub query: ViewQuery,
}

impl DocsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn include_ddocs(mut self, include: bool) -> Self {
        self.include_ddocs = include;
        self
    }

    pub fn query(mut self, query: ViewQuery) -> Self {
        self.query = query;
        self
    }
}

/// A handle for one database on the server
///
/// Handles are cheap to clone and share the session's connection pool.
#[derive(Clone)]
pub struct Database {
    remote: Remote,
    id: String,
    endpoint: String,
}

impl Database {
    pub(crate) fn new(remote: Remote, id: impl Into<String>) -> Self {
        let id = id.into();
        let endpoint = format!("/{}", quote_id(&id));
        Self { remote, id, endpoint }
    }

    pub(crate) fn remote(&self) -> &Remote {
        &self.remote
    }

    /// Name of the database
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Server path of the database
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether the database exists on the server
    pub async fn exists(&self) -> Result<bool> {
        self.remote.exists(&self.endpoint).await
    }

    /// Basic information about the database
    pub async fn info(&self) -> Result<DatabaseInfo> {
        let json = self
            .remote
            .get(&self.endpoint, Params::new())
            .await
            .on_status(404, |_| self.not_found())?;
        Ok(serde_json::from_value(json)?)
    }

    /// Delete the database and all of its documents
    #[instrument(skip(self), fields(db = %self.id))]
    pub async fn delete(&self) -> Result<()> {
        self.remote
            .delete(&self.endpoint, Params::new())
            .await
            .on_status(404, |_| self.not_found())?;
        self.remote.forget_database(&self.id);
        info!("Database deleted");
        Ok(())
    }

    fn not_found(&self) -> CouchError {
        CouchError::NotFound(format!("The database '{}' does not exist.", self.id))
    }

    /// Local proxy for a new document
    ///
    /// Nothing is written; call [`Document::save`] on the result. If the
    /// document already exists on the server this fails with `Conflict`,
    /// unless `exists_ok` is set, in which case the existing content replaces
    /// `data`.
    #[instrument(skip(self, data), fields(db = %self.id))]
    pub async fn create(
        &self,
        id: &str,
        exists_ok: bool,
        data: Option<Map<String, Value>>,
    ) -> Result<Document> {
        let mut doc = Document::new(self, id, data);

        if exists_ok {
            match doc.fetch(true).await {
                Ok(()) | Err(CouchError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        } else if self.remote.exists(doc.endpoint()).await? {
            return Err(CouchError::Conflict(format!(
                "The document '{}' does already exist in the database '{}'.",
                id, self.id
            )));
        }

        Ok(doc)
    }

    /// Fetch the document `id`
    ///
    /// Fails with `NotFound` if it does not exist.
    pub async fn get(&self, id: &str) -> Result<Document> {
        let mut doc = Document::new(self, id, None);
        doc.fetch(true).await?;
        Ok(doc)
    }

    /// Fetch the document `id`, or a local proxy holding `default` if it does
    /// not exist
    pub async fn get_or(&self, id: &str, default: Map<String, Value>) -> Result<Document> {
        let mut doc = Document::new(self, id, Some(default));
        match doc.fetch(true).await {
            Ok(()) | Err(CouchError::NotFound(_)) => Ok(doc),
            Err(e) => Err(e),
        }
    }

    /// Fetch the revision `rev` of the document `id`
    ///
    /// An invalid revision fails with `BadRequest`, an unknown one with
    /// `NotFound`.
    pub async fn get_rev(&self, id: &str, rev: &str) -> Result<Document> {
        let mut doc = Document::new(self, id, None);
        doc.fetch_rev(rev, true).await?;
        Ok(doc)
    }

    /// Ids of all documents in the database
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.all_docs().ids(&ViewQuery::default()).await
    }

    /// Ids of all documents starting with `prefix`
    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let view = self.all_docs();
        view.ids(&view.prefix_query(prefix)).await
    }

    /// Documents of the database, all of them or a selection
    #[instrument(skip(self, options), fields(db = %self.id))]
    pub async fn docs(&self, options: DocsOptions) -> Result<Vec<Document>> {
        let DocsOptions {
            ids,
            create,
            prefix,
            include_ddocs,
            query,
        } = options;

        if prefix.is_some() && (ids.is_some() || create) {
            return Err(CouchError::InvalidArgument(
                "prefix cannot be used together with ids or create".to_string(),
            ));
        }
        if matches!(&ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let view = self.all_docs();
        let query = match prefix {
            Some(prefix) => query.prefix(&prefix, view.prefix_sentinel()),
            None => query,
        };
        let docs = view
            .docs(&query, ids.as_deref(), create, include_ddocs)
            .await?;
        debug!(count = docs.len(), "Loaded documents");
        Ok(docs)
    }

    /// All documents of the database
    pub async fn values(&self, query: ViewQuery) -> Result<Vec<Document>> {
        self.docs(DocsOptions::default().query(query)).await
    }

    /// The `_all_docs` view of the database
    pub fn all_docs(&self) -> View {
        View::all_docs(self)
    }

    /// The view `name` of the design document `design_doc`
    pub fn view(&self, design_doc: &str, name: &str) -> View {
        View::new(self, design_doc, name)
    }

    /// Local proxy for a design document
    ///
    /// Same existence semantics as [`Database::create`].
    #[instrument(skip(self), fields(db = %self.id))]
    pub async fn design_doc(&self, id: &str, exists_ok: bool) -> Result<DesignDocument> {
        let mut ddoc = DesignDocument::new(self, id);

        if exists_ok {
            match ddoc.fetch(true).await {
                Ok(()) | Err(CouchError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        } else if self.remote.exists(ddoc.endpoint()).await? {
            return Err(CouchError::Conflict(format!(
                "The design document '{}' does already exist in the database '{}'.",
                ddoc.id(),
                self.id
            )));
        }

        Ok(ddoc)
    }

    /// Mango query against `_find`
    ///
    /// Fails with `InvalidArgument` if `query` asks for a `fields`
    /// projection, as results are returned as complete documents.
    pub fn find(&self, selector: Value, query: FindQuery) -> Result<FindRequest> {
        FindRequest::new(self, selector, query)
    }

    /// Create a Mango index
    ///
    /// `extra` is merged into the request body (`ddoc`, `name`, `type`, ...).
    #[instrument(skip(self, index, extra), fields(db = %self.id))]
    pub async fn index(&self, index: Value, extra: Map<String, Value>) -> Result<IndexResult> {
        let mut body = extra;
        body.insert("index".to_string(), index);
        let json = self
            .remote
            .post(&format!("{}/_index", self.endpoint), Value::Object(body), Params::new())
            .await?;
        Ok(serde_json::from_value(json)?)
    }

    /// Permanently remove document revisions
    ///
    /// `revs` maps document ids to lists of revisions.
    #[instrument(skip(self, revs), fields(db = %self.id, docs = revs.len()))]
    pub async fn purge(&self, revs: Map<String, Value>) -> Result<PurgeResult> {
        let json = self
            .remote
            .post(&format!("{}/_purge", self.endpoint), Value::Object(revs), Params::new())
            .await?;
        Ok(serde_json::from_value(json)?)
    }

    /// Bulk operation over existing documents
    ///
    /// The documents are loaded up front; with `create`, missing ids become
    /// empty proxies instead of failing with `NotFound`.
    pub async fn update_docs(&self, ids: &[String], create: bool) -> Result<BulkOperation> {
        let docs = if ids.is_empty() {
            Vec::new()
        } else {
            self.docs(DocsOptions::default().ids(ids.iter().cloned()).create(create))
                .await?
        };
        Ok(BulkOperation::with_docs(self, docs))
    }

    /// Bulk operation creating new documents
    pub fn create_docs(&self, ids: &[String]) -> BulkOperation {
        let docs = ids
            .iter()
            .map(|id| Document::new(self, id.clone(), None))
            .collect();
        BulkOperation::with_docs(self, docs)
    }

    /// The `_security` document of the database
    pub async fn security(&self) -> Result<SecurityDocument> {
        let mut doc = SecurityDocument::new(self);
        doc.fetch().await?;
        Ok(doc)
    }

    /// Events for changes made to documents of this database
    pub fn changes(
        &self,
        query: ChangesQuery,
    ) -> impl Stream<Item = Result<ChangeEvent>> + Send + 'static {
        changes::stream(self.clone(), query)
    }

    /// Write documents in a single `_bulk_docs` request
    pub(crate) async fn bulk_docs(&self, docs: Vec<Value>) -> Result<Value> {
        self.remote
            .post(
                &format!("{}/_bulk_docs", self.endpoint),
                json!({ "docs": docs }),
                Params::new(),
            )
            .await
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("id", &self.id).finish()
    }
}

//! Mango queries through `_find`

use crate::database::Database;
use crate::document::{into_object, Document};
use crate::remote::Params;
use couchbridge_common::{CouchError, Result};
use futures::{Stream, TryStreamExt};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Page size used when the query sets no `limit`
pub const DEFAULT_PAGE_SIZE: u64 = 10_000;

/// Options of a `_find` request
///
/// `fields` projections are not supported because results are returned as
/// complete documents.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    /// Maximum number of results; also makes the request a single page
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub sort: Option<Value>,
    pub use_index: Option<Value>,
    pub conflicts: Option<bool>,
    pub execution_stats: Option<bool>,
    /// Resume from a bookmark of an earlier request
    pub bookmark: Option<String>,
    /// Further body fields (`r`, `stable`, `update`, ...)
    pub extra: Map<String, Value>,
}

impl FindQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn sort(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn use_index(mut self, index: impl Into<Value>) -> Self {
        self.use_index = Some(index.into());
        self
    }

    pub fn conflicts(mut self, conflicts: bool) -> Self {
        self.conflicts = Some(conflicts);
        self
    }

    pub fn execution_stats(mut self, enabled: bool) -> Self {
        self.execution_stats = Some(enabled);
        self
    }

    pub fn bookmark(mut self, bookmark: impl Into<String>) -> Self {
        self.bookmark = Some(bookmark.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    fn body(&self, selector: &Value, page_size: u64, bookmark: Option<&str>) -> Value {
        let mut body = self.extra.clone();
        body.insert("selector".to_string(), selector.clone());
        body.insert("limit".to_string(), Value::from(page_size));
        if let Some(skip) = self.skip {
            body.insert("skip".to_string(), Value::from(skip));
        }
        if let Some(sort) = &self.sort {
            body.insert("sort".to_string(), sort.clone());
        }
        if let Some(index) = &self.use_index {
            body.insert("use_index".to_string(), index.clone());
        }
        if let Some(conflicts) = self.conflicts {
            body.insert("conflicts".to_string(), Value::Bool(conflicts));
        }
        if let Some(stats) = self.execution_stats {
            body.insert("execution_stats".to_string(), Value::Bool(stats));
        }
        if let Some(bookmark) = bookmark {
            body.insert("bookmark".to_string(), Value::String(bookmark.to_string()));
        }
        Value::Object(body)
    }
}

#[derive(Debug, Deserialize)]
struct FindPage {
    #[serde(default)]
    docs: Vec<Value>,
    #[serde(default)]
    bookmark: Option<String>,
    #[serde(default)]
    warning: Option<String>,
    #[serde(default)]
    execution_stats: Option<Value>,
}

/// A prepared `_find` request
///
/// Results are fetched lazily, page by page, following the `bookmark` of
/// each response until a page comes back short.
#[derive(Debug, Clone)]
pub struct FindRequest {
    database: Database,
    selector: Value,
    query: FindQuery,
}

impl FindRequest {
    pub(crate) fn new(database: &Database, selector: Value, query: FindQuery) -> Result<Self> {
        if query.extra.contains_key("fields") {
            return Err(CouchError::InvalidArgument(
                "The fields parameter isn't supported".to_string(),
            ));
        }
        Ok(Self {
            database: database.clone(),
            selector,
            query,
        })
    }

    pub fn selector(&self) -> &Value {
        &self.selector
    }

    /// Stream the matching documents
    pub fn into_stream(self) -> impl Stream<Item = Result<Document>> + Send + 'static {
        async_stream::try_stream! {
            let endpoint = format!("{}/_find", self.database.endpoint());
            let page_size = self.query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
            let mut bookmark = self.query.bookmark.clone();

            loop {
                let body = self.query.body(&self.selector, page_size, bookmark.as_deref());
                let json = self
                    .database
                    .remote()
                    .post(&endpoint, body, Params::new())
                    .await?;
                let page: FindPage = serde_json::from_value(json)?;

                if let Some(warning) = &page.warning {
                    warn!(db = %self.database.id(), %warning, "Mango query warning");
                }
                if let Some(stats) = &page.execution_stats {
                    debug!(db = %self.database.id(), %stats, "Mango execution stats");
                }

                let count = page.docs.len() as u64;
                bookmark = page.bookmark;
                for doc in page.docs {
                    yield Document::from_server(&self.database, into_object(doc)?)?;
                }

                if self.query.limit.is_some() || count < page_size {
                    break;
                }
            }
        }
    }

    /// Collect all matching documents
    pub async fn all(self) -> Result<Vec<Document>> {
        self.into_stream().try_collect().await
    }
}

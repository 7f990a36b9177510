//! Bulk writes through `_bulk_docs`
//!
//! A [`BulkOperation`] collects documents and writes all modified ones in a
//! single request on [`BulkOperation::commit`]. Per-document failures do not
//! fail the commit; they are reported in [`BulkResult`].

use crate::database::Database;
use crate::document::Document;
use couchbridge_common::{CouchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

/// Outcome for one document of a `_bulk_docs` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkStatus {
    pub id: String,
    #[serde(default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl BulkStatus {
    pub fn is_ok(&self) -> bool {
        self.ok || (self.error.is_none() && self.rev.is_some())
    }
}

/// Result of a committed bulk operation
#[derive(Debug, Default)]
pub struct BulkResult {
    /// Server response, one entry per document sent
    pub status: Vec<BulkStatus>,
    /// Copies of the documents written, carrying their new `_rev`
    pub ok: Vec<Document>,
    /// Copies of the documents the server rejected or did not answer for
    pub error: Vec<Document>,
}

/// A batch of documents written in one request
///
/// Nothing is sent until [`BulkOperation::commit`]; dropping the operation
/// discards unsaved changes.
///
/// # Example
///
/// ```ignore
/// let mut bulk = db.create_docs(&[]);
/// bulk.create("foo", None)?.set("counter", 1);
/// bulk.create("baz", None)?.set("counter", 2);
/// let result = bulk.commit().await?;
/// assert_eq!(result.ok.len(), 2);
/// ```
#[derive(Debug)]
pub struct BulkOperation {
    database: Database,
    docs: Vec<Document>,
}

impl BulkOperation {
    /// Empty bulk operation
    pub fn new(database: &Database) -> Self {
        Self::with_docs(database, Vec::new())
    }

    pub(crate) fn with_docs(database: &Database, docs: Vec<Document>) -> Self {
        Self {
            database: database.clone(),
            docs,
        }
    }

    /// Add a new local document to the operation
    ///
    /// Fails with `InvalidArgument` if a document with that id is already
    /// part of the operation.
    pub fn create(
        &mut self,
        id: &str,
        data: Option<Map<String, Value>>,
    ) -> Result<&mut Document> {
        self.ensure_unique(id)?;
        self.docs.push(Document::new(&self.database, id, data));
        let index = self.docs.len() - 1;
        Ok(&mut self.docs[index])
    }

    /// Add an existing document to the operation
    pub fn add(&mut self, doc: Document) -> Result<&mut Document> {
        self.ensure_unique(doc.id())?;
        self.docs.push(doc);
        let index = self.docs.len() - 1;
        Ok(&mut self.docs[index])
    }

    fn ensure_unique(&self, id: &str) -> Result<()> {
        if self.docs.iter().any(|doc| doc.id() == id) {
            return Err(CouchError::InvalidArgument(format!(
                "There is already another document instance for '{}' in the bulk operation",
                id
            )));
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.docs.iter().find(|doc| doc.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Document> {
        self.docs.iter_mut().find(|doc| doc.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Document> {
        self.docs.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Write every modified document in one `_bulk_docs` request
    ///
    /// Unmodified documents are neither sent nor reported. If nothing was
    /// modified, no request is made.
    ///
    /// The documents stay in the operation. If the request fails, none of
    /// them is touched and the commit can be retried. Otherwise written
    /// documents carry their new `_rev` and rejected ones stay modified, so
    /// committing again resends only the rejected ones.
    #[instrument(skip(self), fields(db = %self.database.id(), docs = self.docs.len()))]
    pub async fn commit(&mut self) -> Result<BulkResult> {
        let dirty: Vec<usize> = self
            .docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| doc.is_dirty())
            .map(|(index, _)| index)
            .collect();

        if dirty.is_empty() {
            return Ok(BulkResult::default());
        }

        let payload = dirty.iter().map(|&index| self.docs[index].to_json()).collect();
        let response = self.database.bulk_docs(payload).await?;
        let status: Vec<BulkStatus> = serde_json::from_value(response)?;

        let mut result = BulkResult::default();
        for (position, &index) in dirty.iter().enumerate() {
            let doc = &mut self.docs[index];
            match status.get(position) {
                Some(entry) if entry.id != doc.id() => {
                    warn!(
                        doc = %doc.id(),
                        answered = %entry.id,
                        "Bulk response entry does not match the document sent"
                    );
                    result.error.push(doc.clone());
                }
                Some(entry) if entry.is_ok() => {
                    doc.mark_saved(entry.rev.as_deref());
                    result.ok.push(doc.clone());
                }
                Some(entry) => {
                    warn!(
                        doc = %doc.id(),
                        error = ?entry.error,
                        reason = ?entry.reason,
                        "Bulk write rejected"
                    );
                    result.error.push(doc.clone());
                }
                None => {
                    warn!(doc = %doc.id(), "Bulk response has no entry for document");
                    result.error.push(doc.clone());
                }
            }
        }
        result.status = status;

        info!(ok = result.ok.len(), error = result.error.len(), "Bulk commit finished");
        Ok(result)
    }
}

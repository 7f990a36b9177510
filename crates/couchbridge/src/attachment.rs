//! Document attachments

use crate::document::Document;
use crate::remote::{OnStatus, Params};
use couchbridge_common::{CouchError, HttpMethod, Result};
use tracing::{debug, instrument};

/// Handle for one attachment of a document
///
/// Borrowing the parent document mutably lets `save` and `delete` refresh
/// its `_rev` and `_attachments` afterwards.
pub struct Attachment<'a> {
    document: &'a mut Document,
    name: String,
    endpoint: String,
    content_type: Option<String>,
}

impl<'a> Attachment<'a> {
    pub(crate) fn new(document: &'a mut Document, name: String) -> Self {
        let endpoint = format!("{}/{}", document.endpoint(), urlencoding::encode(&name));
        Self {
            document,
            name,
            endpoint,
            content_type: None,
        }
    }

    /// Name of the attachment
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Content type, known after `fetch` or `save`
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The parent document
    pub fn document(&self) -> &Document {
        self.document
    }

    /// Whether the attachment exists on the server
    pub async fn exists(&self) -> Result<bool> {
        self.document.database().remote().exists(&self.endpoint).await
    }

    /// Download the attachment content
    #[instrument(skip(self), fields(doc = %self.document.id(), attachment = %self.name))]
    pub async fn fetch(&mut self) -> Result<Vec<u8>> {
        let remote = self.document.database().remote();
        let response = remote
            .send(remote.builder(HttpMethod::Get, self.endpoint.clone()))
            .await
            .on_status(404, |_| self.not_found())?;

        self.content_type = response.content_type().map(str::to_string);
        let body = response.into_body();
        debug!(bytes = body.len(), "Fetched attachment");
        Ok(body)
    }

    /// Upload the attachment content, then refresh the parent document
    #[instrument(skip(self, data), fields(doc = %self.document.id(), attachment = %self.name, bytes = data.len()))]
    pub async fn save(&mut self, data: Vec<u8>, content_type: &str) -> Result<()> {
        let rev = self.document_rev()?;
        let remote = self.document.database().remote();
        let request = remote
            .builder(HttpMethod::Put, self.endpoint.clone())
            .query("rev", rev)
            .bytes(data, content_type);
        remote
            .send(request)
            .await
            .on_status(409, |_| self.conflict())?;

        self.content_type = Some(content_type.to_string());
        self.document.fetch(false).await
    }

    /// Delete the attachment, then refresh the parent document
    #[instrument(skip(self), fields(doc = %self.document.id(), attachment = %self.name))]
    pub async fn delete(&mut self) -> Result<()> {
        let rev = self.document_rev()?;
        self.document
            .database()
            .remote()
            .delete(&self.endpoint, Params::from([("rev".to_string(), rev)]))
            .await
            .on_status(404, |_| self.not_found())
            .on_status(409, |_| self.conflict())?;

        self.document.fetch(false).await
    }

    fn document_rev(&self) -> Result<String> {
        match self.document.rev() {
            Some(rev) if self.document.exists() => Ok(rev.to_string()),
            _ => Err(CouchError::InvalidArgument(
                "The document must be fetched or saved before updating attachments".to_string(),
            )),
        }
    }

    fn not_found(&self) -> CouchError {
        CouchError::NotFound(format!(
            "The attachment '{}' of document '{}' does not exist.",
            self.name,
            self.document.id()
        ))
    }

    fn conflict(&self) -> CouchError {
        CouchError::Conflict(format!(
            "Conflict when updating attachment '{}': the revision of document '{}' is not the latest",
            self.name,
            self.document.id()
        ))
    }
}

impl std::fmt::Debug for Attachment<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("document", &self.document.id())
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .finish()
    }
}

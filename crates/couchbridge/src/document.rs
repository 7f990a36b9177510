//! Local proxies for CouchDB documents
//!
//! A [`Document`] holds a local copy of a document's JSON content together
//! with a snapshot of the state last exchanged with the server. Mutations
//! only touch the local copy; [`Document::save`] writes it back when it
//! differs from the snapshot. Revision tokens travel with the content, so a
//! save based on an outdated revision fails with `Conflict` instead of
//! overwriting someone else's change.

use crate::attachment::Attachment;
use crate::database::Database;
use crate::remote::{quote_id, OnStatus, Params};
use couchbridge_common::{CouchError, HttpMethod, HttpResponseLike, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::map::Entry;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

/// Id and current revision of a document on the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub ok: bool,
    pub id: String,
    pub rev: String,
}

/// A local representation of a CouchDB document
///
/// Constructing a `Document` never performs a request. The content behaves
/// like a JSON object; `_id`, `_rev` and `_deleted` are kept alongside the
/// user fields exactly as CouchDB stores them.
#[derive(Clone)]
pub struct Document {
    database: Database,
    id: String,
    endpoint: String,
    data: Map<String, Value>,
    synced: Option<Map<String, Value>>,
}

impl Document {
    /// Create a local proxy for the document `id`
    ///
    /// `data` becomes the initial content; `_id` is always set to `id`.
    pub fn new(database: &Database, id: impl Into<String>, data: Option<Map<String, Value>>) -> Self {
        let id = id.into();
        let endpoint = format!("{}/{}", database.endpoint(), quote_id(&id));
        let mut data = data.unwrap_or_default();
        data.insert("_id".to_string(), Value::String(id.clone()));
        Self {
            database: database.clone(),
            id,
            endpoint,
            data,
            synced: None,
        }
    }

    /// Proxy for a document that lives at a non-standard endpoint (`_security`)
    pub(crate) fn with_endpoint(database: &Database, id: &str, endpoint: String) -> Self {
        Self {
            database: database.clone(),
            id: id.to_string(),
            endpoint,
            data: Map::new(),
            synced: None,
        }
    }

    /// Proxy built from content the server just returned
    pub(crate) fn from_server(database: &Database, data: Map<String, Value>) -> Result<Self> {
        let id = data
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| CouchError::Deserialization("document without '_id'".to_string()))?
            .to_string();
        let mut doc = Self::new(database, id, None);
        doc.update_cache(data);
        Ok(doc)
    }

    /// The document id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The database this document belongs to
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Server path of the document
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The local revision, `None` if the document was never fetched or saved
    pub fn rev(&self) -> Option<&str> {
        self.data.get("_rev").and_then(Value::as_str)
    }

    /// Override the local revision
    ///
    /// Used to force a save over a conflicting server revision.
    pub fn set_rev(&mut self, rev: impl Into<String>) {
        self.data.insert("_rev".to_string(), Value::String(rev.into()));
    }

    /// Whether the document exists on the server as far as the local copy knows
    ///
    /// True once the document has been fetched or saved, and false again
    /// after it was deleted. Local edits do not change it until they are
    /// saved. No request is made.
    pub fn exists(&self) -> bool {
        self.synced.as_ref().map_or(false, |synced| {
            synced.contains_key("_rev") && !matches!(synced.get("_deleted"), Some(Value::Bool(true)))
        })
    }

    /// Whether the local copy is a deletion tombstone
    pub fn is_deleted(&self) -> bool {
        matches!(self.data.get("_deleted"), Some(Value::Bool(true)))
    }

    /// The user fields of the document, without `_id` and `_rev`
    ///
    /// Returns `None` if the document does not exist.
    pub fn data(&self) -> Option<Map<String, Value>> {
        if !self.exists() {
            return None;
        }
        Some(
            self.data
                .iter()
                .filter(|(k, _)| k.as_str() != "_id" && k.as_str() != "_rev")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// The complete local content, including `_id` and `_rev`
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Whether the local copy differs from the last synchronised state
    ///
    /// A document that was never synchronised is always dirty.
    pub fn is_dirty(&self) -> bool {
        self.synced.as_ref() != Some(&self.data)
    }

    /// A fresh document carries nothing but its id
    pub(crate) fn is_fresh(&self) -> bool {
        self.data.keys().all(|k| k == "_id")
    }

    // Map-like access

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.data.get_mut(key)
    }

    /// Set a field, returning the previous value
    ///
    /// Setting a field on a deleted document revives it: the next save
    /// recreates the document on top of the tombstone revision.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        if key != "_deleted" {
            self.data.remove("_deleted");
        }
        self.data.insert(key, value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Insert all fields of `fields`, overriding existing ones
    pub fn update(&mut self, fields: Map<String, Value>) {
        for (key, value) in fields {
            self.set(key, value);
        }
    }

    pub fn entry(&mut self, key: impl Into<String>) -> Entry<'_> {
        self.data.entry(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.data.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Number of fields, counting `_id` and `_rev`
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remove every field except `_id` and `_rev`
    pub fn clear(&mut self) {
        self.data
            .retain(|k, _| k.as_str() == "_id" || k.as_str() == "_rev");
    }

    /// Deserialize the content into a typed value
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.data.clone()))
            .map_err(|e| CouchError::Deserialization(e.to_string()))
    }

    /// Replace the user fields with the serialization of `value`
    ///
    /// `_id` and `_rev` are kept.
    pub fn replace_with<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let fields = match serde_json::to_value(value)
            .map_err(|e| CouchError::Serialization(e.to_string()))?
        {
            Value::Object(map) => map,
            other => {
                return Err(CouchError::Serialization(format!(
                    "document content must be a JSON object, got {}",
                    other
                )))
            }
        };
        self.clear();
        self.update(fields);
        Ok(())
    }

    /// Pretty-printed JSON of the local content
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.data).unwrap_or_default()
    }

    pub(crate) fn to_json(&self) -> Value {
        Value::Object(self.data.clone())
    }

    /// Replace the local copy with content from the server
    pub(crate) fn update_cache(&mut self, data: Map<String, Value>) {
        self.data = data;
        self.synced = Some(self.data.clone());
    }

    /// Record a successful write that produced `rev`
    pub(crate) fn mark_saved(&mut self, rev: Option<&str>) {
        if let Some(rev) = rev {
            self.set_rev(rev);
        }
        self.synced = Some(self.data.clone());
    }

    // Server operations

    /// Retrieve the document from the server, replacing the local copy
    ///
    /// Fails with `Conflict` if the local copy has unsaved changes, unless
    /// `discard_changes` is set or the document is still fresh.
    pub async fn fetch(&mut self, discard_changes: bool) -> Result<()> {
        self.fetch_impl(discard_changes, None).await
    }

    /// Retrieve a specific revision of the document
    pub async fn fetch_rev(&mut self, rev: &str, discard_changes: bool) -> Result<()> {
        self.fetch_impl(discard_changes, Some(rev)).await
    }

    #[instrument(skip(self), fields(db = %self.database.id(), doc = %self.id))]
    async fn fetch_impl(&mut self, discard_changes: bool, rev: Option<&str>) -> Result<()> {
        if self.is_dirty() && !(discard_changes || self.is_fresh()) {
            return Err(CouchError::Conflict(format!(
                "Cannot fetch document '{}' from server, as the local cache has unsaved changes.",
                self.id
            )));
        }

        let mut params = Params::new();
        if let Some(rev) = rev {
            params.push(("rev".to_string(), rev.to_string()));
        }

        let id = &self.id;
        let json = self
            .database
            .remote()
            .get(&self.endpoint, params)
            .await
            .on_status(400, |e| {
                CouchError::BadRequest(format!("Invalid request for document '{}': {}", id, e))
            })
            .on_status(401, |_| {
                CouchError::Unauthorized(format!("Access to document '{}' is unauthorized", id))
            })
            .on_status(403, |_| {
                CouchError::Forbidden(format!("Access to document '{}' is forbidden", id))
            })
            .on_status(404, |_| {
                CouchError::NotFound(format!("Requested document '{}' was not found", id))
            })?;

        let data = into_object(json)?;
        debug!(rev = ?data.get("_rev"), "Fetched document");
        self.update_cache(data);
        Ok(())
    }

    /// Save the local copy to the server
    ///
    /// Nothing is sent if the local copy is unchanged. Fails with `Conflict`
    /// if the local revision is not the server's current one.
    #[instrument(skip(self), fields(db = %self.database.id(), doc = %self.id))]
    pub async fn save(&mut self) -> Result<()> {
        if !self.is_dirty() {
            return Ok(());
        }

        let id = &self.id;
        let rev = self.rev().unwrap_or("none");
        let json = self
            .database
            .remote()
            .put(&self.endpoint, Some(self.to_json()), Params::new())
            .await
            .on_status(401, |_| {
                CouchError::Unauthorized(format!("Access to document '{}' is unauthorized", id))
            })
            .on_status(403, |_| {
                CouchError::Forbidden(format!("Access to document '{}' is forbidden", id))
            })
            .on_status(409, |_| {
                CouchError::Conflict(format!(
                    "Conflict when saving document '{}': the local revision '{}' is not the latest",
                    id, rev
                ))
            })?;

        let rev = json.get("rev").and_then(Value::as_str).map(str::to_string);
        debug!(rev = ?rev, "Saved document");
        self.mark_saved(rev.as_deref());
        Ok(())
    }

    /// Delete the document on the server
    ///
    /// Afterwards the local copy is a tombstone carrying the deletion
    /// revision; it can be filled and saved again. Fails with `Conflict` if
    /// the local copy has unsaved changes (unless `discard_changes`) or the
    /// local revision is outdated.
    #[instrument(skip(self), fields(db = %self.database.id(), doc = %self.id))]
    pub async fn delete(&mut self, discard_changes: bool) -> Result<()> {
        if self.is_dirty() && !discard_changes {
            return Err(CouchError::Conflict(format!(
                "Cannot delete document '{}' from server, as the local cache has unsaved changes.",
                self.id
            )));
        }

        let rev = self
            .rev()
            .ok_or_else(|| {
                CouchError::InvalidArgument(format!(
                    "Document '{}' has no revision; fetch or save it before deleting",
                    self.id
                ))
            })?
            .to_string();

        let id = &self.id;
        let json = self
            .database
            .remote()
            .delete(&self.endpoint, vec![("rev".to_string(), rev.clone())])
            .await
            .on_status(404, |_| {
                CouchError::NotFound(format!("Document '{}' was not found on the server", id))
            })
            .on_status(409, |_| {
                CouchError::Conflict(format!(
                    "Conflict when deleting document '{}': the local revision '{}' is not the latest",
                    id, rev
                ))
            })?;

        let mut tombstone = Map::new();
        tombstone.insert("_id".to_string(), Value::String(self.id.clone()));
        if let Some(new_rev) = json.get("rev").and_then(Value::as_str) {
            tombstone.insert("_rev".to_string(), Value::String(new_rev.to_string()));
        }
        tombstone.insert("_deleted".to_string(), Value::Bool(true));
        self.update_cache(tombstone);
        Ok(())
    }

    /// Copy the server's current version of this document to `new_id`
    #[instrument(skip(self), fields(db = %self.database.id(), doc = %self.id))]
    pub async fn copy(&self, new_id: &str) -> Result<Document> {
        let remote = self.database.remote();
        let request = remote
            .builder(HttpMethod::Copy, self.endpoint.clone())
            .header("Destination", quote_id(new_id));
        remote
            .send(request)
            .await
            .on_status(404, |_| {
                CouchError::NotFound(format!("Document '{}' was not found on the server", self.id))
            })
            .on_status(409, |_| {
                CouchError::Conflict(format!("The document '{}' does already exist", new_id))
            })?;

        self.database.get(new_id).await
    }

    /// Id and current revision of the document on the server
    pub async fn info(&self) -> Result<DocumentInfo> {
        let response = self
            .database
            .remote()
            .head(&self.endpoint)
            .await
            .on_status(404, |_| {
                CouchError::NotFound(format!("Document '{}' was not found on the server", self.id))
            })?;

        let rev = response
            .etag()
            .ok_or_else(|| CouchError::Deserialization("response without ETag".to_string()))?
            .to_string();
        Ok(DocumentInfo {
            ok: true,
            id: self.id.clone(),
            rev,
        })
    }

    /// Handle for the attachment `name`; no request is made
    pub fn attachment(&mut self, name: impl Into<String>) -> Attachment<'_> {
        Attachment::new(self, name.into())
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("db", &self.database.id())
            .field("id", &self.id)
            .field("rev", &self.rev())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json_pretty())
    }
}

/// Unwrap a JSON object response
pub(crate) fn into_object(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CouchError::Deserialization(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CouchConfig, CouchDB};
    use serde_json::json;

    fn database() -> Database {
        let couchdb = CouchDB::new(CouchConfig::new("http://localhost:5984")).unwrap();
        Database::new(couchdb.remote().clone(), "testdb")
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Settings {
        theme: String,
        size: u32,
    }

    #[test]
    fn test_constructor_sets_id() {
        let doc = Document::new(&database(), "foo", None);
        assert_eq!(doc.id(), "foo");
        assert_eq!(doc.get("_id"), Some(&json!("foo")));
        assert_eq!(doc.endpoint(), "/testdb/foo");
        assert!(doc.rev().is_none());
        assert!(!doc.exists());
        assert!(doc.data().is_none());
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_constructor_with_data() {
        let mut data = Map::new();
        data.insert("counter".to_string(), json!(42));
        let doc = Document::new(&database(), "foo", Some(data));
        assert_eq!(doc.get("counter"), Some(&json!(42)));
        assert!(!doc.is_fresh());
    }

    #[test]
    fn test_new_document_is_dirty_and_fresh() {
        let doc = Document::new(&database(), "foo", None);
        assert!(doc.is_dirty());
        assert!(doc.is_fresh());
    }

    #[test]
    fn test_cache_tracks_nested_changes() {
        let mut doc = Document::new(&database(), "foo", None);
        doc.mark_saved(Some("1-a"));
        assert!(!doc.is_dirty());
        assert_eq!(doc.rev(), Some("1-a"));

        doc.set("foo", json!({"hello": "kitty"}));
        assert!(doc.is_dirty());
        doc.mark_saved(Some("2-b"));
        assert!(!doc.is_dirty());

        doc.get_mut("foo").unwrap()["llama"] = json!("juicy");
        assert!(doc.is_dirty());
    }

    #[test]
    fn test_data_excludes_meta_fields() {
        let mut doc = Document::new(&database(), "foo", None);
        doc.mark_saved(Some("1-a"));
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.data(), Some(Map::new()));
    }

    #[test]
    fn test_clear_keeps_id_and_rev() {
        let mut doc = Document::new(&database(), "foo", None);
        doc.set("a", 1);
        doc.clear();
        assert_eq!(doc.len(), 1);
        assert!(doc.data().is_none());

        doc.set("a", 1);
        doc.mark_saved(Some("1-a"));
        doc.clear();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.data(), Some(Map::new()));
    }

    #[test]
    fn test_tombstone_exists_again_only_after_save() {
        let mut doc = Document::new(&database(), "foo", None);
        let mut tombstone = Map::new();
        tombstone.insert("_id".to_string(), json!("foo"));
        tombstone.insert("_rev".to_string(), json!("2-b"));
        tombstone.insert("_deleted".to_string(), json!(true));
        doc.update_cache(tombstone);

        assert!(doc.is_deleted());
        assert!(!doc.exists());
        assert!(doc.data().is_none());
        assert!(doc.contains_key("_deleted"));

        doc.set("Zebras", "are majestic");
        assert!(!doc.is_deleted());
        assert!(!doc.exists());
        assert!(doc.data().is_none());
        assert_eq!(doc.rev(), Some("2-b"));

        doc.mark_saved(Some("3-c"));
        assert!(doc.exists());
        assert_eq!(doc.data().unwrap()["Zebras"], json!("are majestic"));
    }

    #[test]
    fn test_typed_roundtrip() {
        let mut doc = Document::new(&database(), "settings", None);
        doc.set_rev("1-a");
        doc.replace_with(&Settings {
            theme: "dark".to_string(),
            size: 12,
        })
        .unwrap();

        assert_eq!(doc.rev(), Some("1-a"));
        assert_eq!(doc.id(), "settings");
        let settings: Settings = doc.deserialize().unwrap();
        assert_eq!(settings.size, 12);
    }

    #[test]
    fn test_replace_with_rejects_non_objects() {
        let mut doc = Document::new(&database(), "foo", None);
        assert!(matches!(doc.replace_with(&42), Err(CouchError::Serialization(_))));
    }

    #[test]
    fn test_from_server_requires_id() {
        let mut data = Map::new();
        data.insert("x".to_string(), json!(1));
        assert!(Document::from_server(&database(), data).is_err());
    }

    #[test]
    fn test_display_is_pretty_json() {
        let doc = Document::new(&database(), "foo", None);
        assert_eq!(doc.to_string(), "{\n  \"_id\": \"foo\"\n}");
    }

    #[test]
    fn test_design_and_encoded_endpoints() {
        let db = database();
        assert_eq!(Document::new(&db, "_design/v", None).endpoint(), "/testdb/_design/v");
        assert_eq!(Document::new(&db, "a b", None).endpoint(), "/testdb/a%20b");
    }
}

//! Design documents

use crate::database::Database;
use crate::document::Document;
use crate::view::View;
use couchbridge_common::{CouchError, Result};
use serde_json::{json, Map, Value};
use tracing::instrument;

/// Keys CouchDB accepts at the top level of a design document
pub const ALLOWED_KEYS: &[&str] = &[
    "language",
    "options",
    "filters",
    "lists",
    "rewrites",
    "shows",
    "updates",
    "validate_doc_update",
    "views",
];

/// A `_design/` document holding view definitions
#[derive(Debug, Clone)]
pub struct DesignDocument {
    doc: Document,
    name: String,
}

impl DesignDocument {
    /// `id` may be given with or without the `_design/` prefix
    pub(crate) fn new(database: &Database, id: &str) -> Self {
        let name = id.strip_prefix("_design/").unwrap_or(id).to_string();
        Self {
            doc: Document::new(database, format!("_design/{}", name), None),
            name,
        }
    }

    /// Full document id, including `_design/`
    pub fn id(&self) -> &str {
        self.doc.id()
    }

    /// Name without the `_design/` prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        self.doc.endpoint()
    }

    pub fn rev(&self) -> Option<&str> {
        self.doc.rev()
    }

    pub fn exists(&self) -> bool {
        self.doc.exists()
    }

    pub fn is_dirty(&self) -> bool {
        self.doc.is_dirty()
    }

    /// The underlying document
    pub fn as_document(&self) -> &Document {
        &self.doc
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }

    /// Set a top-level key
    ///
    /// Fails with `InvalidArgument` for keys outside [`ALLOWED_KEYS`].
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<Option<Value>> {
        if !ALLOWED_KEYS.contains(&key) {
            return Err(CouchError::InvalidArgument(format!(
                "The key '{}' is not allowed in a design document.",
                key
            )));
        }
        Ok(self.doc.set(key, value))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.doc.remove(key)
    }

    /// Names of the views defined locally
    pub fn views(&self) -> Vec<String> {
        self.doc
            .get("views")
            .and_then(Value::as_object)
            .map(|views| views.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Handle for the view `name`; no request is made
    pub fn view(&self, name: &str) -> View {
        View::new(self.doc.database(), &self.name, name)
    }

    /// Define the view `name` and save the design document
    ///
    /// Fails with `Conflict` if the view is already defined, unless
    /// `exists_ok` is set, in which case the definition is replaced.
    #[instrument(skip(self, map, reduce), fields(ddoc = %self.name))]
    pub async fn create_view(
        &mut self,
        name: &str,
        map: &str,
        reduce: Option<&str>,
        exists_ok: bool,
    ) -> Result<View> {
        if self.views().iter().any(|v| v == name) && !exists_ok {
            return Err(CouchError::Conflict(format!(
                "The view '{}' does already exist in the design document '{}'.",
                name,
                self.id()
            )));
        }

        let mut definition = Map::new();
        definition.insert("map".to_string(), Value::String(map.to_string()));
        if let Some(reduce) = reduce {
            definition.insert("reduce".to_string(), Value::String(reduce.to_string()));
        }

        let views = self.doc.entry("views").or_insert_with(|| json!({}));
        if !views.is_object() {
            *views = json!({});
        }
        if let Value::Object(views) = views {
            views.insert(name.to_string(), Value::Object(definition));
        }
        self.doc.set("language", "javascript");

        self.doc.save().await?;
        Ok(self.view(name))
    }

    pub async fn fetch(&mut self, discard_changes: bool) -> Result<()> {
        self.doc.fetch(discard_changes).await
    }

    pub async fn save(&mut self) -> Result<()> {
        self.doc.save().await
    }

    pub async fn delete(&mut self, discard_changes: bool) -> Result<()> {
        self.doc.delete(discard_changes).await
    }
}

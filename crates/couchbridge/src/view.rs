//! Views and the `_all_docs` index

use crate::database::Database;
use crate::document::{into_object, Document};
use crate::remote::{bool_param, json_param, quote_id, OnStatus, Params};
use couchbridge_common::{CouchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{instrument, warn};

/// Highest code point used to close a prefix range on design document views
pub const VIEW_PREFIX_SENTINEL: char = '\u{ffff}';

/// Highest code point used to close a prefix range on `_all_docs`
pub const ALL_DOCS_PREFIX_SENTINEL: char = '\u{10fffe}';

/// Query parameters of a view request
///
/// Keys are JSON values and are encoded as JSON in the query string.
#[derive(Debug, Clone, Default)]
pub struct ViewQuery {
    pub key: Option<Value>,
    pub startkey: Option<Value>,
    pub endkey: Option<Value>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub descending: Option<bool>,
    pub include_docs: Option<bool>,
    pub inclusive_end: Option<bool>,
    pub reduce: Option<bool>,
    pub group: Option<bool>,
    pub group_level: Option<u32>,
    pub update_seq: Option<bool>,
    pub conflicts: Option<bool>,
    /// Parameters passed through verbatim
    pub extra: Vec<(String, String)>,
}

impl ViewQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn startkey(mut self, key: impl Into<Value>) -> Self {
        self.startkey = Some(key.into());
        self
    }

    pub fn endkey(mut self, key: impl Into<Value>) -> Self {
        self.endkey = Some(key.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = Some(descending);
        self
    }

    pub fn include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = Some(include_docs);
        self
    }

    pub fn inclusive_end(mut self, inclusive_end: bool) -> Self {
        self.inclusive_end = Some(inclusive_end);
        self
    }

    pub fn reduce(mut self, reduce: bool) -> Self {
        self.reduce = Some(reduce);
        self
    }

    pub fn group(mut self, group: bool) -> Self {
        self.group = Some(group);
        self
    }

    pub fn group_level(mut self, level: u32) -> Self {
        self.group_level = Some(level);
        self
    }

    pub fn update_seq(mut self, update_seq: bool) -> Self {
        self.update_seq = Some(update_seq);
        self
    }

    pub fn conflicts(mut self, conflicts: bool) -> Self {
        self.conflicts = Some(conflicts);
        self
    }

    /// Add a parameter that has no typed setter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    /// Restrict the range to keys starting with `prefix`
    pub(crate) fn prefix(mut self, prefix: &str, sentinel: char) -> Self {
        self.startkey = Some(Value::String(prefix.to_string()));
        self.endkey = Some(Value::String(format!("{}{}", prefix, sentinel)));
        self
    }

    pub(crate) fn to_params(&self) -> Params {
        let mut params = Params::new();
        let json_fields = [
            ("key", &self.key),
            ("startkey", &self.startkey),
            ("endkey", &self.endkey),
        ];
        for (name, value) in json_fields {
            if let Some(value) = value {
                params.push((name.to_string(), json_param(value)));
            }
        }

        let bool_fields = [
            ("descending", self.descending),
            ("include_docs", self.include_docs),
            ("inclusive_end", self.inclusive_end),
            ("reduce", self.reduce),
            ("group", self.group),
            ("update_seq", self.update_seq),
            ("conflicts", self.conflicts),
        ];
        for (name, value) in bool_fields {
            if let Some(value) = value {
                params.push((name.to_string(), bool_param(value)));
            }
        }

        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(skip) = self.skip {
            params.push(("skip".to_string(), skip.to_string()));
        }
        if let Some(level) = self.group_level {
            params.push(("group_level".to_string(), level.to_string()));
        }

        params.extend(self.extra.iter().cloned());
        params
    }
}

/// One row of a view response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub doc: Option<Value>,
    /// Set for keys that could not be resolved (e.g. `not_found`)
    #[serde(default)]
    pub error: Option<String>,
}

impl ViewRow {
    fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Response of a view request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewResponse {
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub rows: Vec<ViewRow>,
    #[serde(default)]
    pub total_rows: Option<u64>,
    #[serde(default)]
    pub update_seq: Option<Value>,
}

impl ViewResponse {
    /// Rows that resolved successfully
    pub fn valid_rows(&self) -> impl Iterator<Item = &ViewRow> {
        self.rows.iter().filter(|row| !row.is_error())
    }

    pub fn ids(&self) -> Vec<String> {
        self.valid_rows().filter_map(|row| row.id.clone()).collect()
    }

    pub fn keys(&self) -> Vec<Value> {
        self.valid_rows().map(|row| row.key.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.valid_rows().map(|row| row.value.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.valid_rows()
            .map(|row| (row.key.clone(), row.value.clone()))
            .collect()
    }
}

/// A view of a design document, or the `_all_docs` index
#[derive(Debug, Clone)]
pub struct View {
    database: Database,
    design_doc: Option<String>,
    name: String,
    endpoint: String,
}

impl View {
    pub(crate) fn new(database: &Database, design_doc: &str, name: &str) -> Self {
        let ddoc = design_doc.strip_prefix("_design/").unwrap_or(design_doc);
        let endpoint = format!(
            "{}/_design/{}/_view/{}",
            database.endpoint(),
            quote_id(ddoc),
            quote_id(name)
        );
        Self {
            database: database.clone(),
            design_doc: Some(ddoc.to_string()),
            name: name.to_string(),
            endpoint,
        }
    }

    pub(crate) fn all_docs(database: &Database) -> Self {
        Self {
            database: database.clone(),
            design_doc: None,
            name: "_all_docs".to_string(),
            endpoint: format!("{}/_all_docs", database.endpoint()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the design document, `None` for `_all_docs`
    pub fn design_doc(&self) -> Option<&str> {
        self.design_doc.as_deref()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sentinel closing a prefix range on this view
    pub fn prefix_sentinel(&self) -> char {
        match self.design_doc {
            Some(_) => VIEW_PREFIX_SENTINEL,
            None => ALL_DOCS_PREFIX_SENTINEL,
        }
    }

    /// Query selecting every key that starts with `prefix`
    pub fn prefix_query(&self, prefix: &str) -> ViewQuery {
        ViewQuery::default().prefix(prefix, self.prefix_sentinel())
    }

    fn not_found(&self) -> CouchError {
        CouchError::NotFound(format!(
            "The view '{}' does not exist in the database '{}'.",
            self.name,
            self.database.id()
        ))
    }

    /// `GET` the view
    #[instrument(skip(self, query), fields(db = %self.database.id(), view = %self.name))]
    pub async fn get(&self, query: &ViewQuery) -> Result<ViewResponse> {
        let json = self
            .database
            .remote()
            .get(&self.endpoint, query.to_params())
            .await
            .on_status(404, |_| self.not_found())?;
        Ok(serde_json::from_value(json)?)
    }

    /// `POST` the view for the given keys
    #[instrument(skip(self, keys, query), fields(db = %self.database.id(), view = %self.name, keys = keys.len()))]
    pub async fn post(&self, keys: &[Value], query: &ViewQuery) -> Result<ViewResponse> {
        let json = self
            .database
            .remote()
            .post(&self.endpoint, json!({ "keys": keys }), query.to_params())
            .await
            .on_status(404, |_| self.not_found())?;
        Ok(serde_json::from_value(json)?)
    }

    /// Document ids of the rows
    pub async fn ids(&self, query: &ViewQuery) -> Result<Vec<String>> {
        Ok(self.get(query).await?.ids())
    }

    /// Keys of the rows
    pub async fn keys(&self, query: &ViewQuery) -> Result<Vec<Value>> {
        Ok(self.get(query).await?.keys())
    }

    pub async fn values(&self, query: &ViewQuery) -> Result<Vec<Value>> {
        Ok(self.get(query).await?.values())
    }

    pub async fn items(&self, query: &ViewQuery) -> Result<Vec<(Value, Value)>> {
        Ok(self.get(query).await?.items())
    }

    /// Documents of the rows, requested with `include_docs=true`
    ///
    /// With `keys`, the view is queried by `POST`. Keys without a document
    /// yield an empty local proxy if `create` is set, and fail with
    /// `NotFound` otherwise. Design documents are skipped unless
    /// `include_ddocs` is set.
    pub async fn docs(
        &self,
        query: &ViewQuery,
        keys: Option<&[String]>,
        create: bool,
        include_ddocs: bool,
    ) -> Result<Vec<Document>> {
        let query = query.clone().include_docs(true);
        let response = match keys {
            Some(keys) => {
                let keys: Vec<Value> = keys.iter().cloned().map(Value::String).collect();
                self.post(&keys, &query).await?
            }
            None => self.get(&query).await?,
        };

        let mut docs = Vec::with_capacity(response.rows.len());
        for row in response.rows {
            let failed = row.is_error();
            match row.doc {
                Some(doc) if !failed && !doc.is_null() => {
                    let is_ddoc = row
                        .id
                        .as_deref()
                        .map_or(false, |id| id.starts_with("_design/"));
                    if is_ddoc && !include_ddocs {
                        continue;
                    }
                    docs.push(Document::from_server(&self.database, into_object(doc)?)?);
                }
                _ => {
                    let key = match &row.key {
                        Value::String(key) => key.clone(),
                        other => {
                            warn!(key = %other, "Skipping row with a non-string key");
                            continue;
                        }
                    };
                    if !create {
                        return Err(CouchError::NotFound(format!(
                            "The document '{}' does not exist in the database '{}'.",
                            key,
                            self.database.id()
                        )));
                    }
                    docs.push(Document::new(&self.database, key, None));
                }
            }
        }
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_are_json_encoded() {
        let params = ViewQuery::new()
            .key("foo")
            .limit(10)
            .include_docs(true)
            .param("stable", "true")
            .to_params();
        assert_eq!(
            params,
            vec![
                ("key".to_string(), "\"foo\"".to_string()),
                ("include_docs".to_string(), "true".to_string()),
                ("limit".to_string(), "10".to_string()),
                ("stable".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_complex_keys() {
        let params = ViewQuery::new()
            .startkey(json!(["a", 1]))
            .group_level(1)
            .to_params();
        assert_eq!(params[0], ("startkey".to_string(), "[\"a\",1]".to_string()));
        assert_eq!(params[1], ("group_level".to_string(), "1".to_string()));
    }

    #[test]
    fn test_prefix_range() {
        let query = ViewQuery::new().prefix("foo", ALL_DOCS_PREFIX_SENTINEL);
        assert_eq!(query.startkey, Some(json!("foo")));
        assert_eq!(query.endkey, Some(json!("foo\u{10fffe}")));

        let params = ViewQuery::new().prefix("ba", VIEW_PREFIX_SENTINEL).to_params();
        assert_eq!(params[1].1, "\"ba\u{ffff}\"");
    }

    #[test]
    fn test_response_skips_error_rows() {
        let response: ViewResponse = serde_json::from_value(json!({
            "total_rows": 2,
            "offset": 0,
            "rows": [
                {"id": "a", "key": "a", "value": {"rev": "1-x"}},
                {"key": "missing", "error": "not_found"}
            ]
        }))
        .unwrap();
        assert_eq!(response.rows.len(), 2);
        assert_eq!(response.ids(), vec!["a".to_string()]);
        assert_eq!(response.keys(), vec![json!("a")]);
        assert_eq!(response.items(), vec![(json!("a"), json!({"rev": "1-x"}))]);
        assert!(response.update_seq.is_none());
    }

    #[test]
    fn test_reduce_response_without_offset() {
        let response: ViewResponse = serde_json::from_value(json!({
            "rows": [{"key": null, "value": 42}],
            "update_seq": "7-abc"
        }))
        .unwrap();
        assert_eq!(response.values(), vec![json!(42)]);
        assert_eq!(response.update_seq, Some(json!("7-abc")));
        assert!(response.total_rows.is_none());
    }
}

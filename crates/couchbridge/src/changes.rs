//! The `_changes` feed
//!
//! `normal` and `longpoll` feeds return one JSON document whose `results`
//! become events. The `continuous` feed is read incrementally: one JSON
//! object per line, blank heartbeat lines in between, and a final object
//! carrying `last_seq`.

use crate::database::Database;
use crate::document::{into_object, Document};
use crate::remote::{bool_param, Params};
use couchbridge_common::{CouchError, HttpMethod, Result};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Kind of `_changes` feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Feed {
    /// Return all changes at once
    Normal,
    /// Wait for the first change, then return
    Longpoll,
    /// Keep the connection open and stream changes as they happen
    #[default]
    Continuous,
}

impl Feed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Normal => "normal",
            Feed::Longpoll => "longpoll",
            Feed::Continuous => "continuous",
        }
    }
}

/// Options of a `_changes` request
#[derive(Debug, Clone, Default)]
pub struct ChangesQuery {
    pub feed: Feed,
    /// Start after this sequence; `"now"` skips existing changes
    pub since: Option<String>,
    /// Sent as `last-event-id`
    pub last_event_id: Option<String>,
    pub include_docs: Option<bool>,
    pub heartbeat: Option<Duration>,
    pub timeout: Option<Duration>,
    pub limit: Option<u64>,
    pub filter: Option<String>,
    pub descending: Option<bool>,
    /// Parameters passed through verbatim
    pub extra: Vec<(String, String)>,
}

impl ChangesQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(mut self, feed: Feed) -> Self {
        self.feed = feed;
        self
    }

    pub fn since(mut self, since: impl Into<String>) -> Self {
        self.since = Some(since.into());
        self
    }

    pub fn last_event_id(mut self, id: impl Into<String>) -> Self {
        self.last_event_id = Some(id.into());
        self
    }

    pub fn include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = Some(include_docs);
        self
    }

    pub fn heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = Some(descending);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    pub(crate) fn to_params(&self) -> Params {
        let mut params = vec![("feed".to_string(), self.feed.as_str().to_string())];
        if let Some(since) = &self.since {
            params.push(("since".to_string(), since.clone()));
        }
        if let Some(id) = &self.last_event_id {
            params.push(("last-event-id".to_string(), id.clone()));
        }
        if let Some(include_docs) = self.include_docs {
            params.push(("include_docs".to_string(), bool_param(include_docs)));
        }
        if let Some(heartbeat) = self.heartbeat {
            params.push(("heartbeat".to_string(), heartbeat.as_millis().to_string()));
        }
        if let Some(timeout) = self.timeout {
            params.push(("timeout".to_string(), timeout.as_millis().to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(filter) = &self.filter {
            params.push(("filter".to_string(), filter.clone()));
        }
        if let Some(descending) = self.descending {
            params.push(("descending".to_string(), bool_param(descending)));
        }
        params.extend(self.extra.iter().cloned());
        params
    }
}

/// A document was deleted
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedEvent {
    pub json: Value,
}

/// A document was created or modified
#[derive(Debug, Clone)]
pub struct ChangedEvent {
    pub json: Value,
    database: Database,
}

impl ChangedEvent {
    /// The document after the change
    ///
    /// Uses the document included in the event (`include_docs=true`) and
    /// otherwise fetches the event's revision from the server.
    pub async fn doc(&self) -> Result<Document> {
        if let Some(doc @ Value::Object(_)) = self.json.get("doc") {
            return Document::from_server(&self.database, into_object(doc.clone())?);
        }

        let id = event_id(&self.json)
            .ok_or_else(|| CouchError::Deserialization("change event without 'id'".to_string()))?;
        match event_rev(&self.json) {
            Some(rev) => self.database.get_rev(id, rev).await,
            None => self.database.get(id).await,
        }
    }
}

/// One entry of the `_changes` feed
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Changed(ChangedEvent),
    Deleted(DeletedEvent),
}

impl ChangeEvent {
    pub(crate) fn from_json(database: &Database, json: Value) -> Self {
        if json.get("deleted") == Some(&Value::Bool(true)) {
            ChangeEvent::Deleted(DeletedEvent { json })
        } else {
            ChangeEvent::Changed(ChangedEvent {
                json,
                database: database.clone(),
            })
        }
    }

    /// Raw JSON of the event
    pub fn json(&self) -> &Value {
        match self {
            ChangeEvent::Changed(event) => &event.json,
            ChangeEvent::Deleted(event) => &event.json,
        }
    }

    /// Id of the changed document
    pub fn id(&self) -> Option<&str> {
        event_id(self.json())
    }

    /// New revision of the document
    pub fn rev(&self) -> Option<&str> {
        event_rev(self.json())
    }

    /// Sequence identifier of the event
    ///
    /// CouchDB 1.x reports numeric sequences; they are returned as strings.
    pub fn sequence(&self) -> Option<String> {
        match self.json().get("seq")? {
            Value::String(seq) => Some(seq.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, ChangeEvent::Deleted(_))
    }
}

fn event_id(json: &Value) -> Option<&str> {
    json.get("id").and_then(Value::as_str)
}

fn event_rev(json: &Value) -> Option<&str> {
    json.get("changes")?.get(0)?.get("rev")?.as_str()
}

enum FeedLine {
    Heartbeat,
    Change(Value),
    End,
}

fn parse_line(line: &[u8]) -> Result<FeedLine> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(FeedLine::Heartbeat);
    }
    let json: Value = serde_json::from_str(line)?;
    if json.get("last_seq").is_some() {
        return Ok(FeedLine::End);
    }
    Ok(FeedLine::Change(json))
}

/// Accumulates feed chunks and hands out complete lines
///
/// Bytes before `scanned` are known to hold no newline, so a long line
/// arriving in many chunks is searched only once.
#[derive(Default)]
struct LineBuffer {
    buf: Vec<u8>,
    /// Start of the first line not yet handed out
    start: usize,
    scanned: usize,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, including its `\n`
    fn next_line(&mut self) -> Option<Vec<u8>> {
        match self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let end = self.scanned + offset + 1;
                let line = self.buf[self.start..end].to_vec();
                self.start = end;
                self.scanned = end;
                Some(line)
            }
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }

    /// Trailing bytes without a newline
    fn remainder(&self) -> &[u8] {
        &self.buf[self.start..]
    }
}

pub(crate) fn stream(
    database: Database,
    query: ChangesQuery,
) -> impl Stream<Item = Result<ChangeEvent>> + Send + 'static {
    async_stream::try_stream! {
        let remote = database.remote().clone();
        let endpoint = format!("{}/_changes", database.endpoint());
        let mut request = remote
            .builder(HttpMethod::Get, endpoint)
            .query_pairs(query.to_params());
        if query.feed != Feed::Normal {
            request = request.without_timeout();
        }
        debug!(db = %database.id(), feed = query.feed.as_str(), "Listening for changes");

        if query.feed == Feed::Continuous {
            let response = remote.send_streaming(request).await?;
            let mut body = Box::pin(response.bytes_stream());
            let mut buffer = LineBuffer::default();
            let mut finished = false;

            while !finished {
                let chunk = match body.next().await {
                    Some(chunk) => chunk?,
                    None => break,
                };
                buffer.push(&chunk);

                while let Some(line) = buffer.next_line() {
                    match parse_line(&line)? {
                        FeedLine::Heartbeat => {}
                        FeedLine::End => {
                            finished = true;
                            break;
                        }
                        FeedLine::Change(json) => yield ChangeEvent::from_json(&database, json),
                    }
                }
            }

            if !finished {
                if let FeedLine::Change(json) = parse_line(buffer.remainder())? {
                    yield ChangeEvent::from_json(&database, json);
                }
            }
        } else {
            let json = remote.send(request).await?.json()?;
            let results = match json.get("results") {
                Some(Value::Array(results)) => results.clone(),
                _ => {
                    warn!(db = %database.id(), "Changes response without 'results'");
                    Vec::new()
                }
            };
            for entry in results {
                yield ChangeEvent::from_json(&database, entry);
            }
        }
    }
}

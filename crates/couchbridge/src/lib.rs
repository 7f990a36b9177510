//! couchbridge: async CouchDB client
//!
//! Documents are local proxies with dirty tracking: reads fill a local
//! cache, writes send it back together with its revision token, and
//! concurrent modifications surface as `CouchError::Conflict`.
//!
//! # Architecture
//!
//! - `CouchDB`: session with one pooled HTTP client, database management
//! - `Database`: documents, `_all_docs`, views, Mango queries, change feed
//! - `Document`: JSON object with `fetch`/`save`/`delete` against the server
//! - `BulkOperation`: many writes in a single `_bulk_docs` request
//! - `View`, `FindRequest`, `ChangeEvent`: read paths over many documents
//!
//! # Example
//!
//! ```ignore
//! use couchbridge::{CouchConfig, CouchDB, ViewQuery};
//!
//! #[tokio::main]
//! async fn main() -> couchbridge::Result<()> {
//!     let couchdb = CouchDB::new(CouchConfig::from_env())?;
//!     let db = couchdb.create("library", true).await?;
//!
//!     let mut doc = db.create("book-1", true, None).await?;
//!     doc.set("title", "Dune");
//!     doc.save().await?;
//!
//!     for id in db.keys().await? {
//!         println!("{}", id);
//!     }
//!     Ok(())
//! }
//! ```

pub mod attachment;
pub mod bulk;
pub mod changes;
pub mod config;
pub mod database;
pub mod design;
pub mod document;
pub mod find;
pub mod security;
pub mod server;
pub mod view;

mod remote;

pub use attachment::Attachment;
pub use bulk::{BulkOperation, BulkResult, BulkStatus};
pub use changes::{ChangeEvent, ChangedEvent, ChangesQuery, DeletedEvent, Feed};
pub use config::{CouchConfig, Credentials, DEFAULT_SERVER};
pub use database::{Database, DatabaseInfo, DocsOptions, IndexResult, PurgeResult};
pub use design::DesignDocument;
pub use document::{Document, DocumentInfo};
pub use find::{FindQuery, FindRequest};
pub use security::SecurityDocument;
pub use server::{CouchDB, DatabaseOptions, ServerInfo, SessionInfo, UserContext};
pub use view::{View, ViewQuery, ViewResponse, ViewRow};

pub use couchbridge_common::{CouchError, Result};
pub use couchbridge_http::HttpClientConfig;

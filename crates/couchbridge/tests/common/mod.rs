//! Shared fixtures for the integration tests
//!
//! Every test talks to a `wiremock` server that plays the CouchDB REST API.

#![allow(dead_code)]

use couchbridge::{CouchConfig, CouchDB, Database};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const DB: &str = "testdb";

/// Start a mock server and open an anonymous session against it
pub async fn session() -> (MockServer, CouchDB) {
    let server = MockServer::start().await;
    let couchdb = CouchDB::new(CouchConfig::new(server.uri())).unwrap();
    (server, couchdb)
}

/// Start a mock server and return a handle for the existing database `testdb`
pub async fn database() -> (MockServer, Database) {
    let (server, couchdb) = session().await;
    Mock::given(method("HEAD"))
        .and(path(format!("/{}", DB)))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let db = couchdb.database(DB).await.unwrap();
    (server, db)
}

/// Answer `GET /testdb/{id}` with `body`
pub async fn mock_doc(server: &MockServer, id: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/{}/{}", DB, id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// CouchDB's error body
pub fn error_body(error: &str, reason: &str) -> Value {
    serde_json::json!({ "error": error, "reason": reason })
}

/// Route tracing output through the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

//! Integration tests for document proxies: caching, revisions and conflicts

mod common;

use common::{database, error_body, mock_doc};
use couchbridge::{CouchError, Document};
use serde_json::{json, Map, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

#[tokio::test]
async fn test_get_existing_document() {
    let (server, db) = database().await;
    mock_doc(&server, "foo", json!({"_id": "foo", "_rev": "1-a", "bar": true})).await;

    let doc = db.get("foo").await.unwrap();
    assert_eq!(doc.id(), "foo");
    assert_eq!(doc.rev(), Some("1-a"));
    assert!(doc.exists());
    assert!(!doc.is_dirty());
    assert_eq!(doc.data(), Some(fields(json!({"bar": true}))));
}

#[tokio::test]
async fn test_get_missing_document() {
    let (server, db) = database().await;
    Mock::given(method("GET"))
        .and(path("/testdb/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(error_body("not_found", "missing")))
        .mount(&server)
        .await;

    let err = db.get("missing").await.unwrap_err();
    assert!(err.is_not_found());

    let doc = db
        .get_or("missing", fields(json!({"counter": 0})))
        .await
        .unwrap();
    assert!(!doc.exists());
    assert!(doc.is_dirty());
    assert_eq!(doc.get("counter"), Some(&json!(0)));
}

#[tokio::test]
async fn test_get_invalid_revision() {
    let (server, db) = database().await;
    Mock::given(method("GET"))
        .and(path("/testdb/foo"))
        .and(query_param("rev", "nope"))
        .respond_with(ResponseTemplate::new(400).set_body_json(error_body("bad_request", "Invalid rev format")))
        .mount(&server)
        .await;

    let err = db.get_rev("foo", "nope").await.unwrap_err();
    assert!(matches!(err, CouchError::BadRequest(ref m) if m.contains("Invalid rev format")));
}

#[tokio::test]
async fn test_get_older_revision() {
    let (server, db) = database().await;
    Mock::given(method("GET"))
        .and(path("/testdb/foo"))
        .and(query_param("rev", "1-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_id": "foo", "_rev": "1-a", "v": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let doc = db.get_rev("foo", "1-a").await.unwrap();
    assert_eq!(doc.get("v"), Some(&json!(1)));
}

#[tokio::test]
async fn test_create_existing_document_conflicts() {
    let (server, db) = database().await;
    Mock::given(method("HEAD"))
        .and(path("/testdb/foo"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"1-a\""))
        .mount(&server)
        .await;

    let err = db.create("foo", false, None).await.unwrap_err();
    assert_eq!(
        err,
        CouchError::Conflict("The document 'foo' does already exist in the database 'testdb'.".to_string())
    );
}

#[tokio::test]
async fn test_create_exists_ok_fetches_content() {
    let (server, db) = database().await;
    mock_doc(&server, "foo", json!({"_id": "foo", "_rev": "1-a", "kind": "server"})).await;

    let doc = db
        .create("foo", true, Some(fields(json!({"kind": "local"}))))
        .await
        .unwrap();
    assert_eq!(doc.get("kind"), Some(&json!("server")));
    assert!(!doc.is_dirty());
}

#[tokio::test]
async fn test_create_new_document_is_not_written() {
    let (server, db) = database().await;
    Mock::given(method("HEAD"))
        .and(path("/testdb/foo"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let doc = db.create("foo", false, None).await.unwrap();
    assert!(!doc.exists());
    assert!(doc.rev().is_none());
}

#[tokio::test]
async fn test_save_only_when_dirty() {
    let (server, db) = database().await;
    mock_doc(&server, "foo", json!({"_id": "foo", "_rev": "1-a", "x": 1})).await;
    Mock::given(method("PUT"))
        .and(path("/testdb/foo"))
        .and(body_json(json!({"_id": "foo", "_rev": "1-a", "x": 2})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true, "id": "foo", "rev": "2-b"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut doc = db.get("foo").await.unwrap();
    doc.save().await.unwrap();

    doc.set("x", 2);
    assert!(doc.is_dirty());
    doc.save().await.unwrap();
    assert_eq!(doc.rev(), Some("2-b"));
    assert!(!doc.is_dirty());

    doc.save().await.unwrap();
}

#[tokio::test]
async fn test_save_with_outdated_revision() {
    let (server, db) = database().await;
    Mock::given(method("PUT"))
        .and(path("/testdb/foo"))
        .respond_with(ResponseTemplate::new(409).set_body_json(error_body("conflict", "Document update conflict.")))
        .mount(&server)
        .await;

    let mut doc = Document::new(&db, "foo", None);
    doc.set("x", 1);
    let err = doc.save().await.unwrap_err();
    assert!(err.is_conflict());
    assert!(doc.rev().is_none());
    assert!(doc.is_dirty());
}

#[tokio::test]
async fn test_fetch_with_local_changes() {
    let (server, db) = database().await;
    Mock::given(method("GET"))
        .and(path("/testdb/foo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_id": "foo", "_rev": "1-a", "x": 1})))
        .expect(2)
        .mount(&server)
        .await;

    let mut doc = db.get("foo").await.unwrap();
    doc.set("x", 5);

    let err = doc.fetch(false).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(doc.get("x"), Some(&json!(5)));

    doc.fetch(true).await.unwrap();
    assert_eq!(doc.get("x"), Some(&json!(1)));
}

#[tokio::test]
async fn test_fresh_document_can_be_fetched() {
    let (server, db) = database().await;
    mock_doc(&server, "foo", json!({"_id": "foo", "_rev": "3-c"})).await;

    let mut doc = Document::new(&db, "foo", None);
    assert!(doc.is_dirty());
    doc.fetch(false).await.unwrap();
    assert_eq!(doc.rev(), Some("3-c"));
}

#[tokio::test]
async fn test_delete_and_resurrect() {
    let (server, db) = database().await;
    mock_doc(&server, "foo", json!({"_id": "foo", "_rev": "1-a", "x": 1})).await;
    Mock::given(method("DELETE"))
        .and(path("/testdb/foo"))
        .and(query_param("rev", "1-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "id": "foo", "rev": "2-b"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/testdb/foo"))
        .and(body_json(json!({"_id": "foo", "_rev": "2-b", "x": 3})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true, "id": "foo", "rev": "3-c"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut doc = db.get("foo").await.unwrap();
    doc.delete(false).await.unwrap();
    assert!(!doc.exists());
    assert!(doc.is_deleted());
    assert!(doc.data().is_none());
    assert_eq!(doc.rev(), Some("2-b"));
    assert!(!doc.is_dirty());

    doc.set("x", 3);
    assert!(!doc.exists());
    assert!(doc.data().is_none());
    doc.save().await.unwrap();
    assert!(doc.exists());
    assert_eq!(doc.rev(), Some("3-c"));
}

#[tokio::test]
async fn test_delete_with_local_changes() {
    let (server, db) = database().await;
    mock_doc(&server, "foo", json!({"_id": "foo", "_rev": "1-a"})).await;
    Mock::given(method("DELETE"))
        .and(path("/testdb/foo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "id": "foo", "rev": "2-b"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut doc = db.get("foo").await.unwrap();
    doc.set("y", 1);
    assert!(doc.delete(false).await.unwrap_err().is_conflict());
    doc.delete(true).await.unwrap();
    assert!(doc.is_deleted());
}

#[tokio::test]
async fn test_delete_with_outdated_revision() {
    let (server, db) = database().await;
    mock_doc(&server, "foo", json!({"_id": "foo", "_rev": "1-a"})).await;
    Mock::given(method("DELETE"))
        .and(path("/testdb/foo"))
        .respond_with(ResponseTemplate::new(409).set_body_json(error_body("conflict", "Document update conflict.")))
        .mount(&server)
        .await;

    let mut doc = db.get("foo").await.unwrap();
    assert!(doc.delete(false).await.unwrap_err().is_conflict());
    assert!(doc.exists());
}

#[tokio::test]
async fn test_copy_document() {
    let (server, db) = database().await;
    mock_doc(&server, "foo", json!({"_id": "foo", "_rev": "1-a", "x": 1})).await;
    mock_doc(&server, "bar", json!({"_id": "bar", "_rev": "1-a", "x": 1})).await;
    Mock::given(method("COPY"))
        .and(path("/testdb/foo"))
        .and(header("Destination", "bar"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true, "id": "bar", "rev": "1-a"})))
        .expect(1)
        .mount(&server)
        .await;

    let doc = db.get("foo").await.unwrap();
    let copy = doc.copy("bar").await.unwrap();
    assert_eq!(copy.id(), "bar");
    assert_eq!(copy.get("x"), Some(&json!(1)));
}

#[tokio::test]
async fn test_info_reads_etag() {
    let (server, db) = database().await;
    Mock::given(method("HEAD"))
        .and(path("/testdb/foo"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"4-d\""))
        .mount(&server)
        .await;

    let doc = Document::new(&db, "foo", None);
    let info = doc.info().await.unwrap();
    assert_eq!(info.id, "foo");
    assert_eq!(info.rev, "4-d");
}

#[tokio::test]
async fn test_design_document_paths_keep_prefix() {
    let (server, db) = database().await;
    mock_doc(&server, "_design/app", json!({"_id": "_design/app", "_rev": "1-a", "views": {}})).await;

    let doc = db.get("_design/app").await.unwrap();
    assert_eq!(doc.endpoint(), "/testdb/_design/app");
    assert!(doc.contains_key("views"));
}

//! Integration tests for `_all_docs`, design document views and document listing

mod common;

use common::{database, error_body};
use couchbridge::{CouchError, DocsOptions, ViewQuery};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn all_docs_rows() -> serde_json::Value {
    json!({
        "total_rows": 3,
        "offset": 0,
        "rows": [
            {"id": "_design/app", "key": "_design/app", "value": {"rev": "1-d"},
             "doc": {"_id": "_design/app", "_rev": "1-d", "views": {}}},
            {"id": "bar", "key": "bar", "value": {"rev": "1-b"},
             "doc": {"_id": "bar", "_rev": "1-b", "n": 2}},
            {"id": "foo", "key": "foo", "value": {"rev": "1-f"},
             "doc": {"_id": "foo", "_rev": "1-f", "n": 1}}
        ]
    })
}

#[tokio::test]
async fn test_keys() {
    let (server, db) = database().await;
    Mock::given(method("GET"))
        .and(path("/testdb/_all_docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_rows": 2,
            "offset": 0,
            "rows": [
                {"id": "bar", "key": "bar", "value": {"rev": "1-b"}},
                {"id": "foo", "key": "foo", "value": {"rev": "1-f"}}
            ]
        })))
        .mount(&server)
        .await;

    assert_eq!(db.keys().await.unwrap(), vec!["bar", "foo"]);
}

#[tokio::test]
async fn test_keys_with_prefix() {
    let (server, db) = database().await;
    Mock::given(method("GET"))
        .and(path("/testdb/_all_docs"))
        .and(query_param("startkey", "\"fo\""))
        .and(query_param("endkey", format!("\"fo{}\"", '\u{10fffe}')))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_rows": 2,
            "offset": 1,
            "rows": [{"id": "foo", "key": "foo", "value": {"rev": "1-f"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(db.keys_with_prefix("fo").await.unwrap(), vec!["foo"]);
}

#[tokio::test]
async fn test_docs_skip_design_documents() {
    let (server, db) = database().await;
    Mock::given(method("GET"))
        .and(path("/testdb/_all_docs"))
        .and(query_param("include_docs", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(all_docs_rows()))
        .expect(2)
        .mount(&server)
        .await;

    let docs = db.values(ViewQuery::default()).await.unwrap();
    let ids: Vec<&str> = docs.iter().map(|doc| doc.id()).collect();
    assert_eq!(ids, vec!["bar", "foo"]);
    assert!(docs.iter().all(|doc| !doc.is_dirty()));

    let docs = db
        .docs(DocsOptions::new().include_ddocs(true))
        .await
        .unwrap();
    assert_eq!(docs.len(), 3);
    assert_eq!(docs[0].id(), "_design/app");
}

#[tokio::test]
async fn test_docs_by_ids() {
    let (server, db) = database().await;
    Mock::given(method("POST"))
        .and(path("/testdb/_all_docs"))
        .and(body_json(json!({"keys": ["foo", "nope"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_rows": 3,
            "offset": 0,
            "rows": [
                {"id": "foo", "key": "foo", "value": {"rev": "1-f"},
                 "doc": {"_id": "foo", "_rev": "1-f", "n": 1}},
                {"key": "nope", "error": "not_found"}
            ]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let err = db
        .docs(DocsOptions::new().ids(["foo", "nope"]))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CouchError::NotFound("The document 'nope' does not exist in the database 'testdb'.".to_string())
    );

    let docs = db
        .docs(DocsOptions::new().ids(["foo", "nope"]).create(true))
        .await
        .unwrap();
    assert_eq!(docs.len(), 2);
    assert!(docs[0].exists());
    assert_eq!(docs[1].id(), "nope");
    assert!(!docs[1].exists());
}

#[tokio::test]
async fn test_deleted_documents_in_all_docs() {
    let (server, db) = database().await;
    Mock::given(method("POST"))
        .and(path("/testdb/_all_docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_rows": 0,
            "offset": 0,
            "rows": [
                {"id": "gone", "key": "gone", "value": {"rev": "2-x", "deleted": true}, "doc": null}
            ]
        })))
        .mount(&server)
        .await;

    let docs = db
        .docs(DocsOptions::new().ids(["gone"]).create(true))
        .await
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert!(!docs[0].exists());
}

#[tokio::test]
async fn test_design_document_view() {
    let (server, db) = database().await;
    Mock::given(method("HEAD"))
        .and(path("/testdb/_design/stats"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/testdb/_design/stats"))
        .and(body_json(json!({
            "_id": "_design/stats",
            "language": "javascript",
            "views": {
                "by_n": {"map": "function (doc) { emit(doc.n, 1); }", "reduce": "_sum"}
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "ok": true, "id": "_design/stats", "rev": "1-d"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/testdb/_design/stats/_view/by_n"))
        .and(query_param("reduce", "false"))
        .and(query_param("startkey", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_rows": 2,
            "offset": 0,
            "update_seq": "9-xyz",
            "rows": [
                {"id": "foo", "key": 1, "value": 1},
                {"id": "bar", "key": 2, "value": 1}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut ddoc = db.design_doc("stats", false).await.unwrap();
    let view = ddoc
        .create_view(
            "by_n",
            "function (doc) { emit(doc.n, 1); }",
            Some("_sum"),
            false,
        )
        .await
        .unwrap();
    assert_eq!(ddoc.rev(), Some("1-d"));

    let err = ddoc
        .create_view("by_n", "function (doc) {}", None, false)
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let response = view
        .get(&ViewQuery::new().reduce(false).startkey(1).update_seq(true))
        .await
        .unwrap();
    assert_eq!(response.ids(), vec!["foo", "bar"]);
    assert_eq!(response.keys(), vec![json!(1), json!(2)]);
    assert_eq!(response.update_seq, Some(json!("9-xyz")));
}

#[tokio::test]
async fn test_existing_design_document() {
    let (server, db) = database().await;
    Mock::given(method("HEAD"))
        .and(path("/testdb/_design/stats"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/testdb/_design/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "_design/stats",
            "_rev": "1-d",
            "views": {"by_n": {"map": "function (doc) {}"}}
        })))
        .mount(&server)
        .await;

    assert!(db.design_doc("stats", false).await.unwrap_err().is_conflict());

    let ddoc = db.design_doc("_design/stats", true).await.unwrap();
    assert_eq!(ddoc.views(), vec!["by_n"]);
}

#[tokio::test]
async fn test_view_post_keys_and_items() {
    let (server, db) = database().await;
    Mock::given(method("POST"))
        .and(path("/testdb/_design/stats/_view/by_n"))
        .and(body_json(json!({"keys": [1]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_rows": 2,
            "offset": 0,
            "rows": [{"id": "foo", "key": 1, "value": "one"}]
        })))
        .mount(&server)
        .await;

    let response = db
        .view("stats", "by_n")
        .post(&[json!(1)], &ViewQuery::default())
        .await
        .unwrap();
    assert_eq!(response.items(), vec![(json!(1), json!("one"))]);
    assert_eq!(response.values(), vec![json!("one")]);
}

#[tokio::test]
async fn test_missing_view() {
    let (server, db) = database().await;
    Mock::given(method("GET"))
        .and(path("/testdb/_design/stats/_view/nope"))
        .respond_with(ResponseTemplate::new(404).set_body_json(error_body("not_found", "missing_named_view")))
        .mount(&server)
        .await;

    let err = db
        .view("stats", "nope")
        .get(&ViewQuery::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

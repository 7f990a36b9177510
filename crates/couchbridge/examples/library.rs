//! Example: a small book library on a local CouchDB
//!
//! Reads the server from `COUCHDB_HOST`, `COUCHDB_USER` and `COUCHDB_PASS`,
//! then creates a database, writes documents in bulk, queries them and
//! follows the change feed for a moment.

use couchbridge::{ChangesQuery, CouchConfig, CouchDB, Feed, FindQuery, ViewQuery};
use futures::StreamExt;
use serde_json::json;

#[tokio::main]
async fn main() -> couchbridge::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("couchbridge=debug")
        .init();

    let couchdb = CouchDB::new(CouchConfig::from_env())?;
    couchdb.check_credentials().await?;
    let info = couchdb.info().await?;
    println!("Connected to CouchDB {}", info.version);

    let db = couchdb.create("library", true).await?;

    let mut bulk = db.create_docs(&[]);
    for (id, title, year) in [
        ("dune", "Dune", 1965),
        ("neuromancer", "Neuromancer", 1984),
        ("hyperion", "Hyperion", 1989),
    ] {
        let doc = bulk.create(id, None)?;
        doc.set("title", title);
        doc.set("year", year);
    }
    let result = bulk.commit().await?;
    println!("Stored {} books, {} rejected", result.ok.len(), result.error.len());

    let mut ddoc = db.design_doc("books", true).await?;
    let view = ddoc
        .create_view(
            "by_year",
            "function (doc) { if (doc.year) { emit(doc.year, doc.title); } }",
            None,
            true,
        )
        .await?;
    for (year, title) in view.items(&ViewQuery::new().startkey(1980)).await? {
        println!("{}: {}", year, title);
    }

    let old = db
        .find(json!({"year": {"$lt": 1980}}), FindQuery::new())?
        .all()
        .await?;
    println!("{} books from before 1980", old.len());

    let mut changes = Box::pin(db.changes(ChangesQuery::new().feed(Feed::Normal).limit(10)));
    while let Some(event) = changes.next().await {
        let event = event?;
        println!("change {:?} on {:?}", event.sequence(), event.id());
    }

    couchdb.close();
    Ok(())
}

//! CRUD and cursor behavior against the mock server.

mod common;

use bson::doc;
use common::MockServer;
use futures::TryStreamExt;
use mongo_core::{
    aggregation::{GroupAccumulator, PipelineStage},
    options::FindOptions,
    Client,
};

#[tokio::test]
async fn insert_and_find_round_trip() {
    let server = MockServer::start().await;
    let client = Client::with_uri_str(&server.uri()).await.unwrap();
    let db = client.database("app").await.unwrap();
    let coll = db.collection("events");

    let result = coll
        .insert(vec![
            doc! { "_id": 1, "kind": "click" },
            doc! { "_id": 2, "kind": "view" },
            doc! { "_id": 3, "kind": "click" },
        ])
        .await
        .unwrap();
    assert_eq!(result.inserted_count, 3);

    let docs = coll
        .find(doc! { "kind": "click" }, None)
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(docs.len(), 2);

    let all = coll.find(None, None).await.unwrap().collect().await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn duplicate_keys_surface_code_11000() {
    let server = MockServer::start().await;
    let client = Client::with_uri_str(&server.uri()).await.unwrap();
    let db = client.database("app").await.unwrap();
    let coll = db.collection("events");

    coll.insert(vec![doc! { "_id": 1 }]).await.unwrap();
    let error = coll.insert(vec![doc! { "_id": 1 }]).await.unwrap_err();
    assert_eq!(error.code(), Some(11000));
}

#[tokio::test]
async fn count_update_delete() {
    let server = MockServer::start().await;
    let client = Client::with_uri_str(&server.uri()).await.unwrap();
    let db = client.database("app").await.unwrap();
    let coll = db.collection("events");

    coll.insert(vec![
        doc! { "_id": 1, "kind": "click", "seen": false },
        doc! { "_id": 2, "kind": "click", "seen": false },
        doc! { "_id": 3, "kind": "view", "seen": false },
    ])
    .await
    .unwrap();

    assert_eq!(coll.count(doc! { "kind": "click" }, None).await.unwrap(), 2);

    let update = coll
        .update(
            doc! { "kind": "click" },
            doc! { "$set": { "seen": true } },
            false,
            true,
        )
        .await
        .unwrap();
    assert_eq!(update.matched_count, 2);
    assert_eq!(update.modified_count, 2);

    let delete = coll.delete(doc! { "kind": "view" }, true).await.unwrap();
    assert_eq!(delete.deleted_count, 1);
    assert_eq!(coll.count(None, None).await.unwrap(), 2);
}

#[tokio::test]
async fn cursor_streams_across_batches() {
    let server = MockServer::start().await;
    let client = Client::with_uri_str(&server.uri()).await.unwrap();
    let db = client.database("app").await.unwrap();
    let coll = db.collection("events");

    let documents: Vec<_> = (0..10).map(|i| doc! { "_id": i }).collect();
    coll.insert(documents).await.unwrap();

    // A batch size of 3 forces the stream through several getMore rounds.
    let options = FindOptions::builder().batch_size(3_u32).build();
    let cursor = coll.find(None, options).await.unwrap();
    let docs: Vec<_> = cursor.try_collect().await.unwrap();
    assert_eq!(docs.len(), 10);
}

#[tokio::test]
async fn aggregate_match_returns_a_cursor() {
    let server = MockServer::start().await;
    let client = Client::with_uri_str(&server.uri()).await.unwrap();
    let db = client.database("app").await.unwrap();
    let coll = db.collection("events");

    coll.insert(vec![
        doc! { "_id": 1, "kind": "click" },
        doc! { "_id": 2, "kind": "view" },
        doc! { "_id": 3, "kind": "click" },
    ])
    .await
    .unwrap();

    let pipeline = vec![PipelineStage::Match(bson::bson!({ "kind": "click" }))];
    let docs = coll
        .aggregate(pipeline, None)
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(docs.len(), 2);

    // The group stage compiles and dispatches even though the mock ignores
    // anything past $match.
    let pipeline = vec![
        PipelineStage::Match(bson::bson!({ "kind": "click" })),
        PipelineStage::Group {
            id: bson::bson!("$kind"),
            fields: vec![("total".to_string(), GroupAccumulator::SumAll)],
        },
    ];
    let _ = coll.aggregate(pipeline, None).await.unwrap();
}

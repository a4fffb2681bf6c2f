//! Tests for the Elasticsearch client against a mock cluster
//!
//! Covers:
//! - Bulk request encoding and item result handling
//! - Index existence, creation and deletion
//! - Basic authentication

#![allow(clippy::unwrap_used, clippy::expect_used)]

use flightload_ingest::config::ElasticConfig;
use flightload_ingest::delivery::{BulkBatch, BulkItem, DocumentIndex, ElasticsearchClient};
use flightload_ingest::error::{DeliveryError, IndexError};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;
use wiremock::{
    matchers::{basic_auth, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn client(server: &MockServer) -> ElasticsearchClient {
    ElasticsearchClient::new(&ElasticConfig {
        endpoint: server.uri(),
        index: "flights".into(),
        ..ElasticConfig::default()
    })
    .expect("client should build")
}

fn batch(ids: &[&str]) -> BulkBatch {
    let items: Vec<BulkItem> = ids
        .iter()
        .map(|id| BulkItem {
            id: id.to_string(),
            document: json!({ "carrier": "AA", "dep_delay_min": 15 }).to_string(),
        })
        .collect();
    let bytes = items.iter().map(BulkItem::encoded_len).sum();
    BulkBatch { id: 1, items, bytes }
}

fn created(id: &str) -> Value {
    json!({ "create": { "_index": "flights", "_id": id, "status": 201 } })
}

#[tokio::test]
async fn test_bulk_create_sends_ndjson_create_actions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(header("content-type", "application/x-ndjson"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 4,
            "errors": false,
            "items": [created("a"), created("b")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).bulk_create(&batch(&["a", "b"])).await.unwrap();
    assert_eq!(response.first_failure(1), None);

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let lines: Vec<Value> = body.lines().map(|l| serde_json::from_str(l).unwrap()).collect();

    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], json!({ "create": { "_index": "flights", "_id": "a" } }));
    assert_eq!(lines[1]["dep_delay_min"], 15);
    assert_eq!(lines[2]["create"]["_id"], "b");
}

#[tokio::test]
async fn test_bulk_item_conflict_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 2,
            "errors": true,
            "items": [
                created("a"),
                { "create": {
                    "_index": "flights",
                    "_id": "b",
                    "status": 409,
                    "error": {
                        "type": "version_conflict_engine_exception",
                        "reason": "[b]: version conflict, document already exists (current version [1])"
                    }
                }}
            ]
        })))
        .mount(&server)
        .await;

    let response = client(&server).bulk_create(&batch(&["a", "b"])).await.unwrap();
    let err = response.first_failure(1).expect("conflict expected");
    assert!(err.is_conflict());
    assert_eq!(err.flight_id(), Some("b"));
}

#[tokio::test]
async fn test_bulk_http_failure_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(503).set_body_string("cluster unavailable"))
        .mount(&server)
        .await;

    let err = client(&server).bulk_create(&batch(&["a"])).await.unwrap_err();
    match err {
        DeliveryError::Transport { batch, reason } => {
            assert_eq!(batch, 1);
            assert!(reason.contains("503"));
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_bulk_short_response_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": false,
            "items": [created("a")]
        })))
        .mount(&server)
        .await;

    let err = client(&server).bulk_create(&batch(&["a", "b"])).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Transport { .. }));
}

#[tokio::test]
async fn test_index_exists() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/flights"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(client(&server).index_exists().await.unwrap());

    let missing = ElasticsearchClient::new(&ElasticConfig {
        endpoint: server.uri(),
        index: "missing".into(),
        ..ElasticConfig::default()
    })
    .unwrap();
    assert!(!missing.index_exists().await.unwrap());
}

#[tokio::test]
async fn test_ensure_index_creates_from_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/flights"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/flights"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "acknowledged": true,
            "shards_acknowledged": true,
            "index": "flights"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mapping = dir.path().join("mapping.json");
    let mapping_body = json!({ "mappings": { "properties": { "origin_geo": { "type": "geo_point" } } } });
    fs::write(&mapping, mapping_body.to_string()).unwrap();

    assert!(client(&server).ensure_index(&mapping).await.unwrap());

    let requests = server.received_requests().await.unwrap();
    let put = requests.iter().find(|r| r.method.as_str() == "PUT").unwrap();
    let sent: Value = serde_json::from_slice(&put.body).unwrap();
    assert_eq!(sent, mapping_body);
}

#[tokio::test]
async fn test_ensure_index_leaves_existing_index() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/flights"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    // The mapping file is never read when the index exists
    let created = client(&server)
        .ensure_index(std::path::Path::new("/no/such/mapping.json"))
        .await
        .unwrap();
    assert!(!created);
}

#[tokio::test]
async fn test_missing_mapping_file() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/flights"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client(&server)
        .ensure_index(std::path::Path::new("/no/such/mapping.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::Mapping { .. }));
}

#[tokio::test]
async fn test_delete_index() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/flights"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).delete_index().await.unwrap();
}

#[tokio::test]
async fn test_delete_index_not_acknowledged() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/flights"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": false })))
        .mount(&server)
        .await;

    let err = client(&server).delete_index().await.unwrap_err();
    assert!(matches!(err, IndexError::NotAcknowledged { operation: "deletion", .. }));
}

#[tokio::test]
async fn test_delete_missing_index_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/flights"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "type": "index_not_found_exception" },
            "status": 404
        })))
        .mount(&server)
        .await;

    let err = client(&server).delete_index().await.unwrap_err();
    match err {
        IndexError::Status { status, body, .. } => {
            assert_eq!(status, 404);
            assert!(body.contains("index_not_found_exception"));
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_basic_auth_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/flights"))
        .and(basic_auth("loader", "secret"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = ElasticsearchClient::new(&ElasticConfig {
        endpoint: server.uri(),
        username: Some("loader".into()),
        password: Some("secret".into()),
        ..ElasticConfig::default()
    })
    .unwrap();
    assert!(client.index_exists().await.unwrap());
}

//! End-to-end load tests
//!
//! Reference and flight extracts are written to a temporary data directory and
//! loaded through the full pipeline into an in-memory or mocked index.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use flightload_ingest::config::{DeliveryConfig, ElasticConfig, SourceConfig};
use flightload_ingest::delivery::{ElasticsearchClient, MemoryIndex};
use flightload_ingest::error::{DeliveryError, IngestError};
use flightload_ingest::pipeline::{Pipeline, RunSummary};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const AIRLINES: &str = "\
24,\"American Airlines\",\\N,\"AA\",\"AAL\",\"AMERICAN\",\"United States\",\"Y\"
5209,\"United Airlines\",\\N,\"UA\",\"UAL\",\"UNITED\",\"United States\",\"Y\"
";

const AIRPORTS: &str = "\
3830,\"Chicago O'Hare International Airport\",\"Chicago\",\"United States\",\"ORD\",\"KORD\",41.9786,-87.9048,672,-6,\"A\",\"America/Chicago\",\"airport\",\"OurAirports\"
3469,\"San Francisco International Airport\",\"San Francisco\",\"United States\",\"SFO\",\"KSFO\",37.61899948120117,-122.375,13,-8,\"A\",\"America/Los_Angeles\",\"airport\",\"OurAirports\"
3462,\"Phoenix Sky Harbor International Airport\",\"Phoenix\",\"United States\",\"PHX\",\"KPHX\",33.43429946899414,-112.01200103759766,1135,-7,\"N\",\"America/Phoenix\",\"airport\",\"OurAirports\"
";

const HEADER: &str = "FL_DATE,OP_CARRIER,TAIL_NUM,OP_CARRIER_FL_NUM,ORIGIN,DEST,CRS_DEP_TIME,DEP_TIME,DEP_DELAY,TAXI_OUT,TAXI_IN,CRS_ARR_TIME,ARR_TIME,ARR_DELAY,CANCELLED,CANCELLATION_CODE,DIVERTED,CRS_ELAPSED_TIME,ACTUAL_ELAPSED_TIME,AIR_TIME,FLIGHTS,DISTANCE,CARRIER_DELAY,WEATHER_DELAY,NAS_DELAY,SECURITY_DELAY,LATE_AIRCRAFT_DELAY\n";

const JANUARY: &str = "\
2017-01-31,AA,N1234,123,ORD,SFO,1200,1215,15.00,17.00,6.00,1445,1450,5.00,0.00,,0.00,285.00,275.00,252.00,1.00,1846.00,,,,,
2017-01-31,UA,,456,SFO,PHX,2300,,,,,0150,,,1.00,B,0.00,110.00,,,1.00,651.00,,,,,
2017-01-31,DL,N900DL,789,PHX,ORD,0600,0555,-5.00,12.00,8.00,1030,2400,0.00,0.00,,0.00,210.00,215.00,195.00,1.00,1440.00,,,,,
";

const JULY: &str = "\
2017-07-04,AA,N1234,123,ORD,SFO,1200,1210,10.00,20.00,5.00,1445,1440,-5.00,0.00,,0.00,285.00,270.00,245.00,1.00,1846.00,,,,,
";

fn data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("airlines.csv"), AIRLINES).unwrap();
    fs::write(dir.path().join("airports.csv"), AIRPORTS).unwrap();
    fs::write(dir.path().join("2017-01.csv"), format!("{HEADER}{JANUARY}")).unwrap();
    fs::write(dir.path().join("2017-07.csv"), format!("{HEADER}{JULY}")).unwrap();
    dir
}

fn pipeline(dir: &TempDir, bulk_actions: usize) -> Pipeline {
    let mut sources = SourceConfig::new(dir.path());
    sources.flight_files = vec!["2017-01.csv".into(), "2017-07.csv".into()];
    Pipeline::new(
        sources,
        DeliveryConfig {
            workers: 4,
            bulk_actions,
            queue_capacity: Some(4),
            ..DeliveryConfig::default()
        },
    )
}

#[tokio::test]
async fn test_full_load_into_memory() {
    let dir = data_dir();
    let index = Arc::new(MemoryIndex::new());

    let summary = pipeline(&dir, 2).run(index.clone()).await.unwrap();
    assert_eq!(
        summary,
        RunSummary {
            files: 2,
            rows: 4,
            headers_skipped: 2,
            delivered: 4,
            batches: 2,
        }
    );

    let aa = index.get("2017-01-31.1200.AA123.N1234.ORD.SFO").await.unwrap();
    assert_eq!(aa["airline"], "American Airlines");
    assert_eq!(aa["carrier"], "AA");
    assert_eq!(aa["origin_city"], "Chicago");
    assert_eq!(aa["destination_name"], "San Francisco International Airport");
    assert_eq!(aa["scheduled_departure_time"], "2017-01-31T12:00:00-06:00");
    assert_eq!(aa["scheduled_arrival_time"], "2017-01-31T14:45:00-08:00");
    assert_eq!(aa["dep_delay_min"], 15);
    assert_eq!(aa["canceled"], false);

    // Cancelled flight with no tail and blank actuals
    let ua = index.get("2017-01-31.2300.UA456..SFO.PHX").await.unwrap();
    assert_eq!(ua["airline"], "United Airlines");
    assert!(ua["tail"].is_null());
    assert!(ua["actual_departure_time"].is_null());
    assert!(ua["dep_delay_min"].is_null());
    assert_eq!(ua["canceled"], true);
    assert_eq!(ua["cancelation_reason"], "Weather");
    assert_eq!(ua["scheduled_arrival_time"], "2017-01-31T01:50:00-07:00");

    // Carrier missing from the reference data keeps its code
    let dl = index.get("2017-01-31.0600.DL789.N900DL.PHX.ORD").await.unwrap();
    assert_eq!(dl["airline"], "");
    assert_eq!(dl["carrier"], "DL");
    assert_eq!(dl["dep_delay_min"], -5);
    assert_eq!(dl["actual_arrival_time"], "2017-01-31T23:59:00-06:00");

    // Same flight in summer picks up daylight saving time
    let summer = index.get("2017-07-04.1200.AA123.N1234.ORD.SFO").await.unwrap();
    assert_eq!(summer["scheduled_departure_time"], "2017-07-04T12:00:00-05:00");
}

#[tokio::test]
async fn test_second_run_conflicts_and_aborts() {
    let dir = data_dir();
    let index = Arc::new(MemoryIndex::new());

    pipeline(&dir, 1000).run(index.clone()).await.unwrap();
    assert_eq!(index.len().await, 4);

    let err = pipeline(&dir, 1000).run(index.clone()).await.unwrap_err();
    match &err {
        IngestError::Delivery(delivery) => assert!(delivery.is_conflict()),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.flight_id().is_some());
    assert_eq!(index.len().await, 4);
}

#[tokio::test]
async fn test_load_through_bulk_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": false,
            "items": [{ "create": { "_index": "flights", "_id": "x", "status": 201 } }]
        })))
        .expect(4)
        .mount(&server)
        .await;

    let client = ElasticsearchClient::new(&ElasticConfig {
        endpoint: server.uri(),
        ..ElasticConfig::default()
    })
    .unwrap();

    let dir = data_dir();
    let summary = pipeline(&dir, 1).run(Arc::new(client)).await.unwrap();
    assert_eq!(summary.delivered, 4);
    assert_eq!(summary.batches, 4);
}

#[tokio::test]
async fn test_rejected_item_aborts_load() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": true,
            "items": [{ "create": {
                "_index": "flights",
                "_id": "2017-01-31.1200.AA123.N1234.ORD.SFO",
                "status": 400,
                "error": { "type": "mapper_parsing_exception", "reason": "failed to parse field [origin_geo]" }
            }}]
        })))
        .mount(&server)
        .await;

    let client = ElasticsearchClient::new(&ElasticConfig {
        endpoint: server.uri(),
        ..ElasticConfig::default()
    })
    .unwrap();

    let dir = data_dir();
    let err = pipeline(&dir, 1).run(Arc::new(client)).await.unwrap_err();
    match err {
        IngestError::Delivery(DeliveryError::Rejected { status, kind, .. }) => {
            assert_eq!(status, 400);
            assert_eq!(kind, "mapper_parsing_exception");
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

//! AphiaClient against a local stub of the WoRMS REST service

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use cifonauta_common::config::WormsConfig;
use cifonauta_common::db::init::init_memory_database;
use cifonauta_common::db::models::NewTaxon;
use cifonauta_common::db::taxa::{list_orphans, load_taxon};
use cifonauta_common::events::EventBus;
use cifonauta_common::Catalog;
use chrono::{TimeZone, Utc};
use cifonauta_worms::{AphiaClient, ExternalIdType, WormsError};
use reqwest::Url;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
struct Stub {
    /// Record lookups answered with 503 before the first success
    flaky_failures: usize,
    flaky_calls: Arc<AtomicUsize>,
    /// Requests seen by the batch name endpoints
    batch_calls: Arc<AtomicUsize>,
}

fn record(id: i64, name: &str, status: &str, valid_name: Option<&str>, rank: &str) -> Value {
    json!({
        "AphiaID": id,
        "scientificname": name,
        "status": status,
        "valid_name": valid_name,
        "rank": rank,
    })
}

async fn records_by_name(Path(name): Path<String>) -> Response {
    match name.as_str() {
        "Aurelia aurita" => Json(vec![record(135306, "Aurelia aurita", "accepted", Some("Aurelia aurita"), "Species")]).into_response(),
        "Medusa aurita" => Json(vec![record(1, "Medusa aurita", "unaccepted", Some("Aurelia aurita"), "Species")]).into_response(),
        "Loop a" => Json(vec![record(2, "Loop a", "unaccepted", Some("Loop b"), "Species")]).into_response(),
        "Loop b" => Json(vec![record(3, "Loop b", "unaccepted", Some("Loop a"), "Species")]).into_response(),
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn aphia_id_by_name(Path(name): Path<String>) -> Response {
    match name.as_str() {
        "Aurelia aurita" => Json(135306).into_response(),
        "Aurelia" => Json(-999).into_response(),
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn flaky(State(stub): State<Stub>, Path(id): Path<i64>) -> Response {
    let call = stub.flaky_calls.fetch_add(1, Ordering::SeqCst);
    if call < stub.flaky_failures {
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    }
    Json(record(id, "Aurelia aurita", "accepted", None, "Species")).into_response()
}

async fn classification(Path(id): Path<i64>) -> Response {
    if id != 135306 {
        return StatusCode::NO_CONTENT.into_response();
    }
    Json(json!({
        "AphiaID": 1, "rank": "Superdomain", "scientificname": "Biota",
        "child": {
            "AphiaID": 2, "rank": "Kingdom", "scientificname": "Animalia",
            "child": {
                "AphiaID": 1267, "rank": "Phylum", "scientificname": "Cnidaria",
                "child": {
                    "AphiaID": 135306, "rank": "Species", "scientificname": "Aurelia aurita",
                    "child": {}
                }
            }
        }
    }))
    .into_response()
}

/// Decoded query string pairs, in order
fn query_pairs(raw: Option<String>) -> Vec<(String, String)> {
    let url = Url::parse(&format!("http://stub/?{}", raw.unwrap_or_default())).unwrap();
    url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
}

fn query_value(pairs: &[(String, String)], key: &str) -> Option<String> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}

fn requested_names(pairs: &[(String, String)]) -> Vec<String> {
    pairs
        .iter()
        .filter(|(k, _)| k == "scientificnames[]")
        .map(|(_, v)| v.clone())
        .collect()
}

/// One accepted record per requested name, echoing the name
async fn records_by_names(State(stub): State<Stub>, RawQuery(raw): RawQuery) -> Response {
    stub.batch_calls.fetch_add(1, Ordering::SeqCst);
    let pairs = query_pairs(raw);
    let batch: Vec<Vec<Value>> = requested_names(&pairs)
        .iter()
        .enumerate()
        .map(|(i, name)| vec![record(i as i64 + 1, name, "accepted", Some(name.as_str()), "Species")])
        .collect();
    Json(batch).into_response()
}

/// Answers one list short of the names requested
async fn match_records_by_names(State(stub): State<Stub>, RawQuery(raw): RawQuery) -> Response {
    stub.batch_calls.fetch_add(1, Ordering::SeqCst);
    let pairs = query_pairs(raw);
    let names = requested_names(&pairs);
    let batch: Vec<Vec<Value>> = names
        .iter()
        .take(names.len().saturating_sub(1))
        .map(|name| vec![record(1, name, "accepted", None, "Species")])
        .collect();
    Json(batch).into_response()
}

/// Echoes the window and page as the record name
async fn records_by_date(RawQuery(raw): RawQuery) -> Response {
    let pairs = query_pairs(raw);
    let Some(start) = query_value(&pairs, "startdate") else {
        return (StatusCode::BAD_REQUEST, "startdate required").into_response();
    };
    let echo = format!(
        "{}|{}|{}|{}",
        start,
        query_value(&pairs, "enddate").unwrap_or_else(|| "-".to_string()),
        query_value(&pairs, "offset").unwrap_or_default(),
        query_value(&pairs, "marine_only").unwrap_or_default(),
    );
    Json(vec![record(135306, &echo, "accepted", None, "Species")]).into_response()
}

async fn record_by_external_id(Path(id): Path<String>, RawQuery(raw): RawQuery) -> Response {
    let pairs = query_pairs(raw);
    match (id.as_str(), query_value(&pairs, "type").as_deref()) {
        ("6141", Some("ncbi")) => {
            Json(record(135306, "Aurelia aurita", "accepted", None, "Species")).into_response()
        }
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn external_id_by_id(Path(id): Path<i64>, RawQuery(raw): RawQuery) -> Response {
    let pairs = query_pairs(raw);
    match (id, query_value(&pairs, "type").as_deref()) {
        (135306, Some("tsn")) => Json(vec!["51483"]).into_response(),
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn records_by_vernacular(Path(name): Path<String>, RawQuery(raw): RawQuery) -> Response {
    let pairs = query_pairs(raw);
    let like = query_value(&pairs, "like").as_deref() == Some("true");
    match (name.as_str(), like) {
        ("moon jelly", false) | ("moon", true) => {
            Json(vec![record(135306, "Aurelia aurita", "accepted", None, "Species")]).into_response()
        }
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn vernaculars(Path(id): Path<i64>) -> Response {
    if id != 135306 {
        return StatusCode::NO_CONTENT.into_response();
    }
    Json(json!([
        { "vernacular": "moon jelly", "language_code": "eng", "language": "English" },
        { "vernacular": "água-viva", "language_code": "por", "language": "Portuguese" }
    ]))
    .into_response()
}

async fn distributions(Path(id): Path<i64>) -> Response {
    if id != 135306 {
        return StatusCode::NO_CONTENT.into_response();
    }
    Json(json!([
        { "locality": "Brazilian part of the South Atlantic Ocean", "recordStatus": "valid" },
        { "locality": "North Sea", "recordStatus": "valid", "establishmentMeans": "Native" }
    ]))
    .into_response()
}

async fn sources(Path(id): Path<i64>) -> Response {
    if id != 135306 {
        return StatusCode::NO_CONTENT.into_response();
    }
    Json(json!([
        { "source_id": 1, "use": "original description", "reference": "Linnaeus, C. (1758). Systema Naturae." }
    ]))
    .into_response()
}

async fn name_by_id(Path(id): Path<i64>) -> Response {
    match id {
        135306 => Json("Aurelia aurita").into_response(),
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "bad id").into_response()
}

async fn spawn_stub(stub: Stub) -> String {
    let app = Router::new()
        .route("/AphiaRecordsByName/:name", get(records_by_name))
        .route("/AphiaIDByName/:name", get(aphia_id_by_name))
        .route("/AphiaRecordByAphiaID/:id", get(flaky))
        .route("/AphiaClassificationByAphiaID/:id", get(classification))
        .route("/AphiaSynonymsByAphiaID/:id", get(bad_request))
        .route("/AphiaRecordsByNames", get(records_by_names))
        .route("/AphiaRecordsByMatchNames", get(match_records_by_names))
        .route("/AphiaRecordsByDate", get(records_by_date))
        .route("/AphiaRecordByExternalID/:id", get(record_by_external_id))
        .route("/AphiaExternalIDByAphiaID/:id", get(external_id_by_id))
        .route("/AphiaRecordsByVernacular/:name", get(records_by_vernacular))
        .route("/AphiaVernacularsByAphiaID/:id", get(vernaculars))
        .route("/AphiaDistributionsByAphiaID/:id", get(distributions))
        .route("/SourcesByAphiaID/:id", get(sources))
        .route("/AphiaNameByAphiaID/:id", get(name_by_id))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: &str, max_attempts: u32) -> AphiaClient {
    AphiaClient::new(&WormsConfig {
        base_url: base_url.to_string(),
        timeout_secs: 5,
        max_attempts,
    })
    .unwrap()
    .with_retry_delay(Duration::from_millis(1))
}

#[tokio::test]
async fn test_records_by_name() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);

    let records = client.records_by_name("Aurelia aurita", false).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].aphia_id, 135306);
}

#[tokio::test]
async fn test_no_content_is_empty() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);

    assert!(client.records_by_name("Nothing here", false).await.unwrap().is_empty());
    assert_eq!(client.aphia_id_by_name("Nothing here").await.unwrap(), None);
}

#[tokio::test]
async fn test_aphia_id_by_name() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);

    assert_eq!(client.aphia_id_by_name("Aurelia aurita").await.unwrap(), Some(135306));
    assert_eq!(client.aphia_id_by_name("Aurelia").await.unwrap(), None);
}

#[tokio::test]
async fn test_best_match_follows_valid_name() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);

    let direct = client.best_match("Aurelia aurita").await.unwrap().unwrap();
    assert_eq!(direct.aphia_id, 135306);

    let redirected = client.best_match("Medusa aurita").await.unwrap().unwrap();
    assert_eq!(redirected.aphia_id, 135306);

    assert!(client.best_match("Unknown thing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_best_match_stops_on_synonym_cycle() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);

    assert!(client.best_match("Loop a").await.unwrap().is_none());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let stub = Stub {
        flaky_failures: 2,
        ..Default::default()
    };
    let calls = stub.flaky_calls.clone();
    let base = spawn_stub(stub).await;
    let client = client(&base, 3);

    let record = client.record_by_id(42).await.unwrap().unwrap();
    assert_eq!(record.aphia_id, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retries_give_up_after_max_attempts() {
    let stub = Stub {
        flaky_failures: 10,
        ..Default::default()
    };
    let calls = stub.flaky_calls.clone();
    let base = spawn_stub(stub).await;
    let client = client(&base, 3);

    let result = client.record_by_id(42).await;
    assert!(matches!(result, Err(WormsError::Api(503, _))));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);

    let result = client.synonyms_by_id(1).await;
    assert!(matches!(result, Err(WormsError::Api(400, _))));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);

    let result = client.children_by_id(1).await;
    assert!(matches!(result, Err(WormsError::NotFound(_))));
}

#[tokio::test]
async fn test_records_by_names_splits_large_inputs() {
    let stub = Stub::default();
    let calls = stub.batch_calls.clone();
    let base = spawn_stub(stub).await;
    let client = client(&base, 3);

    let owned: Vec<String> = (0..501).map(|i| format!("Species {}", i)).collect();
    let names: Vec<&str> = owned.iter().map(String::as_str).collect();

    let results = client.records_by_names(&names, false).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(results.len(), 501);
    for (name, records) in names.iter().zip(&results) {
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].scientific_name, *name);
    }
}

#[tokio::test]
async fn test_records_by_names_single_request() {
    let stub = Stub::default();
    let calls = stub.batch_calls.clone();
    let base = spawn_stub(stub).await;
    let client = client(&base, 3);

    let results = client
        .records_by_names(&["Aurelia aurita", "Obelia dichotoma"], true)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results[1][0].scientific_name, "Obelia dichotoma");

    assert!(client.records_by_names(&[], false).await.unwrap().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_match_records_pads_short_answers() {
    let stub = Stub::default();
    let calls = stub.batch_calls.clone();
    let base = spawn_stub(stub).await;
    let client = client(&base, 3);

    let results = client
        .match_records_by_names(&["Aurelia aurita", "Obelia", "Physalia"])
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0][0].scientific_name, "Aurelia aurita");
    assert_eq!(results[1][0].scientific_name, "Obelia");
    assert!(results[2].is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_match_records_chunks_of_fifty() {
    let stub = Stub::default();
    let calls = stub.batch_calls.clone();
    let base = spawn_stub(stub).await;
    let client = client(&base, 3);

    let owned: Vec<String> = (0..51).map(|i| format!("Taxon {}", i)).collect();
    let names: Vec<&str> = owned.iter().map(String::as_str).collect();

    let results = client.match_records_by_names(&names).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(results.len(), 51);
    // Each chunk came back one short: the last of each is padded
    assert_eq!(results[48][0].scientific_name, "Taxon 48");
    assert!(results[49].is_empty());
    assert!(results[50].is_empty());
}

#[tokio::test]
async fn test_records_by_date_query() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 2, 1, 12, 30, 0).unwrap();

    let records = client.records_by_date(start, Some(end), 51).await.unwrap();
    assert_eq!(
        records[0].scientific_name,
        "2024-01-01T00:00:00Z|2024-02-01T12:30:00Z|51|true"
    );

    // Offsets start at 1
    let records = client.records_by_date(start, None, 0).await.unwrap();
    assert_eq!(records[0].scientific_name, "2024-01-01T00:00:00Z|-|1|true");
}

#[tokio::test]
async fn test_external_ids() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);

    let record = client
        .record_by_external_id("6141", ExternalIdType::Ncbi)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.aphia_id, 135306);
    assert!(client
        .record_by_external_id("6141", ExternalIdType::Tsn)
        .await
        .unwrap()
        .is_none());

    assert_eq!(
        client.external_id_by_id(135306, ExternalIdType::Tsn).await.unwrap(),
        vec!["51483".to_string()]
    );
    assert!(client
        .external_id_by_id(135306, ExternalIdType::Bold)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_records_by_vernacular() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);

    let exact = client.records_by_vernacular("moon jelly", false).await.unwrap();
    assert_eq!(exact[0].aphia_id, 135306);
    let like = client.records_by_vernacular("moon", true).await.unwrap();
    assert_eq!(like.len(), 1);
    assert!(client.records_by_vernacular("moon", false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_taxon_details() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);

    let vernaculars = client.vernaculars_by_id(135306).await.unwrap();
    assert_eq!(vernaculars.len(), 2);
    assert_eq!(vernaculars[1].vernacular, "água-viva");
    assert_eq!(vernaculars[1].language_code.as_deref(), Some("por"));

    let distributions = client.distributions_by_id(135306).await.unwrap();
    assert_eq!(distributions.len(), 2);
    assert_eq!(distributions[1].locality.as_deref(), Some("North Sea"));
    assert_eq!(distributions[1].establishment_means.as_deref(), Some("Native"));

    let sources = client.sources_by_id(135306).await.unwrap();
    assert_eq!(sources[0].usage.as_deref(), Some("original description"));

    assert_eq!(client.name_by_id(135306).await.unwrap().as_deref(), Some("Aurelia aurita"));
    assert_eq!(client.name_by_id(1).await.unwrap(), None);
    assert!(client.vernaculars_by_id(1).await.unwrap().is_empty());
    assert!(client.distributions_by_id(1).await.unwrap().is_empty());
    assert!(client.sources_by_id(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_import_classification_builds_path() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);
    let pool = init_memory_database().await.unwrap();
    let catalog = Catalog::new(pool, EventBus::new(16));

    let path = client.import_classification(&catalog, 135306).await.unwrap();

    let names: Vec<&str> = path.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Animalia", "Cnidaria", "Aurelia aurita"]);
    assert_eq!(path[0].rank, "Reino");
    assert_eq!(path[2].aphia, Some(135306));

    let leaf = load_taxon(catalog.pool(), path[2].id).await.unwrap();
    assert_eq!(leaf.parent_id, Some(path[1].id));
    assert_eq!(leaf.level, 2);

    // Importing again reuses the same taxa
    let again = client.import_classification(&catalog, 135306).await.unwrap();
    let ids: Vec<i64> = again.iter().map(|t| t.id).collect();
    assert_eq!(ids, path.iter().map(|t| t.id).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_import_attaches_orphans() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);
    let pool = init_memory_database().await.unwrap();
    let catalog = Catalog::new(pool, EventBus::new(16));

    let orphan = catalog
        .create_taxon(&NewTaxon::new("Cnidaria", ""))
        .await
        .unwrap();
    assert_eq!(list_orphans(catalog.pool()).await.unwrap().len(), 1);

    client.import_classification(&catalog, 135306).await.unwrap();

    let fixed = load_taxon(catalog.pool(), orphan.id).await.unwrap();
    assert_eq!(fixed.rank, "Filo");
    assert_eq!(fixed.aphia, Some(1267));
    assert!(fixed.parent_id.is_some());
    assert!(list_orphans(catalog.pool()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_classification() {
    let base = spawn_stub(Stub::default()).await;
    let client = client(&base, 3);
    let pool = init_memory_database().await.unwrap();
    let catalog = Catalog::new(pool, EventBus::new(16));

    let result = client.import_classification(&catalog, 7).await;
    assert!(matches!(result, Err(WormsError::NotFound(_))));
}

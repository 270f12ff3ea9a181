use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use cinesearch_core::persist::{save_catalog, IndexPaths};
use cinesearch_core::{Catalog, Document, Field, Index, SearchEngine, StandardPreprocessor};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tempfile::tempdir;
use tower::ServiceExt;

const TOKEN: &str = "letmein";

fn movie(id: &str, stars: &[&str], genres: &[&str], summaries: &[&str]) -> Document {
    Document::new(id)
        .with_field(Field::Stars, stars)
        .with_field(Field::Genres, genres)
        .with_field(Field::Summaries, summaries)
}

fn tiny_catalog() -> Catalog {
    let preprocessor = StandardPreprocessor::default();
    let docs = vec![
        movie("tt0068646", &["Marlon Brando", "Al Pacino"], &["Crime", "Drama"], &["The aging patriarch of a crime dynasty"]),
        movie("tt0110912", &["John Travolta"], &["Crime", "Drama"], &["Hitmen, a boxer and crime upon crime"]),
        movie("tt0109830", &["Tom Hanks"], &["Drama", "Romance"], &["A slow man witnesses history"]),
    ];
    Catalog::build(Index::build(docs.into_iter().map(|d| preprocessor.preprocess_document(d))))
}

fn app() -> Router {
    server::router(Arc::new(SearchEngine::new(tiny_catalog())), Some(TOKEN.to_string()))
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Bytes) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header("X-ADMIN-TOKEN", t);
    }
    let req = match body {
        Some(json) => req.header("content-type", "application/json").body(Body::from(json.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = call(app, Method::GET, uri, None, None).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn result_ids(json: &Value) -> Vec<String> {
    json["results"].as_array().unwrap().iter().map(|h| h["doc_id"].as_str().unwrap().to_string()).collect()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let app = app();
    let (status, json) = get_json(&app, "/search?q=crime&method=okapibm25&k=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_ids(&json), vec!["tt0110912", "tt0068646"]);
    let scores: Vec<f64> = json["results"].as_array().unwrap().iter().map(|h| h["score"].as_f64().unwrap()).collect();
    assert!(scores[0] >= scores[1]);
    assert_eq!(json["method"], "okapibm25");
}

#[tokio::test]
async fn k_is_clamped() {
    let app = app();
    let (status, json) = get_json(&app, "/search?q=crime&k=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_ids(&json).len(), 1);
}

#[tokio::test]
async fn weights_restrict_the_fields_scored() {
    let app = app();
    let (_, json) = get_json(&app, "/search?q=hanks&weights=genres=1").await;
    assert!(result_ids(&json).is_empty());
    let (_, json) = get_json(&app, "/search?q=hanks&weights=stars=1").await;
    assert_eq!(result_ids(&json), vec!["tt0109830"]);
}

#[tokio::test]
async fn invalid_requests_are_bad_requests() {
    let app = app();
    for uri in [
        "/search?q=crime&method=xyz.abc",
        "/search?q=crime&method=unigram",
        "/search?q=crime&method=unigram&smoothing=mixture&lambda=2",
        "/search?q=crime&weights=plot=1",
    ] {
        let (status, _) = call(&app, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn unigram_with_smoothing_ranks() {
    let app = app();
    let (status, json) = get_json(&app, "/search?q=crime&method=unigram&smoothing=mixture&lambda=0.3").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!result_ids(&json).is_empty());
}

#[tokio::test]
async fn documents_are_served_by_id() {
    let app = app();
    let (status, json) = get_json(&app, "/doc/tt0109830").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "tt0109830");
    let (status, _) = call(&app, Method::GET, "/doc/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mutations_need_the_admin_token() {
    let app = app();
    let doc = serde_json::json!({ "id": "new", "genres": ["western"] });
    let (status, _) = call(&app, Method::POST, "/index/documents", None, Some(doc.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, Method::POST, "/index/documents", Some("wrong"), Some(doc)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, Method::POST, "/index/refresh", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let no_token = server::router(Arc::new(SearchEngine::new(tiny_catalog())), None);
    let (status, _) = call(&no_token, Method::DELETE, "/index/documents/tt0109830", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn add_remove_and_refresh() {
    let app = app();
    let batch = serde_json::json!([
        { "id": "tt0120815", "stars": ["Tom Hanks", "Matt Damon"], "genres": ["Drama", "War"], "summaries": ["Soldiers search for a private"] }
    ]);
    let (status, body) = call(&app, Method::POST, "/index/documents?preprocess=true", Some(TOKEN), Some(batch)).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["stale"], true);

    let (_, json) = get_json(&app, "/search?q=damon").await;
    assert_eq!(result_ids(&json), vec!["tt0120815"]);

    let (status, body) = call(&app, Method::POST, "/index/refresh", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["documents"], 4);

    let (status, _) = call(&app, Method::DELETE, "/index/documents/tt0120815", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = get_json(&app, "/search?q=damon").await;
    assert!(result_ids(&json).is_empty());
    let (status, _) = call(&app, Method::DELETE, "/index/documents/tt0120815", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn app_loads_a_saved_index() {
    let dir = tempdir().unwrap();
    save_catalog(&IndexPaths::new(dir.path()), &tiny_catalog()).unwrap();
    let app = server::build_app(dir.path().to_string_lossy().to_string()).unwrap();

    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");
    let (status, json) = get_json(&app, "/search?q=pacino&safe=false").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_ids(&json), vec!["tt0068646"]);
}

#[tokio::test(flavor = "current_thread")]
async fn pending_writes_do_not_stall_other_requests() {
    let engine = Arc::new(SearchEngine::new(tiny_catalog()));
    let app = server::router(engine.clone(), Some(TOKEN.to_string()));

    // a long search elsewhere holds the read lock
    let (locked_tx, locked_rx) = mpsc::channel();
    let reader = std::thread::spawn(move || {
        let _guard = engine.read();
        locked_tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(500));
    });
    locked_rx.recv().unwrap();

    let start = Instant::now();
    let writer_app = app.clone();
    let refresh = tokio::spawn(async move {
        call(&writer_app, Method::POST, "/index/refresh", Some(TOKEN), None).await.0
    });
    tokio::task::yield_now().await;
    let (status, _) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(start.elapsed() < Duration::from_millis(250), "health waited {:?}", start.elapsed());

    assert_eq!(refresh.await.unwrap(), StatusCode::OK);
    reader.join().unwrap();
}

//! HTTP tests for the friendrec router.
//!
//! Requests go straight through the `Router` with `oneshot`, no socket.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use friendrec::server::{AppState, build_router};
use friendrec::{EmbeddingStore, RecommendationEngine, UserDirectory};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let store =
        EmbeddingStore::from_rows(vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    let directory = UserDirectory::from_entries([
        (1, "Alice".to_string()),
        (2, "Bob".to_string()),
        (3, "Carol".to_string()),
    ]);
    build_router(Arc::new(AppState {
        engine: RecommendationEngine::new(store),
        directory,
        default_top_k: 5,
    }))
}

async fn get(uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn home_is_plain_text() {
    let (status, body) = get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("/tuijian?id=1"));
}

#[tokio::test]
async fn tuijian_returns_friends_with_info() {
    let (status, json) = get_json("/tuijian?id=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["student_id"], 1);
    assert_eq!(json["student_info"], "Alice");
    assert_eq!(json["recommend_ids"], serde_json::json!([2, 3]));
    assert_eq!(json["recommend_friends"], serde_json::json!(["Bob", "Carol"]));
    assert_eq!(json["count"], 2);
}

#[tokio::test]
async fn recommend_alias_honors_k() {
    let (status, json) = get_json("/recommend?id=3&k=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["recommend_ids"], serde_json::json!([1]));
    assert_eq!(json["count"], 1);

    let (_, json) = get_json("/recommend?id=3&k=0").await;
    assert_eq!(json["count"], 0);
}

#[tokio::test]
async fn unknown_student_is_an_empty_success() {
    for uri in ["/tuijian?id=999", "/tuijian?id=0", "/tuijian?id=-4"] {
        let (status, json) = get_json(uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(json["count"], 0, "{uri}");
        assert_eq!(json["recommend_friends"], serde_json::json!([]), "{uri}");
    }
}

#[tokio::test]
async fn malformed_parameters_are_bad_requests() {
    let (status, json) = get_json("/tuijian").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing 'id' parameter");

    let (status, json) = get_json("/tuijian?id=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid 'id' parameter"));

    let (status, json) = get_json("/tuijian?id=1&k=-1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid 'k' parameter"));

    let (status, json) = get_json("/tuijian?id=1&k=many").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("'k'"));
}

#[tokio::test]
async fn users_lists_directory() {
    let (status, json) = get_json("/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 3);
    assert_eq!(json["users"][0]["uid"], 1);
    assert_eq!(json["users"][2]["info"], "Carol");
}

#[tokio::test]
async fn single_user_lookup() {
    let (status, json) = get_json("/users/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["info"], "Bob");
    assert_eq!(json["known"], true);

    let (status, json) = get_json("/users/7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["known"], false);
    assert!(json["info"].as_str().unwrap().contains('7'));

    let (status, _) = get_json("/users/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_sizes() {
    let (status, json) = get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["users"], 3);
    assert_eq!(json["dimension"], 2);
    assert_eq!(json["directory_entries"], 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recommend_on_a_large_store_runs_off_the_async_workers() {
    // Above the parallel scan threshold, one-hot rows cycling over 8 axes.
    let rows: Vec<Vec<f32>> = (0..5_000)
        .map(|i| {
            let mut row = vec![0.0; 8];
            row[i % 8] = 1.0;
            row
        })
        .collect();
    let store = EmbeddingStore::from_rows(rows).unwrap();
    let state = Arc::new(AppState {
        engine: RecommendationEngine::new(store),
        directory: UserDirectory::default(),
        default_top_k: 5,
    });

    let requests = (1..=4_i64).map(|id| {
        let router = build_router(Arc::clone(&state));
        tokio::spawn(async move {
            let uri = format!("/tuijian?id={id}&k=3");
            let response = router
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (id, status, serde_json::from_slice::<Value>(&body).unwrap())
        })
    });

    for handle in requests.collect::<Vec<_>>() {
        let (id, status, json) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 3);
        // Row id-1 shares its axis with rows id+7, id+15, ... and ties break by id.
        assert_eq!(json["recommend_ids"], serde_json::json!([id + 8, id + 16, id + 24]));
    }
}

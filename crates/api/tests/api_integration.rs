//! Integration tests for the API server.

use std::sync::Arc;
use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use kv_store::InMemoryKeyValueStore;
use metrics_exporter_prometheus::PrometheusHandle;
use provider::{ProviderLibrary, TableNames};
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    let library = ProviderLibrary::new(
        Arc::new(InMemoryKeyValueStore::new()),
        TableNames::new("test", "api"),
    );
    api::create_app(Arc::new(library), get_metrics_handle())
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn event(entity_id: &str, type_name: &str, kind: &str) -> Value {
    json!({
        "requestID": "req-1",
        "typeName": type_name,
        "entityTypeName": "Cart",
        "entityID": entity_id,
        "kind": kind,
        "version": 1,
        "value": {"type": type_name},
        "createdAt": "2024-01-01T00:00:00Z"
    })
}

fn in_one_hour() -> i64 {
    chrono::Utc::now().timestamp() + 3600
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}

#[tokio::test]
async fn test_store_and_read_events() {
    let app = setup();
    let id = "0b8c2e4a-1f2d-4c3b-9a8e-7d6c5b4a3f21";

    let (status, json) = send(
        &app,
        "POST",
        "/events",
        Some(json!([event(id, "CartCreated", "event"), event(id, "ItemAdded", "event")])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stored"], 2);

    let (status, json) = send(&app, "GET", &format!("/entities/Cart/{id}/events"), None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["typeName"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["CartCreated", "ItemAdded"]);

    let (status, json) = send(
        &app,
        "GET",
        &format!("/entities/Cart/{id}/events?since=2999-01-01T00:00:00Z"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));

    let (status, json) = send(&app, "GET", "/entities/Cart", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([id]));
}

#[tokio::test]
async fn test_latest_snapshot() {
    let app = setup();

    let (status, json) = send(&app, "GET", "/entities/Cart/abc123/snapshot", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["title"], "NotFound");

    send(
        &app,
        "POST",
        "/events",
        Some(json!([event("abc123", "Cart", "snapshot")])),
    )
    .await;

    let (status, json) = send(&app, "GET", "/entities/Cart/abc123/snapshot", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["kind"], "snapshot");

    let (status, json) = send(&app, "GET", "/entities/Cart?kind=snapshot", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!(["abc123"]));
}

#[tokio::test]
async fn test_event_with_ambiguous_entity_type_is_rejected() {
    let app = setup();
    let mut bad = event("abc123", "CartCreated", "event");
    bad["entityTypeName"] = json!("Shop-Cart");

    let (status, json) = send(&app, "POST", "/events", Some(json!([bad]))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["title"], "InvalidKey");
    assert!(json["reason"].as_str().unwrap().contains("entity_type_name"));
}

#[tokio::test]
async fn test_read_models_store_fetch_search() {
    let app = setup();

    for (id, total) in [("a", 10), ("b", 20)] {
        let (status, _) = send(
            &app,
            "PUT",
            "/read-models/CartReadModel",
            Some(json!({"id": id, "total": total})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = send(&app, "GET", "/read-models/CartReadModel/b", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 20);

    let (status, _) = send(&app, "GET", "/read-models/CartReadModel/zzz", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(
        &app,
        "POST",
        "/search/CartReadModel",
        Some(json!({"filters": [{"property": "total", "operation": ">", "values": [15]}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([{"id": "b", "total": 20}]));
}

#[tokio::test]
async fn test_read_model_without_id_is_rejected() {
    let app = setup();

    let (status, json) = send(
        &app,
        "PUT",
        "/read-models/CartReadModel",
        Some(json!({"total": 1})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["title"], "MissingReadModelId");
}

#[tokio::test]
async fn test_invalid_search_filter_is_rejected() {
    let app = setup();

    let (status, json) = send(
        &app,
        "POST",
        "/search/CartReadModel",
        Some(json!({"filters": [{"property": "total", "operation": "between", "values": [1]}]})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["title"], "InvalidFilter");
}

#[tokio::test]
async fn test_subscription_lifecycle() {
    let app = setup();

    for (read_model, subscription_id) in [("CartReadModel", "sub1"), ("OrderReadModel", "sub2")] {
        let (status, _) = send(
            &app,
            "POST",
            "/subscriptions",
            Some(json!({
                "typeName": read_model,
                "connectionID": "conn42",
                "subscriptionID": subscription_id,
                "operation": {"query": "subscription { id }"},
                "requestID": "req-1",
                "expirationTime": in_one_hour()
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = send(&app, "GET", "/subscriptions/CartReadModel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["subscriptionID"], "sub1");

    let (status, json) = send(&app, "DELETE", "/connections/conn42/subscriptions/sub1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deleted"], 1);

    let (status, json) = send(&app, "DELETE", "/connections/conn42/subscriptions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deleted"], 1);

    let (_, json) = send(&app, "GET", "/subscriptions/OrderReadModel", None).await;
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn test_connection_data_lifecycle() {
    let app = setup();

    let (status, _) = send(
        &app,
        "PUT",
        "/connections/conn42",
        Some(json!({"expirationTime": in_one_hour(), "user": {"username": "alice"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, "GET", "/connections/conn42", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["user"]["username"], "alice");

    let (status, _) = send(&app, "DELETE", "/connections/conn42", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", "/connections/conn42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_connection_id_with_delimiter_is_rejected() {
    let app = setup();

    let (status, json) = send(&app, "DELETE", "/connections/conn-42/subscriptions", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["title"], "InvalidKey");
}

#[tokio::test]
async fn test_any_document_id_can_be_fetched() {
    let app = setup();

    for id in ["search", "a-b"] {
        let (status, _) = send(
            &app,
            "PUT",
            "/read-models/CartReadModel",
            Some(json!({"id": id, "total": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = send(&app, "GET", &format!("/read-models/CartReadModel/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], id);
    }
}

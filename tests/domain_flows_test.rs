// Domain Flow Integration Tests
// The uniform write protocol exercised across entity types: cascading
// deletes, card moves journaled as PATCH, and multi-entity orders sharing
// one version.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use deltasync::api::auth::mint_token;
use deltasync::api::server::build_router;
use deltasync::api::AppState;
use deltasync::config::Config;
use deltasync::coord::MemoryCoordinator;
use deltasync::sync::fanout;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    _data_dir: tempfile::TempDir,
    fanout: tokio::task::JoinHandle<()>,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.fanout.abort();
    }
}

async fn spawn_app() -> TestApp {
    let data_dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: data_dir.path().to_path_buf(),
        jwt_secret: "test-secret".to_string(),
        ..Config::default()
    };
    let coordinator = Arc::new(MemoryCoordinator::new());
    let state = Arc::new(AppState::new(config, coordinator.clone()).unwrap());
    let fanout = fanout::spawn(state.coordinator.clone(), state.bus.clone());

    while coordinator.subscriber_count() == 0 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    TestApp {
        router: build_router(state.clone()),
        state,
        _data_dir: data_dir,
        fanout,
    }
}

async fn request(
    router: &Router,
    method: &str,
    path: &str,
    token: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("Authorization", format!("Bearer {token}"));
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let request = match body {
        Some(value) => builder.body(Body::from(value.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn deltas(app: &TestApp, token: &str, since: u64) -> Vec<Value> {
    let (status, rows) = request(
        &app.router,
        "GET",
        &format!("/api/sync?since={since}"),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    rows.as_array().unwrap().clone()
}

#[tokio::test]
async fn board_flow_create_update_move() {
    let app = spawn_app().await;
    let token = mint_token(&app.state.config.jwt_secret, "acme", "user-1").unwrap();

    let (_, project) = request(
        &app.router,
        "POST",
        "/api/projects",
        &token,
        Some(json!({ "name": "Board" })),
    )
    .await;
    let project_id = project["id"].as_str().unwrap().to_string();

    let (_, todo) = request(
        &app.router,
        "POST",
        "/api/columns",
        &token,
        Some(json!({ "project_id": project_id, "name": "Todo" })),
    )
    .await;
    let (_, done) = request(
        &app.router,
        "POST",
        "/api/columns",
        &token,
        Some(json!({ "project_id": project_id, "name": "Done" })),
    )
    .await;
    assert_eq!(todo["position"], 0);
    assert_eq!(done["position"], 1);

    let (status, card) = request(
        &app.router,
        "POST",
        "/api/cards",
        &token,
        Some(json!({ "column_id": todo["id"], "title": "Ship it" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let card_id = card["id"].as_str().unwrap().to_string();

    let (status, moved) = request(
        &app.router,
        "PATCH",
        &format!("/api/cards/{card_id}/move"),
        &token,
        Some(json!({ "column_id": done["id"], "position": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["column_id"], done["id"]);

    // The move is journaled as a PATCH with the full post-state.
    let rows = deltas(&app, &token, 0).await;
    let last = rows.last().unwrap();
    assert_eq!(last["operation"], "PATCH");
    assert_eq!(last["table_name"], "cards");
    let payload: Value = serde_json::from_str(last["payload"].as_str().unwrap()).unwrap();
    assert_eq!(payload["column_id"], done["id"]);
}

#[tokio::test]
async fn creating_a_card_in_a_missing_column_is_not_found() {
    let app = spawn_app().await;
    let token = mint_token(&app.state.config.jwt_secret, "acme", "user-1").unwrap();

    let (status, _) = request(
        &app.router,
        "POST",
        "/api/cards",
        &token,
        Some(json!({ "column_id": "ghost", "title": "Orphan" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The failed write journaled nothing.
    assert!(deltas(&app, &token, 0).await.is_empty());
}

#[tokio::test]
async fn deleting_a_project_cascades_in_one_version() {
    let app = spawn_app().await;
    let token = mint_token(&app.state.config.jwt_secret, "acme", "user-1").unwrap();

    let (_, project) = request(
        &app.router,
        "POST",
        "/api/projects",
        &token,
        Some(json!({ "name": "Doomed" })),
    )
    .await;
    let project_id = project["id"].as_str().unwrap().to_string();
    let (_, column) = request(
        &app.router,
        "POST",
        "/api/columns",
        &token,
        Some(json!({ "project_id": project_id, "name": "Lane" })),
    )
    .await;
    let (_, _card) = request(
        &app.router,
        "POST",
        "/api/cards",
        &token,
        Some(json!({ "column_id": column["id"], "title": "Gone" })),
    )
    .await;

    let before = deltas(&app, &token, 0).await;
    let max_before = before.last().unwrap()["version"].as_u64().unwrap();

    let (status, _) = request(
        &app.router,
        "DELETE",
        &format!("/api/projects/{project_id}"),
        &token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let delta = deltas(&app, &token, max_before).await;
    assert_eq!(delta.len(), 3); // card, column, project
    assert!(delta.iter().all(|row| row["operation"] == "DELETE"));
    assert!(delta
        .iter()
        .all(|row| row["version"] == delta[0]["version"]));
    assert_eq!(delta[0]["table_name"], "cards");
    assert_eq!(delta[2]["table_name"], "projects");
}

#[tokio::test]
async fn orders_and_items_share_one_version_and_notification() {
    let app = spawn_app().await;
    let token = mint_token(&app.state.config.jwt_secret, "acme", "user-1").unwrap();

    let mut subscription = app.state.bus.subscribe("acme");

    let (_, product) = request(
        &app.router,
        "POST",
        "/api/products",
        &token,
        Some(json!({ "name": "Widget", "price_cents": 1999, "stock": 10 })),
    )
    .await;
    let product_id = product["id"].as_str().unwrap().to_string();

    let product_version = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
        .await
        .unwrap();
    assert_eq!(product_version, Some(1));

    let (status, order) = request(
        &app.router,
        "POST",
        "/api/orders",
        &token,
        Some(json!({
            "customer_name": "Ada",
            "items": [
                { "product_id": product_id, "quantity": 2 },
                { "product_id": product_id, "quantity": 1 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
    assert_eq!(order["status"], "open");

    // One notification for the whole group.
    let version = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(version, 2);
    assert!(subscription.try_recv().is_none());

    let rows = deltas(&app, &token, 1).await;
    assert_eq!(rows.len(), 3); // order + two items
    assert!(rows.iter().all(|row| row["version"] == 2));
    assert_eq!(rows[0]["table_name"], "orders");
    assert_eq!(rows[1]["table_name"], "order_items");
}

#[tokio::test]
async fn order_with_unknown_product_rolls_back_entirely() {
    let app = spawn_app().await;
    let token = mint_token(&app.state.config.jwt_secret, "acme", "user-1").unwrap();

    let (status, _) = request(
        &app.router,
        "POST",
        "/api/orders",
        &token,
        Some(json!({
            "customer_name": "Ada",
            "items": [{ "product_id": "ghost", "quantity": 1 }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Neither the order row nor any journal row survived the rollback.
    assert!(deltas(&app, &token, 0).await.is_empty());
}

#[tokio::test]
async fn referenced_products_cannot_be_deleted() {
    let app = spawn_app().await;
    let token = mint_token(&app.state.config.jwt_secret, "acme", "user-1").unwrap();

    let (_, product) = request(
        &app.router,
        "POST",
        "/api/products",
        &token,
        Some(json!({ "name": "Widget", "price_cents": 500 })),
    )
    .await;
    let product_id = product["id"].as_str().unwrap().to_string();

    let (_, _order) = request(
        &app.router,
        "POST",
        "/api/orders",
        &token,
        Some(json!({
            "customer_name": "Ada",
            "items": [{ "product_id": product_id, "quantity": 1 }]
        })),
    )
    .await;

    let (status, body) = request(
        &app.router,
        "DELETE",
        &format!("/api/products/{product_id}"),
        &token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn deleting_an_order_removes_its_items() {
    let app = spawn_app().await;
    let token = mint_token(&app.state.config.jwt_secret, "acme", "user-1").unwrap();

    let (_, product) = request(
        &app.router,
        "POST",
        "/api/products",
        &token,
        Some(json!({ "name": "Widget", "price_cents": 500 })),
    )
    .await;
    let (_, order) = request(
        &app.router,
        "POST",
        "/api/orders",
        &token,
        Some(json!({
            "customer_name": "Ada",
            "items": [{ "product_id": product["id"], "quantity": 1 }]
        })),
    )
    .await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, deleted) = request(
        &app.router,
        "DELETE",
        &format!("/api/orders/{order_id}"),
        &token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["id"], order["id"]);

    let rows = deltas(&app, &token, 0).await;
    let deletes: Vec<&Value> = rows
        .iter()
        .filter(|row| row["operation"] == "DELETE")
        .collect();
    assert_eq!(deletes.len(), 2); // item then order
    assert_eq!(deletes[0]["table_name"], "order_items");
    assert_eq!(deletes[1]["table_name"], "orders");
}

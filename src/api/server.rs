// # Server Router
//
// Route table and middleware stack. Public routes (`/api/auth/*`, the
// health probe) sit outside the identity middleware; everything else
// requires a bearer credential. The stream endpoint gets no request
// timeout (stream connections are expected to live for minutes to hours)
// while every other route is bounded.

use crate::accounts;
use crate::api::auth::require_identity;
use crate::api::{events, sync, AppState};
use crate::domain::{cards, columns, orders, products, projects};
use axum::http::Method;
use axum::middleware;
use axum::response::Json;
use axum::routing::{get, patch, post, put};
use axum::Router;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Assemble the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/api/auth/register", post(accounts::register))
        .route("/api/auth/login", post(accounts::login))
        .route("/healthz", get(healthz));

    let protected = Router::new()
        .route("/api/sync", get(sync::get_deltas))
        // Domain write endpoints, all running the write pipeline
        .route("/api/projects", post(projects::create_project))
        .route(
            "/api/projects/{id}",
            put(projects::update_project).delete(projects::delete_project),
        )
        .route("/api/columns", post(columns::create_column))
        .route(
            "/api/columns/{id}",
            put(columns::update_column).delete(columns::delete_column),
        )
        .route("/api/cards", post(cards::create_card))
        .route(
            "/api/cards/{id}",
            put(cards::update_card).delete(cards::delete_card),
        )
        .route("/api/cards/{id}/move", patch(cards::move_card))
        .route("/api/products", post(products::create_product))
        .route(
            "/api/products/{id}",
            put(products::update_product).delete(products::delete_product),
        )
        .route("/api/orders", post(orders::create_order))
        .route("/api/orders/{id}", axum::routing::delete(orders::delete_order))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    // The stream endpoint shares the identity middleware but must not sit
    // under the request timeout.
    let stream = Router::new()
        .route("/sse/events", get(events::stream_events))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    let mut router = Router::new()
        .merge(public.layer(TimeoutLayer::new(REQUEST_TIMEOUT)))
        .merge(protected.layer(TimeoutLayer::new(REQUEST_TIMEOUT)))
        .merge(stream);

    if let Some(static_dir) = &state.config.static_dir {
        router = router.fallback_service(ServeDir::new(static_dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                ])
                .allow_headers(Any)
                .allow_origin(Any),
        )
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

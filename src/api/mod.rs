// # HTTP API
//
// Router, shared state, authentication middleware, and the sync endpoints.

pub mod auth;
pub mod events;
pub mod server;
pub mod sync;

use crate::accounts::IdentityDb;
use crate::config::Config;
use crate::coord::Coordinator;
use crate::error::SyncError;
use crate::sync::{NotificationBus, WritePipeline};
use crate::tenant::StoreManager;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use std::sync::Arc;

/// Shared state behind every handler.
pub struct AppState {
    pub config: Config,
    pub stores: Arc<StoreManager>,
    pub coordinator: Arc<dyn Coordinator>,
    pub bus: Arc<NotificationBus>,
    pub pipeline: WritePipeline,
    pub identities: IdentityDb,
}

impl AppState {
    pub fn new(config: Config, coordinator: Arc<dyn Coordinator>) -> crate::error::Result<Self> {
        let stores = Arc::new(StoreManager::new(
            config.data_dir.clone(),
            config.store_cache_capacity,
        ));
        let bus = Arc::new(NotificationBus::new());
        let pipeline = WritePipeline::new(stores.clone(), coordinator.clone());
        let identities = IdentityDb::open(&config.data_dir)?;

        Ok(Self {
            config,
            stores,
            coordinator,
            bus,
            pipeline,
            identities,
        })
    }
}

impl SyncError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            SyncError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            SyncError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            SyncError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            SyncError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            SyncError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            SyncError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_UNAVAILABLE"),
            SyncError::Oracle(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ORACLE_UNAVAILABLE"),
            SyncError::Config(_) | SyncError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
        }
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        }
        let body = Json(json!({
            "code": code,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

// # Delta Endpoint
//
// Pull-based read of journal rows after a given version, for the caller's
// tenant only. Never blocks and never long-polls: the WAL snapshot either
// contains a concurrent write's rows or it doesn't.

use crate::api::auth::Identity;
use crate::api::AppState;
use crate::error::Result;
use crate::journal::{self, JournalRow};
use axum::extract::{Query, State};
use axum::response::Json;
use std::collections::HashMap;
use std::sync::Arc;

/// `GET /api/sync?since=<u64>`: all journal rows with `version > since`,
/// ascending. `since` defaults to 0 when omitted or unparseable.
pub async fn get_deltas(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<JournalRow>>> {
    let since = params
        .get("since")
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(0);

    let store = state.stores.open(&identity.tenant_id)?;
    let rows = store
        .with_reader(|conn| journal::read_since(conn, since))
        .await?;

    tracing::debug!(
        tenant_id = %identity.tenant_id,
        since,
        rows = rows.len(),
        "delta pull"
    );

    Ok(Json(rows))
}

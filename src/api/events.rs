// # Stream Endpoint
//
// Long-lived server-sent-events channel pushing version numbers to one
// client. The response opens with a `:ok` comment so intermediate proxies
// flush their buffers, then emits one `data: <version>` frame per
// notification. There is no terminating frame; the stream ends with the
// connection, and dropping the body unsubscribes the queue from the bus.

use crate::api::auth::Identity;
use crate::api::AppState;
use crate::error::{Result, SyncError};
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::Response;
use bytes::Bytes;
use std::convert::Infallible;
use std::sync::Arc;

/// `GET /sse/events`: push channel of version numbers for the caller's
/// tenant. One subscription per connection; slow consumers drop versions
/// and recover through the delta endpoint.
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Response> {
    let mut subscription = state.bus.subscribe(&identity.tenant_id);
    tracing::debug!(tenant_id = %identity.tenant_id, "stream opened");

    let stream = async_stream::stream! {
        yield Ok::<Bytes, Infallible>(Bytes::from_static(b":ok\n\n"));
        while let Some(version) = subscription.recv().await {
            yield Ok(Bytes::from(format!("data: {version}\n\n")));
        }
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(stream))
        .map_err(|e| SyncError::Internal(format!("stream response: {e}")))
}

// # Identity Context
//
// Bearer-token authentication. The middleware verifies the JWT once per
// request and attaches the extracted `(tenant_id, user_id)` identity to the
// request's extensions; handlers read it through the `Identity` extractor.
// Paths under `/api/auth/` are mounted outside this middleware and stay
// public.

use crate::api::AppState;
use crate::error::{Result, SyncError};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const BEARER_PREFIX: &str = "Bearer ";

/// Token lifetime.
const TOKEN_TTL_HOURS: i64 = 24;

/// JWT claims carried by every credential.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,

    /// Tenant id
    pub tid: String,

    /// Expiry, seconds since the epoch
    pub exp: i64,
}

/// The authenticated scope of one request. Never persisted.
#[derive(Debug, Clone)]
pub struct Identity {
    pub tenant_id: String,
    pub user_id: String,
}

/// Mint a token for a user of a tenant.
pub fn mint_token(secret: &str, tenant_id: &str, user_id: &str) -> Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        tid: tenant_id.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| SyncError::Internal(format!("token mint: {e}")))
}

/// Verify a token's signature and expiry, returning its claims.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| SyncError::Unauthenticated(format!("invalid token: {e}")))
}

/// Middleware guarding every protected route.
pub async fn require_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> std::result::Result<Response, SyncError> {
    let token = bearer_token(&req)
        .ok_or_else(|| SyncError::Unauthenticated("missing bearer credential".to_string()))?;

    let claims = verify_token(&state.config.jwt_secret, token)?;
    if claims.tid.is_empty() {
        return Err(SyncError::Unauthenticated("token carries no tenant".to_string()));
    }

    req.extensions_mut().insert(Identity {
        tenant_id: claims.tid,
        user_id: claims.sub,
    });

    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(BEARER_PREFIX)
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = SyncError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| SyncError::Unauthenticated("request has no identity".to_string()))
    }
}

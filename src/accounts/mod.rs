// # Account Endpoints
//
// Registration and login against the central identity database. These are
// the only public API routes; everything they produce that the sync core
// cares about is the `(tenant_id, user_id)` pair baked into the minted
// token. The identity database is a plain SQLite file next to the tenant
// stores and is never journaled.

use crate::api::auth::mint_token;
use crate::api::AppState;
use crate::error::{Result, SyncError};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const IDENTITY_DB_FILE: &str = "identity.db";

const MIN_PASSWORD_LEN: usize = 8;

pub struct IdentityDb {
    conn: Mutex<Connection>,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub tenant_id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

impl IdentityDb {
    /// Open (creating if necessary) the central identity database.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join(IDENTITY_DB_FILE))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub async fn create_user(&self, user: &UserRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO users (id, tenant_id, email, password_hash, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                user.id,
                user.tenant_id,
                user.email,
                user.password_hash,
                user.created_at
            ],
        )
        .map_err(|e| match SyncError::from(e) {
            SyncError::Conflict(_) => {
                SyncError::Conflict(format!("email already registered: {}", user.email))
            }
            other => other,
        })?;
        Ok(())
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock().await;
        let user = conn
            .query_row(
                "SELECT id, tenant_id, email, password_hash, created_at \
                 FROM users WHERE email = ?1",
                [email],
                |row| {
                    Ok(UserRecord {
                        id: row.get(0)?,
                        tenant_id: row.get(1)?,
                        email: row.get(2)?,
                        password_hash: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,

    /// Join an existing tenant; a fresh tenant is provisioned when absent.
    pub tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub tenant_id: String,
    pub user_id: String,
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    if !req.email.contains('@') {
        return Err(SyncError::InvalidInput("invalid email address".to_string()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(SyncError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let tenant_id = req
        .tenant_id
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let user = UserRecord {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.clone(),
        email: req.email.trim().to_lowercase(),
        password_hash: hash_password(&req.password)?,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    state.identities.create_user(&user).await?;

    tracing::info!(tenant_id = %tenant_id, user_id = %user.id, "user registered");

    let token = mint_token(&state.config.jwt_secret, &tenant_id, &user.id)?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            tenant_id,
            user_id: user.id,
        }),
    ))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let email = req.email.trim().to_lowercase();
    let user = state
        .identities
        .find_by_email(&email)
        .await?
        .ok_or_else(|| SyncError::Unauthenticated("unknown email or password".to_string()))?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(SyncError::Unauthenticated(
            "unknown email or password".to_string(),
        ));
    }

    let token = mint_token(&state.config.jwt_secret, &user.tenant_id, &user.id)?;
    Ok(Json(AuthResponse {
        token,
        tenant_id: user.tenant_id,
        user_id: user.id,
    }))
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SyncError::Internal(format!("password hash: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

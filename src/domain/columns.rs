// # Columns
//
// Ordered lanes within a project.

use crate::api::auth::Identity;
use crate::api::AppState;
use crate::domain::{projects, require_text, timestamp};
use crate::error::{Result, SyncError};
use crate::journal::JournalDraft;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub position: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateColumn {
    pub project_id: String,
    pub name: String,
    pub position: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateColumn {
    pub name: String,
    pub position: Option<i64>,
}

pub(crate) fn read_column(conn: &Connection, id: &str) -> Result<Column> {
    conn.query_row(
        "SELECT id, project_id, name, position, created_at, updated_at \
         FROM columns WHERE id = ?1",
        [id],
        |row| {
            Ok(Column {
                id: row.get(0)?,
                project_id: row.get(1)?,
                name: row.get(2)?,
                position: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| SyncError::NotFound(format!("column {id}")))
}

/// `POST /api/columns`
pub async fn create_column(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<CreateColumn>,
) -> Result<(StatusCode, Json<Column>)> {
    let name = require_text(&req.name, "name")?;

    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            // Parent must exist in this tenant.
            projects::read_project(conn, &req.project_id)?;

            let position = match req.position {
                Some(p) => p,
                None => next_position(conn, &req.project_id)?,
            };
            let now = timestamp();
            let column = Column {
                id: Uuid::new_v4().to_string(),
                project_id: req.project_id,
                name,
                position,
                created_at: now.clone(),
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO columns (id, project_id, name, position, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    column.id,
                    column.project_id,
                    column.name,
                    column.position,
                    column.created_at,
                    column.updated_at
                ],
            )?;
            let payload = serde_json::to_value(&column)?;
            let draft = JournalDraft::insert("columns", &column.id, payload);
            Ok((column, vec![draft]))
        })
        .await?;

    Ok((StatusCode::CREATED, Json(committed.value)))
}

/// `PUT /api/columns/{id}`
pub async fn update_column(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<UpdateColumn>,
) -> Result<Json<Column>> {
    let name = require_text(&req.name, "name")?;

    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            let mut column = read_column(conn, &id)?;
            column.name = name;
            if let Some(position) = req.position {
                column.position = position;
            }
            column.updated_at = timestamp();
            conn.execute(
                "UPDATE columns SET name = ?1, position = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![column.name, column.position, column.updated_at, column.id],
            )?;
            let payload = serde_json::to_value(&column)?;
            let draft = JournalDraft::update("columns", &column.id, payload);
            Ok((column, vec![draft]))
        })
        .await?;

    Ok(Json(committed.value))
}

/// `DELETE /api/columns/{id}`
pub async fn delete_column(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Column>> {
    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            let column = read_column(conn, &id)?;
            let mut drafts = Vec::new();

            let card_ids: Vec<String> = {
                let mut stmt = conn.prepare("SELECT id FROM cards WHERE column_id = ?1")?;
                let ids = stmt
                    .query_map([&column.id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            };
            for card_id in &card_ids {
                drafts.push(JournalDraft::delete("cards", card_id));
            }
            conn.execute("DELETE FROM cards WHERE column_id = ?1", [&column.id])?;

            conn.execute("DELETE FROM columns WHERE id = ?1", [&column.id])?;
            drafts.push(JournalDraft::delete("columns", &column.id));

            Ok((column, drafts))
        })
        .await?;

    Ok(Json(committed.value))
}

fn next_position(conn: &Connection, project_id: &str) -> Result<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(position) FROM columns WHERE project_id = ?1",
        [project_id],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(-1) + 1)
}

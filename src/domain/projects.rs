// # Projects
//
// Top-level container of the collaborative workspace. Deleting a project
// removes its columns and cards in the same transaction, journaling every
// removed entity at the single allocated version.

use crate::api::auth::Identity;
use crate::api::AppState;
use crate::domain::{require_text, timestamp};
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
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProject {
    pub name: String,
}

pub(crate) fn read_project(conn: &Connection, id: &str) -> Result<Project> {
    conn.query_row(
        "SELECT id, name, created_at, updated_at FROM projects WHERE id = ?1",
        [id],
        |row| {
            Ok(Project {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| SyncError::NotFound(format!("project {id}")))
}

/// `POST /api/projects`
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<CreateProject>,
) -> Result<(StatusCode, Json<Project>)> {
    let name = require_text(&req.name, "name")?;

    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            let now = timestamp();
            let project = Project {
                id: Uuid::new_v4().to_string(),
                name,
                created_at: now.clone(),
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO projects (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![project.id, project.name, project.created_at, project.updated_at],
            )?;
            let payload = serde_json::to_value(&project)?;
            let draft = JournalDraft::insert("projects", &project.id, payload);
            Ok((project, vec![draft]))
        })
        .await?;

    Ok((StatusCode::CREATED, Json(committed.value)))
}

/// `PUT /api/projects/{id}`
pub async fn update_project(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<UpdateProject>,
) -> Result<Json<Project>> {
    let name = require_text(&req.name, "name")?;

    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            let mut project = read_project(conn, &id)?;
            project.name = name;
            project.updated_at = timestamp();
            conn.execute(
                "UPDATE projects SET name = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![project.name, project.updated_at, project.id],
            )?;
            let payload = serde_json::to_value(&project)?;
            let draft = JournalDraft::update("projects", &project.id, payload);
            Ok((project, vec![draft]))
        })
        .await?;

    Ok(Json(committed.value))
}

/// `DELETE /api/projects/{id}`
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Project>> {
    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            let project = read_project(conn, &id)?;
            let mut drafts = Vec::new();

            // Children first, so a replaying client never holds an orphan.
            let card_ids: Vec<String> = {
                let mut stmt = conn.prepare(
                    "SELECT id FROM cards WHERE column_id IN \
                     (SELECT id FROM columns WHERE project_id = ?1)",
                )?;
                let ids = stmt
                    .query_map([&project.id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            };
            for card_id in &card_ids {
                drafts.push(JournalDraft::delete("cards", card_id));
            }
            conn.execute(
                "DELETE FROM cards WHERE column_id IN (SELECT id FROM columns WHERE project_id = ?1)",
                [&project.id],
            )?;

            let column_ids: Vec<String> = {
                let mut stmt = conn.prepare("SELECT id FROM columns WHERE project_id = ?1")?;
                let ids = stmt
                    .query_map([&project.id], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            };
            for column_id in &column_ids {
                drafts.push(JournalDraft::delete("columns", column_id));
            }
            conn.execute("DELETE FROM columns WHERE project_id = ?1", [&project.id])?;

            conn.execute("DELETE FROM projects WHERE id = ?1", [&project.id])?;
            drafts.push(JournalDraft::delete("projects", &project.id));

            Ok((project, drafts))
        })
        .await?;

    Ok(Json(committed.value))
}

// # Cards
//
// The unit of work users drag between columns. Moving a card is journaled
// as a PATCH carrying the full post-state, so replaying clients treat it as
// an upsert like any other change.

use crate::api::auth::Identity;
use crate::api::AppState;
use crate::domain::{columns, require_text, timestamp};
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
pub struct Card {
    pub id: String,
    pub column_id: String,
    pub title: String,
    pub description: Option<String>,
    pub position: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCard {
    pub column_id: String,
    pub title: String,
    pub description: Option<String>,
    pub position: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCard {
    pub title: String,
    pub description: Option<String>,
    pub position: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MoveCard {
    pub column_id: String,
    pub position: i64,
}

fn read_card(conn: &Connection, id: &str) -> Result<Card> {
    conn.query_row(
        "SELECT id, column_id, title, description, position, created_at, updated_at \
         FROM cards WHERE id = ?1",
        [id],
        |row| {
            Ok(Card {
                id: row.get(0)?,
                column_id: row.get(1)?,
                title: row.get(2)?,
                description: row.get(3)?,
                position: row.get(4)?,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| SyncError::NotFound(format!("card {id}")))
}

/// `POST /api/cards`
pub async fn create_card(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<CreateCard>,
) -> Result<(StatusCode, Json<Card>)> {
    let title = require_text(&req.title, "title")?;

    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            columns::read_column(conn, &req.column_id)?;

            let position = match req.position {
                Some(p) => p,
                None => next_position(conn, &req.column_id)?,
            };
            let now = timestamp();
            let card = Card {
                id: Uuid::new_v4().to_string(),
                column_id: req.column_id,
                title,
                description: req.description,
                position,
                created_at: now.clone(),
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO cards (id, column_id, title, description, position, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    card.id,
                    card.column_id,
                    card.title,
                    card.description,
                    card.position,
                    card.created_at,
                    card.updated_at
                ],
            )?;
            let payload = serde_json::to_value(&card)?;
            let draft = JournalDraft::insert("cards", &card.id, payload);
            Ok((card, vec![draft]))
        })
        .await?;

    Ok((StatusCode::CREATED, Json(committed.value)))
}

/// `PUT /api/cards/{id}`
pub async fn update_card(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<UpdateCard>,
) -> Result<Json<Card>> {
    let title = require_text(&req.title, "title")?;

    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            let mut card = read_card(conn, &id)?;
            card.title = title;
            card.description = req.description;
            if let Some(position) = req.position {
                card.position = position;
            }
            card.updated_at = timestamp();
            conn.execute(
                "UPDATE cards SET title = ?1, description = ?2, position = ?3, updated_at = ?4 \
                 WHERE id = ?5",
                rusqlite::params![
                    card.title,
                    card.description,
                    card.position,
                    card.updated_at,
                    card.id
                ],
            )?;
            let payload = serde_json::to_value(&card)?;
            let draft = JournalDraft::update("cards", &card.id, payload);
            Ok((card, vec![draft]))
        })
        .await?;

    Ok(Json(committed.value))
}

/// `PATCH /api/cards/{id}/move`
pub async fn move_card(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<MoveCard>,
) -> Result<Json<Card>> {
    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            let mut card = read_card(conn, &id)?;
            columns::read_column(conn, &req.column_id)?;

            card.column_id = req.column_id;
            card.position = req.position;
            card.updated_at = timestamp();
            conn.execute(
                "UPDATE cards SET column_id = ?1, position = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![card.column_id, card.position, card.updated_at, card.id],
            )?;
            let payload = serde_json::to_value(&card)?;
            let draft = JournalDraft::patch("cards", &card.id, payload);
            Ok((card, vec![draft]))
        })
        .await?;

    Ok(Json(committed.value))
}

/// `DELETE /api/cards/{id}`
pub async fn delete_card(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Card>> {
    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            let card = read_card(conn, &id)?;
            conn.execute("DELETE FROM cards WHERE id = ?1", [&card.id])?;
            let draft = JournalDraft::delete("cards", &card.id);
            Ok((card, vec![draft]))
        })
        .await?;

    Ok(Json(committed.value))
}

fn next_position(conn: &Connection, column_id: &str) -> Result<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(position) FROM cards WHERE column_id = ?1",
        [column_id],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(-1) + 1)
}

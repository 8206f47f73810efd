// # Products
//
// Catalogue entries referenced by orders.

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
pub struct Product {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub stock: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub price_cents: i64,
    pub stock: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProduct {
    pub name: String,
    pub price_cents: i64,
    pub stock: i64,
}

pub(crate) fn read_product(conn: &Connection, id: &str) -> Result<Product> {
    conn.query_row(
        "SELECT id, name, price_cents, stock, created_at, updated_at \
         FROM products WHERE id = ?1",
        [id],
        |row| {
            Ok(Product {
                id: row.get(0)?,
                name: row.get(1)?,
                price_cents: row.get(2)?,
                stock: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| SyncError::NotFound(format!("product {id}")))
}

fn validate_price(price_cents: i64) -> Result<()> {
    if price_cents < 0 {
        return Err(SyncError::InvalidInput(
            "price_cents must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// `POST /api/products`
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<CreateProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    let name = require_text(&req.name, "name")?;
    validate_price(req.price_cents)?;

    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            let now = timestamp();
            let product = Product {
                id: Uuid::new_v4().to_string(),
                name,
                price_cents: req.price_cents,
                stock: req.stock.unwrap_or(0),
                created_at: now.clone(),
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO products (id, name, price_cents, stock, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    product.id,
                    product.name,
                    product.price_cents,
                    product.stock,
                    product.created_at,
                    product.updated_at
                ],
            )?;
            let payload = serde_json::to_value(&product)?;
            let draft = JournalDraft::insert("products", &product.id, payload);
            Ok((product, vec![draft]))
        })
        .await?;

    Ok((StatusCode::CREATED, Json(committed.value)))
}

/// `PUT /api/products/{id}`
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<UpdateProduct>,
) -> Result<Json<Product>> {
    let name = require_text(&req.name, "name")?;
    validate_price(req.price_cents)?;

    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            let mut product = read_product(conn, &id)?;
            product.name = name;
            product.price_cents = req.price_cents;
            product.stock = req.stock;
            product.updated_at = timestamp();
            conn.execute(
                "UPDATE products SET name = ?1, price_cents = ?2, stock = ?3, updated_at = ?4 \
                 WHERE id = ?5",
                rusqlite::params![
                    product.name,
                    product.price_cents,
                    product.stock,
                    product.updated_at,
                    product.id
                ],
            )?;
            let payload = serde_json::to_value(&product)?;
            let draft = JournalDraft::update("products", &product.id, payload);
            Ok((product, vec![draft]))
        })
        .await?;

    Ok(Json(committed.value))
}

/// `DELETE /api/products/{id}`
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Product>> {
    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            let product = read_product(conn, &id)?;

            let referencing_orders: i64 = conn.query_row(
                "SELECT COUNT(*) FROM order_items WHERE product_id = ?1",
                [&product.id],
                |row| row.get(0),
            )?;
            if referencing_orders > 0 {
                return Err(SyncError::Conflict(format!(
                    "product {} is referenced by existing orders",
                    product.id
                )));
            }

            conn.execute("DELETE FROM products WHERE id = ?1", [&product.id])?;
            let draft = JournalDraft::delete("products", &product.id);
            Ok((product, vec![draft]))
        })
        .await?;

    Ok(Json(committed.value))
}

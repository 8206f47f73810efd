// # Orders
//
// The multi-entity write: an order and all of its items are created in one
// transaction and journaled at a single allocated version, so every client
// applies the whole group or none of it.

use crate::api::auth::Identity;
use crate::api::AppState;
use crate::domain::{products, require_text, timestamp};
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
pub struct Order {
    pub id: String,
    pub customer_name: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: i64,
}

/// Canonical response shape: the order with its items.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrder {
    pub customer_name: String,
    pub items: Vec<OrderItemInput>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemInput {
    pub product_id: String,
    pub quantity: i64,
}

fn read_order(conn: &Connection, id: &str) -> Result<Order> {
    conn.query_row(
        "SELECT id, customer_name, status, created_at, updated_at FROM orders WHERE id = ?1",
        [id],
        |row| {
            Ok(Order {
                id: row.get(0)?,
                customer_name: row.get(1)?,
                status: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| SyncError::NotFound(format!("order {id}")))
}

fn read_items(conn: &Connection, order_id: &str) -> Result<Vec<OrderItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, order_id, product_id, quantity FROM order_items WHERE order_id = ?1",
    )?;
    let items = stmt
        .query_map([order_id], |row| {
            Ok(OrderItem {
                id: row.get(0)?,
                order_id: row.get(1)?,
                product_id: row.get(2)?,
                quantity: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items)
}

/// `POST /api/orders`
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<CreateOrder>,
) -> Result<(StatusCode, Json<OrderWithItems>)> {
    let customer_name = require_text(&req.customer_name, "customer_name")?;
    if req.items.is_empty() {
        return Err(SyncError::InvalidInput(
            "order must contain at least one item".to_string(),
        ));
    }
    for item in &req.items {
        if item.quantity <= 0 {
            return Err(SyncError::InvalidInput(
                "item quantity must be positive".to_string(),
            ));
        }
    }

    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            let now = timestamp();
            let order = Order {
                id: Uuid::new_v4().to_string(),
                customer_name,
                status: "open".to_string(),
                created_at: now.clone(),
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO orders (id, customer_name, status, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    order.id,
                    order.customer_name,
                    order.status,
                    order.created_at,
                    order.updated_at
                ],
            )?;

            let mut drafts = vec![JournalDraft::insert(
                "orders",
                &order.id,
                serde_json::to_value(&order)?,
            )];

            let mut items = Vec::with_capacity(req.items.len());
            for input in req.items {
                // Every referenced product must exist in this tenant.
                products::read_product(conn, &input.product_id)?;

                let item = OrderItem {
                    id: Uuid::new_v4().to_string(),
                    order_id: order.id.clone(),
                    product_id: input.product_id,
                    quantity: input.quantity,
                };
                conn.execute(
                    "INSERT INTO order_items (id, order_id, product_id, quantity) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![item.id, item.order_id, item.product_id, item.quantity],
                )?;
                drafts.push(JournalDraft::insert(
                    "order_items",
                    &item.id,
                    serde_json::to_value(&item)?,
                ));
                items.push(item);
            }

            Ok((OrderWithItems { order, items }, drafts))
        })
        .await?;

    Ok((StatusCode::CREATED, Json(committed.value)))
}

/// `DELETE /api/orders/{id}`
pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderWithItems>> {
    let committed = state
        .pipeline
        .execute(&identity.tenant_id, move |conn| {
            let order = read_order(conn, &id)?;
            let items = read_items(conn, &order.id)?;

            let mut drafts = Vec::with_capacity(items.len() + 1);
            for item in &items {
                drafts.push(JournalDraft::delete("order_items", &item.id));
            }
            conn.execute("DELETE FROM order_items WHERE order_id = ?1", [&order.id])?;

            conn.execute("DELETE FROM orders WHERE id = ?1", [&order.id])?;
            drafts.push(JournalDraft::delete("orders", &order.id));

            Ok((OrderWithItems { order, items }, drafts))
        })
        .await?;

    Ok(Json(committed.value))
}

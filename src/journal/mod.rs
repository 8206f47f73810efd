// # Mutation Journal
//
// Per-tenant append-only log of entity changes, keyed by the monotonic
// tenant version. The journal lives in the tenant store itself so one local
// transaction covers both the domain change and the journal row: a change
// happened iff the journal records it, with no distributed commit.
//
// Rows carry the full post-state of the mutated row (`{}` for deletes), so
// a client replaying them as upserts from any `since` converges on current
// state. Retention is unbounded here; pruning is an external compaction
// concern and must preserve the replay-from-zero property.

use crate::error::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Kind of change a journal row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationOp {
    Insert,
    Update,
    Patch,
    Delete,
}

impl MutationOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationOp::Insert => "INSERT",
            MutationOp::Update => "UPDATE",
            MutationOp::Patch => "PATCH",
            MutationOp::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(MutationOp::Insert),
            "UPDATE" => Some(MutationOp::Update),
            "PATCH" => Some(MutationOp::Patch),
            "DELETE" => Some(MutationOp::Delete),
            _ => None,
        }
    }
}

/// A change waiting to be journaled, produced by a domain mutation inside
/// the write pipeline's transaction. The version is stamped on at append
/// time, once the oracle has allocated it.
#[derive(Debug, Clone)]
pub struct JournalDraft {
    pub table_name: String,
    pub entity_id: String,
    pub op: MutationOp,
    pub payload: serde_json::Value,
}

impl JournalDraft {
    pub fn insert(table_name: &str, entity_id: &str, payload: serde_json::Value) -> Self {
        Self {
            table_name: table_name.to_string(),
            entity_id: entity_id.to_string(),
            op: MutationOp::Insert,
            payload,
        }
    }

    pub fn update(table_name: &str, entity_id: &str, payload: serde_json::Value) -> Self {
        Self {
            table_name: table_name.to_string(),
            entity_id: entity_id.to_string(),
            op: MutationOp::Update,
            payload,
        }
    }

    pub fn patch(table_name: &str, entity_id: &str, payload: serde_json::Value) -> Self {
        Self {
            table_name: table_name.to_string(),
            entity_id: entity_id.to_string(),
            op: MutationOp::Patch,
            payload,
        }
    }

    /// Deletes carry only the primary key; the payload is the literal `{}`.
    pub fn delete(table_name: &str, entity_id: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            entity_id: entity_id.to_string(),
            op: MutationOp::Delete,
            payload: serde_json::json!({}),
        }
    }
}

/// A persisted journal row, as served by the delta endpoint. `payload` is
/// the opaque JSON string exactly as journaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRow {
    pub id: i64,
    pub table_name: String,
    pub entity_id: String,
    pub operation: MutationOp,
    pub payload: String,
    pub version: u64,
}

/// Append one row inside the caller's open transaction.
pub fn append(conn: &Connection, draft: &JournalDraft, version: u64) -> Result<()> {
    let payload = serde_json::to_string(&draft.payload)?;
    conn.execute(
        "INSERT INTO mutation_journal (table_name, entity_id, operation, payload, version) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            draft.table_name,
            draft.entity_id,
            draft.op.as_str(),
            payload,
            version as i64,
        ],
    )?;
    Ok(())
}

/// All journal rows with `version > since`, ascending. Rows sharing a
/// version (a multi-entity write) come back in append order.
pub fn read_since(conn: &Connection, since: u64) -> Result<Vec<JournalRow>> {
    let mut stmt = conn.prepare(
        "SELECT seq, table_name, entity_id, operation, payload, version \
         FROM mutation_journal WHERE version > ?1 ORDER BY version ASC, seq ASC",
    )?;

    let rows = stmt.query_map([since as i64], |row| {
        let op_raw: String = row.get(3)?;
        let version: i64 = row.get(5)?;
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            op_raw,
            row.get::<_, String>(4)?,
            version,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, table_name, entity_id, op_raw, payload, version) = row?;
        let operation = MutationOp::parse(&op_raw).ok_or_else(|| {
            crate::error::SyncError::Store(format!("corrupt journal row {id}: operation {op_raw}"))
        })?;
        out.push(JournalRow {
            id,
            table_name,
            entity_id,
            operation,
            payload,
            version: version as u64,
        });
    }
    Ok(out)
}

/// Highest version present in the journal, or 0 when empty.
pub fn max_version(conn: &Connection) -> Result<u64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(version) FROM mutation_journal",
        [],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(0) as u64)
}

// # Tenant Store Migrations
//
// Ordered SQL migrations embedded in the binary. Each freshly opened tenant
// store is brought from its current schema version to the latest before the
// manager hands it out. The schema version lives in `PRAGMA user_version`;
// every migration runs in its own transaction and bumps it on commit.

use crate::error::{Result, SyncError};
use rusqlite::Connection;

/// A single schema migration.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Schema version this migration brings the store to
    pub version: i64,

    /// SQL executed inside the migration's transaction
    pub sql: &'static str,
}

const V0001_MUTATION_JOURNAL: &str = r#"
CREATE TABLE mutation_journal (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    payload TEXT NOT NULL,
    version INTEGER NOT NULL
);

CREATE INDEX idx_mutation_journal_version ON mutation_journal(version);
"#;

const V0002_DOMAIN_TABLES: &str = r#"
CREATE TABLE projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE columns (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    name TEXT NOT NULL,
    position INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id)
);

CREATE TABLE cards (
    id TEXT PRIMARY KEY,
    column_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    position INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (column_id) REFERENCES columns(id)
);

CREATE TABLE products (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    price_cents INTEGER NOT NULL,
    stock INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE orders (
    id TEXT PRIMARY KEY,
    customer_name TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE order_items (
    id TEXT PRIMARY KEY,
    order_id TEXT NOT NULL,
    product_id TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    FOREIGN KEY (order_id) REFERENCES orders(id),
    FOREIGN KEY (product_id) REFERENCES products(id)
);

CREATE INDEX idx_columns_project ON columns(project_id);
CREATE INDEX idx_cards_column ON cards(column_id);
CREATE INDEX idx_order_items_order ON order_items(order_id);
"#;

/// All migrations, ascending by version.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: V0001_MUTATION_JOURNAL,
    },
    Migration {
        version: 2,
        sql: V0002_DOMAIN_TABLES,
    },
];

/// Current schema version of a store.
pub fn schema_version(conn: &Connection) -> Result<i64> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Apply every migration newer than the store's schema version, in order.
/// A failure aborts that migration's transaction and surfaces to the caller.
pub fn run(conn: &mut Connection) -> Result<()> {
    let mut current = schema_version(conn)?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        if migration.version != current + 1 {
            return Err(SyncError::Store(format!(
                "migration gap: store at schema {current}, next embedded migration is {}",
                migration.version
            )));
        }

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;

        tracing::debug!(schema_version = migration.version, "applied migration");
        current = migration.version;
    }

    Ok(())
}

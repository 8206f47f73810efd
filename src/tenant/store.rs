// # Tenant Store
//
// One self-contained SQLite database per tenant, holding the domain tables
// and the mutation journal. Write-ahead logging is on so reads never block
// the single writer. The handle owns two connections: the writer, which the
// write pipeline locks for the duration of a transaction, and a read-only
// connection for delta reads.

use crate::error::{Result, SyncError};
use crate::tenant::migrations;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_TENANT_ID_LEN: usize = 128;

pub struct TenantStore {
    tenant_id: String,
    path: PathBuf,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl TenantStore {
    /// Open (creating and migrating if necessary) the store for a tenant.
    pub fn open(tenant_id: &str, data_dir: &Path) -> Result<Self> {
        validate_tenant_id(tenant_id)?;
        std::fs::create_dir_all(data_dir)?;

        let path = data_dir.join(store_filename(tenant_id));

        let mut writer = Connection::open(&path)?;
        configure(&writer)?;
        migrations::run(&mut writer)?;

        let reader = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        reader.busy_timeout(BUSY_TIMEOUT)?;

        tracing::debug!(tenant_id = %tenant_id, path = %path.display(), "opened tenant store");

        Ok(Self {
            tenant_id: tenant_id.to_string(),
            path,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the writer connection. Holding the guard is what serialises
    /// writes within one tenant.
    pub async fn lock_writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock().await
    }

    /// Run a read against the store's read-only connection.
    pub async fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.reader.lock().await;
        f(&conn)
    }
}

/// Deterministic store file name for a tenant id. Hex keeps arbitrary ids
/// filesystem-safe.
pub fn store_filename(tenant_id: &str) -> String {
    format!("tenant_{}.db", hex::encode(tenant_id.as_bytes()))
}

fn validate_tenant_id(tenant_id: &str) -> Result<()> {
    if tenant_id.is_empty() {
        return Err(SyncError::InvalidInput("empty tenant id".to_string()));
    }
    if tenant_id.len() > MAX_TENANT_ID_LEN {
        return Err(SyncError::InvalidInput(format!(
            "tenant id exceeds {MAX_TENANT_ID_LEN} bytes"
        )));
    }
    Ok(())
}

fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    // journal_mode returns the resulting mode as a row.
    let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        return Err(SyncError::Store(format!(
            "could not enable write-ahead logging, store reports journal_mode={mode}"
        )));
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

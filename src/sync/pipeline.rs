// # Write Pipeline
//
// The transactional envelope every domain mutation executes in:
//
//   open store → BEGIN IMMEDIATE → mutate → allocate version → append
//   journal rows → COMMIT → publish notification
//
// Allocating the version before commit puts the journal row and the domain
// change in the same local transaction. Publishing only after a successful
// commit keeps the client-visible invariant: a version seen on the bus is
// always readable through the delta endpoint. A failed oracle call, a failed
// mutation, or a dropped request rolls the transaction back; a failed
// publish is logged and the write still succeeds.

use crate::coord::Coordinator;
use crate::error::{Result, SyncError};
use crate::journal::{self, JournalDraft};
use crate::tenant::{StoreManager, TenantStore};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::MutexGuard;

/// Outcome of a committed write: the canonical post-mutation value and the
/// version the journal rows were stamped with.
pub struct Committed<T> {
    pub value: T,
    pub version: u64,
}

pub struct WritePipeline {
    stores: Arc<StoreManager>,
    coordinator: Arc<dyn Coordinator>,
}

impl WritePipeline {
    pub fn new(stores: Arc<StoreManager>, coordinator: Arc<dyn Coordinator>) -> Self {
        Self { stores, coordinator }
    }

    pub fn stores(&self) -> &Arc<StoreManager> {
        &self.stores
    }

    /// Execute one domain write for a tenant. `mutate` runs inside the open
    /// transaction; it performs the domain SQL and returns the canonical
    /// post-state plus one journal draft per affected entity. All drafts are
    /// journaled at a single allocated version and one notification is
    /// published after commit.
    pub async fn execute<T, F>(&self, tenant_id: &str, mutate: F) -> Result<Committed<T>>
    where
        T: Send,
        F: FnOnce(&Connection) -> Result<(T, Vec<JournalDraft>)> + Send,
    {
        let store = self.stores.open(tenant_id)?;
        let txn = WriteTxn::begin(store.as_ref()).await?;

        let (value, drafts) = mutate(txn.conn())?;
        if drafts.is_empty() {
            return Err(SyncError::Internal(
                "domain write produced no journal rows".to_string(),
            ));
        }

        // The oracle round-trip happens with the transaction open; on any
        // failure the guard rolls back and the counter gap is harmless.
        let version = self.coordinator.next_version(tenant_id).await?;

        for draft in &drafts {
            journal::append(txn.conn(), draft, version)?;
        }

        txn.commit()?;

        tracing::debug!(
            tenant_id = %tenant_id,
            version,
            rows = drafts.len(),
            "write committed"
        );

        if let Err(e) = self.coordinator.publish(tenant_id, version).await {
            // Fire-and-forget: subscribers recover via their next pull.
            tracing::warn!(tenant_id = %tenant_id, version, error = %e, "notification publish failed");
        }

        Ok(Committed { value, version })
    }
}

/// Transaction guard over the store's writer connection. Rolls back on drop
/// unless committed, so a cancelled request never leaks an open transaction
/// into the next writer.
struct WriteTxn<'a> {
    guard: MutexGuard<'a, Connection>,
    committed: bool,
}

impl<'a> WriteTxn<'a> {
    async fn begin(store: &'a TenantStore) -> Result<WriteTxn<'a>> {
        let guard = store.lock_writer().await;
        guard.execute_batch("BEGIN IMMEDIATE")?;
        Ok(WriteTxn {
            guard,
            committed: false,
        })
    }

    fn conn(&self) -> &Connection {
        &self.guard
    }

    fn commit(mut self) -> Result<()> {
        self.guard.execute_batch("COMMIT")?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for WriteTxn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = self.guard.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "transaction rollback failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{Coordinator, EventStream, MemoryCoordinator, SyncEvent};
    use crate::journal::MutationOp;
    use async_trait::async_trait;
    use serde_json::json;

    fn pipeline_with(coordinator: Arc<dyn Coordinator>) -> (WritePipeline, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let stores = Arc::new(StoreManager::new(dir.path().to_path_buf(), 8));
        (WritePipeline::new(stores, coordinator), dir)
    }

    fn insert_project(conn: &Connection, id: &str, name: &str) -> Result<(String, Vec<JournalDraft>)> {
        conn.execute(
            "INSERT INTO projects (id, name, created_at, updated_at) VALUES (?1, ?2, '', '')",
            rusqlite::params![id, name],
        )?;
        let payload = json!({"id": id, "name": name});
        Ok((name.to_string(), vec![JournalDraft::insert("projects", id, payload)]))
    }

    #[tokio::test]
    async fn committed_write_journals_at_allocated_version() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let (pipeline, _dir) = pipeline_with(coordinator.clone());

        let first = pipeline
            .execute("acme", |conn| insert_project(conn, "p1", "Roadmap"))
            .await
            .unwrap();
        let second = pipeline
            .execute("acme", |conn| insert_project(conn, "p2", "Icebox"))
            .await
            .unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);

        let store = pipeline.stores().open("acme").unwrap();
        let rows = store
            .with_reader(|conn| journal::read_since(conn, 0))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].version, 1);
        assert_eq!(rows[0].operation, MutationOp::Insert);
        assert_eq!(rows[1].entity_id, "p2");
    }

    #[tokio::test]
    async fn mutation_failure_rolls_back_without_burning_a_version() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let (pipeline, _dir) = pipeline_with(coordinator.clone());

        let result: Result<Committed<()>> = pipeline
            .execute("acme", |_conn| {
                Err(SyncError::InvalidInput("bad request".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(coordinator.current_version("acme"), 0);

        let store = pipeline.stores().open("acme").unwrap();
        let rows = store
            .with_reader(|conn| journal::read_since(conn, 0))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    struct FailingOracle;

    #[async_trait]
    impl Coordinator for FailingOracle {
        async fn next_version(&self, _tenant_id: &str) -> Result<u64> {
            Err(SyncError::Oracle("connection refused".to_string()))
        }

        async fn publish(&self, _tenant_id: &str, _version: u64) -> Result<()> {
            panic!("publish must not be called when allocation fails");
        }

        async fn subscribe(&self) -> Result<EventStream> {
            Ok(Box::pin(futures_util::stream::empty::<SyncEvent>()))
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn oracle_failure_rolls_back_domain_change() {
        let (pipeline, _dir) = pipeline_with(Arc::new(FailingOracle));

        let result = pipeline
            .execute("acme", |conn| insert_project(conn, "p1", "Doomed"))
            .await;
        match result {
            Err(SyncError::Oracle(_)) => {}
            other => panic!("expected Oracle error, got {:?}", other.err()),
        }

        let store = pipeline.stores().open("acme").unwrap();
        let (projects, journal_rows) = store
            .with_reader(|conn| {
                let p: i64 = conn.query_row("SELECT COUNT(*) FROM projects", [], |r| r.get(0))?;
                let j: i64 =
                    conn.query_row("SELECT COUNT(*) FROM mutation_journal", [], |r| r.get(0))?;
                Ok((p, j))
            })
            .await
            .unwrap();
        assert_eq!(projects, 0);
        assert_eq!(journal_rows, 0);

        // The rollback left no transaction open: the next write reaches the
        // oracle again instead of failing at BEGIN.
        let again = pipeline
            .execute("acme", |conn| insert_project(conn, "p2", "Recovered"))
            .await;
        assert!(matches!(again, Err(SyncError::Oracle(_))));
    }

    #[tokio::test]
    async fn multi_entity_write_shares_one_version() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let (pipeline, _dir) = pipeline_with(coordinator.clone());

        let committed = pipeline
            .execute("acme", |conn| {
                conn.execute(
                    "INSERT INTO orders (id, customer_name, status, created_at, updated_at) \
                     VALUES ('o1', 'Ada', 'open', '', '')",
                    [],
                )?;
                conn.execute(
                    "INSERT INTO order_items (id, order_id, product_id, quantity) \
                     VALUES ('i1', 'o1', 'prod', 2)",
                    [],
                )?;
                Ok((
                    (),
                    vec![
                        JournalDraft::insert("orders", "o1", json!({"id": "o1"})),
                        JournalDraft::insert("order_items", "i1", json!({"id": "i1"})),
                    ],
                ))
            })
            .await
            .unwrap();

        assert_eq!(committed.version, 1);
        assert_eq!(coordinator.current_version("acme"), 1);

        let store = pipeline.stores().open("acme").unwrap();
        let rows = store
            .with_reader(|conn| journal::read_since(conn, 0))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.version == 1));
    }

    #[tokio::test]
    async fn empty_draft_set_is_rejected() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let (pipeline, _dir) = pipeline_with(coordinator);

        let result: Result<Committed<()>> =
            pipeline.execute("acme", |_conn| Ok(((), Vec::new()))).await;
        assert!(matches!(result, Err(SyncError::Internal(_))));
    }

    #[tokio::test]
    async fn writes_to_one_tenant_leave_others_untouched() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        let (pipeline, _dir) = pipeline_with(coordinator.clone());

        pipeline
            .execute("acme", |conn| insert_project(conn, "p1", "Roadmap"))
            .await
            .unwrap();

        assert_eq!(coordinator.current_version("globex"), 0);
        let store = pipeline.stores().open("globex").unwrap();
        let rows = store
            .with_reader(|conn| journal::read_since(conn, 0))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}

// # Tenant Store Manager
//
// Lazily opens per-tenant stores and keeps at most `capacity` of them in an
// LRU cache. One mutex guards the map and the recency list; the store
// handles themselves are safe for concurrent use. Holding the lock across
// an open also means two racing first-accesses to the same tenant cannot
// construct two handles.

use crate::error::Result;
use crate::tenant::store::TenantStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

pub struct StoreManager {
    data_dir: PathBuf,
    capacity: usize,
    cache: Mutex<CacheState>,
}

struct CacheState {
    stores: HashMap<String, Arc<TenantStore>>,

    /// Most-recently-used tenant id at the front.
    recency: VecDeque<String>,
}

impl StoreManager {
    pub fn new(data_dir: PathBuf, capacity: usize) -> Self {
        Self {
            data_dir,
            capacity: capacity.max(1),
            cache: Mutex::new(CacheState {
                stores: HashMap::new(),
                recency: VecDeque::new(),
            }),
        }
    }

    /// Open the store for a tenant, or return the cached handle. The least
    /// recently used store is closed once capacity is exceeded.
    pub fn open(&self, tenant_id: &str) -> Result<Arc<TenantStore>> {
        let mut cache = self.cache.lock();

        if let Some(store) = cache.stores.get(tenant_id).cloned() {
            promote(&mut cache.recency, tenant_id);
            return Ok(store);
        }

        // Miss: open and migrate before inserting. Failures surface to the
        // caller and nothing is cached.
        let store = Arc::new(TenantStore::open(tenant_id, &self.data_dir)?);

        cache.stores.insert(tenant_id.to_string(), store.clone());
        cache.recency.push_front(tenant_id.to_string());

        while cache.recency.len() > self.capacity {
            if let Some(evicted_id) = cache.recency.pop_back() {
                if let Some(evicted) = cache.stores.remove(&evicted_id) {
                    // The handle closes when the last reference drops; an
                    // in-flight request on the evicted store finishes first.
                    tracing::debug!(tenant_id = %evicted_id, "evicting tenant store");
                    drop(evicted);
                }
            }
        }

        Ok(store)
    }

    /// Number of currently cached store handles.
    pub fn cached_count(&self) -> usize {
        self.cache.lock().stores.len()
    }

    /// Whether a tenant's store is currently cached.
    pub fn is_cached(&self, tenant_id: &str) -> bool {
        self.cache.lock().stores.contains_key(tenant_id)
    }

    /// Release every cached handle. Idempotent.
    pub fn close_all(&self) {
        let mut cache = self.cache.lock();
        let count = cache.stores.len();
        cache.stores.clear();
        cache.recency.clear();
        if count > 0 {
            tracing::info!(closed = count, "closed all tenant stores");
        }
    }
}

fn promote(recency: &mut VecDeque<String>, tenant_id: &str) {
    if let Some(pos) = recency.iter().position(|id| id == tenant_id) {
        recency.remove(pos);
    }
    recency.push_front(tenant_id.to_string());
}

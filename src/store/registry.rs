//! `NamespaceRegistry`: lazily opens and caches one `NamespaceHandle` per
//! namespace, grounded on `knhk-workflow-engine/src/state/manager.rs`'s
//! `StateManager` (a `HashMap` of per-resource state behind a shared lock,
//! opened lazily on first access).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::RwLock;

use crate::error::MonumentResult;

use super::namespace::NamespaceStore;

/// One namespace's store behind a single-writer lock. The write guard is
/// held across the entire admission-insert + completeness-check + MERGE
/// critical section so that tick advancement is atomic with respect to
/// concurrent submissions, per the admission/tick-coordinator contract.
pub struct NamespaceHandle {
    pub store: RwLock<NamespaceStore>,
}

impl NamespaceHandle {
    fn new(store: NamespaceStore) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }
}

/// Process-wide cache of open namespace handles.
pub struct NamespaceRegistry {
    data_dir: PathBuf,
    handles: Mutex<HashMap<String, Arc<NamespaceHandle>>>,
}

impl NamespaceRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Get an already-open handle, or open one from disk. Does not create a
    /// namespace that has never existed.
    pub fn get_or_open(&self, namespace: &str) -> MonumentResult<Arc<NamespaceHandle>> {
        if let Some(handle) = self.handles.lock().get(namespace) {
            return Ok(handle.clone());
        }
        let store = NamespaceStore::open(&self.data_dir, namespace)?;
        let handle = Arc::new(NamespaceHandle::new(store));
        self.handles
            .lock()
            .insert(namespace.to_string(), handle.clone());
        Ok(handle)
    }

    /// Create a brand-new namespace and register its handle. Fails if the
    /// namespace already exists on disk.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        namespace: &str,
        width: u32,
        height: u32,
        goal: &str,
        epoch: u64,
    ) -> MonumentResult<Arc<NamespaceHandle>> {
        let store = NamespaceStore::create(&self.data_dir, namespace, width, height, goal, epoch)?;
        let handle = Arc::new(NamespaceHandle::new(store));
        self.handles
            .lock()
            .insert(namespace.to_string(), handle.clone());
        Ok(handle)
    }

    /// Whether a namespace is already open in this registry (test/diagnostic
    /// helper, not load-bearing for admission correctness).
    pub fn is_open(&self, namespace: &str) -> bool {
        self.handles.lock().contains_key(namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_then_get_or_open_returns_same_handle() {
        let dir = tempdir().unwrap();
        let registry = NamespaceRegistry::new(dir.path());
        let created = registry.create("ns1", 4, 4, "goal", 1).unwrap();
        {
            let guard = created.store.read().await;
            assert_eq!(guard.meta().unwrap().width, 4);
        }
        let reopened = registry.get_or_open("ns1").unwrap();
        assert!(Arc::ptr_eq(&created, &reopened));
    }

    #[test]
    fn get_or_open_unknown_namespace_fails() {
        let dir = tempdir().unwrap();
        let registry = NamespaceRegistry::new(dir.path());
        assert!(registry.get_or_open("nope").is_err());
    }
}

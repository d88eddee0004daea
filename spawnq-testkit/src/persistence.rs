use async_trait::async_trait;
use parking_lot::Mutex;
use spawnq::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// [`ProxyInfoStore`] held in process memory, with write failure injection.
#[derive(Clone, Default)]
pub struct InMemoryProxyInfoStore {
    documents: Arc<Mutex<HashMap<String, ProxyInfo>>>,
    failing: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryProxyInfoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert fail with [`PersistenceError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get(&self, notebook_id: &str) -> Option<ProxyInfo> {
        self.documents.lock().get(notebook_id).cloned()
    }

    /// Successful upserts so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyInfoStore for InMemoryProxyInfoStore {
    async fn upsert(&self, notebook_id: &str, info: &ProxyInfo) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("injected outage".into()));
        }
        self.documents
            .lock()
            .insert(notebook_id.to_string(), info.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, notebook_id: &str) -> Result<Option<ProxyInfo>, PersistenceError> {
        Ok(self.get(notebook_id))
    }
}

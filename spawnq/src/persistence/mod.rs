//! Backends for the two external stores the core talks to: the ordered
//! store behind the work queue and the durable store holding proxy info.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::PersistenceError;
use crate::workload::ProxyInfo;

/// PostgreSQL-backed proxy info store.
#[cfg(feature = "postgres")]
pub mod postgres;

/// Redis-backed ordered store.
#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "postgres")]
pub use postgres::PostgresProxyInfoStore;
#[cfg(feature = "redis")]
pub use redis::RedisOrderedStore;

/// Document store keyed by notebook id holding the latest [`ProxyInfo`].
///
/// `upsert` replaces the stored document as a whole: readers never observe a
/// mix of an old and a new snapshot.
#[async_trait]
pub trait ProxyInfoStore: Send + Sync {
    async fn upsert(&self, notebook_id: &str, info: &ProxyInfo) -> Result<(), PersistenceError>;

    async fn load(&self, notebook_id: &str) -> Result<Option<ProxyInfo>, PersistenceError>;
}

#[async_trait]
impl<P: ProxyInfoStore + ?Sized> ProxyInfoStore for Arc<P> {
    async fn upsert(&self, notebook_id: &str, info: &ProxyInfo) -> Result<(), PersistenceError> {
        (**self).upsert(notebook_id, info).await
    }

    async fn load(&self, notebook_id: &str) -> Result<Option<ProxyInfo>, PersistenceError> {
        (**self).load(notebook_id).await
    }
}

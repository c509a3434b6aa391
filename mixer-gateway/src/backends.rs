//! External interfaces the gateway fans requests out to. Only the
//! in-memory private store gets a concrete implementation; the warehouse, KV-store, and
//! remote-mixer connectors are specified as traits only — physical connectors to the
//! warehouse, the KV-store, and the cache are out of scope here.

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::Result;
use mixer_translate::sql::SqlOutput;

/// Executes translated SQL against the graph warehouse and returns rows keyed by the
/// emitted column aliases, in column-declaration order.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    async fn query(&self, sql: &SqlOutput) -> Result<Vec<IndexMap<String, serde_json::Value>>>;
}

/// Reads import-group membership and schema metadata backing the mapping model;
/// mappings are partitioned by import group at load time.
#[async_trait]
pub trait KvStoreClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// The peer Mixer instance a request can additionally fan out to, producing the
/// "remote" side of every merge rule.
#[async_trait]
pub trait RemoteMixerClient<R, O>: Send + Sync {
    async fn call(&self, request: &R) -> Result<O>;
}

/// The private, per-deployment data store consulted ahead of the shared warehouse: a
/// configured private store takes priority over the shared warehouse for entities it
/// holds. Unlike the other backends above, this one gets a concrete in-memory
/// implementation below.
#[async_trait]
pub trait PrivateStore: Send + Sync {
    async fn get(&self, dcid: &str) -> Result<Option<IndexMap<String, serde_json::Value>>>;
    async fn put(&self, dcid: String, properties: IndexMap<String, serde_json::Value>);
}

/// A reader-preferred `RwLock`-backed private store; mirrors the in-memory
/// cache test double in [`crate::cache`] but permanent rather than TTL-bounded, since
/// the private store is authoritative rather than a cache.
#[derive(Default)]
pub struct InMemoryPrivateStore {
    entries: tokio::sync::RwLock<IndexMap<String, IndexMap<String, serde_json::Value>>>,
}

impl InMemoryPrivateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrivateStore for InMemoryPrivateStore {
    async fn get(&self, dcid: &str) -> Result<Option<IndexMap<String, serde_json::Value>>> {
        let entries = self.entries.read().await;
        Ok(entries.get(dcid).cloned())
    }

    async fn put(&self, dcid: String, properties: IndexMap<String, serde_json::Value>) {
        let mut entries = self.entries.write().await;
        entries.insert(dcid, properties);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn private_store_round_trips_entries() {
        let store = InMemoryPrivateStore::new();
        assert_eq!(store.get("dc/1").await.unwrap(), None);

        let mut props = IndexMap::new();
        props.insert("name".to_string(), json!("Test"));
        store.put("dc/1".to_string(), props.clone()).await;

        assert_eq!(store.get("dc/1").await.unwrap(), Some(props));
    }

    #[tokio::test]
    async fn private_store_concurrent_reads_do_not_block_each_other() {
        let store = std::sync::Arc::new(InMemoryPrivateStore::new());
        let mut props = IndexMap::new();
        props.insert("name".to_string(), json!("Test"));
        store.put("dc/1".to_string(), props).await;

        let a = store.clone();
        let b = store.clone();
        let (ra, rb) = tokio::join!(
            async move { a.get("dc/1").await.unwrap() },
            async move { b.get("dc/1").await.unwrap() }
        );
        assert!(ra.is_some());
        assert!(rb.is_some());
    }
}

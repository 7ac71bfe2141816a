//! Key-value persistence for client-side state.
//!
//! The only state the client persists is the current user session. Apps plug
//! in their own store; [`MemoryStore`] is the default.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;

/// Asynchronous string store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_string(&self, key: &str, value: String) -> Result<()>;

    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// In-process store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_string(&self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get_string("k").await.unwrap(), None);

        store.set_string("k", "v".into()).await.unwrap();
        assert_eq!(store.get_string("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.len(), 1);

        store.remove("k").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let store = MemoryStore::new();
        store.set_string("a", "1".into()).await.unwrap();
        store.set_string("b", "2".into()).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.is_empty());
    }
}

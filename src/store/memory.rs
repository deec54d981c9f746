//! In-process store backed by a concurrent map.

use dashmap::DashMap;

use crate::store::{KeyValueStore, StoreResult};

/// Volatile [`KeyValueStore`]. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<(String, Vec<u8>), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all namespaces.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, namespace: &str, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .entries
            .get(&(namespace.to_string(), key.to_vec()))
            .map(|v| v.value().clone()))
    }

    fn set(&self, namespace: &str, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.entries
            .insert((namespace.to_string(), key.to_vec()), value.to_vec());
        Ok(())
    }

    fn remove(&self, namespace: &str, key: &[u8]) -> StoreResult<()> {
        self.entries.remove(&(namespace.to_string(), key.to_vec()));
        Ok(())
    }

    fn keys(&self, namespace: &str) -> StoreResult<Vec<Vec<u8>>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == namespace)
            .map(|entry| entry.key().1.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_are_isolated() {
        let store = MemoryStore::new();
        store.set("a", b"key", b"1").unwrap();
        store.set("b", b"key", b"2").unwrap();

        assert_eq!(store.get("a", b"key").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("b", b"key").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.keys("a").unwrap(), vec![b"key".to_vec()]);
    }

    #[test]
    fn test_remove() {
        let store = MemoryStore::new();
        store.set("a", b"key", b"1").unwrap();
        store.remove("a", b"key").unwrap();
        store.remove("a", b"never").unwrap();
        assert!(store.get("a", b"key").unwrap().is_none());
        assert!(store.is_empty());
    }
}

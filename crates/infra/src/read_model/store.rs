use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use tagstream_events::ProjectionError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("read model store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for ProjectionError {
    fn from(value: StoreError) -> Self {
        ProjectionError::Store(value.to_string())
    }
}

/// Key/value store behind a read model.
///
/// Writes are idempotent upserts and removals, so replaying the same event
/// twice leaves the same content.
pub trait ReadModelStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Result<Option<V>, StoreError>;
    fn upsert(&self, key: K, value: V) -> Result<(), StoreError>;
    fn remove(&self, key: &K) -> Result<(), StoreError>;
    /// All records in key order.
    fn list(&self) -> Result<Vec<V>, StoreError>;
    /// Drop every record (rebuild support).
    fn clear(&self) -> Result<(), StoreError>;
}

impl<K, V, S> ReadModelStore<K, V> for Arc<S>
where
    S: ReadModelStore<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        (**self).get(key)
    }

    fn upsert(&self, key: K, value: V) -> Result<(), StoreError> {
        (**self).upsert(key, value)
    }

    fn remove(&self, key: &K) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn list(&self) -> Result<Vec<V>, StoreError> {
        (**self).list()
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }
}

/// In-memory store for tests/dev.
///
/// `set_available(false)` makes every call fail, which lets tests drive the
/// projection retry path.
#[derive(Debug)]
pub struct InMemoryReadModelStore<K, V> {
    inner: RwLock<BTreeMap<K, V>>,
    available: AtomicBool,
}

impl<K, V> InMemoryReadModelStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store switched off".to_string()))
        }
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("lock poisoned".to_string())
    }
}

impl<K: Clone, V: Clone> InMemoryReadModelStore<K, V> {
    /// Full copy of the content, for comparing views.
    pub fn snapshot(&self) -> Result<BTreeMap<K, V>, StoreError> {
        self.check()?;
        Ok(self.inner.read().map_err(|_| Self::poisoned())?.clone())
    }
}

impl<K, V> Default for InMemoryReadModelStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ReadModelStore<K, V> for InMemoryReadModelStore<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        self.check()?;
        let map = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(map.get(key).cloned())
    }

    fn upsert(&self, key: K, value: V) -> Result<(), StoreError> {
        self.check()?;
        self.inner.write().map_err(|_| Self::poisoned())?.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<(), StoreError> {
        self.check()?;
        self.inner.write().map_err(|_| Self::poisoned())?.remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<V>, StoreError> {
        self.check()?;
        let map = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(map.values().cloned().collect())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.check()?;
        self.inner.write().map_err(|_| Self::poisoned())?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_is_idempotent() {
        let store = InMemoryReadModelStore::new();
        store.upsert("a".to_string(), 1).unwrap();
        store.upsert("a".to_string(), 1).unwrap();
        assert_eq!(store.list().unwrap(), vec![1]);
    }

    #[test]
    fn list_is_key_ordered() {
        let store = InMemoryReadModelStore::new();
        store.upsert(3, "c").unwrap();
        store.upsert(1, "a").unwrap();
        store.upsert(2, "b").unwrap();
        store.remove(&2).unwrap();
        assert_eq!(store.list().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn unavailable_store_fails_writes() {
        let store: InMemoryReadModelStore<u8, u8> = InMemoryReadModelStore::new();
        store.set_available(false);
        assert!(store.upsert(1, 1).is_err());
        store.set_available(true);
        assert_eq!(store.get(&1).unwrap(), None);
    }
}

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use thiserror::Error;

/// Errors produced by backend implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Persistent key-value contract the typed store writes its records into.
pub trait Backend: Send + Sync {
    /// Fetch the text stored under a key, `None` when absent.
    fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Persist text under a key, overwriting any existing entry.
    fn set(&self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Remove a key and its value (idempotent).
    fn remove(&self, key: &str) -> Result<(), BackendError>;

    /// Enumerate every key currently held by the backend.
    fn keys(&self) -> Result<Vec<String>, BackendError>;
}

impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        (**self).keys()
    }
}

/// In-memory backend for tests and ephemeral sessions.
/// Clones share the same map, so several stores can sit on one backend.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_map<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> T,
    ) -> Result<T, BackendError> {
        let mut map = self.inner.lock().map_err(|err| BackendError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(f(&mut map))
    }
}

impl Backend for InMemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        self.with_map(|map| map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.with_map(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.with_map(|map| {
            map.remove(key);
        })
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        self.with_map(|map| map.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_and_overwrite() {
        let backend = InMemoryBackend::new();
        backend.set("a", "1").expect("set should succeed");
        backend.set("a", "2").expect("overwrite should succeed");

        assert_eq!(backend.get("a").expect("get"), Some("2".to_string()));
        assert_eq!(backend.get("b").expect("get"), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let backend = InMemoryBackend::new();
        backend.set("k", "v").expect("set should succeed");
        backend.remove("k").expect("remove should succeed");
        backend
            .remove("k")
            .expect("remove again should still succeed");

        assert_eq!(backend.get("k").expect("get"), None);
        assert!(backend.keys().expect("keys").is_empty());
    }

    #[test]
    fn clones_share_state() {
        let backend = InMemoryBackend::new();
        let shared = Arc::new(backend.clone());
        shared.set("x", "y").expect("set through arc");

        assert_eq!(backend.keys().expect("keys"), vec!["x".to_string()]);
    }
}

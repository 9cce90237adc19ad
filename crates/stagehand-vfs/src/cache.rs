//! Per-file cache of typed views, cleared by the owning handle.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Typed views of one file, owned by that file's handle.
///
/// The owning handle clears the cache itself when it reports an update or a
/// deletion, so a cached value is never observed after its source changed.
#[derive(Default)]
pub struct TypedCache {
    entries: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl TypedCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the cached value of type `T`, if any.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Store a value of type `T`, replacing any previous one.
    pub fn insert<T: Any + Send + Sync>(&self, value: Arc<T>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<T>(), value);
    }

    /// Drop every cached view.
    pub fn invalidate(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of cached views.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for TypedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_entries_are_independent() {
        let cache = TypedCache::new();
        cache.insert(Arc::new(String::from("text")));
        cache.insert(Arc::new(42_u32));

        assert_eq!(cache.get::<String>().as_deref().map(String::as_str), Some("text"));
        assert_eq!(cache.get::<u32>().as_deref(), Some(&42));
        assert!(cache.get::<i64>().is_none());

        cache.invalidate();
        assert!(cache.is_empty());
        assert!(cache.get::<String>().is_none());
    }
}

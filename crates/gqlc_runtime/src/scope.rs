//! Storage scoped to a single top-level execution.
//!
//! Every call to [`Executor::execute`](crate::Executor::execute) and every
//! subscription event gets a fresh [`ExecutionScope`]. Extensions stored in it
//! are keyed by `TypeId` and dropped together with the scope.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity and typed storage of one execution.
pub struct ExecutionScope {
    id: u64,
    extensions: Mutex<FxHashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ExecutionScope {
    /// Creates a scope with a process-unique id.
    pub fn new() -> Self {
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            extensions: Mutex::new(FxHashMap::default()),
        }
    }

    /// Returns the scope id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Gets the extension of type `T`, if one was inserted.
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.extensions
            .lock()
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|ext| ext.downcast::<T>().ok())
    }

    /// Gets the extension of type `T`, inserting `init()` first if absent.
    pub fn extension_or_insert_with<T, F>(&self, init: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut extensions = self.extensions.lock();
        let key = TypeId::of::<T>();
        if let Some(ext) = extensions.get(&key).cloned().and_then(|e| e.downcast::<T>().ok()) {
            return ext;
        }
        let ext = Arc::new(init());
        extensions.insert(key, Arc::clone(&ext) as Arc<dyn Any + Send + Sync>);
        ext
    }
}

impl Default for ExecutionScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionScope")
            .field("id", &self.id)
            .field("extension_count", &self.extensions.lock().len())
            .finish()
    }
}

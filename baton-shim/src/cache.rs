use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

// sweeping below this size is not worth the pass over the map
const MIN_SWEEP: usize = 64;

/// Maps underlying handles, by identity, to their one canonical wrapper.
///
/// The cache holds only weak references: it never keeps a wrapper (or,
/// through it, the wrapped handle) alive on its own, so handle churn in a
/// long-running process cannot grow it without bound. Dead entries are swept
/// under the write lock once the map outgrows an adaptive threshold.
///
/// Lookups take the shared lock; an insert upgrades to the exclusive lock
/// and re-checks, so two flows racing on first access construct exactly one
/// wrapper between them. The `create` closure runs under the exclusive lock
/// and must not call back into the cache.
pub struct ShimCache<W> {
    inner: RwLock<CacheInner<W>>,
}

struct CacheInner<W> {
    entries: HashMap<usize, Weak<W>>,
    sweep_at: usize,
}

impl<W> ShimCache<W> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> ShimCache<W> {
        ShimCache {
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                sweep_at: MIN_SWEEP,
            }),
        }
    }

    /// Returns the live wrapper registered for `key`, or registers and
    /// returns the one produced by `create`.
    pub fn get_or_create<F>(&self, key: usize, create: F) -> Arc<W>
    where
        F: FnOnce() -> Arc<W>,
    {
        if let Some(existing) = self.lookup(key) {
            return existing;
        }

        let mut inner = self.inner.write().unwrap();

        // re-check: another flow may have inserted between the locks
        if let Some(existing) = inner.entries.get(&key).and_then(Weak::upgrade) {
            return existing;
        }

        if inner.entries.len() >= inner.sweep_at {
            inner.entries.retain(|_, wrapper| wrapper.strong_count() > 0);
            inner.sweep_at = (inner.entries.len() * 2).max(MIN_SWEEP);
        }

        let wrapper = create();
        inner.entries.insert(key, Arc::downgrade(&wrapper));
        wrapper
    }

    /// Returns the live wrapper registered for `key`, if any.
    pub fn lookup(&self, key: usize) -> Option<Arc<W>> {
        let inner = self.inner.read().unwrap();
        inner.entries.get(&key).and_then(Weak::upgrade)
    }

    /// Registers an externally constructed wrapper as canonical for `key`,
    /// replacing any prior registration. Last write wins.
    pub fn associate(&self, key: usize, wrapper: &Arc<W>) {
        let mut inner = self.inner.write().unwrap();
        inner.entries.insert(key, Arc::downgrade(wrapper));
    }

    /// The number of wrappers currently alive in the cache.
    pub fn live(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner
            .entries
            .values()
            .filter(|wrapper| wrapper.strong_count() > 0)
            .count()
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }
}

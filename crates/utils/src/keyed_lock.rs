//! Per-key async lock whose entries disappear when the last holder lets go

use std::hash::Hash;
use std::sync::Arc;
use std::sync::Weak;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

/// Guard returned by [`KeyedAsyncLock::try_lock`]
///
/// Dropping it releases the key. If nobody else holds the same key, the entry
/// is removed from the map right away.
pub struct KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    guard: Option<OwnedMutexGuard<()>>,
    arc: Arc<Mutex<()>>,
    key: K,
    locks: Arc<DashMap<K, Weak<Mutex<()>>>>,
}

impl<K> Drop for KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    fn drop(&mut self) {
        drop(self.guard.take());

        // Only `self.arc` left means nobody else references the key.
        if Arc::strong_count(&self.arc) == 1 {
            self.locks.remove(&self.key);
        }
    }
}

/// Serializes work per key while letting different keys proceed in parallel.
///
/// The computation executor keys it by computation id so that one id is never
/// provisioned by two tasks at the same time.
///
/// ```rust,ignore
/// let locks = KeyedAsyncLock::<String>::new();
/// if let Some(guard) = locks.try_lock(&computation_id) {
///     // provision ...
///     drop(guard);
/// }
/// ```
pub struct KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    locks: Arc<DashMap<K, Weak<Mutex<()>>>>,
}

impl<K> KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Takes the key only if nobody holds it right now.
    pub fn try_lock(&self, key: &K) -> Option<KeyedLockGuard<K>> {
        let arc = self.get_or_create_lock(key);
        match Arc::clone(&arc).try_lock_owned() {
            Ok(guard) => Some(self.guard(guard, arc, key)),
            Err(_) => None,
        }
    }

    fn guard(&self, guard: OwnedMutexGuard<()>, arc: Arc<Mutex<()>>, key: &K) -> KeyedLockGuard<K> {
        KeyedLockGuard {
            guard: Some(guard),
            arc,
            key: key.clone(),
            locks: Arc::clone(&self.locks),
        }
    }

    fn get_or_create_lock(&self, key: &K) -> Arc<Mutex<()>> {
        loop {
            match self.locks.entry(key.clone()) {
                Entry::Occupied(occupied) => {
                    if let Some(strong) = occupied.get().upgrade() {
                        return strong;
                    }
                    // stale weak reference, drop it and retry
                    occupied.remove();
                }
                Entry::Vacant(vacant) => {
                    let strong = Arc::new(Mutex::new(()));
                    vacant.insert(Arc::downgrade(&strong));
                    return strong;
                }
            }
        }
    }
}

impl<K> Default for KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

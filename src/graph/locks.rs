//! Keyed async lock table
//!
//! One `tokio::sync::Mutex` per live key. Tasks folding the same edge queue on
//! the same slot; tasks on different edges never touch each other's slot.
//!
//! Each slot counts the tasks registered on it (holding or waiting). The count
//! is taken under the table mutex and released by a drop guard, so a waiter
//! whose `lock()` future is cancelled still deregisters, and a slot leaves the
//! table as soon as its count reaches zero.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    users: usize,
}

pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Slot>>,
}

/// One task's claim on a key's slot, held or pending
struct Registration<'a, K: Eq + Hash> {
    locks: &'a KeyedLocks<K>,
    key: K,
}

/// Exclusive access to one key; released on drop
pub struct KeyGuard<'a, K: Eq + Hash> {
    // Field order matters: the mutex is released before the registration
    _guard: OwnedMutexGuard<()>,
    _registration: Registration<'a, K>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn lock(&self, key: K) -> KeyGuard<'_, K> {
        let (registration, mutex) = self.register(key);
        let guard = mutex.lock_owned().await;

        KeyGuard {
            _guard: guard,
            _registration: registration,
        }
    }

    /// Number of keys currently held or awaited
    pub fn active_keys(&self) -> usize {
        self.slots().len()
    }

    fn register(&self, key: K) -> (Registration<'_, K>, Arc<AsyncMutex<()>>) {
        let mut slots = self.slots();
        let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
            mutex: Arc::new(AsyncMutex::new(())),
            users: 0,
        });
        slot.users += 1;
        let mutex = slot.mutex.clone();

        (Registration { locks: self, key }, mutex)
    }

    // The map is only mutated by insert/remove/counter updates, so a poisoned guard is still consistent
    fn slots(&self) -> MutexGuard<'_, HashMap<K, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash> Drop for Registration<'_, K> {
    fn drop(&mut self) {
        let mut slots = self.locks.slots.lock().unwrap_or_else(PoisonError::into_inner);

        let idle = match slots.get_mut(&self.key) {
            Some(slot) => {
                slot.users = slot.users.saturating_sub(1);
                slot.users == 0
            }
            None => false,
        };

        if idle {
            slots.remove(&self.key);
        }
    }
}

//! A fixed-capacity table of shared, lazily-initialized, reference-counted slots.
//!
//! Grounded in `libsqsh`'s `cextras` reference-counted collection
//! (`subprojects/cextras-*/test/collection/rc_map_test.c`,
//! `subprojects/cextras-*/test/memory/rc.c`): a slot starts `Empty`, moves to
//! `Initializing` while exactly one caller builds its value, then `Ready` once
//! installed. Waiters for a slot that is mid-initialization block on a condvar
//! rather than busy-spinning or taking the whole map's lock.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{CachedError, Error};

#[derive(Clone)]
enum SlotState<V> {
    Empty,
    Initializing,
    Ready(V),
    Failed(CachedError),
}

struct Slot<V> {
    state: Mutex<SlotState<V>>,
    condvar: Condvar,
    refcount: Mutex<u32>,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Empty),
            condvar: Condvar::new(),
            refcount: Mutex::new(0),
        }
    }
}

/// A shared handle to a resolved value held in an [`RcMap`].
///
/// Dropping the handle decrements the slot's refcount; when it reaches zero
/// and the LRU (if any) no longer holds the slot, the value is dropped.
pub struct Handle<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    map: Arc<RcMapInner<K, V>>,
    key: K,
    value: V,
}

impl<K, V> Handle<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K, V> Clone for Handle<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        self.map.retain_raw(&self.key);
        Self {
            map: self.map.clone(),
            key: self.key.clone(),
            value: self.value.clone(),
        }
    }
}

impl<K, V> Drop for Handle<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        self.map.release(&self.key);
    }
}

struct RcMapInner<K, V> {
    slots: Mutex<HashMap<K, Arc<Slot<V>>>>,
}

impl<K, V> RcMapInner<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn slot_for(&self, key: &K) -> Arc<Slot<V>> {
        let mut slots = self.slots.lock();
        slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone()
    }

    fn retain_raw(&self, key: &K) {
        if let Some(slot) = self.slots.lock().get(key) {
            *slot.refcount.lock() += 1;
        }
    }

    /// Decrement the refcount for `key`; if it hits zero, remove the slot so the
    /// next retain starts fresh (cleanup is just dropping `V`).
    fn release(&self, key: &K) {
        let mut slots = self.slots.lock();
        let remove = if let Some(slot) = slots.get(key) {
            let mut rc = slot.refcount.lock();
            debug_assert!(*rc > 0);
            *rc -= 1;
            *rc == 0
        } else {
            false
        };
        if remove {
            slots.remove(key);
        }
    }

    /// Extra, non-owning hold used by the LRU ring: bumps the refcount without
    /// requiring a full `Handle`. Paired with [`RcMapInner::release`].
    fn extra_hold(&self, key: &K) {
        self.retain_raw(key);
    }
}

/// Fixed-capacity-in-spirit (soft-bounded by an external LRU), reference-counted
/// map of lazily-built values of type `V`, keyed by `K`.
pub struct RcMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    inner: Arc<RcMapInner<K, V>>,
}

impl<K, V> Clone for RcMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> RcMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RcMapInner {
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Retain a value for `key`, building it with `build` if absent. Concurrent
    /// callers for the same key that arrive while another is building block on
    /// the slot's condvar and share the single built value (or its error).
    pub fn get_or_build<F>(&self, key: K, build: F) -> Result<Handle<K, V>, Error>
    where
        F: FnOnce() -> Result<V, Error>,
    {
        let slot = self.inner.slot_for(&key);
        let mut state = slot.state.lock();
        loop {
            match &*state {
                SlotState::Ready(v) => {
                    let v = v.clone();
                    *slot.refcount.lock() += 1;
                    return Ok(Handle {
                        map: self.inner.clone(),
                        key,
                        value: v,
                    });
                }
                SlotState::Failed(e) => return Err(e.clone().into()),
                SlotState::Initializing => {
                    slot.condvar.wait(&mut state);
                    continue;
                }
                SlotState::Empty => {
                    *state = SlotState::Initializing;
                    drop(state);
                    let result = build();
                    let mut state = slot.state.lock();
                    match result {
                        Ok(v) => {
                            *state = SlotState::Ready(v.clone());
                            *slot.refcount.lock() += 1;
                            slot.condvar.notify_all();
                            return Ok(Handle {
                                map: self.inner.clone(),
                                key,
                                value: v,
                            });
                        }
                        Err(e) => {
                            let cached = CachedError::new(e);
                            *state = SlotState::Empty;
                            slot.condvar.notify_all();
                            return Err(cached.into());
                        }
                    }
                }
            }
        }
    }

    /// Number of currently tracked (non-empty) slots.
    pub fn len(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Give the LRU ring a way to take and release an extra hold by key, so that
    /// "touching" a key keeps its slot alive without requiring the LRU to hold a
    /// real [`Handle`].
    pub(crate) fn extra_hold(&self, key: &K) {
        self.inner.extra_hold(key);
    }

    pub(crate) fn release_extra_hold(&self, key: &K) {
        self.inner.release(key);
    }
}

impl<K, V> Default for RcMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn builds_once_per_key() {
        let map: RcMap<u32, Arc<[u8]>> = RcMap::new();
        let builds = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let map = map.clone();
                let builds = builds.clone();
                thread::spawn(move || {
                    map.get_or_build(1, || {
                        builds.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(5));
                        Ok(Arc::from(vec![1u8, 2, 3]))
                    })
                    .unwrap()
                })
            })
            .collect();

        for h in handles {
            let handle = h.join().unwrap();
            assert_eq!(&**handle.value(), &[1, 2, 3]);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_build_allows_retry() {
        let map: RcMap<u32, Arc<[u8]>> = RcMap::new();
        let attempt = AtomicUsize::new(0);
        let err = map.get_or_build(7, || {
            attempt.fetch_add(1, Ordering::SeqCst);
            Err(Error::OutOfBounds)
        });
        assert!(err.is_err());

        let ok = map.get_or_build(7, || Ok(Arc::from(vec![9u8])));
        assert!(ok.is_ok());
    }

    #[test]
    fn slot_drops_at_zero_refcount() {
        let map: RcMap<u32, Arc<[u8]>> = RcMap::new();
        {
            let _h = map.get_or_build(1, || Ok(Arc::from(vec![1u8]))).unwrap();
            assert_eq!(map.len(), 1);
        }
        assert_eq!(map.len(), 0);
    }
}

//! A bounded FIFO of extra retain/release holds that keeps recently-used
//! cache slots alive past the point where their last real [`Handle`] drops.
//!
//! Mirrors the "LRU admission ring" in `libsqsh`: it never owns a value by
//! itself, it just extends the lifetime of whichever slots were touched most
//! recently by taking an extra hold on the underlying [`RcMap`] and releasing
//! the oldest hold once the ring is full.

use std::collections::VecDeque;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::rcmap::RcMap;

struct Inner<K> {
    capacity: usize,
    ring: VecDeque<K>,
}

/// Bounded admission ring over keys of an [`RcMap`].
pub struct LruRing<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    map: RcMap<K, V>,
    inner: Mutex<Inner<K>>,
}

impl<K, V> LruRing<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(map: RcMap<K, V>, capacity: usize) -> Self {
        Self {
            map,
            inner: Mutex::new(Inner {
                capacity: capacity.max(1),
                ring: VecDeque::with_capacity(capacity.max(1)),
            }),
        }
    }

    /// Record that `key` was just used. No-op if it is already the
    /// most-recently-touched entry (the common case of repeated sequential
    /// reads within the same block).
    pub fn touch(&self, key: &K) {
        let mut inner = self.inner.lock();
        if inner.ring.back() == Some(key) {
            return;
        }
        self.map.extra_hold(key);
        inner.ring.push_back(key.clone());
        if inner.ring.len() > inner.capacity {
            if let Some(evicted) = inner.ring.pop_front() {
                self.map.release_extra_hold(&evicted);
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn bounds_live_slots_under_churn() {
        let map: RcMap<u32, Arc<[u8]>> = RcMap::new();
        let lru = LruRing::new(map.clone(), 4);

        for i in 0..100u32 {
            let _h = map.get_or_build(i, || Ok(Arc::from(vec![0u8]))).unwrap();
            lru.touch(&i);
        }
        assert!(map.len() <= 4);
    }

    #[test]
    fn repeated_touch_of_same_key_is_noop() {
        let map: RcMap<u32, Arc<[u8]>> = RcMap::new();
        let lru = LruRing::new(map.clone(), 2);
        let _h = map.get_or_build(1, || Ok(Arc::from(vec![0u8]))).unwrap();
        for _ in 0..10 {
            lru.touch(&1);
        }
        assert_eq!(lru.len(), 1);
    }
}

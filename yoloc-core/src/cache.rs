//! Adaptive replacement cache for fetched commit histories.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use crate::domain::Commit;

/// Default number of commit lists kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Bounded cache balancing recency and frequency (ARC).
///
/// `t1` holds entries seen once, `t2` entries seen at least twice. `b1` and
/// `b2` remember keys recently evicted from each, and hits on those ghosts
/// move the target size `p` of `t1`. Front of each list is least recent.
#[derive(Debug)]
pub struct ArcCache<K, V> {
    capacity: usize,
    p: usize,
    t1: VecDeque<K>,
    t2: VecDeque<K>,
    b1: VecDeque<K>,
    b2: VecDeque<K>,
    values: HashMap<K, V>,
}

impl<K, V> ArcCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache holding at most `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            p: 0,
            t1: VecDeque::new(),
            t2: VecDeque::new(),
            b1: VecDeque::new(),
            b2: VecDeque::new(),
            values: HashMap::new(),
        }
    }

    /// Number of resident values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no value is resident.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a value, promoting it to the frequent list on hit.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let value = self.values.get(key)?.clone();
        if take(&mut self.t1, key) || take(&mut self.t2, key) {
            self.t2.push_back(key.clone());
        }
        Some(value)
    }

    /// Insert or refresh a value.
    pub fn add(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }

        if self.values.contains_key(&key) {
            if !take(&mut self.t1, &key) {
                take(&mut self.t2, &key);
            }
            self.t2.push_back(key.clone());
            self.values.insert(key, value);
            return;
        }

        if contains(&self.b1, &key) {
            let delta = (self.b2.len() / self.b1.len()).max(1);
            self.p = (self.p + delta).min(self.capacity);
            self.replace(false);
            take(&mut self.b1, &key);
            self.t2.push_back(key.clone());
            self.values.insert(key, value);
            return;
        }

        if contains(&self.b2, &key) {
            let delta = (self.b1.len() / self.b2.len()).max(1);
            self.p = self.p.saturating_sub(delta);
            self.replace(true);
            take(&mut self.b2, &key);
            self.t2.push_back(key.clone());
            self.values.insert(key, value);
            return;
        }

        let l1 = self.t1.len() + self.b1.len();
        if l1 >= self.capacity {
            if self.t1.len() < self.capacity {
                self.b1.pop_front();
                self.replace(false);
            } else if let Some(victim) = self.t1.pop_front() {
                self.values.remove(&victim);
            }
        } else {
            let total = l1 + self.t2.len() + self.b2.len();
            if total >= self.capacity {
                if total >= 2 * self.capacity {
                    self.b2.pop_front();
                }
                self.replace(false);
            }
        }

        self.t1.push_back(key.clone());
        self.values.insert(key, value);
    }

    fn replace(&mut self, hit_in_b2: bool) {
        if self.values.len() < self.capacity {
            return;
        }
        let t1_len = self.t1.len();
        let from_t1 = t1_len > 0 && (t1_len > self.p || (hit_in_b2 && t1_len == self.p));
        if from_t1 || self.t2.is_empty() {
            if let Some(victim) = self.t1.pop_front() {
                self.values.remove(&victim);
                self.b1.push_back(victim);
            }
        } else if let Some(victim) = self.t2.pop_front() {
            self.values.remove(&victim);
            self.b2.push_back(victim);
        }
    }
}

fn contains<K: Eq>(list: &VecDeque<K>, key: &K) -> bool {
    list.iter().any(|candidate| candidate == key)
}

fn take<K: Eq>(list: &mut VecDeque<K>, key: &K) -> bool {
    match list.iter().position(|candidate| candidate == key) {
        Some(index) => {
            list.remove(index);
            true
        }
        None => false,
    }
}

/// Process-wide cache from history fingerprints to commit lists.
#[derive(Debug)]
pub struct FingerprintCache {
    inner: Mutex<ArcCache<String, Vec<Commit>>>,
}

impl FingerprintCache {
    /// Create a cache holding at most `capacity` commit lists.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(ArcCache::new(capacity)),
        }
    }

    /// Cached commits for a fingerprint.
    pub fn get(&self, fingerprint: &str) -> Option<Vec<Commit>> {
        self.lock().get(&fingerprint.to_string())
    }

    /// Store the commits fetched for a fingerprint.
    pub fn add(&self, fingerprint: impl Into<String>, commits: Vec<Commit>) {
        self.lock().add(fingerprint.into(), commits);
    }

    /// Number of cached commit lists.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the lists half-updated in a
    // way that breaks lookups, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, ArcCache<String, Vec<Commit>>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for FingerprintCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_inserted_values() {
        let mut cache = ArcCache::new(2);
        cache.add("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"missing"), None);
        cache.add("a", 2);
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut cache = ArcCache::new(3);
        for key in 0..50 {
            cache.add(key, key * 10);
            if key % 3 == 0 {
                let _ = cache.get(&key);
            }
            assert!(cache.len() <= 3, "len {} after {key}", cache.len());
        }
    }

    #[test]
    fn frequent_entry_survives_a_scan() {
        let mut cache = ArcCache::new(2);
        cache.add("hot", 0);
        assert_eq!(cache.get(&"hot"), Some(0));
        for key in ["b", "c", "d", "e"] {
            cache.add(key, 1);
        }
        assert_eq!(cache.get(&"hot"), Some(0));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"e"), Some(1));
    }

    #[test]
    fn ghost_hit_readmits_entry() {
        let mut cache = ArcCache::new(2);
        cache.add("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.add("b", 2);
        cache.add("c", 3);
        assert_eq!(cache.get(&"b"), None);

        // "b" is a ghost now; re-adding it lands in the frequent list.
        cache.add("b", 4);
        assert_eq!(cache.get(&"b"), Some(4));
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = FingerprintCache::new(0);
        cache.add("fp", Vec::new());
        assert!(cache.get("fp").is_none());
        assert!(cache.is_empty());
    }
}

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Generic cache with TTL.
///
/// Reads take a shared lock and see only whole records; entries are built by
/// the caller before `insert`, so nothing half-constructed is ever published.
/// Expired entries are treated as absent and overwritten on the next insert.
pub struct Cache<K, V> {
    data: RwLock<HashMap<K, (V, Instant)>>,
    ttl: Duration,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn with_ttl_secs(ttl_seconds: u64) -> Self {
        Self::new(Duration::from_secs(ttl_seconds))
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let data = self.data.read().expect("cache lock poisoned");
        data.get(key).and_then(|(value, inserted)| {
            if inserted.elapsed() < self.ttl {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&self, key: K, value: V) {
        let mut data = self.data.write().expect("cache lock poisoned");
        data.insert(key, (value, Instant::now()));
    }

    pub fn remove(&self, key: &K) {
        let mut data = self.data.write().expect("cache lock poisoned");
        data.remove(key);
    }

    pub fn clear(&self) {
        let mut data = self.data.write().expect("cache lock poisoned");
        data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache: Cache<String, u64> = Cache::with_ttl_secs(30);
        cache.insert("price:SOL".to_string(), 100);
        assert_eq!(cache.get(&"price:SOL".to_string()), Some(100));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let cache: Cache<String, u64> = Cache::new(Duration::from_millis(0));
        cache.insert("price:SOL".to_string(), 100);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"price:SOL".to_string()), None);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache: Cache<String, u64> = Cache::with_ttl_secs(30);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        cache.remove(&"a".to_string());
        assert_eq!(cache.get(&"a".to_string()), None);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_readers_see_whole_records() {
        use std::sync::Arc;

        let cache: Arc<Cache<String, (u64, u64)>> = Arc::new(Cache::with_ttl_secs(30));
        cache.insert("k".to_string(), (1, 1));

        let mut handles = Vec::new();
        for i in 0..4u64 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..500 {
                    cache.insert("k".to_string(), (i, i));
                    if let Some((a, b)) = cache.get(&"k".to_string()) {
                        assert_eq!(a, b);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}

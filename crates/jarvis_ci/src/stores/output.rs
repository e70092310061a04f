//! Bounded, recency-ordered cache of job output

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Accumulated output of recent jobs, keyed by job id.
///
/// Every access, reads included, goes through the one lock: a lookup
/// refreshes the key's recency and so mutates the cache.
pub struct OutputStore {
    cache: Mutex<LruCache<String, String>>,
}

impl OutputStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Append `text` to the output of `job_id`, newline-separated from what
    /// is already there. Creating the (N+1)th key evicts the least recently
    /// used one; appending to an existing key never evicts.
    pub fn add_output(&self, job_id: &str, text: impl AsRef<str>) {
        let text = text.as_ref();
        let mut cache = self.cache.lock();
        match cache.get_mut(job_id) {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(text);
            }
            None => {
                cache.put(job_id.to_string(), text.to_string());
            }
        }
    }

    /// Full output of `job_id`, or `None` if unknown or evicted.
    pub fn get_output(&self, job_id: &str) -> Option<String> {
        self.cache.lock().get(job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache.lock().cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store(capacity: usize) -> OutputStore {
        OutputStore::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn appends_are_newline_joined() {
        let store = store(4);
        store.add_output("abc", "a");
        store.add_output("abc", "b");

        assert_eq!(store.get_output("abc").as_deref(), Some("a\nb"));
        assert_eq!(store.get_output("missing"), None);
    }

    #[test]
    fn inserting_past_capacity_evicts_oldest() {
        let store = store(2);
        store.add_output("x", "1");
        store.add_output("y", "2");
        store.add_output("z", "3");

        assert_eq!(store.get_output("x"), None);
        assert_eq!(store.get_output("y").as_deref(), Some("2"));
        assert_eq!(store.get_output("z").as_deref(), Some("3"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn reading_refreshes_recency() {
        let store = store(2);
        store.add_output("x", "1");
        store.add_output("y", "2");
        assert!(store.get_output("x").is_some());
        store.add_output("z", "3");

        assert_eq!(store.get_output("y"), None);
        assert_eq!(store.get_output("x").as_deref(), Some("1"));
    }

    #[test]
    fn appending_to_existing_key_never_evicts() {
        let store = store(2);
        store.add_output("x", "1");
        store.add_output("y", "2");
        store.add_output("x", "more");
        store.add_output("y", "more");

        assert_eq!(store.len(), 2);
        assert_eq!(store.get_output("x").as_deref(), Some("1\nmore"));
        assert_eq!(store.get_output("y").as_deref(), Some("2\nmore"));
    }

    #[test]
    fn concurrent_writers_keep_per_key_order() {
        let store = Arc::new(store(8));
        let handles: Vec<_> = (0..4)
            .map(|writer| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let key = format!("job-{writer}");
                    for line in 0..100 {
                        store.add_output(&key, line.to_string());
                        let _ = store.get_output(&key);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let expected = (0..100).map(|n| n.to_string()).collect::<Vec<_>>().join("\n");
        for writer in 0..4 {
            assert_eq!(store.get_output(&format!("job-{writer}")), Some(expected.clone()));
        }
    }
}

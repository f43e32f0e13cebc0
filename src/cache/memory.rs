//! In-process LRU cache bounded by total size.

use super::Cache;
use crate::error::{CacheMiss, Result};
use crate::image::Image;
use crate::params::Params;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

#[derive(Default)]
struct Lru {
    entries: HashMap<String, (Image, u64)>,
    /// Recency stamp to key; the smallest stamp is the next eviction.
    order: BTreeMap<u64, String>,
    clock: u64,
    bytes: usize,
}

impl Lru {
    fn touch(&mut self, key: &str) -> Option<Image> {
        self.clock += 1;
        let clock = self.clock;
        let (image, stamp) = self.entries.get_mut(key)?;
        let old = std::mem::replace(stamp, clock);
        let image = image.clone();
        if let Some(k) = self.order.remove(&old) {
            self.order.insert(clock, k);
        }
        Some(image)
    }

    fn remove(&mut self, key: &str) {
        if let Some((image, stamp)) = self.entries.remove(key) {
            self.order.remove(&stamp);
            self.bytes -= entry_size(key, &image);
        }
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_first() {
            Some((_, key)) => {
                if let Some((image, _)) = self.entries.remove(&key) {
                    self.bytes -= entry_size(&key, &image);
                }
                trace!(%key, "evicted");
                true
            }
            None => false,
        }
    }
}

fn entry_size(key: &str, image: &Image) -> usize {
    key.len() + image.format().len() + image.len()
}

/// Least-recently-used cache holding at most `max_bytes` of keys and images.
///
/// An image bigger than the whole budget is never stored.
pub struct MemoryCache {
    max_bytes: usize,
    lru: Mutex<Lru>,
}

impl MemoryCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            lru: Mutex::new(Lru::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lru> {
        self.lru.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently accounted to entries.
    pub fn size(&self) -> usize {
        self.lock().bytes
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str, _params: &Params) -> Result<Image> {
        self.lock()
            .touch(key)
            .ok_or_else(|| CacheMiss::new(key, "memory").into())
    }

    fn set(&self, key: &str, image: &Image, _params: &Params) -> Result<()> {
        let size = entry_size(key, image);
        let mut lru = self.lock();
        lru.remove(key);
        if size > self.max_bytes {
            return Ok(());
        }
        while lru.bytes + size > self.max_bytes && lru.evict_oldest() {}
        lru.clock += 1;
        let clock = lru.clock;
        lru.entries.insert(key.to_string(), (image.clone(), clock));
        lru.order.insert(clock, key.to_string());
        lru.bytes += size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(n: usize) -> Image {
        Image::new("raw", vec![0u8; n])
    }

    fn p() -> Params {
        Params::new()
    }

    #[test]
    fn get_after_set() {
        let cache = MemoryCache::new(1024);
        cache.set("a", &image(10), &p()).unwrap();
        assert_eq!(cache.get("a", &p()).unwrap(), image(10));
        assert_eq!(cache.size(), 1 + 3 + 10);
    }

    #[test]
    fn missing_key_is_a_miss() {
        let cache = MemoryCache::new(1024);
        let err = cache.get("nope", &p()).unwrap_err();
        assert!(err.is_miss());
        assert!(err.to_string().contains("memory"));
    }

    #[test]
    fn evicts_least_recently_used() {
        // Each entry is 1 + 3 + 10 = 14 bytes.
        let cache = MemoryCache::new(42);
        cache.set("a", &image(10), &p()).unwrap();
        cache.set("b", &image(10), &p()).unwrap();
        cache.set("c", &image(10), &p()).unwrap();
        cache.get("a", &p()).unwrap();
        cache.set("d", &image(10), &p()).unwrap();

        assert!(cache.get("b", &p()).unwrap_err().is_miss());
        for key in ["a", "c", "d"] {
            assert!(cache.get(key, &p()).is_ok(), "{key}");
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn oversized_entry_is_not_stored() {
        let cache = MemoryCache::new(20);
        cache.set("a", &image(5), &p()).unwrap();
        cache.set("big", &image(100), &p()).unwrap();
        assert!(cache.get("big", &p()).unwrap_err().is_miss());
        assert!(cache.get("a", &p()).is_ok());
    }

    #[test]
    fn overwrite_replaces_accounting() {
        let cache = MemoryCache::new(1024);
        cache.set("a", &image(10), &p()).unwrap();
        cache.set("a", &image(2), &p()).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size(), 1 + 3 + 2);
    }

    #[test]
    fn zero_budget_stores_nothing() {
        let cache = MemoryCache::new(0);
        cache.set("a", &image(1), &p()).unwrap();
        assert!(cache.is_empty());
    }
}

//! Key namespacing over a shared cache.

use super::Cache;
use crate::error::Result;
use crate::image::Image;
use crate::params::Params;
use std::sync::Arc;

/// Stores every entry of `inner` under `prefix + key`, so several logical
/// regions (source images, results) can share one backend.
pub struct PrefixCache {
    prefix: String,
    inner: Arc<dyn Cache>,
}

impl PrefixCache {
    pub fn new(prefix: impl Into<String>, inner: Arc<dyn Cache>) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl Cache for PrefixCache {
    fn get(&self, key: &str, params: &Params) -> Result<Image> {
        self.inner.get(&self.key(key), params)
    }

    fn set(&self, key: &str, image: &Image, params: &Params) -> Result<()> {
        self.inner.set(&self.key(key), image, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::{MockCache, RecordedOp};

    #[test]
    fn regions_do_not_collide() {
        let shared = Arc::new(MockCache::named("shared"));
        let sources = PrefixCache::new("source:", shared.clone());
        let results = PrefixCache::new("result:", shared.clone());
        let p = Params::new();

        sources.set("k", &Image::new("jpeg", b"src".to_vec()), &p).unwrap();
        results.set("k", &Image::new("png", b"out".to_vec()), &p).unwrap();

        assert_eq!(sources.get("k", &p).unwrap().data(), b"src");
        assert_eq!(results.get("k", &p).unwrap().data(), b"out");
        assert_eq!(shared.stored("source:k").map(|i| i.format().to_string()), Some("jpeg".into()));
        assert_eq!(
            shared.get_operations()[..2],
            [RecordedOp::Set("source:k".into()), RecordedOp::Set("result:k".into())]
        );
    }

    #[test]
    fn miss_reports_prefixed_key() {
        let cache = PrefixCache::new("p/", Arc::new(MockCache::named("inner")));
        let err = cache.get("k", &Params::new()).unwrap_err();
        assert!(err.is_miss());
        assert!(err.to_string().contains("\"p/k\""));
    }
}

//! Caches and cache composition.
//!
//! A [`Cache`] stores [`Image`]s under derived keys. The contract is minimal:
//! `get` returns the image or the distinguished miss
//! ([`Error::Miss`](crate::error::Error::Miss)), `set` stores. Everything else
//! is composition:
//!
//! | Type | Role |
//! |------|------|
//! | [`CacheServer`] | cache-aside around any [`Server`] |
//! | [`ListCache`](list::ListCache) | ordered tiers, first hit wins, backfill upward |
//! | [`PrefixCache`](prefix::PrefixCache) | key namespacing over a shared backend |
//! | [`AsyncCache`](background::AsyncCache) | `set` returns at once, writes in the background |
//! | [`MemoryCache`](memory::MemoryCache) | in-process LRU bounded by bytes |
//! | [`FileCache`](file::FileCache) | one file per key |
//!
//! A typical result chain is
//! `CacheServer(ListCache[memory, Prefix("result:", file)]) → HandlerServer → provider`.

pub mod background;
pub mod file;
pub mod key;
pub mod list;
pub mod memory;
pub mod prefix;

pub use background::AsyncCache;
pub use file::FileCache;
pub use key::{KeyGenerator, KeyGeneratorFunc, ParamsHashKeyGenerator, SourceHashKeyGenerator};
pub use list::ListCache;
pub use memory::MemoryCache;
pub use prefix::PrefixCache;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::params::Params;
use crate::server::Server;
use std::sync::Arc;
use tracing::{debug, warn};

pub trait Cache: Send + Sync {
    fn get(&self, key: &str, params: &Params) -> Result<Image>;
    fn set(&self, key: &str, image: &Image, params: &Params) -> Result<()>;
}

impl<T: Cache + ?Sized> Cache for Arc<T> {
    fn get(&self, key: &str, params: &Params) -> Result<Image> {
        (**self).get(key, params)
    }

    fn set(&self, key: &str, image: &Image, params: &Params) -> Result<()> {
        (**self).set(key, image, params)
    }
}

/// A [`Cache`] backed by a pair of closures.
pub struct CacheFunc<G, S> {
    get: G,
    set: S,
}

impl<G, S> CacheFunc<G, S>
where
    G: Fn(&str, &Params) -> Result<Image> + Send + Sync,
    S: Fn(&str, &Image, &Params) -> Result<()> + Send + Sync,
{
    pub fn new(get: G, set: S) -> Self {
        Self { get, set }
    }
}

impl<G, S> Cache for CacheFunc<G, S>
where
    G: Fn(&str, &Params) -> Result<Image> + Send + Sync,
    S: Fn(&str, &Image, &Params) -> Result<()> + Send + Sync,
{
    fn get(&self, key: &str, params: &Params) -> Result<Image> {
        (self.get)(key, params)
    }

    fn set(&self, key: &str, image: &Image, params: &Params) -> Result<()> {
        (self.set)(key, image, params)
    }
}

/// Receives failures of best-effort work that has no caller to return to.
pub type ErrorFunc = Arc<dyn Fn(&Error) + Send + Sync>;

/// The default [`ErrorFunc`]: log and move on.
pub fn log_errors() -> ErrorFunc {
    Arc::new(|e: &Error| warn!(error = %e, "cache write failed"))
}

/// Cache-aside in front of an upstream server.
///
/// A hit answers immediately. A miss asks `upstream` and stores its answer;
/// a failing store is reported to the error callback and the fetched image is
/// returned regardless. Cache errors other than a miss fail the request.
pub struct CacheServer {
    upstream: Arc<dyn Server>,
    cache: Arc<dyn Cache>,
    keys: Arc<dyn KeyGenerator>,
    on_error: ErrorFunc,
}

impl CacheServer {
    pub fn new(
        upstream: Arc<dyn Server>,
        cache: Arc<dyn Cache>,
        keys: Arc<dyn KeyGenerator>,
    ) -> Self {
        Self {
            upstream,
            cache,
            keys,
            on_error: log_errors(),
        }
    }

    pub fn with_error_func(mut self, on_error: ErrorFunc) -> Self {
        self.on_error = on_error;
        self
    }
}

impl Server for CacheServer {
    fn get(&self, params: &Params, cancel: &CancelToken) -> Result<Image> {
        let key = self.keys.key(params);
        match self.cache.get(&key, params) {
            Ok(image) => {
                debug!(%key, "cache hit");
                return Ok(image);
            }
            Err(e) if e.is_miss() => debug!(%key, "cache miss"),
            Err(e) => return Err(e),
        }
        let image = self.upstream.get(params, cancel)?;
        if let Err(e) = self.cache.set(&key, &image, params) {
            (self.on_error)(&e);
        }
        Ok(image)
    }
}

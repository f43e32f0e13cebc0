//! Ordered multi-tier cache.
//!
//! Tiers are probed in order and the first hit wins; tier order is the only
//! priority signal. A hit at tier `i > 0` is copied into tiers `0..i` in the
//! background so the next lookup stops earlier. `set` writes every tier in the
//! background and returns at once.
//!
//! Any tier error other than a miss ends the lookup with that error, so an
//! unavailable backend is visible to the caller instead of being read as
//! "not cached".

use super::{Cache, ErrorFunc, log_errors};
use crate::error::{CacheMiss, Error, Result};
use crate::image::Image;
use crate::params::Params;
use crate::tasks::TaskPool;
use std::sync::Arc;
use tracing::debug;

pub struct ListCache {
    tiers: Vec<Arc<dyn Cache>>,
    pool: Arc<TaskPool>,
    on_error: ErrorFunc,
}

impl ListCache {
    pub fn new(tiers: Vec<Arc<dyn Cache>>, pool: Arc<TaskPool>) -> Self {
        Self {
            tiers,
            pool,
            on_error: log_errors(),
        }
    }

    pub fn with_error_func(mut self, on_error: ErrorFunc) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn tiers(&self) -> &[Arc<dyn Cache>] {
        &self.tiers
    }

    fn write_behind(&self, tiers: &[Arc<dyn Cache>], key: &str, image: &Image, params: &Params) {
        for tier in tiers {
            let tier = tier.clone();
            let key = key.to_string();
            let image = image.clone();
            let params = params.clone();
            let on_error = self.on_error.clone();
            let submitted = self.pool.submit(move || {
                if let Err(e) = tier.set(&key, &image, &params) {
                    on_error(&e);
                }
            });
            if let Err(e) = submitted {
                (self.on_error)(&e);
            }
        }
    }
}

impl Cache for ListCache {
    fn get(&self, key: &str, params: &Params) -> Result<Image> {
        let mut missed = Vec::with_capacity(self.tiers.len());
        for (i, tier) in self.tiers.iter().enumerate() {
            match tier.get(key, params) {
                Ok(image) => {
                    if i > 0 {
                        debug!(%key, tier = i, "backfilling {} tier(s)", i);
                        self.write_behind(&self.tiers[..i], key, &image, params);
                    }
                    return Ok(image);
                }
                Err(Error::Miss(miss)) => missed.push(miss.cache),
                Err(e) => return Err(e),
            }
        }
        Err(CacheMiss::new(key, format!("list[{}]", missed.join(", "))).into())
    }

    fn set(&self, key: &str, image: &Image, params: &Params) -> Result<()> {
        self.write_behind(&self.tiers, key, image, params);
        Ok(())
    }
}

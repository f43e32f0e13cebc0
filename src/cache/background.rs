//! Fire-and-forget writes.

use super::{Cache, ErrorFunc, log_errors};
use crate::error::Result;
use crate::image::Image;
use crate::params::Params;
use crate::tasks::TaskPool;
use std::sync::Arc;

/// Wraps a cache so that `set` returns immediately and the write runs on the
/// task pool. Write failures, and writes the pool refuses, go to the error
/// callback only. `get` is passed through unchanged.
pub struct AsyncCache {
    inner: Arc<dyn Cache>,
    pool: Arc<TaskPool>,
    on_error: ErrorFunc,
}

impl AsyncCache {
    pub fn new(inner: Arc<dyn Cache>, pool: Arc<TaskPool>) -> Self {
        Self {
            inner,
            pool,
            on_error: log_errors(),
        }
    }

    pub fn with_error_func(mut self, on_error: ErrorFunc) -> Self {
        self.on_error = on_error;
        self
    }
}

impl Cache for AsyncCache {
    fn get(&self, key: &str, params: &Params) -> Result<Image> {
        self.inner.get(key, params)
    }

    fn set(&self, key: &str, image: &Image, params: &Params) -> Result<()> {
        let inner = self.inner.clone();
        let on_error = self.on_error.clone();
        let key = key.to_string();
        let image = image.clone();
        let params = params.clone();
        let submitted = self.pool.submit(move || {
            if let Err(e) = inner.set(&key, &image, &params) {
                on_error(&e);
            }
        });
        if let Err(e) = submitted {
            (self.on_error)(&e);
        }
        Ok(())
    }
}

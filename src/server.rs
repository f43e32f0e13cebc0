//! The server chain.
//!
//! A [`Server`] answers a request descriptor with an [`Image`]. Servers wrap
//! each other: a provider at the bottom fetches source bytes, a
//! [`HandlerServer`] transforms what its upstream returns, and cache-aside
//! servers ([`CacheServer`](crate::cache::CacheServer)) sit in between. The
//! chain is assembled once at startup and never changes afterwards.

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::image::Image;
use crate::params::Params;
use std::sync::Arc;

/// Answers a request descriptor with an image.
pub trait Server: Send + Sync {
    fn get(&self, params: &Params, cancel: &CancelToken) -> Result<Image>;
}

impl<T: Server + ?Sized> Server for Arc<T> {
    fn get(&self, params: &Params, cancel: &CancelToken) -> Result<Image> {
        (**self).get(params, cancel)
    }
}

/// A [`Server`] backed by a closure.
pub struct ServerFunc<F>(pub F);

impl<F> Server for ServerFunc<F>
where
    F: Fn(&Params, &CancelToken) -> Result<Image> + Send + Sync,
{
    fn get(&self, params: &Params, cancel: &CancelToken) -> Result<Image> {
        (self.0)(params, cancel)
    }
}

/// Transforms an image according to a request descriptor.
pub trait Handler: Send + Sync {
    fn handle(&self, image: Image, params: &Params, cancel: &CancelToken) -> Result<Image>;
}

impl<T: Handler + ?Sized> Handler for Arc<T> {
    fn handle(&self, image: Image, params: &Params, cancel: &CancelToken) -> Result<Image> {
        (**self).handle(image, params, cancel)
    }
}

/// A [`Handler`] backed by a closure.
pub struct HandlerFunc<F>(pub F);

impl<F> Handler for HandlerFunc<F>
where
    F: Fn(Image, &Params, &CancelToken) -> Result<Image> + Send + Sync,
{
    fn handle(&self, image: Image, params: &Params, cancel: &CancelToken) -> Result<Image> {
        (self.0)(image, params, cancel)
    }
}

/// Fetches from `upstream`, then runs `handler` on the result.
pub struct HandlerServer {
    upstream: Arc<dyn Server>,
    handler: Arc<dyn Handler>,
}

impl HandlerServer {
    pub fn new(upstream: Arc<dyn Server>, handler: Arc<dyn Handler>) -> Self {
        Self { upstream, handler }
    }
}

impl Server for HandlerServer {
    fn get(&self, params: &Params, cancel: &CancelToken) -> Result<Image> {
        let image = self.upstream.get(params, cancel)?;
        cancel.check()?;
        self.handler.handle(image, params, cancel)
    }
}

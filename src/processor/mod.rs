//! Pixel transforms.
//!
//! A [`Processor`] turns one [`PixelBuffer`] into another. Besides doing the
//! work it answers [`Processor::change`]: would processing with these
//! parameters alter the image at all? The orchestrator asks every processor
//! (and the encoder) before decoding anything, and skips the whole
//! decode/process/encode round trip when nobody would change a pixel.
//! `change` must therefore be cheap and must not touch pixels.
//!
//! | Type | Role |
//! |------|------|
//! | [`ListProcessor`] | runs processors in order |
//! | [`ScopedProcessor`] | feeds a nested descriptor to an inner processor |
//! | [`LimitProcessor`](limit::LimitProcessor) | caps concurrent executions |
//! | [`GammaProcessor`](gamma::GammaProcessor) | runs the inner processor in linear light |
//! | [`ResizeProcessor`](resize::ResizeProcessor) | `width` / `height` / `filter` |
//! | [`GrayscaleProcessor`](grayscale::GrayscaleProcessor) | `grayscale` |

pub mod gamma;
pub mod grayscale;
pub mod limit;
pub mod resize;

pub use gamma::GammaProcessor;
pub use grayscale::GrayscaleProcessor;
pub use limit::LimitProcessor;
pub use resize::ResizeProcessor;

use crate::cancel::CancelToken;
use crate::error::{ParamError, Result};
use crate::params::{Params, Value};
use crate::pixel::PixelBuffer;
use std::sync::Arc;

pub trait Processor: Send + Sync {
    fn process(
        &self,
        buf: PixelBuffer,
        params: &Params,
        cancel: &CancelToken,
    ) -> Result<PixelBuffer>;

    /// Whether [`process`](Processor::process) would alter the image.
    fn change(&self, params: &Params) -> bool;
}

impl<T: Processor + ?Sized> Processor for Arc<T> {
    fn process(
        &self,
        buf: PixelBuffer,
        params: &Params,
        cancel: &CancelToken,
    ) -> Result<PixelBuffer> {
        (**self).process(buf, params, cancel)
    }

    fn change(&self, params: &Params) -> bool {
        (**self).change(params)
    }
}

type ChangeFn = fn(&Params) -> bool;

fn always(_: &Params) -> bool {
    true
}

/// A [`Processor`] backed by closures. Without
/// [`with_change`](ProcessorFunc::with_change) it claims to change every
/// image.
pub struct ProcessorFunc<P, C = ChangeFn> {
    process: P,
    change: C,
}

impl<P> ProcessorFunc<P>
where
    P: Fn(PixelBuffer, &Params, &CancelToken) -> Result<PixelBuffer> + Send + Sync,
{
    pub fn new(process: P) -> Self {
        Self {
            process,
            change: always,
        }
    }
}

impl<P, C> ProcessorFunc<P, C> {
    pub fn with_change<C2>(self, change: C2) -> ProcessorFunc<P, C2>
    where
        C2: Fn(&Params) -> bool + Send + Sync,
    {
        ProcessorFunc {
            process: self.process,
            change,
        }
    }
}

impl<P, C> Processor for ProcessorFunc<P, C>
where
    P: Fn(PixelBuffer, &Params, &CancelToken) -> Result<PixelBuffer> + Send + Sync,
    C: Fn(&Params) -> bool + Send + Sync,
{
    fn process(
        &self,
        buf: PixelBuffer,
        params: &Params,
        cancel: &CancelToken,
    ) -> Result<PixelBuffer> {
        (self.process)(buf, params, cancel)
    }

    fn change(&self, params: &Params) -> bool {
        (self.change)(params)
    }
}

/// Runs processors in order, each on the previous one's output.
pub struct ListProcessor {
    processors: Vec<Arc<dyn Processor>>,
}

impl ListProcessor {
    pub fn new(processors: Vec<Arc<dyn Processor>>) -> Self {
        Self { processors }
    }
}

impl Processor for ListProcessor {
    fn process(
        &self,
        mut buf: PixelBuffer,
        params: &Params,
        cancel: &CancelToken,
    ) -> Result<PixelBuffer> {
        for processor in &self.processors {
            cancel.check()?;
            buf = processor.process(buf, params, cancel)?;
        }
        Ok(buf)
    }

    fn change(&self, params: &Params) -> bool {
        self.processors.iter().any(|p| p.change(params))
    }
}

/// Hands `params[scope]` to the inner processor.
///
/// With no such key the image passes through untouched. Parameter errors
/// raised inside are reported under the scope (`"resize.width"`).
pub struct ScopedProcessor {
    scope: String,
    inner: Arc<dyn Processor>,
}

impl ScopedProcessor {
    pub fn new(scope: impl Into<String>, inner: Arc<dyn Processor>) -> Self {
        Self {
            scope: scope.into(),
            inner,
        }
    }

    fn scoped<'a>(&self, params: &'a Params) -> Result<Option<&'a Params>> {
        match params.get(&self.scope) {
            Err(_) => Ok(None),
            Ok(Value::Params(p)) => Ok(Some(p)),
            Ok(other) => Err(ParamError::wrong_type(
                self.scope.as_str(),
                other.type_name(),
                "params",
            )
            .into()),
        }
    }
}

impl Processor for ScopedProcessor {
    fn process(
        &self,
        buf: PixelBuffer,
        params: &Params,
        cancel: &CancelToken,
    ) -> Result<PixelBuffer> {
        match self.scoped(params)? {
            Some(sub) => self
                .inner
                .process(buf, sub, cancel)
                .map_err(|e| e.with_param_prefix(&self.scope)),
            None => Ok(buf),
        }
    }

    fn change(&self, params: &Params) -> bool {
        // A malformed scope must reach process() to be reported.
        match self.scoped(params) {
            Ok(Some(sub)) => self.inner.change(sub),
            Ok(None) => false,
            Err(_) => true,
        }
    }
}

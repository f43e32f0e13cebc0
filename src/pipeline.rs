//! Decode, process, encode, or skip all three.
//!
//! [`ImageHandler`] is where change detection pays off. Before touching a
//! pixel it resolves the target format and asks the processor and the
//! target encoder whether they would alter anything. If the format is
//! unchanged and neither would, the source image is returned as is: no
//! decode, no encode, and the payload is the very same allocation.
//!
//! Target format: the `format` parameter if present, else the source
//! format. A format without a registered encoder is a parameter error on
//! `"format"`.

use crate::cancel::CancelToken;
use crate::codec::{CodecRegistry, Encoder};
use crate::error::{ImageError, ParamError, Result};
use crate::image::Image;
use crate::params::Params;
use crate::processor::Processor;
use crate::server::Handler;
use std::sync::Arc;
use tracing::debug;

pub struct ImageHandler {
    codecs: Arc<CodecRegistry>,
    processor: Option<Arc<dyn Processor>>,
}

impl ImageHandler {
    pub fn new(codecs: Arc<CodecRegistry>) -> Self {
        Self {
            codecs,
            processor: None,
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// The requested output format and its encoder.
    fn target<'a>(
        &'a self,
        source: &'a str,
        params: &'a Params,
    ) -> Result<(&'a str, &'a Arc<dyn Encoder>)> {
        let format = if params.has("format") {
            params.get_string("format")?
        } else {
            source
        };
        let encoder = self.codecs.encoder(format).ok_or_else(|| {
            ParamError::invalid("format", format!("unknown format \"{format}\""))
        })?;
        Ok((format, encoder))
    }

    /// Whether handling `source` with `params` has to decode at all.
    pub fn needs_processing(&self, source: &str, params: &Params) -> Result<bool> {
        let (format, encoder) = self.target(source, params)?;
        Ok(format != source
            || self.processor.as_ref().is_some_and(|p| p.change(params))
            || encoder.change(params))
    }
}

impl Handler for ImageHandler {
    fn handle(&self, image: Image, params: &Params, cancel: &CancelToken) -> Result<Image> {
        if !self.needs_processing(image.format(), params)? {
            debug!(format = image.format(), "nothing to change, returning source");
            return Ok(image);
        }
        let (format, encoder) = self.target(image.format(), params)?;
        let decoder = self
            .codecs
            .decoder(image.format())
            .ok_or_else(|| ImageError::UnknownFormat(image.format().to_string()))?;

        cancel.check()?;
        let mut buf = decoder.decode(&image)?;
        if let Some(processor) = &self.processor {
            cancel.check()?;
            buf = processor.process(buf, params, cancel)?;
        }
        cancel.check()?;
        let out = encoder.encode(&buf, params)?;
        debug!(from = image.format(), to = format, bytes = out.len(), "re-encoded");
        Ok(out)
    }
}

//! Luma-only conversion, driven by the `grayscale` bool parameter.

use super::Processor;
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::params::Params;
use crate::pixel::{Color, PixelBuffer, color::luma16, map_pixels};

#[derive(Debug, Default)]
pub struct GrayscaleProcessor;

impl GrayscaleProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Processor for GrayscaleProcessor {
    fn process(
        &self,
        mut buf: PixelBuffer,
        params: &Params,
        cancel: &CancelToken,
    ) -> Result<PixelBuffer> {
        if !params.has("grayscale") || !params.get_bool("grayscale")? {
            return Ok(buf);
        }
        // Alpha is kept as is.
        map_pixels(&mut buf, cancel, |c| {
            let y = luma16(c);
            Color::new(y, y, y, c.a)
        })?;
        Ok(buf)
    }

    fn change(&self, params: &Params) -> bool {
        // Malformed values report from process().
        params.has("grayscale") && params.get_bool("grayscale").unwrap_or(true)
    }
}

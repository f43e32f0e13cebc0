//! Still-image codecs on top of the `image` crate.
//!
//! | Format | Encode parameters |
//! |---|---|
//! | `jpeg` | `quality` (1-100, default 85) |
//! | `png` | none, keeps 16-bit depth |
//! | `gif` | none, first frame only on decode |
//! | `bmp` | none |
//! | `tiff` | none, keeps 16-bit depth |

use super::{Decoder, Encoder};
use crate::error::{ImageError, ParamError, Result};
use crate::image::Image;
use crate::params::Params;
use crate::pixel::PixelBuffer;
use crate::pixel::convert::{from_dynamic, to_dynamic};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy)]
pub struct RasterCodec {
    name: &'static str,
    format: ImageFormat,
}

impl RasterCodec {
    pub fn jpeg() -> Self {
        Self { name: "jpeg", format: ImageFormat::Jpeg }
    }

    pub fn png() -> Self {
        Self { name: "png", format: ImageFormat::Png }
    }

    pub fn gif() -> Self {
        Self { name: "gif", format: ImageFormat::Gif }
    }

    pub fn bmp() -> Self {
        Self { name: "bmp", format: ImageFormat::Bmp }
    }

    pub fn tiff() -> Self {
        Self { name: "tiff", format: ImageFormat::Tiff }
    }

    pub fn all() -> [Self; 5] {
        [Self::jpeg(), Self::png(), Self::gif(), Self::bmp(), Self::tiff()]
    }

    /// The format tag carried by images this codec produces.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn encode_error(&self, e: impl std::fmt::Display) -> ImageError {
        ImageError::Encode {
            format: self.name.to_string(),
            message: e.to_string(),
        }
    }
}

fn jpeg_quality(params: &Params) -> Result<u8> {
    if !params.has("quality") {
        return Ok(DEFAULT_JPEG_QUALITY);
    }
    let q = params.get_int("quality")?;
    if !(1..=100).contains(&q) {
        return Err(ParamError::invalid("quality", format!("{q} is outside 1..=100")).into());
    }
    Ok(q as u8)
}

impl Decoder for RasterCodec {
    fn decode(&self, image: &Image) -> Result<PixelBuffer> {
        let img = image::load_from_memory_with_format(image.data(), self.format).map_err(|e| {
            ImageError::Decode {
                format: image.format().to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(from_dynamic(img))
    }
}

impl Encoder for RasterCodec {
    fn encode(&self, buf: &PixelBuffer, params: &Params) -> Result<Image> {
        let img = to_dynamic(buf)?;
        let mut out = Vec::new();
        match self.format {
            ImageFormat::Jpeg => {
                let quality = jpeg_quality(params)?;
                JpegEncoder::new_with_quality(&mut out, quality)
                    .encode_image(&img.to_rgb8())
                    .map_err(|e| self.encode_error(e))?;
            }
            ImageFormat::Png => img
                .write_to(&mut Cursor::new(&mut out), self.format)
                .map_err(|e| self.encode_error(e))?,
            ImageFormat::Tiff => DynamicImage::ImageRgba16(img.to_rgba16())
                .write_to(&mut Cursor::new(&mut out), self.format)
                .map_err(|e| self.encode_error(e))?,
            _ => DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut Cursor::new(&mut out), self.format)
                .map_err(|e| self.encode_error(e))?,
        }
        Ok(Image::new(self.name, out))
    }

    fn change(&self, params: &Params) -> bool {
        self.format == ImageFormat::Jpeg && params.has("quality")
    }
}

//! Bridges between `image::DynamicImage` and [`PixelBuffer`].
//!
//! Decoders hand the engine whatever the codec produced; the mapping keeps
//! the codec's native depth so nothing is lost before a processor runs:
//!
//! | `DynamicImage` | `PixelBuffer` |
//! |---|---|
//! | `ImageLuma8` | `Gray` |
//! | `ImageLuma16` | `Gray16` |
//! | `ImageRgb8` | `Rgba` (opaque) |
//! | `ImageRgba8` | `Nrgba` |
//! | `ImageRgb16` | `Rgba64` (opaque) |
//! | `ImageRgba16` | `Nrgba64` |
//! | anything else | `Nrgba64` via `to_rgba16` |

use super::access::new_at_func;
use super::buffer::{Interleaved, Layout, PixelBuffer, Rect};
use crate::error::ImageError;
use image::{DynamicImage, ImageBuffer, Rgba};

pub fn from_dynamic(img: DynamicImage) -> PixelBuffer {
    let rect = Rect::from_size(img.width(), img.height());
    match img {
        DynamicImage::ImageLuma8(b) => PixelBuffer::Gray(rows(Layout::Gray, rect, b.into_raw())),
        DynamicImage::ImageLuma16(b) => {
            PixelBuffer::Gray16(rows(Layout::Gray16, rect, be_bytes(b.as_raw())))
        }
        DynamicImage::ImageRgb8(b) => {
            let pix = b
                .as_raw()
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 0xff])
                .collect();
            PixelBuffer::Rgba(rows(Layout::Rgba, rect, pix))
        }
        DynamicImage::ImageRgba8(b) => PixelBuffer::Nrgba(rows(Layout::Nrgba, rect, b.into_raw())),
        DynamicImage::ImageRgb16(b) => {
            let pix = b
                .as_raw()
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 0xffff])
                .flat_map(u16::to_be_bytes)
                .collect();
            PixelBuffer::Rgba64(rows(Layout::Rgba64, rect, pix))
        }
        DynamicImage::ImageRgba16(b) => {
            PixelBuffer::Nrgba64(rows(Layout::Nrgba64, rect, be_bytes(b.as_raw())))
        }
        other => {
            let b = other.to_rgba16();
            PixelBuffer::Nrgba64(rows(Layout::Nrgba64, rect, be_bytes(b.as_raw())))
        }
    }
}

/// Convert to a straight-alpha `DynamicImage` whose origin is the buffer's
/// top-left corner.
pub fn to_dynamic(buf: &PixelBuffer) -> Result<DynamicImage, ImageError> {
    if matches!(buf, PixelBuffer::Uniform(_)) {
        return Err(ImageError::Process(
            "uniform buffer has no finite bounds".into(),
        ));
    }
    let rect = buf.bounds();
    let (w, h) = (rect.width(), rect.height());
    let fast = match buf {
        PixelBuffer::Gray(p) => {
            ImageBuffer::from_raw(w, h, tight(p, 1)).map(DynamicImage::ImageLuma8)
        }
        PixelBuffer::Gray16(p) => {
            ImageBuffer::from_raw(w, h, from_be_bytes(&tight(p, 2))).map(DynamicImage::ImageLuma16)
        }
        PixelBuffer::Nrgba(p) => {
            ImageBuffer::from_raw(w, h, tight(p, 4)).map(DynamicImage::ImageRgba8)
        }
        PixelBuffer::Nrgba64(p) => {
            ImageBuffer::from_raw(w, h, from_be_bytes(&tight(p, 8))).map(DynamicImage::ImageRgba16)
        }
        _ => None,
    };
    if let Some(img) = fast {
        return Ok(img);
    }

    let at = new_at_func(buf);
    let out = ImageBuffer::from_fn(w, h, |x, y| {
        let c = at(rect.x0 + x as i32, rect.y0 + y as i32);
        Rgba([c.r as u16, c.g as u16, c.b as u16, c.a as u16])
    });
    Ok(DynamicImage::ImageRgba16(out))
}

fn rows(layout: Layout, rect: Rect, pix: Vec<u8>) -> Interleaved {
    Interleaved {
        pix,
        stride: rect.width() as usize * layout.bytes_per_pixel(),
        rect,
    }
}

/// Row bytes without stride padding.
fn tight(p: &Interleaved, bpp: usize) -> Vec<u8> {
    let row = p.rect.width() as usize * bpp;
    if p.stride == row {
        return p.pix[..row * p.rect.height() as usize].to_vec();
    }
    let mut out = Vec::with_capacity(row * p.rect.height() as usize);
    for y in 0..p.rect.height() as usize {
        out.extend_from_slice(&p.pix[y * p.stride..y * p.stride + row]);
    }
    out
}

fn be_bytes(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn from_be_bytes(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .collect()
}

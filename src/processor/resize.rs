//! Resampling with the `image` crate's filters.
//!
//! Parameters:
//!
//! | Key | Type | Meaning |
//! |-----|------|---------|
//! | `width` | int | target width, `0` or absent keeps the aspect ratio |
//! | `height` | int | target height, `0` or absent keeps the aspect ratio |
//! | `filter` | string | `nearest`, `triangle`, `catmull_rom`, `gaussian`, `lanczos3` (default) |
//!
//! Resampling happens on premultiplied 16-bit samples so transparent pixels
//! do not bleed their colour into opaque neighbours; the result is stored as
//! premultiplied `Rgba64`.

use super::Processor;
use crate::cancel::CancelToken;
use crate::error::{Error, ImageError, ParamError, Result};
use crate::params::{Params, Value};
use crate::pixel::{Interleaved, Layout, PixelBuffer, Rect, new_at_func, nrgba_to_rgba};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};
use rayon::prelude::*;

/// Largest accepted target dimension.
pub const MAX_DIMENSION: u32 = 1 << 14;

#[derive(Debug, Default)]
pub struct ResizeProcessor;

impl ResizeProcessor {
    pub fn new() -> Self {
        Self
    }
}

fn dimension(params: &Params, key: &str) -> Result<u32> {
    if !params.has(key) {
        return Ok(0);
    }
    let v = params.get_u32(key)?;
    if v > MAX_DIMENSION {
        return Err(ParamError::invalid(key, format!("must be at most {MAX_DIMENSION}")).into());
    }
    Ok(v)
}

fn filter(params: &Params) -> Result<FilterType> {
    if !params.has("filter") {
        return Ok(FilterType::Lanczos3);
    }
    match params.get_string("filter")? {
        "nearest" => Ok(FilterType::Nearest),
        "triangle" => Ok(FilterType::Triangle),
        "catmull_rom" => Ok(FilterType::CatmullRom),
        "gaussian" => Ok(FilterType::Gaussian),
        "lanczos3" => Ok(FilterType::Lanczos3),
        other => Err(ParamError::invalid("filter", format!("unknown filter \"{other}\"")).into()),
    }
}

/// A non-zero (or malformed, so that processing reports it) dimension.
fn requested(params: &Params, key: &str) -> bool {
    !matches!(params.get(key), Err(_) | Ok(Value::Int(0)))
}

/// Fill in a missing dimension from the source aspect ratio.
fn target_size(src: (u32, u32), want: (u32, u32)) -> (u32, u32) {
    let (sw, sh) = (u64::from(src.0.max(1)), u64::from(src.1.max(1)));
    match want {
        (0, 0) => src,
        (w, 0) => (w, ((sh * u64::from(w) + sw / 2) / sw).max(1) as u32),
        (0, h) => (((sw * u64::from(h) + sh / 2) / sh).max(1) as u32, h),
        both => both,
    }
}

impl Processor for ResizeProcessor {
    fn process(
        &self,
        buf: PixelBuffer,
        params: &Params,
        cancel: &CancelToken,
    ) -> Result<PixelBuffer> {
        let want = (dimension(params, "width")?, dimension(params, "height")?);
        let filter = filter(params)?;
        let rect = buf.bounds();
        if want == (0, 0) || matches!(buf, PixelBuffer::Uniform(_)) || rect.is_empty() {
            return Ok(buf);
        }
        let src_size = (rect.width(), rect.height());
        let (w, h) = target_size(src_size, want);
        if (w, h) == src_size {
            return Ok(buf);
        }

        let at = new_at_func(&buf);
        let row_len = src_size.0 as usize * 4;
        let mut samples = vec![0u16; row_len * src_size.1 as usize];
        samples
            .par_chunks_mut(row_len)
            .enumerate()
            .try_for_each(|(row, out)| {
                cancel.check()?;
                let y = rect.y0 + row as i32;
                for (i, px) in out.chunks_exact_mut(4).enumerate() {
                    let c = nrgba_to_rgba(at(rect.x0 + i as i32, y));
                    px.copy_from_slice(&[c.r as u16, c.g as u16, c.b as u16, c.a as u16]);
                }
                Ok::<_, Error>(())
            })?;
        let src: ImageBuffer<Rgba<u16>, Vec<u16>> =
            ImageBuffer::from_raw(src_size.0, src_size.1, samples)
                .ok_or_else(|| ImageError::Process("resize buffer size mismatch".into()))?;
        cancel.check()?;
        let resized = imageops::resize(&src, w, h, filter);

        // Keep the origin proportional so sub-images (animation frames) stay
        // in place relative to each other.
        let x0 = (i64::from(rect.x0) * i64::from(w) / i64::from(src_size.0)) as i32;
        let y0 = (i64::from(rect.y0) * i64::from(h) / i64::from(src_size.1)) as i32;
        let out_rect = Rect::new(x0, y0, x0 + w as i32, y0 + h as i32);
        let mut pix = Vec::with_capacity(resized.as_raw().len() * 2);
        for px in resized.as_raw().chunks_exact(4) {
            let a = px[3];
            for &v in &px[..3] {
                pix.extend_from_slice(&v.min(a).to_be_bytes());
            }
            pix.extend_from_slice(&a.to_be_bytes());
        }
        Ok(PixelBuffer::Rgba64(Interleaved {
            pix,
            stride: w as usize * Layout::Rgba64.bytes_per_pixel(),
            rect: out_rect,
        }))
    }

    fn change(&self, params: &Params) -> bool {
        requested(params, "width") || requested(params, "height")
    }
}

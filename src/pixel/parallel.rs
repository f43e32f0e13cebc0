//! Row-band parallel executor.
//!
//! Whole-image transforms split the bounding rectangle into one horizontal
//! band per rayon worker and run a per-band closure on each. Interleaved
//! destinations are split into disjoint row slices, so every band gets its own
//! writer and no locking is involved. Layouts whose rows cannot be separated
//! (planar, uniform, trait objects) run as a single band.
//!
//! The cancel token is checked before each band starts; the first error (or
//! cancellation) stops bands that have not started yet and is returned once
//! the running ones finish.

use super::access::{SetFunc, new_at_func, new_set_func, rows_at_func, rows_set_func};
use super::buffer::{PixelBuffer, Rect};
use super::color::Color;
use crate::cancel::CancelToken;
use crate::error::Result;
use rayon::prelude::*;

/// Split `bounds` into at most `n` full-width bands of near-equal height.
pub fn bands(bounds: Rect, n: usize) -> Vec<Rect> {
    if bounds.is_empty() {
        return Vec::new();
    }
    let h = bounds.height() as usize;
    let n = n.clamp(1, h);
    (0..n)
        .map(|i| {
            let top = bounds.y0 + (h * i / n) as i32;
            let bottom = bounds.y0 + (h * (i + 1) / n) as i32;
            Rect::new(bounds.x0, top, bounds.x1, bottom)
        })
        .collect()
}

/// Run `f` over every band of `bounds` concurrently.
pub fn run<F>(bounds: Rect, cancel: &CancelToken, f: F) -> Result<()>
where
    F: Fn(Rect) -> Result<()> + Sync,
{
    bands(bounds, rayon::current_num_threads())
        .into_par_iter()
        .try_for_each(|band| {
            cancel.check()?;
            f(band)
        })
}

/// Run `f` over every band of `dst`, handing each band a writer that may only
/// touch the band's rows.
pub fn run_mut<F>(dst: &mut PixelBuffer, cancel: &CancelToken, f: F) -> Result<()>
where
    F: for<'b> Fn(Rect, &mut SetFunc<'b>) -> Result<()> + Sync,
{
    let bounds = dst.bounds();
    if let Some((layout, rows, palette)) = dst.rows_mut() {
        let stride = rows.stride;
        return split_rows(&mut rows.pix, stride, bounds)
            .into_par_iter()
            .try_for_each(|(band, pix)| {
                cancel.check()?;
                let mut set = rows_set_func(layout, pix, stride, band, palette);
                f(band, &mut set)
            });
    }
    cancel.check()?;
    let mut set = new_set_func(dst);
    f(bounds, &mut set)
}

/// Replace every pixel of `buf` with `f(pixel)`, in place.
pub fn map_pixels<F>(buf: &mut PixelBuffer, cancel: &CancelToken, f: F) -> Result<()>
where
    F: Fn(Color) -> Color + Sync,
{
    if let PixelBuffer::Uniform(c) = buf {
        *c = f(*c);
        return Ok(());
    }
    let bounds = buf.bounds();
    if let Some((layout, rows, palette)) = buf.rows_mut() {
        let stride = rows.stride;
        return split_rows(&mut rows.pix, stride, bounds)
            .into_par_iter()
            .try_for_each(|(band, pix)| {
                cancel.check()?;
                let colors = {
                    let at = rows_at_func(layout, pix, stride, band, palette);
                    collect(&band, |x, y| at(x, y))
                };
                let mut set = rows_set_func(layout, pix, stride, band, palette);
                write(&band, colors, |x, y, c| set(x, y, f(c)));
                Ok(())
            });
    }

    // Read in parallel, write back on this thread.
    let read: Vec<(Rect, Vec<Color>)> = {
        let at = new_at_func(buf);
        bands(bounds, rayon::current_num_threads())
            .into_par_iter()
            .map(|band| {
                cancel.check()?;
                Ok((band, collect(&band, |x, y| at(x, y))))
            })
            .collect::<Result<_>>()?
    };
    let mut set = new_set_func(buf);
    for (band, colors) in read {
        write(&band, colors, |x, y, c| set(x, y, f(c)));
    }
    Ok(())
}

/// Copy `src` into `dst` over their common rectangle, converting layouts.
pub fn copy_into(src: &PixelBuffer, dst: &mut PixelBuffer, cancel: &CancelToken) -> Result<()> {
    let area = dst.bounds().intersect(&src.bounds());
    let at = new_at_func(src);
    run_mut(dst, cancel, |band, set| {
        let band = band.intersect(&area);
        for y in band.y0..band.y1 {
            for x in band.x0..band.x1 {
                set(x, y, at(x, y));
            }
        }
        Ok(())
    })
}

fn split_rows(pix: &mut [u8], stride: usize, bounds: Rect) -> Vec<(Rect, &mut [u8])> {
    let mut rest = pix;
    let mut out = Vec::new();
    for band in bands(bounds, rayon::current_num_threads()) {
        let len = (band.height() as usize * stride).min(rest.len());
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(len);
        rest = tail;
        out.push((band, head));
    }
    out
}

fn collect(band: &Rect, at: impl Fn(i32, i32) -> Color) -> Vec<Color> {
    let mut out = Vec::with_capacity(band.width() as usize * band.height() as usize);
    for y in band.y0..band.y1 {
        for x in band.x0..band.x1 {
            out.push(at(x, y));
        }
    }
    out
}

fn write(band: &Rect, colors: Vec<Color>, mut set: impl FnMut(i32, i32, Color)) {
    let mut colors = colors.into_iter();
    for y in band.y0..band.y1 {
        for x in band.x0..band.x1 {
            if let Some(c) = colors.next() {
                set(x, y, c);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::pixel::buffer::{Layout, Paletted, Subsample, YCbCr};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn gradient(layout: Layout, rect: Rect) -> PixelBuffer {
        let mut buf = PixelBuffer::new(layout, rect);
        {
            let mut set = new_set_func(&mut buf);
            for y in rect.y0..rect.y1 {
                for x in rect.x0..rect.x1 {
                    let v = ((x - rect.x0) as u32 * 0x1111) & 0xffff;
                    set(x, y, Color::new(v, 0xffff - v, (y - rect.y0) as u32 * 0x101, 0xffff));
                }
            }
        }
        buf
    }

    // =========================================================================
    // Bands
    // =========================================================================

    #[test]
    fn bands_cover_rect_exactly_once() {
        let r = Rect::new(-3, -5, 4, 12);
        for n in [1, 2, 3, 7, 17, 100] {
            let bands = bands(r, n);
            assert!(bands.len() <= n.min(17));
            assert_eq!(bands[0].y0, r.y0);
            assert_eq!(bands.last().map(|b| b.y1), Some(r.y1));
            for pair in bands.windows(2) {
                assert_eq!(pair[0].y1, pair[1].y0);
                assert!(!pair[0].is_empty());
            }
        }
    }

    #[test]
    fn bands_of_empty_rect() {
        assert!(bands(Rect::new(0, 0, 5, 0), 4).is_empty());
    }

    // =========================================================================
    // run
    // =========================================================================

    #[test]
    fn run_visits_every_row() {
        let rows = AtomicUsize::new(0);
        run(Rect::from_size(3, 50), &CancelToken::new(), |band| {
            rows.fetch_add(band.height() as usize, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
        assert_eq!(rows.into_inner(), 50);
    }

    #[test]
    fn run_stops_when_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let calls = AtomicUsize::new(0);
        let result = run(Rect::from_size(3, 50), &token, |_| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls.into_inner(), 0);
    }

    #[test]
    fn run_returns_band_error() {
        let result = run(Rect::from_size(1, 8), &CancelToken::new(), |band| {
            if band.y0 == 0 {
                Err(Error::Internal("boom".into()))
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(Error::Internal(m)) if m == "boom"));
    }

    // =========================================================================
    // run_mut / map_pixels / copy_into
    // =========================================================================

    #[test]
    fn run_mut_bands_write_disjoint_rows() {
        let rect = Rect::new(2, 3, 9, 40);
        let mut buf = PixelBuffer::new(Layout::Nrgba64, rect);
        let seen = Mutex::new(Vec::new());
        run_mut(&mut buf, &CancelToken::new(), |band, set| {
            seen.lock().unwrap().push(band);
            for y in band.y0..band.y1 {
                for x in band.x0..band.x1 {
                    set(x, y, Color::new(x as u32, y as u32, 0, 0xffff));
                }
            }
            Ok(())
        })
        .unwrap();
        let at = new_at_func(&buf);
        for y in rect.y0..rect.y1 {
            for x in rect.x0..rect.x1 {
                assert_eq!(at(x, y), Color::new(x as u32, y as u32, 0, 0xffff));
            }
        }
        let rows: u32 = seen.into_inner().unwrap().iter().map(|b| b.height()).sum();
        assert_eq!(rows, rect.height());
    }

    #[test]
    fn run_mut_planar_is_single_band() {
        let rect = Rect::from_size(6, 6);
        let mut buf = PixelBuffer::YCbCr(YCbCr::new(rect, Subsample::R420));
        let calls = AtomicUsize::new(0);
        run_mut(&mut buf, &CancelToken::new(), |band, set| {
            calls.fetch_add(1, Ordering::Relaxed);
            assert_eq!(band, rect);
            set(0, 0, Color::WHITE);
            Ok(())
        })
        .unwrap();
        assert_eq!(calls.into_inner(), 1);
        assert_eq!(new_at_func(&buf)(0, 0), Color::WHITE);
    }

    #[test]
    fn map_pixels_inverts_in_place() {
        let rect = Rect::new(-4, -4, 13, 21);
        let mut buf = gradient(Layout::Rgba64, rect);
        let before = buf.clone();
        let invert = |c: Color| Color::new(0xffff - c.r, 0xffff - c.g, 0xffff - c.b, c.a);
        map_pixels(&mut buf, &CancelToken::new(), invert).unwrap();
        let (old, new) = (new_at_func(&before), new_at_func(&buf));
        for y in rect.y0..rect.y1 {
            for x in rect.x0..rect.x1 {
                assert_eq!(new(x, y), invert(old(x, y)));
            }
        }
    }

    #[test]
    fn map_pixels_on_planar_and_uniform() {
        let rect = Rect::from_size(4, 4);
        let mut buf = PixelBuffer::YCbCr(YCbCr::new(rect, Subsample::R444));
        map_pixels(&mut buf, &CancelToken::new(), |_| Color::WHITE).unwrap();
        assert_eq!(new_at_func(&buf)(3, 3), Color::WHITE);

        let mut uniform = PixelBuffer::Uniform(Color::BLACK);
        map_pixels(&mut uniform, &CancelToken::new(), |_| Color::WHITE).unwrap();
        assert_eq!(new_at_func(&uniform)(0, 0), Color::WHITE);
    }

    #[test]
    fn copy_into_requantizes_to_palette() {
        let rect = Rect::from_size(2, 1);
        let mut src = PixelBuffer::new(Layout::Nrgba, rect);
        {
            let mut set = new_set_func(&mut src);
            set(0, 0, Color::new(0xee00, 0xee00, 0xee00, 0xffff));
            set(1, 0, Color::new(0x0800, 0, 0, 0xffff));
        }
        let mut dst = PixelBuffer::Paletted(Paletted::new(
            rect,
            vec![[0, 0, 0, 255], [255, 255, 255, 255]],
        ));
        copy_into(&src, &mut dst, &CancelToken::new()).unwrap();
        let PixelBuffer::Paletted(p) = &dst else {
            unreachable!()
        };
        assert_eq!(p.pixels.pix, vec![1, 0]);
    }

    #[test]
    fn map_pixels_respects_cancellation() {
        let token = CancelToken::new();
        token.cancel();
        let mut buf = gradient(Layout::Gray, Rect::from_size(4, 4));
        let result = map_pixels(&mut buf, &token, |c| c);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}

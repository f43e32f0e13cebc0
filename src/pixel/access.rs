//! Accessor and mutator factories.
//!
//! [`new_at_func`] and [`new_set_func`] inspect a [`PixelBuffer`] once and
//! return a closure specialised for its layout. Every closure speaks the same
//! language: straight-alpha 16-bit [`Color`]s. A transform is therefore a
//! plain double loop over `at` and `set`, whatever the storage underneath.
//!
//! Coordinates must lie inside the buffer's bounds; the closures index
//! directly and do not re-check.

use super::buffer::{Layout, NYCbCrA, PixelBuffer, Rect, YCbCr, pix_offset};
use super::color::{
    Color, cmyk_to_rgb, luma16, nrgba_to_rgba, rgb_to_cmyk, rgb_to_ycbcr, rgba_to_nrgba,
    ycbcr_to_rgb,
};

/// Reads the straight-alpha colour at `(x, y)`.
pub type AtFunc<'a> = Box<dyn Fn(i32, i32) -> Color + Send + Sync + 'a>;

/// Writes a straight-alpha colour at `(x, y)`.
pub type SetFunc<'a> = Box<dyn FnMut(i32, i32, Color) + Send + 'a>;

#[inline]
fn read16(pix: &[u8], i: usize) -> u32 {
    u32::from(pix[i]) << 8 | u32::from(pix[i + 1])
}

#[inline]
fn write16(pix: &mut [u8], i: usize, v: u32) {
    pix[i] = (v >> 8) as u8;
    pix[i + 1] = v as u8;
}

/// Build a reader for `buf`.
pub fn new_at_func(buf: &PixelBuffer) -> AtFunc<'_> {
    match buf {
        PixelBuffer::YCbCr(p) => ycbcr_at_func(p),
        PixelBuffer::NYCbCrA(p) => nycbcra_at_func(p),
        PixelBuffer::Uniform(c) => {
            let c = *c;
            Box::new(move |_, _| c)
        }
        PixelBuffer::Other(p) => Box::new(move |x, y| rgba_to_nrgba(p.rgba64_at(x, y))),
        interleaved => {
            let Some((layout, rows, palette)) = interleaved.rows() else {
                unreachable!("every remaining layout is interleaved")
            };
            rows_at_func(layout, &rows.pix, rows.stride, rows.rect, palette)
        }
    }
}

/// Build a writer for `buf`.
pub fn new_set_func(buf: &mut PixelBuffer) -> SetFunc<'_> {
    match buf {
        PixelBuffer::YCbCr(p) => Box::new(move |x, y, c| set_ycbcr(p, x, y, c)),
        PixelBuffer::NYCbCrA(p) => Box::new(move |x, y, c| {
            let ai = p.a_offset(x, y);
            p.a[ai] = (c.a >> 8) as u8;
            // Chroma planes hold the unassociated colour.
            set_ycbcr(&mut p.ycbcr, x, y, Color { a: 0xffff, ..c });
        }),
        PixelBuffer::Uniform(slot) => Box::new(move |_, _, c| *slot = c),
        PixelBuffer::Other(p) => Box::new(move |x, y, c| p.set_rgba64(x, y, nrgba_to_rgba(c))),
        interleaved => {
            let Some((layout, rows, palette)) = interleaved.rows_mut() else {
                unreachable!("every remaining layout is interleaved")
            };
            let (stride, rect) = (rows.stride, rows.rect);
            rows_set_func(layout, &mut rows.pix, stride, rect, palette)
        }
    }
}

/// Reader over row storage; `rect` locates `pix[0]`.
pub(crate) fn rows_at_func<'a>(
    layout: Layout,
    pix: &'a [u8],
    stride: usize,
    rect: Rect,
    palette: &'a [[u8; 4]],
) -> AtFunc<'a> {
    let bpp = layout.bytes_per_pixel();
    let off = move |x: i32, y: i32| pix_offset(rect, stride, x, y, bpp);
    match layout {
        Layout::Rgba => Box::new(move |x, y| {
            let i = off(x, y);
            rgba_to_nrgba(Color::from_rgba8(pix[i], pix[i + 1], pix[i + 2], pix[i + 3]))
        }),
        Layout::Nrgba => Box::new(move |x, y| {
            let i = off(x, y);
            Color::from_rgba8(pix[i], pix[i + 1], pix[i + 2], pix[i + 3])
        }),
        Layout::Rgba64 => Box::new(move |x, y| {
            let i = off(x, y);
            rgba_to_nrgba(Color::new(
                read16(pix, i),
                read16(pix, i + 2),
                read16(pix, i + 4),
                read16(pix, i + 6),
            ))
        }),
        Layout::Nrgba64 => Box::new(move |x, y| {
            let i = off(x, y);
            Color::new(
                read16(pix, i),
                read16(pix, i + 2),
                read16(pix, i + 4),
                read16(pix, i + 6),
            )
        }),
        Layout::Gray => Box::new(move |x, y| {
            let v = u32::from(pix[off(x, y)]) * 0x101;
            Color::new(v, v, v, 0xffff)
        }),
        Layout::Gray16 => Box::new(move |x, y| {
            let v = read16(pix, off(x, y));
            Color::new(v, v, v, 0xffff)
        }),
        Layout::Alpha => Box::new(move |x, y| {
            let a = u32::from(pix[off(x, y)]) * 0x101;
            rgba_to_nrgba(Color::new(a, a, a, a))
        }),
        Layout::Alpha16 => Box::new(move |x, y| {
            let a = read16(pix, off(x, y));
            rgba_to_nrgba(Color::new(a, a, a, a))
        }),
        Layout::Cmyk => Box::new(move |x, y| {
            let i = off(x, y);
            let (r, g, b) = cmyk_to_rgb(pix[i], pix[i + 1], pix[i + 2], pix[i + 3]);
            Color::new(r, g, b, 0xffff)
        }),
        Layout::Paletted => {
            let colors: Vec<Color> = palette
                .iter()
                .map(|&[r, g, b, a]| rgba_to_nrgba(Color::from_rgba8(r, g, b, a)))
                .collect();
            Box::new(move |x, y| {
                let index = usize::from(pix[off(x, y)]);
                colors.get(index).copied().unwrap_or(Color::TRANSPARENT)
            })
        }
    }
}

/// Writer over row storage; `rect` locates `pix[0]`.
pub(crate) fn rows_set_func<'a>(
    layout: Layout,
    pix: &'a mut [u8],
    stride: usize,
    rect: Rect,
    palette: &'a [[u8; 4]],
) -> SetFunc<'a> {
    let bpp = layout.bytes_per_pixel();
    let off = move |x: i32, y: i32| pix_offset(rect, stride, x, y, bpp);
    match layout {
        Layout::Rgba => Box::new(move |x, y, c| {
            let i = off(x, y);
            let p = nrgba_to_rgba(c);
            pix[i] = (p.r >> 8) as u8;
            pix[i + 1] = (p.g >> 8) as u8;
            pix[i + 2] = (p.b >> 8) as u8;
            pix[i + 3] = (p.a >> 8) as u8;
        }),
        Layout::Nrgba => Box::new(move |x, y, c| {
            let i = off(x, y);
            pix[i] = (c.r >> 8) as u8;
            pix[i + 1] = (c.g >> 8) as u8;
            pix[i + 2] = (c.b >> 8) as u8;
            pix[i + 3] = (c.a >> 8) as u8;
        }),
        Layout::Rgba64 => Box::new(move |x, y, c| {
            let i = off(x, y);
            let p = nrgba_to_rgba(c);
            write16(pix, i, p.r);
            write16(pix, i + 2, p.g);
            write16(pix, i + 4, p.b);
            write16(pix, i + 6, p.a);
        }),
        Layout::Nrgba64 => Box::new(move |x, y, c| {
            let i = off(x, y);
            write16(pix, i, c.r);
            write16(pix, i + 2, c.g);
            write16(pix, i + 4, c.b);
            write16(pix, i + 6, c.a);
        }),
        Layout::Gray => Box::new(move |x, y, c| {
            pix[off(x, y)] = (luma16(nrgba_to_rgba(c)) >> 8) as u8;
        }),
        Layout::Gray16 => Box::new(move |x, y, c| {
            write16(pix, off(x, y), luma16(nrgba_to_rgba(c)));
        }),
        Layout::Alpha => Box::new(move |x, y, c| {
            pix[off(x, y)] = (c.a >> 8) as u8;
        }),
        Layout::Alpha16 => Box::new(move |x, y, c| {
            write16(pix, off(x, y), c.a);
        }),
        Layout::Cmyk => Box::new(move |x, y, c| {
            let i = off(x, y);
            let p = nrgba_to_rgba(c);
            let (cc, m, yy, k) = rgb_to_cmyk((p.r >> 8) as u8, (p.g >> 8) as u8, (p.b >> 8) as u8);
            pix[i] = cc;
            pix[i + 1] = m;
            pix[i + 2] = yy;
            pix[i + 3] = k;
        }),
        Layout::Paletted => {
            let entries: Vec<Color> = palette
                .iter()
                .map(|&[r, g, b, a]| Color::from_rgba8(r, g, b, a))
                .collect();
            Box::new(move |x, y, c| {
                pix[off(x, y)] = palette_index(&entries, nrgba_to_rgba(c)) as u8;
            })
        }
    }
}

#[inline]
fn sq_diff(x: u32, y: u32) -> u32 {
    let d = x.abs_diff(y);
    (d * d) >> 2
}

/// Index of the palette entry closest to premultiplied `c`.
///
/// Distance is the sum of squared channel differences over R, G, B and A.
/// The scan is linear and keeps the first best match, so ties resolve to the
/// lowest index.
pub fn palette_index(palette: &[Color], c: Color) -> usize {
    let mut best_index = 0;
    let mut best_sum = u32::MAX;
    for (index, p) in palette.iter().enumerate() {
        let sum =
            sq_diff(c.r, p.r) + sq_diff(c.g, p.g) + sq_diff(c.b, p.b) + sq_diff(c.a, p.a);
        if sum < best_sum {
            if sum == 0 {
                return index;
            }
            best_index = index;
            best_sum = sum;
        }
    }
    best_index
}

fn ycbcr_at_func(p: &YCbCr) -> AtFunc<'_> {
    Box::new(move |x, y| {
        let yi = p.y_offset(x, y);
        let ci = p.c_offset(x, y);
        let (r, g, b) = ycbcr_to_rgb(p.y[yi], p.cb[ci], p.cr[ci]);
        Color::new(r, g, b, 0xffff)
    })
}

fn nycbcra_at_func(p: &NYCbCrA) -> AtFunc<'_> {
    Box::new(move |x, y| {
        let yc = &p.ycbcr;
        let yi = yc.y_offset(x, y);
        let ci = yc.c_offset(x, y);
        let (r, g, b) = ycbcr_to_rgb(yc.y[yi], yc.cb[ci], yc.cr[ci]);
        let a = u32::from(p.a[p.a_offset(x, y)]) * 0x101;
        if a == 0 {
            Color::TRANSPARENT
        } else {
            Color::new(r, g, b, a)
        }
    })
}

fn set_ycbcr(p: &mut YCbCr, x: i32, y: i32, c: Color) {
    // Opaque storage: composite over black.
    let c = nrgba_to_rgba(c);
    let (yy, cb, cr) = rgb_to_ycbcr((c.r >> 8) as u8, (c.g >> 8) as u8, (c.b >> 8) as u8);
    let yi = p.y_offset(x, y);
    let ci = p.c_offset(x, y);
    p.y[yi] = yy;
    p.cb[ci] = cb;
    p.cr[ci] = cr;
}

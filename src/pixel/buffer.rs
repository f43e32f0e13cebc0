//! Concrete in-memory pixel layouts.
//!
//! | Variant | Storage | Alpha |
//! |---|---|---|
//! | `Rgba` / `Rgba64` | interleaved 8 / 16-bit (big-endian) | premultiplied |
//! | `Nrgba` / `Nrgba64` | interleaved 8 / 16-bit (big-endian) | straight |
//! | `Gray` / `Gray16` | one channel | opaque |
//! | `Alpha` / `Alpha16` | one channel | alpha only |
//! | `Cmyk` | interleaved 8-bit C, M, Y, K | opaque |
//! | `Paletted` | 8-bit indices + palette | per entry |
//! | `YCbCr` | planar Y, Cb, Cr, six subsampling ratios | opaque |
//! | `NYCbCrA` | `YCbCr` plus a straight alpha plane | straight |
//! | `Uniform` | one colour everywhere | straight |
//! | `Other` | any [`RawImage`] | premultiplied through the trait |
//!
//! Interleaved buffers follow the usual row-major convention: the byte for
//! pixel `(x, y)` starts at `(y - rect.y0) * stride + (x - rect.x0) * bpp`.
//! A buffer's rectangle need not start at the origin.

use super::color::Color;
use std::fmt;

/// A half-open rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Rect {
    /// Bounds reported by [`PixelBuffer::Uniform`].
    pub const UNBOUNDED: Rect = Rect::new(
        -1_000_000_000,
        -1_000_000_000,
        1_000_000_000,
        1_000_000_000,
    );

    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn width(&self) -> u32 {
        (self.x1 - self.x0).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y1 - self.y0).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let r = Rect::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        );
        if r.is_empty() { Rect::default() } else { r }
    }

    /// Grow to cover `other` as well.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }
}

/// Interleaved layouts that store whole pixels row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    Rgba,
    Rgba64,
    Nrgba,
    Nrgba64,
    Gray,
    Gray16,
    Alpha,
    Alpha16,
    Cmyk,
    Paletted,
}

impl Layout {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Layout::Rgba | Layout::Nrgba | Layout::Cmyk => 4,
            Layout::Rgba64 | Layout::Nrgba64 => 8,
            Layout::Gray | Layout::Alpha | Layout::Paletted => 1,
            Layout::Gray16 | Layout::Alpha16 => 2,
        }
    }
}

/// Row-major pixel storage shared by the interleaved layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interleaved {
    pub pix: Vec<u8>,
    pub stride: usize,
    pub rect: Rect,
}

impl Interleaved {
    /// Zeroed storage for `rect` with a tight stride.
    pub fn new(layout: Layout, rect: Rect) -> Self {
        let stride = rect.width() as usize * layout.bytes_per_pixel();
        Self {
            pix: vec![0; stride * rect.height() as usize],
            stride,
            rect,
        }
    }

    #[inline]
    pub fn offset(&self, x: i32, y: i32, bpp: usize) -> usize {
        pix_offset(self.rect, self.stride, x, y, bpp)
    }
}

#[inline]
pub(crate) fn pix_offset(rect: Rect, stride: usize, x: i32, y: i32, bpp: usize) -> usize {
    (y - rect.y0) as usize * stride + (x - rect.x0) as usize * bpp
}

/// Palette-indexed pixels. Palette entries are premultiplied 8-bit RGBA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paletted {
    pub pixels: Interleaved,
    pub palette: Vec<[u8; 4]>,
}

impl Paletted {
    pub fn new(rect: Rect, palette: Vec<[u8; 4]>) -> Self {
        Self {
            pixels: Interleaved::new(Layout::Paletted, rect),
            palette,
        }
    }
}

/// Chroma subsampling ratio of a [`YCbCr`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsample {
    R444,
    R422,
    R420,
    R440,
    R411,
    R410,
}

/// Planar JFIF YCbCr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YCbCr {
    pub y: Vec<u8>,
    pub cb: Vec<u8>,
    pub cr: Vec<u8>,
    pub y_stride: usize,
    pub c_stride: usize,
    pub ratio: Subsample,
    pub rect: Rect,
}

impl YCbCr {
    pub fn new(rect: Rect, ratio: Subsample) -> Self {
        let (w, h) = (rect.width() as usize, rect.height() as usize);
        let half_w = ((rect.x1 + 1) / 2 - rect.x0 / 2) as usize;
        let half_h = ((rect.y1 + 1) / 2 - rect.y0 / 2) as usize;
        let quarter_w = ((rect.x1 + 3) / 4 - rect.x0 / 4) as usize;
        let (cw, ch) = match ratio {
            Subsample::R444 => (w, h),
            Subsample::R422 => (half_w, h),
            Subsample::R420 => (half_w, half_h),
            Subsample::R440 => (w, half_h),
            Subsample::R411 => (quarter_w, h),
            Subsample::R410 => (quarter_w, half_h),
        };
        Self {
            y: vec![0; w * h],
            cb: vec![0; cw * ch],
            cr: vec![0; cw * ch],
            y_stride: w,
            c_stride: cw,
            ratio,
            rect,
        }
    }

    #[inline]
    pub fn y_offset(&self, x: i32, y: i32) -> usize {
        (y - self.rect.y0) as usize * self.y_stride + (x - self.rect.x0) as usize
    }

    /// Index into the chroma planes for luma position `(x, y)`.
    ///
    /// Division truncates toward zero, which matters for rectangles with
    /// negative origins and is part of the storage contract.
    #[inline]
    pub fn c_offset(&self, x: i32, y: i32) -> usize {
        let r = self.rect;
        let s = self.c_stride;
        let (row, col) = match self.ratio {
            Subsample::R422 => (y - r.y0, x / 2 - r.x0 / 2),
            Subsample::R420 => (y / 2 - r.y0 / 2, x / 2 - r.x0 / 2),
            Subsample::R440 => (y / 2 - r.y0 / 2, x - r.x0),
            Subsample::R411 => (y - r.y0, x / 4 - r.x0 / 4),
            Subsample::R410 => (y / 2 - r.y0 / 2, x / 4 - r.x0 / 4),
            Subsample::R444 => (y - r.y0, x - r.x0),
        };
        row as usize * s + col as usize
    }
}

/// [`YCbCr`] plus a straight alpha plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NYCbCrA {
    pub ycbcr: YCbCr,
    pub a: Vec<u8>,
    pub a_stride: usize,
}

impl NYCbCrA {
    pub fn new(rect: Rect, ratio: Subsample) -> Self {
        let ycbcr = YCbCr::new(rect, ratio);
        let a_stride = ycbcr.y_stride;
        Self {
            a: vec![0; ycbcr.y.len()],
            ycbcr,
            a_stride,
        }
    }

    #[inline]
    pub fn a_offset(&self, x: i32, y: i32) -> usize {
        pix_offset(self.ycbcr.rect, self.a_stride, x, y, 1)
    }
}

/// Pixel storage the engine has no specialised path for.
///
/// Colours cross this boundary premultiplied, like a standard per-pixel
/// colour interface; the engine converts to and from straight alpha.
pub trait RawImage: Send + Sync + fmt::Debug {
    fn bounds(&self) -> Rect;
    fn rgba64_at(&self, x: i32, y: i32) -> Color;
    fn set_rgba64(&mut self, x: i32, y: i32, c: Color);
    fn box_clone(&self) -> Box<dyn RawImage>;
}

impl Clone for Box<dyn RawImage> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// A rectangle of pixels in one of the supported layouts.
#[derive(Debug, Clone)]
pub enum PixelBuffer {
    Rgba(Interleaved),
    Rgba64(Interleaved),
    Nrgba(Interleaved),
    Nrgba64(Interleaved),
    Gray(Interleaved),
    Gray16(Interleaved),
    Alpha(Interleaved),
    Alpha16(Interleaved),
    Cmyk(Interleaved),
    Paletted(Paletted),
    YCbCr(YCbCr),
    NYCbCrA(NYCbCrA),
    Uniform(Color),
    Other(Box<dyn RawImage>),
}

impl PixelBuffer {
    /// Zeroed buffer in an interleaved layout.
    pub fn new(layout: Layout, rect: Rect) -> Self {
        let rows = Interleaved::new(layout, rect);
        match layout {
            Layout::Rgba => PixelBuffer::Rgba(rows),
            Layout::Rgba64 => PixelBuffer::Rgba64(rows),
            Layout::Nrgba => PixelBuffer::Nrgba(rows),
            Layout::Nrgba64 => PixelBuffer::Nrgba64(rows),
            Layout::Gray => PixelBuffer::Gray(rows),
            Layout::Gray16 => PixelBuffer::Gray16(rows),
            Layout::Alpha => PixelBuffer::Alpha(rows),
            Layout::Alpha16 => PixelBuffer::Alpha16(rows),
            Layout::Cmyk => PixelBuffer::Cmyk(rows),
            Layout::Paletted => PixelBuffer::Paletted(Paletted {
                pixels: rows,
                palette: Vec::new(),
            }),
        }
    }

    pub fn bounds(&self) -> Rect {
        match self {
            PixelBuffer::Rgba(p)
            | PixelBuffer::Rgba64(p)
            | PixelBuffer::Nrgba(p)
            | PixelBuffer::Nrgba64(p)
            | PixelBuffer::Gray(p)
            | PixelBuffer::Gray16(p)
            | PixelBuffer::Alpha(p)
            | PixelBuffer::Alpha16(p)
            | PixelBuffer::Cmyk(p) => p.rect,
            PixelBuffer::Paletted(p) => p.pixels.rect,
            PixelBuffer::YCbCr(p) => p.rect,
            PixelBuffer::NYCbCrA(p) => p.ycbcr.rect,
            PixelBuffer::Uniform(_) => Rect::UNBOUNDED,
            PixelBuffer::Other(p) => p.bounds(),
        }
    }

    /// Short name of the layout, for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            PixelBuffer::Rgba(_) => "rgba",
            PixelBuffer::Rgba64(_) => "rgba64",
            PixelBuffer::Nrgba(_) => "nrgba",
            PixelBuffer::Nrgba64(_) => "nrgba64",
            PixelBuffer::Gray(_) => "gray",
            PixelBuffer::Gray16(_) => "gray16",
            PixelBuffer::Alpha(_) => "alpha",
            PixelBuffer::Alpha16(_) => "alpha16",
            PixelBuffer::Cmyk(_) => "cmyk",
            PixelBuffer::Paletted(_) => "paletted",
            PixelBuffer::YCbCr(_) => "ycbcr",
            PixelBuffer::NYCbCrA(_) => "nycbcra",
            PixelBuffer::Uniform(_) => "uniform",
            PixelBuffer::Other(_) => "other",
        }
    }

    /// The row storage of interleaved layouts, with the palette (empty
    /// unless paletted).
    pub(crate) fn rows(&self) -> Option<(Layout, &Interleaved, &[[u8; 4]])> {
        let rows = match self {
            PixelBuffer::Rgba(p) => (Layout::Rgba, p, &[][..]),
            PixelBuffer::Rgba64(p) => (Layout::Rgba64, p, &[][..]),
            PixelBuffer::Nrgba(p) => (Layout::Nrgba, p, &[][..]),
            PixelBuffer::Nrgba64(p) => (Layout::Nrgba64, p, &[][..]),
            PixelBuffer::Gray(p) => (Layout::Gray, p, &[][..]),
            PixelBuffer::Gray16(p) => (Layout::Gray16, p, &[][..]),
            PixelBuffer::Alpha(p) => (Layout::Alpha, p, &[][..]),
            PixelBuffer::Alpha16(p) => (Layout::Alpha16, p, &[][..]),
            PixelBuffer::Cmyk(p) => (Layout::Cmyk, p, &[][..]),
            PixelBuffer::Paletted(Paletted { pixels, palette }) => {
                (Layout::Paletted, pixels, palette.as_slice())
            }
            _ => return None,
        };
        Some(rows)
    }

    pub(crate) fn rows_mut(&mut self) -> Option<(Layout, &mut Interleaved, &[[u8; 4]])> {
        let rows = match self {
            PixelBuffer::Rgba(p) => (Layout::Rgba, p, &[][..]),
            PixelBuffer::Rgba64(p) => (Layout::Rgba64, p, &[][..]),
            PixelBuffer::Nrgba(p) => (Layout::Nrgba, p, &[][..]),
            PixelBuffer::Nrgba64(p) => (Layout::Nrgba64, p, &[][..]),
            PixelBuffer::Gray(p) => (Layout::Gray, p, &[][..]),
            PixelBuffer::Gray16(p) => (Layout::Gray16, p, &[][..]),
            PixelBuffer::Alpha(p) => (Layout::Alpha, p, &[][..]),
            PixelBuffer::Alpha16(p) => (Layout::Alpha16, p, &[][..]),
            PixelBuffer::Cmyk(p) => (Layout::Cmyk, p, &[][..]),
            PixelBuffer::Paletted(Paletted { pixels, palette }) => {
                let palette: &[[u8; 4]] = palette;
                (Layout::Paletted, pixels, palette)
            }
            _ => return None,
        };
        Some(rows)
    }
}

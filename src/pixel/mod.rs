//! Uniform pixel access over heterogeneous buffer layouts.
//!
//! Transform code never matches on a concrete layout. It asks for a reader
//! and a writer and works in straight-alpha 16-bit colour:
//!
//! ```
//! use imageserver::pixel::{Color, Layout, PixelBuffer, Rect, new_at_func, new_set_func};
//!
//! let src = PixelBuffer::Uniform(Color::WHITE);
//! let mut dst = PixelBuffer::new(Layout::Gray, Rect::from_size(2, 2));
//! let at = new_at_func(&src);
//! let mut set = new_set_func(&mut dst);
//! for y in 0..2 {
//!     for x in 0..2 {
//!         set(x, y, at(x, y));
//!     }
//! }
//! ```
//!
//! The closures are built once per buffer, so the per-pixel cost is the
//! layout's own arithmetic and nothing else. [`parallel`] runs such loops over
//! row bands on the rayon pool.
//!
//! | Module | Role |
//! |--------|------|
//! | [`color`] | 16-bit colour and the exact alpha / YCbCr / CMYK conversions |
//! | [`buffer`] | Concrete layouts and [`PixelBuffer`] |
//! | [`access`] | [`new_at_func`] / [`new_set_func`] and palette search |
//! | [`parallel`] | Band executor with cancellation |
//! | [`convert`] | `image::DynamicImage` bridges |

pub mod access;
pub mod buffer;
pub mod color;
pub mod convert;
pub mod parallel;

pub use access::{AtFunc, SetFunc, new_at_func, new_set_func, palette_index};
pub use buffer::{
    Interleaved, Layout, NYCbCrA, Paletted, PixelBuffer, RawImage, Rect, Subsample, YCbCr,
};
pub use color::{Color, nrgba_to_rgba, rgba_to_nrgba};
pub use parallel::{copy_into, map_pixels, run, run_mut};

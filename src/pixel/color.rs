//! Colour arithmetic on 16-bit channels.
//!
//! All conversions here are integer-exact and reproduce the reference colour
//! models bit for bit, so a pixel read through the engine has the same value
//! no matter which concrete layout stored it.

/// A colour with four 16-bit channels held in `u32`s (`0..=0xffff`).
///
/// Whether the channels are premultiplied depends on context: the engine's
/// accessors always speak straight (non-premultiplied) alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Color {
    pub r: u32,
    pub g: u32,
    pub b: u32,
    pub a: u32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::new(0, 0, 0, 0);
    pub const BLACK: Color = Color::new(0, 0, 0, 0xffff);
    pub const WHITE: Color = Color::new(0xffff, 0xffff, 0xffff, 0xffff);

    pub const fn new(r: u32, g: u32, b: u32, a: u32) -> Self {
        Self { r, g, b, a }
    }

    /// Widen 8-bit channels (`0xab` becomes `0xabab`).
    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(
            r as u32 * 0x101,
            g as u32 * 0x101,
            b as u32 * 0x101,
            a as u32 * 0x101,
        )
    }
}

/// Premultiplied to straight alpha.
pub fn rgba_to_nrgba(c: Color) -> Color {
    match c.a {
        0 => Color::TRANSPARENT,
        0xffff => c,
        a => Color::new(
            (c.r * 0xffff) / a,
            (c.g * 0xffff) / a,
            (c.b * 0xffff) / a,
            a,
        ),
    }
}

/// Straight to premultiplied alpha.
pub fn nrgba_to_rgba(c: Color) -> Color {
    match c.a {
        0 => Color::TRANSPARENT,
        0xffff => c,
        a => Color::new(c.r * a / 0xffff, c.g * a / 0xffff, c.b * a / 0xffff, a),
    }
}

/// Clamp a fixed-point (16.8) intermediate into `0..=0xffff`.
#[inline]
fn clamp_fixed(v: i32) -> u32 {
    if (v as u32) & 0xff00_0000 == 0 {
        (v >> 8) as u32
    } else {
        (!(v >> 31) & 0xffff) as u32
    }
}

/// JFIF YCbCr to 16-bit RGB.
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> (u32, u32, u32) {
    let yy1 = i32::from(y) * 0x10101;
    let cb1 = i32::from(cb) - 128;
    let cr1 = i32::from(cr) - 128;

    let r = clamp_fixed(yy1 + 91881 * cr1);
    let g = clamp_fixed(yy1 - 22554 * cb1 - 46802 * cr1);
    let b = clamp_fixed(yy1 + 116130 * cb1);
    (r, g, b)
}

/// 8-bit RGB to JFIF YCbCr.
pub fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r1 = i32::from(r);
    let g1 = i32::from(g);
    let b1 = i32::from(b);

    let yy = (19595 * r1 + 38470 * g1 + 7471 * b1 + (1 << 15)) >> 16;

    let mut cb = -11056 * r1 - 21712 * g1 + 32768 * b1 + (257 << 15);
    cb = if (cb as u32) & 0xff00_0000 == 0 {
        cb >> 16
    } else {
        !(cb >> 31)
    };

    let mut cr = 32768 * r1 - 27440 * g1 - 5328 * b1 + (257 << 15);
    cr = if (cr as u32) & 0xff00_0000 == 0 {
        cr >> 16
    } else {
        !(cr >> 31)
    };

    (yy as u8, cb as u8, cr as u8)
}

/// CMYK to 16-bit RGB (always opaque).
pub fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> (u32, u32, u32) {
    let w = 0xffff - u32::from(k) * 0x101;
    let r = (0xffff - u32::from(c) * 0x101) * w / 0xffff;
    let g = (0xffff - u32::from(m) * 0x101) * w / 0xffff;
    let b = (0xffff - u32::from(y) * 0x101) * w / 0xffff;
    (r, g, b)
}

/// 8-bit RGB to CMYK.
pub fn rgb_to_cmyk(r: u8, g: u8, b: u8) -> (u8, u8, u8, u8) {
    let rr = u32::from(r);
    let gg = u32::from(g);
    let bb = u32::from(b);
    let w = rr.max(gg).max(bb);
    if w == 0 {
        return (0, 0, 0, 0xff);
    }
    let c = (w - rr) * 0xff / w;
    let m = (w - gg) * 0xff / w;
    let y = (w - bb) * 0xff / w;
    (c as u8, m as u8, y as u8, (0xff - w) as u8)
}

/// 16-bit luma with the JFIF weights; alpha is ignored.
pub fn luma16(c: Color) -> u32 {
    (19595 * c.r + 38470 * c.g + 7471 * c.b + (1 << 15)) >> 16
}

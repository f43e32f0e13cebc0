//! Animated GIF support.
//!
//! Still-image codecs see only the first frame of a GIF. [`GifHandler`]
//! instead decodes every frame, runs the processor on each one (in
//! parallel), maps the results back onto each frame's own palette and
//! re-encodes, keeping per-frame delay, disposal and transparency plus the
//! loop count. The logical screen grows or shrinks to the largest frame
//! extent.
//!
//! [`FallbackHandler`] picks the GIF path only when the source is a GIF and
//! the request does not ask for another format; everything else goes to the
//! still-image handler.

use crate::cancel::CancelToken;
use crate::error::{ImageError, ParamError, Result};
use crate::image::Image;
use crate::params::{Params, Value};
use crate::pixel::{Paletted, PixelBuffer, Rect, copy_into};
use crate::processor::Processor;
use crate::server::Handler;
use gif::{ColorOutput, DecodeOptions, DisposalMethod, Repeat};
use rayon::prelude::*;
use std::borrow::Cow;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

const FORMAT: &str = "gif";

struct Frame {
    buf: PixelBuffer,
    delay: u16,
    dispose: DisposalMethod,
    transparent: Option<u8>,
}

struct Animation {
    repeat: Repeat,
    frames: Vec<Frame>,
}

fn decode_error(e: impl std::fmt::Display) -> ImageError {
    ImageError::Decode {
        format: FORMAT.to_string(),
        message: e.to_string(),
    }
}

fn encode_error(e: impl std::fmt::Display) -> ImageError {
    ImageError::Encode {
        format: FORMAT.to_string(),
        message: e.to_string(),
    }
}

/// GIF colour table to premultiplied palette entries.
fn palette(rgb: &[u8], transparent: Option<u8>) -> Vec<[u8; 4]> {
    rgb.chunks_exact(3)
        .enumerate()
        .map(|(i, c)| {
            if transparent == Some(i as u8) {
                [0, 0, 0, 0]
            } else {
                [c[0], c[1], c[2], 0xff]
            }
        })
        .collect()
}

fn decode(data: &[u8]) -> Result<Animation> {
    let mut options = DecodeOptions::new();
    options.set_color_output(ColorOutput::Indexed);
    let mut decoder = options.read_info(Cursor::new(data)).map_err(decode_error)?;
    let global = decoder.global_palette().map(<[u8]>::to_vec);

    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame().map_err(decode_error)? {
        let colors = frame
            .palette
            .as_deref()
            .or(global.as_deref())
            .ok_or_else(|| decode_error("frame has no colour table"))?;
        let rect = Rect::new(
            i32::from(frame.left),
            i32::from(frame.top),
            i32::from(frame.left) + i32::from(frame.width),
            i32::from(frame.top) + i32::from(frame.height),
        );
        let mut pixels = Paletted::new(rect, palette(colors, frame.transparent));
        if frame.buffer.len() != pixels.pixels.pix.len() {
            return Err(decode_error("frame buffer does not match its size").into());
        }
        pixels.pixels.pix.copy_from_slice(&frame.buffer);
        frames.push(Frame {
            buf: PixelBuffer::Paletted(pixels),
            delay: frame.delay,
            dispose: frame.dispose,
            transparent: frame.transparent,
        });
    }
    // The loop extension is only seen once frames are being read.
    let repeat = decoder.repeat();
    Ok(Animation { repeat, frames })
}

fn to_u16(v: i32, what: &str) -> Result<u16> {
    u16::try_from(v.max(0))
        .map_err(|_| ImageError::Process(format!("{what} {v} does not fit a GIF")).into())
}

fn encode(animation: &Animation) -> Result<Image> {
    let canvas = animation
        .frames
        .iter()
        .fold((0, 0), |(w, h), f| {
            let r = f.buf.bounds();
            (w.max(r.x1), h.max(r.y1))
        });
    let (width, height) = (to_u16(canvas.0, "width")?, to_u16(canvas.1, "height")?);

    let mut out = Vec::new();
    {
        let mut encoder =
            gif::Encoder::new(&mut out, width, height, &[]).map_err(encode_error)?;
        encoder.set_repeat(animation.repeat).map_err(encode_error)?;
        for frame in &animation.frames {
            let PixelBuffer::Paletted(p) = &frame.buf else {
                return Err(ImageError::Process("frame was not requantized".into()).into());
            };
            let rect = p.pixels.rect;
            let row = rect.width() as usize;
            let mut indices = Vec::with_capacity(row * rect.height() as usize);
            for y in 0..rect.height() as usize {
                let start = y * p.pixels.stride;
                indices.extend_from_slice(&p.pixels.pix[start..start + row]);
            }
            let colors: Vec<u8> = p.palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
            let out_frame = gif::Frame {
                left: to_u16(rect.x0, "left")?,
                top: to_u16(rect.y0, "top")?,
                width: to_u16(rect.width() as i32, "width")?,
                height: to_u16(rect.height() as i32, "height")?,
                delay: frame.delay,
                dispose: frame.dispose,
                transparent: frame.transparent,
                palette: Some(colors),
                buffer: Cow::Owned(indices),
                ..gif::Frame::default()
            };
            encoder.write_frame(&out_frame).map_err(encode_error)?;
        }
    }
    Ok(Image::new(FORMAT, out))
}

/// Map `out` back onto the palette of the frame it came from.
fn requantize(out: PixelBuffer, palette: Vec<[u8; 4]>, cancel: &CancelToken) -> Result<PixelBuffer> {
    if matches!(out, PixelBuffer::Paletted(_)) {
        return Ok(out);
    }
    let mut dst = PixelBuffer::Paletted(Paletted::new(out.bounds(), palette));
    copy_into(&out, &mut dst, cancel)?;
    Ok(dst)
}

/// Runs a processor over every frame of an animated GIF.
pub struct GifHandler {
    processor: Arc<dyn Processor>,
}

impl GifHandler {
    pub fn new(processor: Arc<dyn Processor>) -> Self {
        Self { processor }
    }
}

impl Handler for GifHandler {
    fn handle(&self, image: Image, params: &Params, cancel: &CancelToken) -> Result<Image> {
        if image.format() != FORMAT {
            return Err(ImageError::UnknownFormat(image.format().to_string()).into());
        }
        if params.has("format") && params.get_string("format")? != FORMAT {
            return Err(ParamError::invalid("format", "animated output is gif only").into());
        }
        if !self.processor.change(params) {
            return Ok(image);
        }

        let mut animation = decode(image.data())?;
        cancel.check()?;
        let frames = std::mem::take(&mut animation.frames);
        animation.frames = frames
            .into_par_iter()
            .map(|frame| {
                let palette = match &frame.buf {
                    PixelBuffer::Paletted(p) => p.palette.clone(),
                    _ => Vec::new(),
                };
                let buf = self.processor.process(frame.buf, params, cancel)?;
                Ok(Frame {
                    buf: requantize(buf, palette, cancel)?,
                    ..frame
                })
            })
            .collect::<Result<_>>()?;
        debug!(frames = animation.frames.len(), "processed animation");
        encode(&animation)
    }
}

/// Sends GIF-to-GIF requests to the animation handler and everything else
/// to the still-image handler.
pub struct FallbackHandler {
    animated: Arc<dyn Handler>,
    still: Arc<dyn Handler>,
}

impl FallbackHandler {
    pub fn new(animated: Arc<dyn Handler>, still: Arc<dyn Handler>) -> Self {
        Self { animated, still }
    }
}

fn wants_gif(params: &Params) -> bool {
    match params.get("format") {
        Err(_) => true,
        Ok(Value::String(f)) => f == FORMAT,
        // Let the still handler report the bad type.
        Ok(_) => false,
    }
}

impl Handler for FallbackHandler {
    fn handle(&self, image: Image, params: &Params, cancel: &CancelToken) -> Result<Image> {
        if image.format() == FORMAT && wants_gif(params) {
            self.animated.handle(image, params, cancel)
        } else {
            self.still.handle(image, params, cancel)
        }
    }
}

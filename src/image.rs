//! The immutable image value passed along the server chain.
//!
//! An [`Image`] is a format tag (`"jpeg"`, `"png"`, ...) plus an opaque
//! encoded payload. It is cheap to clone: the payload lives behind an
//! `Arc<[u8]>` and a clone only bumps a reference count, so the same value can
//! be handed to a caller and to a background cache write at once.
//!
//! ## Binary form
//!
//! ```text
//! u32 LE len(format) | format bytes | u32 LE len(data) | data bytes
//! ```
//!
//! [`Image::unmarshal`] copies the payload out of the input.
//! [`Image::unmarshal_shared`] keeps a window into the caller's buffer
//! instead, which is what cache reads use: a file or network read produces
//! a fresh buffer that nobody else touches, so aliasing it saves a copy of the
//! largest part of the record.

use crate::error::ImageError;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Maximum length of the format tag in bytes.
pub const MAX_FORMAT_LEN: usize = 1 << 8;

/// Maximum length of the payload in bytes (1 GiB).
pub const MAX_DATA_LEN: usize = 1 << 30;

/// An encoded image: format tag and payload bytes.
#[derive(Clone)]
pub struct Image {
    format: String,
    buf: Arc<[u8]>,
    range: Range<usize>,
}

impl Image {
    pub fn new(format: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        let len = data.len();
        Self {
            format: format.into(),
            buf: Arc::from(data),
            range: 0..len,
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[self.range.clone()]
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// True when both values share the same payload allocation.
    pub fn same_payload(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.buf, &other.buf) && self.range == other.range
    }

    /// Encode to the binary form.
    pub fn marshal(&self) -> Result<Vec<u8>, ImageError> {
        if self.format.len() > MAX_FORMAT_LEN {
            return Err(ImageError::FormatTooLong(self.format.len()));
        }
        if self.len() > MAX_DATA_LEN {
            return Err(ImageError::DataTooLong(self.len()));
        }
        let mut out = Vec::with_capacity(8 + self.format.len() + self.len());
        out.extend_from_slice(&(self.format.len() as u32).to_le_bytes());
        out.extend_from_slice(self.format.as_bytes());
        out.extend_from_slice(&(self.len() as u32).to_le_bytes());
        out.extend_from_slice(self.data());
        Ok(out)
    }

    /// Decode from the binary form, copying the payload.
    pub fn unmarshal(input: &[u8]) -> Result<Self, ImageError> {
        let layout = Layout::parse(input)?;
        Ok(Self::new(
            layout.format,
            input[layout.data.clone()].to_vec(),
        ))
    }

    /// Decode from the binary form, keeping the payload as a window into
    /// `input` instead of copying it.
    pub fn unmarshal_shared(input: Arc<[u8]>) -> Result<Self, ImageError> {
        let layout = Layout::parse(&input)?;
        Ok(Self {
            format: layout.format,
            buf: input,
            range: layout.data,
        })
    }
}

/// Where the fields of a marshaled image live in the input.
struct Layout {
    format: String,
    data: Range<usize>,
}

impl Layout {
    fn parse(input: &[u8]) -> Result<Self, ImageError> {
        let mut pos = 0;

        let format_len = read_len(input, &mut pos)?;
        if format_len > MAX_FORMAT_LEN {
            return Err(ImageError::FormatTooLong(format_len));
        }
        let format_bytes = take(input, &mut pos, format_len)?;
        let format = String::from_utf8(format_bytes.to_vec()).map_err(|e| ImageError::Decode {
            format: "binary".into(),
            message: format!("format tag is not UTF-8: {e}"),
        })?;

        let data_len = read_len(input, &mut pos)?;
        if data_len > MAX_DATA_LEN {
            return Err(ImageError::DataTooLong(data_len));
        }
        let start = pos;
        take(input, &mut pos, data_len)?;

        Ok(Self {
            format,
            data: start..pos,
        })
    }
}

fn read_len(input: &[u8], pos: &mut usize) -> Result<usize, ImageError> {
    let bytes = take(input, pos, 4)?;
    let mut le = [0u8; 4];
    le.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(le) as usize)
}

fn take<'a>(input: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], ImageError> {
    let end = pos.checked_add(n).ok_or(ImageError::UnexpectedEof)?;
    let bytes = input.get(*pos..end).ok_or(ImageError::UnexpectedEof)?;
    *pos = end;
    Ok(bytes)
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.format == other.format && self.data() == other.data()
    }
}

impl Eq for Image {}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("format", &self.format)
            .field("len", &self.len())
            .finish()
    }
}

//! Encoders, decoders and the registry that maps format names to them.
//!
//! The registry is an ordinary value built once at startup and handed to the
//! orchestrator; there is no process-wide table.

pub mod raster;

pub use raster::RasterCodec;

use crate::error::Result;
use crate::image::Image;
use crate::params::Params;
use crate::pixel::PixelBuffer;
use std::collections::HashMap;
use std::sync::Arc;

pub trait Decoder: Send + Sync {
    fn decode(&self, image: &Image) -> Result<PixelBuffer>;
}

pub trait Encoder: Send + Sync {
    fn encode(&self, buf: &PixelBuffer, params: &Params) -> Result<Image>;

    /// Whether re-encoding an image already in this format would alter it
    /// (a quality override, for instance).
    fn change(&self, params: &Params) -> bool;
}

/// Format name to codec.
#[derive(Default, Clone)]
pub struct CodecRegistry {
    encoders: HashMap<String, Arc<dyn Encoder>>,
    decoders: HashMap<String, Arc<dyn Decoder>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the raster codecs for every built-in format.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for codec in RasterCodec::all() {
            let codec = Arc::new(codec);
            registry.register_decoder(codec.name(), codec.clone());
            registry.register_encoder(codec.name(), codec);
        }
        registry
    }

    /// Register (or replace) the encoder for `format`.
    pub fn register_encoder(&mut self, format: impl Into<String>, encoder: Arc<dyn Encoder>) {
        self.encoders.insert(format.into(), encoder);
    }

    pub fn register_decoder(&mut self, format: impl Into<String>, decoder: Arc<dyn Decoder>) {
        self.decoders.insert(format.into(), decoder);
    }

    pub fn encoder(&self, format: &str) -> Option<&Arc<dyn Encoder>> {
        self.encoders.get(format)
    }

    pub fn decoder(&self, format: &str) -> Option<&Arc<dyn Decoder>> {
        self.decoders.get(format)
    }

    /// Formats that can be encoded, sorted.
    pub fn formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.encoders.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_builtin_formats() {
        let registry = CodecRegistry::with_defaults();
        assert_eq!(registry.formats(), vec!["bmp", "gif", "jpeg", "png", "tiff"]);
        assert!(registry.decoder("png").is_some());
        assert!(registry.encoder("webp").is_none());
    }

    #[test]
    fn registration_replaces() {
        let mut registry = CodecRegistry::new();
        assert!(registry.formats().is_empty());
        registry.register_encoder("png", Arc::new(RasterCodec::png()));
        registry.register_encoder("png", Arc::new(RasterCodec::jpeg()));
        assert_eq!(registry.formats(), vec!["png"]);
        // The JPEG encoder reacts to quality, the PNG one does not.
        let quality = Params::new().with("quality", 50);
        assert!(registry.encoder("png").is_some_and(|e| e.change(&quality)));
    }
}

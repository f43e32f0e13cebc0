//! # imageserver
//!
//! Building blocks for serving transformed images: fetch source bytes,
//! decode, transform and re-encode them when (and only when) the request
//! asks for a change, and cache both sources and results across tiers.
//!
//! # Architecture: A Chain of Servers
//!
//! Every layer implements the same one-method contract, [`server::Server`]:
//! a request descriptor in, an encoded [`image::Image`] out. Layers wrap each
//! other, and each either answers on its own or asks the layer below:
//!
//! ```text
//! CacheServer(results)                 key = hash(whole descriptor)
//!   └─ HandlerServer                   decode → process → encode, or skip
//!        └─ CacheServer(sources)       key = hash(source)
//!             └─ FileProvider          bytes from disk
//! ```
//!
//! The chain is assembled once ([`chain::Chain::from_config`]) and never
//! changes while serving.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`params`] | Request descriptors: nested typed maps with a canonical string form |
//! | [`image`] | The immutable encoded image and its binary form |
//! | [`error`] | Parameter / image / miss / internal error taxonomy |
//! | [`cancel`] | Cancellation tokens with deadlines |
//! | [`pixel`] | Uniform straight-alpha access to a dozen buffer layouts, parallel bands |
//! | [`processor`] | Pixel transforms with cheap change detection |
//! | [`codec`] | Encoders, decoders and the format registry |
//! | [`pipeline`] | The decode/process/encode orchestrator |
//! | [`animated`] | Frame-by-frame GIF processing |
//! | [`exec`] | External-program transforms with kill-on-timeout |
//! | [`cache`] | Cache contract, key generation, tiers and composites |
//! | [`tasks`] | Bounded background pool for fire-and-forget writes |
//! | [`server`] | The server and handler contracts |
//! | [`provider`] | Source providers |
//! | [`config`] | TOML configuration loading, merging and validation |
//! | [`chain`] | Builds the standard chain from configuration |
//!
//! # Design Decisions
//!
//! ## Change Detection Before Decoding
//!
//! Every processor and encoder answers `change(params)` without touching
//! pixels. When the output format equals the input format and nobody would
//! change anything, the orchestrator hands back the source image itself.
//! Most cache misses for already-right images therefore cost one file read.
//!
//! ## One Pixel Vocabulary
//!
//! Decoders produce whatever layout the codec likes (YCbCr from JPEG,
//! paletted from GIF, 16-bit gray from PNG). Processors never match on it:
//! [`pixel::new_at_func`] and [`pixel::new_set_func`] return closures
//! specialised once per buffer that read and write straight-alpha 16-bit
//! colour. A new transform is a double loop; a new layout is one more arm in
//! the factories.
//!
//! ## Bounded Background Writes
//!
//! Backfills and asynchronous sets run on a [`tasks::TaskPool`] with a fixed
//! number of in-flight slots. A write that finds the pool full is dropped and
//! reported, never queued without bound. A cache is an optimisation; losing a
//! write costs one recomputation later.
//!
//! ## Explicit Codec Registry
//!
//! Formats are looked up in a [`codec::CodecRegistry`] value that is built at
//! startup and passed to the orchestrator. Tests build registries holding
//! counting mocks; nothing global needs resetting.

pub mod animated;
pub mod cache;
pub mod cancel;
pub mod chain;
pub mod codec;
pub mod config;
pub mod error;
pub mod exec;
pub mod image;
pub mod params;
pub mod pipeline;
pub mod pixel;
pub mod processor;
pub mod provider;
pub mod server;
pub mod tasks;

pub use error::{Error, Result};
pub use image::Image;
pub use params::Params;

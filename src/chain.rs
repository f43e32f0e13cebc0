//! Assembles a server chain from [`ServerConfig`].
//!
//! ```text
//! result cache ─► handler ─► source cache ─► file provider
//! ```
//!
//! Both caches use the same physical tiers (memory, then file), told apart
//! by key prefix. Source entries are keyed by the `source` value alone,
//! result entries by the whole descriptor.

use crate::animated::{FallbackHandler, GifHandler};
use crate::cache::{
    AsyncCache, Cache, CacheServer, FileCache, KeyGenerator, ListCache, MemoryCache,
    ParamsHashKeyGenerator, PrefixCache, SourceHashKeyGenerator,
};
use crate::codec::CodecRegistry;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::exec::CommandHandler;
use crate::pipeline::ImageHandler;
use crate::processor::{
    GammaProcessor, GrayscaleProcessor, LimitProcessor, ListProcessor, Processor,
    ResizeProcessor, ScopedProcessor,
};
use crate::provider::FileProvider;
use crate::server::{Handler, HandlerServer, Server};
use crate::tasks::TaskPool;
use std::sync::Arc;
use tracing::info;

/// Worker threads for background cache writes.
const BACKGROUND_THREADS: usize = 2;

/// A ready-to-use server plus the pieces callers may want to inspect.
pub struct Chain {
    pub server: Arc<dyn Server>,
    pub result_keys: Arc<dyn KeyGenerator>,
    pub pool: Arc<TaskPool>,
}

impl Chain {
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let pool = Arc::new(TaskPool::new(
            BACKGROUND_THREADS,
            config.processing.background_writes,
        )?);

        let mut tiers: Vec<Arc<dyn Cache>> = Vec::new();
        if config.cache.memory.max_bytes > 0 {
            tiers.push(Arc::new(MemoryCache::new(config.cache.memory.max_bytes)));
        }
        if let Some(dir) = &config.cache.file.dir {
            tiers.push(Arc::new(FileCache::new(dir)?));
        }
        info!(tiers = tiers.len(), "cache tiers ready");

        let mut server: Arc<dyn Server> = Arc::new(FileProvider::new(&config.source.root));
        if let Some(cache) = region(&tiers, &config.cache.source_prefix, &pool) {
            server = Arc::new(CacheServer::new(
                server,
                cache,
                Arc::new(SourceHashKeyGenerator::<sha2::Sha256>::new()),
            ));
        }

        server = Arc::new(HandlerServer::new(server, handler(config)));

        let result_keys: Arc<dyn KeyGenerator> =
            Arc::new(ParamsHashKeyGenerator::<sha2::Sha256>::new());
        if let Some(cache) = region(&tiers, &config.cache.result_prefix, &pool) {
            server = Arc::new(CacheServer::new(server, cache, result_keys.clone()));
        }

        Ok(Self {
            server,
            result_keys,
            pool,
        })
    }
}

/// One logical cache over the shared tiers.
fn region(tiers: &[Arc<dyn Cache>], prefix: &str, pool: &Arc<TaskPool>) -> Option<Arc<dyn Cache>> {
    let prefixed: Vec<Arc<dyn Cache>> = tiers
        .iter()
        .map(|t| Arc::new(PrefixCache::new(prefix, t.clone())) as Arc<dyn Cache>)
        .collect();
    match prefixed.len() {
        0 => None,
        1 => Some(Arc::new(AsyncCache::new(prefixed[0].clone(), pool.clone()))),
        _ => Some(Arc::new(ListCache::new(prefixed, pool.clone()))),
    }
}

/// Built-in processors, or the configured external program.
///
/// Resize parameters are read at the top level (`width=100`) and under the
/// `resize` scope (`resize.width=100`).
fn handler(config: &ServerConfig) -> Arc<dyn Handler> {
    if let Some(program) = &config.exec.program {
        return Arc::new(CommandHandler::new(
            program.clone(),
            config.exec.args.clone(),
            config.exec.timeout(),
        ));
    }
    let transforms: Arc<dyn Processor> = Arc::new(ListProcessor::new(vec![
        Arc::new(ResizeProcessor::new()),
        Arc::new(ScopedProcessor::new("resize", Arc::new(ResizeProcessor::new()))),
        Arc::new(GrayscaleProcessor::new()),
    ]));
    let processor: Arc<dyn Processor> = Arc::new(LimitProcessor::new(
        config.processing.max_concurrent_transforms,
        Arc::new(GammaProcessor::new(
            transforms,
            config.processing.gamma_correction,
        )),
    ));
    let codecs = Arc::new(CodecRegistry::with_defaults());
    Arc::new(FallbackHandler::new(
        Arc::new(GifHandler::new(processor.clone())),
        Arc::new(ImageHandler::new(codecs).with_processor(processor)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::codec::{Decoder, Encoder, RasterCodec};
    use crate::params::Params;
    use crate::pixel::{Color, Layout, PixelBuffer, Rect, map_pixels};
    use std::fs;
    use tempfile::TempDir;

    fn write_png(dir: &std::path::Path, name: &str, w: u32, h: u32) {
        let mut buf = PixelBuffer::new(Layout::Nrgba, Rect::from_size(w, h));
        map_pixels(&mut buf, &CancelToken::new(), |_| Color::from_rgba8(90, 120, 200, 255)).unwrap();
        let image = RasterCodec::png().encode(&buf, &Params::new()).unwrap();
        fs::write(dir.join(name), image.data()).unwrap();
    }

    fn config(tmp: &TempDir) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.source.root = tmp.path().join("images");
        config.cache.file.dir = Some(tmp.path().join("cache"));
        fs::create_dir_all(&config.source.root).unwrap();
        config
    }

    #[test]
    fn serves_resized_image_and_caches_it() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        write_png(&config.source.root, "a.png", 40, 20);
        let chain = Chain::from_config(&config).unwrap();

        let params = Params::new().with("source", "a.png").with("width", 10);
        let image = chain.server.get(&params, &CancelToken::new()).unwrap();
        assert_eq!(image.format(), "png");
        let decoded = RasterCodec::png().decode(&image).unwrap();
        assert_eq!(decoded.bounds(), Rect::from_size(10, 5));

        chain.pool.wait_idle();
        let key = format!("result:{}", chain.result_keys.key(&params));
        let cached = FileCache::new(tmp.path().join("cache")).unwrap();
        assert!(cached.path_for(&key).exists());
    }

    #[test]
    fn scoped_resize_parameters_resize() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        write_png(&config.source.root, "a.png", 40, 20);
        let chain = Chain::from_config(&config).unwrap();

        let mut params = Params::new();
        params.parse_pair("source=a.png").unwrap();
        params.parse_pair("resize.width=10").unwrap();
        let image = chain.server.get(&params, &CancelToken::new()).unwrap();
        let decoded = RasterCodec::png().decode(&image).unwrap();
        assert_eq!(decoded.bounds(), Rect::from_size(10, 5));
    }

    #[test]
    fn scoped_parameter_errors_carry_the_scope() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        write_png(&config.source.root, "a.png", 40, 20);
        let chain = Chain::from_config(&config).unwrap();

        let params = Params::new()
            .with("source", "a.png")
            .with("resize", Params::new().with("width", "wide"));
        let err = chain.server.get(&params, &CancelToken::new()).unwrap_err();
        assert!(
            matches!(err, crate::error::Error::Param(ref e) if e.param == "resize.width"),
            "{err:?}"
        );
    }

    #[test]
    fn untouched_request_returns_source_bytes() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        write_png(&config.source.root, "a.png", 4, 4);
        let chain = Chain::from_config(&config).unwrap();
        let image = chain
            .server
            .get(&Params::new().with("source", "a.png"), &CancelToken::new())
            .unwrap();
        assert_eq!(image.data(), &fs::read(config.source.root.join("a.png")).unwrap()[..]);
    }

    #[test]
    fn works_without_any_cache() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(&tmp);
        config.cache.file.dir = None;
        config.cache.memory.max_bytes = 0;
        write_png(&config.source.root, "a.png", 8, 8);
        let chain = Chain::from_config(&config).unwrap();
        let params = Params::new()
            .with("source", "a.png")
            .with("format", "jpeg")
            .with("grayscale", true);
        let image = chain.server.get(&params, &CancelToken::new()).unwrap();
        assert_eq!(image.format(), "jpeg");
        assert!(!tmp.path().join("cache").exists());
    }

    #[cfg(unix)]
    #[test]
    fn external_program_replaces_builtin_handler() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(&tmp);
        config.exec.program = Some("cat".into());
        fs::write(config.source.root.join("a.gif"), b"GIF89a-not-really").unwrap();
        let chain = Chain::from_config(&config).unwrap();
        let image = chain
            .server
            .get(&Params::new().with("source", "a.gif"), &CancelToken::new())
            .unwrap();
        assert_eq!(image.data(), b"GIF89a-not-really");
    }
}

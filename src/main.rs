use clap::{Parser, Subcommand};
use imageserver::cache::{KeyGenerator, ParamsHashKeyGenerator};
use imageserver::cancel::CancelToken;
use imageserver::chain::Chain;
use imageserver::config;
use imageserver::params::Params;
use imageserver::server::Server;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let hash = env!("IMAGESERVER_GIT_HASH");
    if hash.is_empty() {
        env!("CARGO_PKG_VERSION")
    } else {
        // Leaked once at startup
        Box::leak(format!("{}@{hash}", env!("CARGO_PKG_VERSION")).into_boxed_str())
    }
}

/// Request parameters given as repeated `-p key=value`.
#[derive(clap::Args, Clone)]
struct RequestArgs {
    /// Request parameter; dotted keys build nested descriptors (resize.width=100)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

impl RequestArgs {
    fn descriptor(&self) -> Result<Params, imageserver::error::ParamError> {
        let mut params = Params::new();
        for pair in &self.params {
            params.parse_pair(pair)?;
        }
        Ok(params)
    }
}

#[derive(Parser)]
#[command(name = "imageserver")]
#[command(about = "Fetch, transform and cache images")]
#[command(long_about = "\
Fetch, transform and cache images

Requests are descriptors built from -p key=value pairs:

  source=photos/a.jpg   file below [source] root (required)
  width=100 height=80   resize; a missing side keeps the aspect ratio
  resize.width=100      the same, scoped under resize
  filter=lanczos3       nearest, triangle, catmull_rom, gaussian, lanczos3
  grayscale=true        drop colour
  format=png            jpeg, png, gif, bmp, tiff (default: source format)
  quality=80            JPEG quality 1-100
  gamma_correction=true resize in linear light

Requests that change nothing return the source bytes untouched.

Run 'imageserver gen-config' to generate a documented config file.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (stock defaults when missing)
    #[arg(long, default_value = "imageserver.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve one request through the full chain
    Get {
        #[command(flatten)]
        request: RequestArgs,
        /// Write the image here instead of printing a summary only
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Print the result cache key for a request
    Key {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Get {
            request,
            output,
            timeout_ms,
        } => {
            let config = config::load_config(&cli.config)?;
            init_thread_pool(&config.processing);
            let chain = Chain::from_config(&config)?;
            let params = request.descriptor()?;
            let cancel = match timeout_ms {
                Some(ms) => CancelToken::with_timeout(Duration::from_millis(ms)),
                None => CancelToken::new(),
            };
            let image = chain.server.get(&params, &cancel)?;
            if let Some(path) = &output {
                std::fs::write(path, image.data())?;
                info!(path = %path.display(), "written");
            }
            let key = chain.result_keys.key(&params);
            let summary = serde_json::json!({
                "key": format!("{}{key}", config.cache.result_prefix),
                "params": params,
                "format": image.format(),
                "bytes": image.len(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            // Let background cache writes land before exiting.
            chain.pool.wait_idle();
        }
        Command::Key { request } => {
            let config = config::load_config(&cli.config)?;
            let params = request.descriptor()?;
            let keys = ParamsHashKeyGenerator::<sha2::Sha256>::new();
            println!("{}{}", config.cache.result_prefix, keys.key(&params));
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; users can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

//! Server configuration.
//!
//! Loads, merges and validates the TOML file that wires a server chain
//! together. Stock defaults are serialized to a TOML table and the user's
//! file is merged on top, so a file only needs the keys it changes.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [source]
//! root = "images"               # Directory the file provider serves from
//!
//! [cache]
//! source_prefix = "source:"     # Namespace for cached source images
//! result_prefix = "result:"     # Namespace for cached results
//!
//! [cache.memory]
//! max_bytes = 67108864          # In-process LRU budget, 0 disables the tier
//!
//! [cache.file]
//! # dir = "cache"               # On-disk tier, omit to disable
//!
//! [processing]
//! # max_processes = 4           # Pixel worker threads (omit for auto = CPU cores)
//! max_concurrent_transforms = 4 # Transforms allowed to run at once
//! background_writes = 256       # Cache writes allowed in flight
//! gamma_correction = false      # Resize in linear light unless a request says otherwise
//!
//! [exec]
//! # program = "convert"         # Pipe images through this program instead
//! # args = ["-", "-resize", "{width}x{height}", "-"]
//! timeout_ms = 30000
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Everything needed to assemble a server chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub source: SourceConfig,
    pub cache: CacheConfig,
    pub processing: ProcessingConfig,
    pub exec: ExecConfig,
}

impl ServerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.max_concurrent_transforms == 0 {
            return Err(ConfigError::Validation(
                "processing.max_concurrent_transforms must be at least 1".into(),
            ));
        }
        if self.processing.background_writes == 0 {
            return Err(ConfigError::Validation(
                "processing.background_writes must be at least 1".into(),
            ));
        }
        if self.cache.source_prefix == self.cache.result_prefix {
            return Err(ConfigError::Validation(
                "cache.source_prefix and cache.result_prefix must differ".into(),
            ));
        }
        if self.exec.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "exec.timeout_ms must be positive".into(),
            ));
        }
        if self.exec.program.is_none() && !self.exec.args.is_empty() {
            return Err(ConfigError::Validation(
                "exec.args given without exec.program".into(),
            ));
        }
        Ok(())
    }
}

/// Where source images come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub root: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("images"),
        }
    }
}

/// Cache tiers and key namespaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub source_prefix: String,
    pub result_prefix: String,
    pub memory: MemoryCacheConfig,
    pub file: FileCacheConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            source_prefix: "source:".into(),
            result_prefix: "result:".into(),
            memory: MemoryCacheConfig::default(),
            file: FileCacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryCacheConfig {
    /// Total bytes of keys and images held; `0` disables the tier.
    pub max_bytes: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 64 << 20,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileCacheConfig {
    pub dir: Option<PathBuf>,
}

/// Parallelism and back-pressure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of pixel worker threads.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Transforms allowed to run at once; further requests wait.
    pub max_concurrent_transforms: usize,
    /// Background cache writes allowed in flight; further writes are dropped.
    pub background_writes: usize,
    /// Default for the `gamma_correction` request parameter.
    pub gamma_correction: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            max_concurrent_transforms: 4,
            background_writes: 256,
            gamma_correction: false,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.clamp(1, cores)).unwrap_or(cores)
}

/// External transform program.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecConfig {
    pub program: Option<String>,
    /// Arguments; `{key}` is replaced by the request parameter `key`.
    pub args: Vec<String>,
    pub timeout_ms: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            timeout_ms: 30_000,
        }
    }
}

impl ExecConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ServerConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ServerConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ServerConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, or stock defaults when it does not exist.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imageserver configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Source images
# ---------------------------------------------------------------------------
[source]
# Directory that the "source" request parameter is relative to.
root = "images"

# ---------------------------------------------------------------------------
# Caching
# ---------------------------------------------------------------------------
[cache]
# Key namespaces. Source images and transformed results share the same
# tiers, so the two prefixes must differ.
source_prefix = "source:"
result_prefix = "result:"

[cache.memory]
# In-process LRU budget in bytes (keys plus encoded images).
# 0 disables the memory tier.
max_bytes = 67108864

[cache.file]
# On-disk tier, one file per key. Omit to disable.
# dir = "cache"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Pixel worker threads.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Transforms allowed to run at the same time. Further requests wait.
max_concurrent_transforms = 4

# Background cache writes allowed in flight. Writes beyond this are dropped
# (and logged) rather than queued.
background_writes = 256

# Resize in linear light. Requests can override with gamma_correction=true|false.
gamma_correction = false

# ---------------------------------------------------------------------------
# External transform
# ---------------------------------------------------------------------------
[exec]
# Pipe images through a program (stdin to stdout) instead of the built-in
# processors. "{key}" in an argument is replaced by the request parameter.
# program = "convert"
# args = ["-", "-resize", "{width}x{height}", "-"]

# Kill the program after this many milliseconds.
timeout_ms = 30000
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = ServerConfig::default();
        assert_eq!(config.source.root, PathBuf::from("images"));
        assert_eq!(config.cache.memory.max_bytes, 64 << 20);
        assert!(config.cache.file.dir.is_none());
        assert_eq!(config.processing.max_concurrent_transforms, 4);
        assert_eq!(config.exec.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[cache.file]
dir = "/var/cache/images"
"#;
        let config: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.file.dir, Some(PathBuf::from("/var/cache/images")));
        assert_eq!(config.cache.result_prefix, "result:");
        assert_eq!(config.source.root, PathBuf::from("images"));
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("imageserver.toml")).unwrap();
        assert_eq!(config.cache.source_prefix, "source:");
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imageserver.toml");
        fs::write(
            &path,
            r#"
[source]
root = "/srv/photos"

[processing]
max_concurrent_transforms = 2
gamma_correction = true

[exec]
program = "convert"
args = ["-", "-resize", "{width}", "-"]
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.source.root, PathBuf::from("/srv/photos"));
        assert_eq!(config.processing.max_concurrent_transforms, 2);
        assert!(config.processing.gamma_correction);
        assert_eq!(config.processing.background_writes, 256);
        assert_eq!(config.exec.program.as_deref(), Some("convert"));
        assert_eq!(config.exec.args.len(), 4);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imageserver.toml");
        fs::write(&path, "[cache\nmax_bytes = ").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // Processing config tests
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig::default();
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
            ..ProcessingConfig::default()
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
            ..ProcessingConfig::default()
        };
        assert_eq!(effective_threads(&config), 1);
        let config = ProcessingConfig {
            max_processes: Some(0),
            ..ProcessingConfig::default()
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str(r#"timeout_ms = 100"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"timeout_ms = 200"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("timeout_ms").unwrap().as_integer(), Some(200));
    }

    #[test]
    fn merge_toml_deep_nested() {
        let base: toml::Value = toml::from_str(
            r#"
[cache]
source_prefix = "s:"

[cache.memory]
max_bytes = 10
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[cache.memory]
max_bytes = 20
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let cache = merged.get("cache").unwrap();
        assert_eq!(cache.get("source_prefix").unwrap().as_str(), Some("s:"));
        assert_eq!(
            cache.get("memory").unwrap().get("max_bytes").unwrap().as_integer(),
            Some(20)
        );
    }

    // =========================================================================
    // Unknown key rejection tests
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let toml = r#"
[cache.memory]
max_bytez = 10
"#;
        let result: Result<ServerConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str("[redis]\nurl = \"x\"\n");
        assert!(result.is_err());
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let mut config = ServerConfig::default();
        config.processing.max_concurrent_transforms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = ServerConfig::default();
        config.processing.background_writes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = ServerConfig::default();
        config.exec.timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_shared_prefix() {
        let mut config = ServerConfig::default();
        config.cache.result_prefix = config.cache.source_prefix.clone();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_args_without_program() {
        let mut config = ServerConfig::default();
        config.exec.args = vec!["-".into()];
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn resolve_config_rejects_invalid_values() {
        let base = stock_defaults_value().unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[processing]
max_concurrent_transforms = 0
"#,
        )
        .unwrap();
        let result = resolve_config(base, Some(overlay));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: ServerConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = ServerConfig::default();
        assert_eq!(config.source.root, defaults.source.root);
        assert_eq!(config.cache.memory.max_bytes, defaults.cache.memory.max_bytes);
        assert_eq!(config.cache.source_prefix, defaults.cache.source_prefix);
        assert_eq!(
            config.processing.background_writes,
            defaults.processing.background_writes
        );
        assert_eq!(config.exec.timeout_ms, defaults.exec.timeout_ms);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in ["[source]", "[cache]", "[cache.memory]", "[cache.file]", "[processing]", "[exec]"] {
            assert!(content.contains(section), "{section}");
        }
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value().unwrap();
        assert!(val.is_table());
        for section in ["source", "cache", "processing", "exec"] {
            assert!(val.get(section).is_some(), "{section}");
        }
    }
}

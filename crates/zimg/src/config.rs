//! Configuration loading.
//!
//! A YAML file with every field optional, taken from `--config <path>` or a
//! `zimg.yaml` in the working directory. The resolved [`Settings`] value is
//! created once in `main` and handed to the handlers through shared state.

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{Result, WrapErr};
use serde::Deserialize;

const CONFIG_FILE: &str = "zimg.yaml";

const DEFAULT_BIND: &str = "0.0.0.0:4869";
const DEFAULT_IMG_PATH: &str = "./img";
const DEFAULT_CACHE_MAX_SIZE: usize = 1024 * 1024;
const DEFAULT_CACHE_TOTAL_SIZE: usize = 64 * 1024 * 1024;
const DEFAULT_SHARD_BUCKETS: u32 = 1024;

/// Raw on-disk configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZimgConfig {
    /// Listen address, e.g. `127.0.0.1:4869`.
    pub bind: Option<String>,
    /// Root of the sharded image store.
    pub img_path: Option<Utf8PathBuf>,
    /// Welcome page served at `/`; a built-in page is used when absent.
    pub root_path: Option<Utf8PathBuf>,
    /// Per-entry hot-cache bound in bytes.
    pub cache_max_size: Option<usize>,
    /// Whole hot-cache byte budget.
    pub cache_total_size: Option<usize>,
    /// Fan-out range for both shard levels.
    pub shard_buckets: Option<u32>,
}

/// Resolved configuration with defaults applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub img_path: Utf8PathBuf,
    pub root_path: Option<Utf8PathBuf>,
    pub cache_max_size: usize,
    pub cache_total_size: usize,
    pub shard_buckets: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from_raw(ZimgConfig::default())
    }
}

impl Settings {
    /// Load from an explicit path, or from `zimg.yaml` in the working
    /// directory when present; defaults otherwise.
    pub fn load(config_path: Option<&Utf8Path>) -> Result<Self> {
        let raw = match config_path {
            Some(path) => parse_file(path)?,
            None => {
                let default = Utf8Path::new(CONFIG_FILE);
                if default.exists() {
                    parse_file(default)?
                } else {
                    ZimgConfig::default()
                }
            }
        };
        Ok(Settings::from_raw(raw))
    }

    fn from_raw(raw: ZimgConfig) -> Self {
        Settings {
            bind: raw.bind.unwrap_or_else(|| DEFAULT_BIND.to_string()),
            img_path: raw
                .img_path
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_IMG_PATH)),
            root_path: raw.root_path,
            cache_max_size: raw.cache_max_size.unwrap_or(DEFAULT_CACHE_MAX_SIZE),
            cache_total_size: raw.cache_total_size.unwrap_or(DEFAULT_CACHE_TOTAL_SIZE),
            shard_buckets: raw.shard_buckets.unwrap_or(DEFAULT_SHARD_BUCKETS).max(1),
        }
    }
}

fn parse_file(path: &Utf8Path) -> Result<ZimgConfig> {
    let content = fs_err::read_to_string(path.as_std_path())
        .wrap_err_with(|| format!("failed to read config file {path}"))?;
    serde_yaml::from_str(&content).wrap_err_with(|| format!("failed to parse {path}"))
}

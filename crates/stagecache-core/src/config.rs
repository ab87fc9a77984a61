//! Dataset configuration.
//!
//! Loaded from YAML, from the environment, or built in code:
//!
//! ```yaml
//! cache_mode: eager
//! storage:
//!   kind: durable
//!   dir: /var/cache/stagecache
//! workers: 8
//! cache_rate: 0.5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, DatasetResult};

/// Upper bound on eager population workers.
pub const MAX_WORKERS: usize = 256;

/// When (and whether) prefix results are computed and stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Full pipeline on every access.
    None,
    /// Every prefix computed during construction.
    Eager,
    /// Prefix computed on first access to an index.
    #[default]
    Lazy,
}

impl std::str::FromStr for CacheMode {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "eager" => Ok(Self::Eager),
            "lazy" => Ok(Self::Lazy),
            other => Err(DatasetError::config(format!(
                "unknown cache mode '{other}' (expected none, eager or lazy)"
            ))),
        }
    }
}

/// Where prefix results live.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-process; dropped with the dataset.
    #[default]
    Memory,
    /// On disk under `dir`; shared across instances and processes.
    Durable { dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    #[serde(default)]
    pub cache_mode: CacheMode,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Eager population parallelism, `1..=MAX_WORKERS`.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Cache at most this many leading indices.
    #[serde(default)]
    pub cache_limit: Option<usize>,

    /// Cache this fraction of leading indices (`0.0..=1.0`).
    #[serde(default)]
    pub cache_rate: Option<f64>,

    /// Cut the cached prefix after this many stages.
    #[serde(default)]
    pub max_cached_stages: Option<usize>,

    /// Seed for per-access draws; random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(MAX_WORKERS)
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            cache_mode: CacheMode::default(),
            storage: StorageConfig::default(),
            workers: default_workers(),
            cache_limit: None,
            cache_rate: None,
            max_cached_stages: None,
            seed: None,
        }
    }
}

impl DatasetConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `STAGECACHE_MODE` | `none`, `eager` or `lazy` |
    /// | `STAGECACHE_DIR` | Durable cache directory (memory when unset) |
    /// | `STAGECACHE_WORKERS` | Eager population workers |
    /// | `STAGECACHE_SEED` | Seed for per-access draws |
    pub fn from_env() -> DatasetResult<Self> {
        let mut cfg = Self::default();

        if let Ok(mode) = std::env::var("STAGECACHE_MODE") {
            cfg.cache_mode = mode.parse()?;
        }
        if let Ok(dir) = std::env::var("STAGECACHE_DIR") {
            if !dir.trim().is_empty() {
                cfg.storage = StorageConfig::Durable {
                    dir: PathBuf::from(dir),
                };
            }
        }
        if let Ok(workers) = std::env::var("STAGECACHE_WORKERS") {
            cfg.workers = workers.trim().parse().map_err(|_| {
                DatasetError::config(format!("STAGECACHE_WORKERS is not a number: '{workers}'"))
            })?;
        }
        if let Ok(seed) = std::env::var("STAGECACHE_SEED") {
            cfg.seed = Some(seed.trim().parse().map_err(|_| {
                DatasetError::config(format!("STAGECACHE_SEED is not a number: '{seed}'"))
            })?);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(s: &str) -> DatasetResult<Self> {
        let cfg: Self = serde_yaml::from_str(s)
            .map_err(|e| DatasetError::config(format!("invalid dataset config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> DatasetResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DatasetError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> DatasetResult<()> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(DatasetError::config(format!(
                "workers must be in 1..={MAX_WORKERS}, got {}",
                self.workers
            )));
        }
        if let Some(rate) = self.cache_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(DatasetError::config(format!(
                    "cache_rate must be within 0.0..=1.0, got {rate}"
                )));
            }
        }
        Ok(())
    }

    /// Number of leading indices that are cached for a dataset of `len`.
    pub fn cached_len(&self, len: usize) -> usize {
        if self.cache_mode == CacheMode::None {
            return 0;
        }
        let mut n = len;
        if let Some(limit) = self.cache_limit {
            n = n.min(limit);
        }
        if let Some(rate) = self.cache_rate {
            n = n.min((len as f64 * rate).floor() as usize);
        }
        n
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn with_durable_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage = StorageConfig::Durable { dir: dir.into() };
        self
    }

    pub fn with_memory(mut self) -> Self {
        self.storage = StorageConfig::Memory;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = Some(limit);
        self
    }

    pub fn with_cache_rate(mut self, rate: f64) -> Self {
        self.cache_rate = Some(rate);
        self
    }

    pub fn with_max_cached_stages(mut self, stages: usize) -> Self {
        self.max_cached_stages = Some(stages);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Default durable cache root.
///
/// Default: `<platform cache dir>/stagecache`
pub fn default_cache_dir() -> DatasetResult<PathBuf> {
    let base = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| DatasetError::Storage {
            message: "could not determine cache directory".to_string(),
        })?;

    Ok(base.join("stagecache"))
}

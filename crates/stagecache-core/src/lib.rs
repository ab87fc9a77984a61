//! Transform-caching dataset layer.
//!
//! Wraps a raw record source and a transform pipeline, caching the output of
//! the pipeline's deterministic prefix per index so that only the stochastic
//! suffix (augmentation and the like) runs on every access:
//!
//! - Pipeline splitting at the first stochastic stage
//! - Cache modes: none, eager (bounded worker pool), lazy
//! - Memory tier and durable on-disk tier with atomic, first-writer-wins publish
//! - Cache namespaces derived from the prefix stage identities
//! - Integrity verification of durable artifacts on every read
//!
//! # Quick Start
//!
//! ```no_run
//! use stagecache_core::{CacheMode, CachedDataset, Lambda, Pipeline, RandLambda};
//! use rand::Rng;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pipeline = Pipeline::new()
//!     .then(Lambda::new("square", |x: i64| Ok(x * x)))
//!     .then(RandLambda::new("jitter", |x: i64, ctx| Ok(x + ctx.rng().gen_range(0..3))));
//!
//! let ds = CachedDataset::builder(vec![4_i64, 9, 3], pipeline)
//!     .cache_mode(CacheMode::Eager)
//!     .durable("/tmp/stagecache")
//!     .workers(4)
//!     .build()
//!     .await?;
//!
//! let item = ds.get(1).await?;
//! println!("item 1 = {item}, namespace {}", ds.namespace());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `STAGECACHE_MODE` | `none`, `eager` or `lazy` (default: `lazy`) |
//! | `STAGECACHE_DIR` | Durable cache directory (default: memory tier) |
//! | `STAGECACHE_WORKERS` | Eager population workers (default: available cores) |
//! | `STAGECACHE_SEED` | Seed for per-access draws (default: random) |

pub mod codec;
pub mod config;
pub mod dataset;
mod digest;
pub mod error;
pub mod fingerprint;
mod memory;
mod populate;
pub mod record;
mod stats;
pub mod store;
pub mod transform;

// Re-export main types
pub use config::{default_cache_dir, CacheMode, DatasetConfig, StorageConfig, MAX_WORKERS};
pub use dataset::{CachedDataset, DatasetBuilder};
pub use error::{DatasetError, DatasetResult};
pub use fingerprint::{Fingerprint, ARTIFACT_FORMAT};
pub use record::{Record, Source};
pub use stats::StatsSnapshot;
pub use store::{
    ArtifactKey, ArtifactStore, DiskStore, NamespaceInfo, PipelineManifest, VerifyReport,
};
pub use transform::{Lambda, Pipeline, RandLambda, SplitPipeline, StageContext, Transform};

//! The cached transform dataset.
//!
//! `get(i)` returns `suffix(prefix(raw[i]))`, where the prefix output is
//! computed at most once per index and storage tier and the suffix runs on
//! a fresh copy on every call.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::codec;
use crate::config::{CacheMode, DatasetConfig, StorageConfig};
use crate::error::{DatasetError, DatasetResult};
use crate::fingerprint::{self, Fingerprint};
use crate::memory::MemoryTier;
use crate::populate;
use crate::record::{Record, Source};
use crate::stats::{CacheStats, StatsSnapshot};
use crate::store::{ArtifactKey, ArtifactStore, DiskStore};
use crate::transform::{Pipeline, SplitPipeline, StageContext};

pub(crate) enum Tier<R> {
    Off,
    Memory(MemoryTier<R>),
    Durable(Arc<dyn ArtifactStore>),
}

impl<R> Tier<R> {
    fn label(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Memory(_) => "memory",
            Self::Durable(_) => "durable",
        }
    }
}

pub(crate) struct Inner<R> {
    pub(crate) source: Arc<dyn Source<R>>,
    pub(crate) split: SplitPipeline<R>,
    pub(crate) fingerprint: Fingerprint,
    pub(crate) mode: CacheMode,
    pub(crate) tier: Tier<R>,
    pub(crate) len: usize,
    pub(crate) cached_len: usize,
    pub(crate) stats: CacheStats,
    draws: Mutex<StdRng>,
}

impl<R: Record> Inner<R> {
    pub(crate) fn check_index(&self, index: usize) -> DatasetResult<()> {
        if index >= self.len {
            return Err(DatasetError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        Ok(())
    }

    fn raw(&self, index: usize) -> DatasetResult<R> {
        self.source
            .get(index)
            .ok_or(DatasetError::IndexOutOfRange {
                index,
                len: self.source.len(),
            })
    }

    pub(crate) fn key(&self, index: usize) -> ArtifactKey {
        ArtifactKey::new(self.fingerprint.namespace.clone(), index)
    }

    /// Run the deterministic prefix on the raw record at `index`.
    fn compute_prefix(&self, index: usize) -> DatasetResult<R> {
        self.stats.prefix_run();
        let raw = self.raw(index)?;
        self.split.run_prefix(index, raw)
    }

    /// [`Self::compute_prefix`] on the blocking pool. A panicking stage is
    /// reported as a transform failure.
    pub(crate) async fn compute_prefix_blocking(
        self: &Arc<Self>,
        index: usize,
    ) -> DatasetResult<R> {
        let worker = self.clone();
        tokio::task::spawn_blocking(move || worker.compute_prefix(index))
            .await
            .unwrap_or_else(|e| {
                Err(DatasetError::Transform {
                    index,
                    stage: "<prefix>".to_string(),
                    message: format!("prefix computation panicked: {e}"),
                })
            })
    }

    fn next_seed(&self) -> u64 {
        let mut rng = self.draws.lock().unwrap_or_else(|p| p.into_inner());
        rng.gen()
    }

    fn reseed(&self, seed: u64) {
        let mut rng = self.draws.lock().unwrap_or_else(|p| p.into_inner());
        *rng = StdRng::seed_from_u64(seed);
    }

    /// Prefix output for `index` from storage, computing and storing it on a
    /// miss. `None` when the index is outside the cached range.
    async fn cached_prefix(self: &Arc<Self>, index: usize) -> DatasetResult<Option<R>> {
        if index >= self.cached_len {
            return Ok(None);
        }

        match &self.tier {
            Tier::Off => Ok(None),
            Tier::Memory(tier) => {
                if let Some(hit) = tier.get(index) {
                    self.stats.hit();
                    debug!(index, "memory cache hit");
                    return Ok(Some(R::clone(&hit)));
                }

                self.stats.miss();
                let record = self.compute_prefix_blocking(index).await?;
                let (stored, published) = tier.insert(index, record).ok_or(
                    DatasetError::IndexOutOfRange {
                        index,
                        len: self.cached_len,
                    },
                )?;
                self.stats.write(published);
                debug!(index, published, "memory cache miss");
                Ok(Some(R::clone(&stored)))
            }
            Tier::Durable(store) => {
                let key = self.key(index);
                if let Some(bytes) = store.read(&key).await? {
                    let record = codec::decode(&key.namespace, index, &bytes)?;
                    self.stats.hit();
                    debug!(key = %key, "durable cache hit");
                    return Ok(Some(record));
                }

                self.stats.miss();
                let record = self.compute_prefix_blocking(index).await?;
                let bytes = codec::encode(&key.namespace, index, &record)?;
                let published = store.write_if_absent(&key, &bytes).await?;
                self.stats.write(published);
                debug!(key = %key, published, "durable cache miss");
                Ok(Some(record))
            }
        }
    }
}

/// Fixed-length, randomly indexable view over a raw source with cached
/// preprocessing.
///
/// Clones share the source, the cache and the counters, so one instance can
/// serve many concurrent consumers.
pub struct CachedDataset<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for CachedDataset<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Record> CachedDataset<R> {
    pub fn builder<S>(source: S, pipeline: Pipeline<R>) -> DatasetBuilder<R>
    where
        S: Source<R> + 'static,
    {
        Self::builder_shared(Arc::new(source), pipeline)
    }

    pub fn builder_shared(source: Arc<dyn Source<R>>, pipeline: Pipeline<R>) -> DatasetBuilder<R> {
        DatasetBuilder {
            source,
            pipeline,
            config: DatasetConfig::default(),
            store: None,
        }
    }

    /// Build straight from a config.
    pub async fn from_config<S>(
        source: S,
        pipeline: Pipeline<R>,
        config: DatasetConfig,
    ) -> DatasetResult<Self>
    where
        S: Source<R> + 'static,
    {
        Self::builder(source, pipeline).config(config).build().await
    }

    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Record at `index`, with one fresh draw for the stochastic stages.
    pub async fn get(&self, index: usize) -> DatasetResult<R> {
        self.inner.check_index(index)?;
        let seed = self.inner.next_seed();
        self.get_with_seed(index, seed).await
    }

    /// Record at `index` using a caller-supplied draw.
    pub async fn get_with_seed(&self, index: usize, seed: u64) -> DatasetResult<R> {
        let inner = &self.inner;
        inner.check_index(index)?;
        let ctx = StageContext::new(index, seed);

        match inner.cached_prefix(index).await? {
            Some(prefix) => inner.split.run_suffix(prefix, &ctx),
            None => {
                inner.stats.uncached();
                let raw = inner.raw(index)?;
                inner.split.run_full(raw, &ctx)
            }
        }
    }

    /// Records for `indices`, in request order.
    ///
    /// Every index is range-checked before any work starts.
    pub async fn get_batch(&self, indices: &[usize]) -> DatasetResult<Vec<R>> {
        for &index in indices {
            self.inner.check_index(index)?;
        }
        let mut out = Vec::with_capacity(indices.len());
        for &index in indices {
            out.push(self.get(index).await?);
        }
        Ok(out)
    }

    /// Restart the per-access draw sequence from `seed`.
    pub fn reseed(&self, seed: u64) {
        self.inner.reseed(seed);
    }

    /// Namespace keying this dataset's cache entries.
    pub fn namespace(&self) -> &str {
        &self.inner.fingerprint.namespace
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.inner.fingerprint
    }

    pub fn split(&self) -> &SplitPipeline<R> {
        &self.inner.split
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.inner.mode
    }

    /// Number of leading indices that go through the cache.
    pub fn cached_len(&self) -> usize {
        self.inner.cached_len
    }

    /// Filled memory slots; zero for other tiers.
    pub fn memory_entries(&self) -> usize {
        match &self.inner.tier {
            Tier::Memory(tier) => tier.filled(),
            _ => 0,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl<R> std::fmt::Debug for CachedDataset<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedDataset")
            .field("len", &self.inner.len)
            .field("mode", &self.inner.mode)
            .field("tier", &self.inner.tier.label())
            .field("namespace", &self.inner.fingerprint.namespace)
            .field("split", &self.inner.split)
            .finish()
    }
}

/// Builder for [`CachedDataset`].
pub struct DatasetBuilder<R> {
    source: Arc<dyn Source<R>>,
    pipeline: Pipeline<R>,
    config: DatasetConfig,
    store: Option<Arc<dyn ArtifactStore>>,
}

impl<R: Record> DatasetBuilder<R> {
    pub fn config(mut self, config: DatasetConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.config.cache_mode = mode;
        self
    }

    pub fn memory(mut self) -> Self {
        self.config.storage = StorageConfig::Memory;
        self.store = None;
        self
    }

    pub fn durable(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage = StorageConfig::Durable { dir: dir.into() };
        self.store = None;
        self
    }

    /// Use a custom durable backend instead of a [`DiskStore`].
    pub fn artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn cache_limit(mut self, limit: usize) -> Self {
        self.config.cache_limit = Some(limit);
        self
    }

    pub fn cache_rate(mut self, rate: f64) -> Self {
        self.config.cache_rate = Some(rate);
        self
    }

    pub fn max_cached_stages(mut self, stages: usize) -> Self {
        self.config.max_cached_stages = Some(stages);
        self
    }

    /// Construct the dataset. In eager mode this returns only after every
    /// cached index has been populated.
    pub async fn build(self) -> DatasetResult<CachedDataset<R>> {
        let config = self.config;
        config.validate()?;

        let len = self.source.len();
        let split = self.pipeline.split(config.max_cached_stages);
        let fingerprint = fingerprint::compute(&split);
        let cached_len = config.cached_len(len);

        let tier = match (config.cache_mode, self.store, &config.storage) {
            (CacheMode::None, _, _) => Tier::Off,
            (_, Some(store), _) => Tier::Durable(store),
            (_, None, StorageConfig::Durable { dir }) => {
                Tier::Durable(Arc::new(DiskStore::with_dir(dir.clone())))
            }
            (_, None, StorageConfig::Memory) => Tier::Memory(MemoryTier::new(cached_len)),
        };

        if let Tier::Durable(store) = &tier {
            store.register(&fingerprint).await?;
        }

        let draws = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let inner = Arc::new(Inner {
            source: self.source,
            split,
            fingerprint,
            mode: config.cache_mode,
            tier,
            len,
            cached_len,
            stats: CacheStats::default(),
            draws: Mutex::new(draws),
        });

        if config.cache_mode == CacheMode::Eager {
            populate::populate(&inner, config.workers).await?;
        }

        info!(
            len,
            cached_len,
            mode = ?inner.mode,
            tier = inner.tier.label(),
            namespace = %inner.fingerprint.namespace,
            prefix = ?inner.split.prefix_names(),
            suffix = ?inner.split.suffix_names(),
            "dataset ready"
        );

        Ok(CachedDataset { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{Lambda, RandLambda};
    use rand::Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn counted_square(counter: &Arc<AtomicUsize>) -> Lambda<i64> {
        let counter = counter.clone();
        Lambda::new("square", move |x: i64| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(x * x)
        })
    }

    fn noise() -> RandLambda<i64> {
        RandLambda::new("noise", |x: i64, ctx| Ok(x + ctx.rng().gen_range(1..1_000_000)))
    }

    #[tokio::test]
    async fn out_of_range_is_index_error() {
        let ds = CachedDataset::builder(vec![1_i64, 2], Pipeline::new())
            .build()
            .await
            .unwrap();
        let err = ds.get(2).await.unwrap_err();
        assert!(matches!(err, DatasetError::IndexOutOfRange { index: 2, len: 2 }));
    }

    #[tokio::test]
    async fn batch_checks_all_indices_first() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ds = CachedDataset::builder(
            vec![1_i64, 2, 3],
            Pipeline::new().then(counted_square(&counter)),
        )
        .build()
        .await
        .unwrap();

        assert!(ds.get_batch(&[0, 1, 7]).await.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(ds.get_batch(&[2, 0, 2]).await.unwrap(), vec![9, 1, 9]);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn lazy_memory_computes_once_per_index() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ds = CachedDataset::builder(
            vec![3_i64, 4],
            Pipeline::new().then(counted_square(&counter)),
        )
        .cache_mode(CacheMode::Lazy)
        .build()
        .await
        .unwrap();

        for _ in 0..3 {
            assert_eq!(ds.get(1).await.unwrap(), 16);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(ds.memory_entries(), 1);

        let stats = ds.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.writes, 1);
    }

    #[tokio::test]
    async fn same_seed_same_output() {
        let ds = CachedDataset::builder(vec![5_i64], Pipeline::new().then(noise()))
            .build()
            .await
            .unwrap();
        let a = ds.get_with_seed(0, 11).await.unwrap();
        let b = ds.get_with_seed(0, 11).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn reseed_replays_draw_sequence() {
        let ds = CachedDataset::builder(vec![5_i64, 6], Pipeline::new().then(noise()))
            .seed(1)
            .build()
            .await
            .unwrap();
        let first = ds.get_batch(&[0, 1, 0]).await.unwrap();
        ds.reseed(1);
        let again = ds.get_batch(&[0, 1, 0]).await.unwrap();
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn cache_limit_leaves_tail_uncached() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ds = CachedDataset::builder(
            vec![1_i64, 2, 3, 4],
            Pipeline::new().then(counted_square(&counter)),
        )
        .cache_mode(CacheMode::Eager)
        .cache_limit(2)
        .workers(2)
        .build()
        .await
        .unwrap();

        assert_eq!(ds.cached_len(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        assert_eq!(ds.get(0).await.unwrap(), 1);
        assert_eq!(ds.get(3).await.unwrap(), 16);
        assert_eq!(ds.get(3).await.unwrap(), 16);
        // Head served from cache, tail recomputed per access.
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(ds.stats().uncached, 2);
    }

    #[tokio::test]
    async fn max_cached_stages_recomputes_the_rest() {
        let counter = Arc::new(AtomicUsize::new(0));
        let inc_counter = counter.clone();
        let pipeline = Pipeline::new()
            .then(Lambda::new("double", |x: i64| Ok(x * 2)))
            .then(Lambda::new("inc", move |x: i64| {
                inc_counter.fetch_add(1, Ordering::SeqCst);
                Ok(x + 1)
            }));
        let ds = CachedDataset::builder(vec![10_i64], pipeline)
            .max_cached_stages(1)
            .build()
            .await
            .unwrap();

        assert_eq!(ds.split().prefix_names(), vec!["double"]);
        assert_eq!(ds.get(0).await.unwrap(), 21);
        assert_eq!(ds.get(0).await.unwrap(), 21);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_config_fails_build() {
        let err = CachedDataset::builder(vec![1_i64], Pipeline::new())
            .workers(0)
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetError::Config { .. }));
    }

    #[tokio::test]
    async fn durable_lazy_reads_back_from_disk() {
        let tmp = TempDir::new().unwrap();
        let ds = CachedDataset::builder(
            vec![serde_json::json!({"image": [1.5, 2.0], "label": 1})],
            Pipeline::new().then(Lambda::new("scale", |mut r: serde_json::Value| {
                if let Some(pixels) = r["image"].as_array_mut() {
                    for p in pixels.iter_mut() {
                        *p = serde_json::json!(p.as_f64().unwrap_or(0.0) * 0.5);
                    }
                }
                Ok(r)
            })),
        )
        .durable(tmp.path())
        .build()
        .await
        .unwrap();

        let first = ds.get(0).await.unwrap();
        let second = ds.get(0).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first["image"], serde_json::json!([0.75, 1.0]));

        let stats = ds.stats();
        assert_eq!((stats.misses, stats.hits, stats.writes), (1, 1, 1));

        let store = DiskStore::with_dir(tmp.path());
        assert_eq!(store.list(ds.namespace()).await.unwrap(), vec![0]);
        let manifest = store.manifest(ds.namespace()).await.unwrap();
        assert_eq!(manifest.stages, vec!["scale@1"]);
    }

    #[tokio::test]
    async fn lazy_miss_panic_is_reported_as_transform_error() {
        let ds = CachedDataset::builder(
            vec![1_i64, 2],
            Pipeline::new().then(Lambda::new("explode", |x: i64| {
                if x == 2 {
                    panic!("stage bug");
                }
                Ok(x)
            })),
        )
        .build()
        .await
        .unwrap();

        assert_eq!(ds.get(0).await.unwrap(), 1);
        let err = ds.get(1).await.unwrap_err();
        assert!(
            matches!(err, DatasetError::Transform { index: 1, .. }),
            "{err:?}"
        );
        assert_eq!(ds.memory_entries(), 1);
    }

    #[tokio::test]
    async fn none_mode_never_touches_storage() {
        let tmp = TempDir::new().unwrap();
        let ds = CachedDataset::builder(vec![2_i64], Pipeline::new().then(noise()))
            .cache_mode(CacheMode::None)
            .durable(tmp.path().join("cache"))
            .build()
            .await
            .unwrap();
        ds.get(0).await.unwrap();
        assert!(!tmp.path().join("cache").exists());
        assert_eq!(ds.stats().uncached, 1);
    }
}

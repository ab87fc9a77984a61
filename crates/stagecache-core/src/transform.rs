//! Transform stages and pipelines.
//!
//! A pipeline is split once, at dataset construction, into a deterministic
//! prefix (cached) and a suffix starting at the first stochastic stage
//! (re-run on every access).
//!
//! Randomness is never shared through mutable stage state. Each top-level
//! access draws one seed and passes it to every stage in a [`StageContext`].

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};

/// Per-call context handed to every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageContext {
    index: usize,
    seed: u64,
}

impl StageContext {
    pub fn new(index: usize, seed: u64) -> Self {
        Self { index, seed }
    }

    /// Context used for prefix computation. Deterministic stages must not
    /// depend on the seed, so it is pinned.
    pub(crate) fn prefix(index: usize) -> Self {
        Self { index, seed: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generator for this call's draw. Stages calling this in the same
    /// access observe the same sequence.
    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    /// Independent stream for `salt`, stable for a given call seed.
    pub fn stage_rng(&self, salt: &str) -> StdRng {
        let mut h = Sha256::new();
        h.update(self.seed.to_le_bytes());
        h.update(salt.as_bytes());
        let digest = h.finalize();
        let bytes: &[u8] = digest.as_ref();
        let mut word = [0_u8; 8];
        word.copy_from_slice(&bytes[..8]);
        StdRng::seed_from_u64(u64::from_le_bytes(word))
    }
}

/// One stage of a pipeline.
pub trait Transform<R>: Send + Sync {
    /// Stable identity, part of the cache namespace.
    fn name(&self) -> &str;

    /// Bump when the stage's output changes for the same input.
    fn version(&self) -> &str {
        "1"
    }

    fn is_stochastic(&self) -> bool {
        false
    }

    fn apply(&self, record: R, ctx: &StageContext) -> anyhow::Result<R>;
}

type StageFn<R> = dyn Fn(R) -> anyhow::Result<R> + Send + Sync;
type RandStageFn<R> = dyn Fn(R, &StageContext) -> anyhow::Result<R> + Send + Sync;

/// Deterministic closure stage.
pub struct Lambda<R> {
    name: String,
    version: String,
    func: Box<StageFn<R>>,
}

impl<R> Lambda<R> {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(R) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            version: "1".to_string(),
            func: Box::new(func),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

impl<R> Transform<R> for Lambda<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn apply(&self, record: R, _ctx: &StageContext) -> anyhow::Result<R> {
        (self.func)(record)
    }
}

impl<R> fmt::Debug for Lambda<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lambda")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish()
    }
}

/// Stochastic closure stage; receives the call context for its draw.
pub struct RandLambda<R> {
    name: String,
    version: String,
    func: Box<RandStageFn<R>>,
}

impl<R> RandLambda<R> {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(R, &StageContext) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            version: "1".to_string(),
            func: Box::new(func),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

impl<R> Transform<R> for RandLambda<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn is_stochastic(&self) -> bool {
        true
    }

    fn apply(&self, record: R, ctx: &StageContext) -> anyhow::Result<R> {
        (self.func)(record, ctx)
    }
}

impl<R> fmt::Debug for RandLambda<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandLambda")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish()
    }
}

/// Ordered composition of stages.
///
/// A pipeline is itself a stage, so pipelines nest. A nested pipeline counts
/// as stochastic when any of its members is.
pub struct Pipeline<R> {
    name: String,
    stages: Vec<Arc<dyn Transform<R>>>,
}

impl<R> Clone for Pipeline<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            stages: self.stages.clone(),
        }
    }
}

impl<R> Default for Pipeline<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Pipeline<R> {
    pub fn new() -> Self {
        Self {
            name: "compose".to_string(),
            stages: Vec::new(),
        }
    }

    /// Rename the pipeline when it is nested as a stage.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a stage.
    pub fn then<T>(mut self, stage: T) -> Self
    where
        T: Transform<R> + 'static,
    {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Append an already shared stage.
    pub fn then_shared(mut self, stage: Arc<dyn Transform<R>>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Arc<dyn Transform<R>>] {
        &self.stages
    }

    /// Split into cached prefix and per-access suffix.
    ///
    /// The prefix is the leading run of deterministic stages, cut to at most
    /// `max_cached` stages when given.
    pub fn split(&self, max_cached: Option<usize>) -> SplitPipeline<R> {
        let mut boundary = self
            .stages
            .iter()
            .position(|s| s.is_stochastic())
            .unwrap_or(self.stages.len());
        if let Some(limit) = max_cached {
            boundary = boundary.min(limit);
        }

        SplitPipeline {
            prefix: self.stages[..boundary].to_vec(),
            suffix: self.stages[boundary..].to_vec(),
        }
    }
}

impl<R> Transform<R> for Pipeline<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "1"
    }

    fn is_stochastic(&self) -> bool {
        self.stages.iter().any(|s| s.is_stochastic())
    }

    fn apply(&self, record: R, ctx: &StageContext) -> anyhow::Result<R> {
        let mut current = record;
        for stage in &self.stages {
            current = stage.apply(current, ctx)?;
        }
        Ok(current)
    }
}

impl<R> fmt::Debug for Pipeline<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|s| s.name()).collect();
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &names)
            .finish()
    }
}

/// A pipeline cut at its cache boundary. Fixed for a dataset's lifetime.
pub struct SplitPipeline<R> {
    prefix: Vec<Arc<dyn Transform<R>>>,
    suffix: Vec<Arc<dyn Transform<R>>>,
}

impl<R> SplitPipeline<R> {
    pub fn prefix_names(&self) -> Vec<String> {
        self.prefix.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn suffix_names(&self) -> Vec<String> {
        self.suffix.iter().map(|s| s.name().to_string()).collect()
    }

    pub(crate) fn prefix(&self) -> &[Arc<dyn Transform<R>>] {
        &self.prefix
    }

    pub fn is_prefix_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    pub(crate) fn run_prefix(&self, index: usize, record: R) -> crate::DatasetResult<R> {
        run_stages(&self.prefix, record, &StageContext::prefix(index))
    }

    pub(crate) fn run_suffix(&self, record: R, ctx: &StageContext) -> crate::DatasetResult<R> {
        run_stages(&self.suffix, record, ctx)
    }

    /// Prefix then suffix, used when an index is not cached.
    pub(crate) fn run_full(&self, record: R, ctx: &StageContext) -> crate::DatasetResult<R> {
        let record = run_stages(&self.prefix, record, ctx)?;
        run_stages(&self.suffix, record, ctx)
    }
}

impl<R> fmt::Debug for SplitPipeline<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitPipeline")
            .field("prefix", &self.prefix_names())
            .field("suffix", &self.suffix_names())
            .finish()
    }
}

fn run_stages<R>(
    stages: &[Arc<dyn Transform<R>>],
    record: R,
    ctx: &StageContext,
) -> crate::DatasetResult<R> {
    let mut current = record;
    for stage in stages {
        current = stage
            .apply(current, ctx)
            .map_err(|e| crate::DatasetError::transform(ctx.index(), stage.name(), &e))?;
    }
    Ok(current)
}

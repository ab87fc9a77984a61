//! Eager population of the cache during construction.
//!
//! Indices are fanned out over a bounded worker pool; prefix computation runs
//! on the blocking pool. Population is fail-fast: once an index fails,
//! workers skip indices they have not started, and construction reports the
//! first failure observed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::codec;
use crate::dataset::{Inner, Tier};
use crate::error::{DatasetError, DatasetResult};
use crate::record::Record;

pub(crate) async fn populate<R: Record>(
    inner: &Arc<Inner<R>>,
    workers: usize,
) -> DatasetResult<()> {
    if matches!(inner.tier, Tier::Off) {
        return Ok(());
    }

    let started = Instant::now();
    let total = inner.cached_len;
    let sem = Arc::new(Semaphore::new(workers.max(1)));
    let stop = Arc::new(AtomicBool::new(false));
    let mut join_set = JoinSet::new();

    for index in 0..total {
        let Ok(permit) = sem.clone().acquire_owned().await else {
            break;
        };
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let inner = inner.clone();
        let stop = stop.clone();
        join_set.spawn(async move {
            let _permit = permit;
            if stop.load(Ordering::SeqCst) {
                return Ok(());
            }
            let res = populate_one(&inner, index).await;
            if res.is_err() {
                stop.store(true, Ordering::SeqCst);
            }
            res
        });
    }

    let mut first: Option<DatasetError> = None;
    let mut failed = 0_usize;
    while let Some(joined) = join_set.join_next().await {
        let res = joined.unwrap_or_else(|e| {
            Err(DatasetError::Storage {
                message: format!("population worker aborted: {e}"),
            })
        });
        if let Err(e) = res {
            failed += 1;
            warn!(error = %e, "cache population failure");
            if first.is_none() {
                first = Some(e);
            }
        }
    }

    if let Some(err) = first {
        return Err(into_population_error(err, failed));
    }

    info!(
        total,
        workers,
        namespace = %inner.fingerprint.namespace,
        duration_ms = started.elapsed().as_millis() as u64,
        "cache populated"
    );
    Ok(())
}

async fn populate_one<R: Record>(inner: &Arc<Inner<R>>, index: usize) -> DatasetResult<()> {
    match &inner.tier {
        Tier::Off => Ok(()),
        Tier::Memory(tier) => {
            if tier.get(index).is_some() {
                return Ok(());
            }
            let record = inner.compute_prefix_blocking(index).await?;
            if let Some((_, published)) = tier.insert(index, record) {
                inner.stats.write(published);
            }
            Ok(())
        }
        Tier::Durable(store) => {
            let key = inner.key(index);
            if store.exists(&key).await? {
                debug!(key = %key, "reusing stored artifact");
                return Ok(());
            }
            let record = inner.compute_prefix_blocking(index).await?;
            let bytes = codec::encode(&key.namespace, index, &record)?;
            let published = store.write_if_absent(&key, &bytes).await?;
            inner.stats.write(published);
            Ok(())
        }
    }
}

/// Stage failures become `Population`; backend failures keep their kind.
fn into_population_error(err: DatasetError, failed: usize) -> DatasetError {
    match err {
        DatasetError::Transform {
            index,
            stage,
            message,
        } => DatasetError::Population {
            index,
            stage,
            message,
            failed,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheMode;
    use crate::dataset::CachedDataset;
    use crate::transform::{Lambda, Pipeline};
    use std::sync::atomic::AtomicUsize;

    fn failing_at(bad: i64, calls: &Arc<AtomicUsize>) -> Lambda<i64> {
        let calls = calls.clone();
        Lambda::new("check", move |x: i64| {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(x != bad, "bad record {x}");
            Ok(x)
        })
    }

    #[tokio::test]
    async fn single_worker_stops_after_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let err = CachedDataset::builder(
            vec![0_i64, 1, 2, 3, 4],
            Pipeline::new().then(failing_at(3, &calls)),
        )
        .cache_mode(CacheMode::Eager)
        .workers(1)
        .build()
        .await
        .unwrap_err();

        match err {
            DatasetError::Population {
                index,
                stage,
                failed,
                message,
            } => {
                assert_eq!(index, 3);
                assert_eq!(stage, "check");
                assert_eq!(failed, 1);
                assert!(message.contains("bad record 3"), "{message}");
            }
            other => panic!("expected population error, got {other:?}"),
        }
        // Index 4 is never started.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn panicking_stage_is_reported_not_propagated() {
        let err = CachedDataset::builder(
            vec![1_i64, 2],
            Pipeline::new().then(Lambda::new("explode", |x: i64| {
                if x == 2 {
                    panic!("stage bug");
                }
                Ok(x)
            })),
        )
        .cache_mode(CacheMode::Eager)
        .workers(2)
        .build()
        .await
        .unwrap_err();

        assert!(
            matches!(err, DatasetError::Population { index: 1, .. }),
            "{err:?}"
        );
    }

    #[test]
    fn storage_errors_keep_their_kind() {
        let err = into_population_error(
            DatasetError::Storage {
                message: "read-only file system".into(),
            },
            1,
        );
        assert!(matches!(err, DatasetError::Storage { .. }));
    }
}

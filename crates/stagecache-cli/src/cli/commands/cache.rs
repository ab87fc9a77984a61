use stagecache_core::{ArtifactKey, DiskStore, VerifyReport};
use tracing::{info, warn};

use super::super::args::{EvictArgs, InspectArgs, VerifyArgs};
use crate::exit_codes::{EXIT_CORRUPT, EXIT_SUCCESS};

pub(crate) async fn inspect(store: &DiskStore, args: InspectArgs) -> anyhow::Result<i32> {
    let namespaces = store.list_namespaces().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&namespaces)?);
        return Ok(EXIT_SUCCESS);
    }

    if namespaces.is_empty() {
        println!("no namespaces under {}", store.root().display());
        return Ok(EXIT_SUCCESS);
    }

    for info in &namespaces {
        let stages = match &info.manifest {
            Some(m) if m.stages.is_empty() => "(identity)".to_string(),
            Some(m) => m.stages.join(" -> "),
            None => "(no manifest)".to_string(),
        };
        println!(
            "{}  entries={}  stages={}",
            info.namespace, info.entries, stages
        );
    }
    Ok(EXIT_SUCCESS)
}

pub(crate) async fn verify(store: &DiskStore, args: VerifyArgs) -> anyhow::Result<i32> {
    let targets = match args.namespace {
        Some(ns) => vec![ns],
        None => store
            .list_namespaces()
            .await?
            .into_iter()
            .map(|info| info.namespace)
            .collect(),
    };

    let mut reports: Vec<VerifyReport> = Vec::with_capacity(targets.len());
    for ns in &targets {
        reports.push(store.verify(ns).await?);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for r in &reports {
            if r.is_clean() {
                println!("{}  ok ({} checked)", r.namespace, r.checked);
            } else {
                println!(
                    "{}  CORRUPT {:?} ({} checked)",
                    r.namespace, r.corrupt, r.checked
                );
            }
        }
    }

    if reports.iter().all(VerifyReport::is_clean) {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_CORRUPT)
    }
}

pub(crate) async fn evict(store: &DiskStore, args: EvictArgs) -> anyhow::Result<i32> {
    match args.index {
        Some(index) => {
            let key = ArtifactKey::new(args.namespace, index);
            if store.evict(&key).await? {
                info!(key = %key, "evicted");
            } else {
                warn!(key = %key, "not cached, nothing evicted");
            }
        }
        None => {
            store.evict_namespace(&args.namespace).await?;
            info!(namespace = %args.namespace, "evicted namespace");
        }
    }
    Ok(EXIT_SUCCESS)
}

pub(crate) async fn clear(store: &DiskStore) -> anyhow::Result<i32> {
    store.clear().await?;
    info!(root = %store.root().display(), "cleared cache");
    Ok(EXIT_SUCCESS)
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stagecache_core::{CachedDataset, DiskStore, Lambda, Pipeline};

use crate::cli::args::DemoArgs;
use crate::exit_codes::EXIT_SUCCESS;

const RAW: [i64; 7] = [4, 9, 3, 7, 1, 2, 5];

pub async fn cmd_demo(store: &DiskStore, args: DemoArgs) -> anyhow::Result<i32> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let pipeline = Pipeline::new().named("demo").then(Lambda::new("square", move |x: i64| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(x * x)
    }));

    let mut builder = CachedDataset::builder(RAW.to_vec(), pipeline)
        .cache_mode(args.mode)
        .workers(args.workers);
    builder = if args.durable {
        builder.durable(store.root())
    } else {
        builder.memory()
    };
    let ds = builder.build().await?;
    let calls_at_build = calls.load(Ordering::SeqCst);

    let mut values = Vec::with_capacity(ds.len());
    for i in 0..ds.len() {
        values.push(ds.get(i).await?);
    }

    let report = serde_json::json!({
        "namespace": ds.namespace(),
        "mode": ds.cache_mode(),
        "raw": RAW,
        "values": values,
        "calls_at_build": calls_at_build,
        "calls_total": calls.load(Ordering::SeqCst),
        "stats": ds.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(EXIT_SUCCESS)
}

use std::path::PathBuf;

use stagecache_core::DiskStore;

use super::args::*;

pub(crate) mod cache;
pub(crate) mod demo;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let store = open_store(cli.dir)?;
    match cli.cmd {
        Command::Inspect(args) => cache::inspect(&store, args).await,
        Command::Verify(args) => cache::verify(&store, args).await,
        Command::Evict(args) => cache::evict(&store, args).await,
        Command::Clear => cache::clear(&store).await,
        Command::Demo(args) => demo::cmd_demo(&store, args).await,
    }
}

fn open_store(dir: Option<PathBuf>) -> anyhow::Result<DiskStore> {
    Ok(match dir {
        Some(dir) => DiskStore::with_dir(dir),
        None => DiskStore::new()?,
    })
}

use clap::{Parser, Subcommand};
use stagecache_core::CacheMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stagecache",
    version,
    about = "Inspect and maintain stagecache artifact directories"
)]
pub struct Cli {
    /// Cache directory (defaults to the platform cache dir)
    #[arg(long, global = true, env = "STAGECACHE_DIR")]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List namespaces, entry counts and pipeline manifests
    Inspect(InspectArgs),
    /// Re-check artifact digests; exits 1 when any entry is corrupt
    Verify(VerifyArgs),
    /// Remove a namespace or a single entry
    Evict(EvictArgs),
    /// Remove every namespace under the cache directory
    Clear,
    /// Run a small squaring pipeline and print cache statistics
    Demo(DemoArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct VerifyArgs {
    /// Only scan this namespace
    #[arg(long)]
    pub namespace: Option<String>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct EvictArgs {
    #[arg(long)]
    pub namespace: String,

    /// Evict one entry instead of the whole namespace
    #[arg(long)]
    pub index: Option<usize>,
}

#[derive(Parser, Debug, Clone)]
pub struct DemoArgs {
    /// Cache mode for the demo dataset (none, eager, lazy)
    #[arg(long, default_value = "eager")]
    pub mode: CacheMode,

    #[arg(long, default_value_t = 3)]
    pub workers: usize,

    /// Store artifacts under --dir instead of in memory
    #[arg(long)]
    pub durable: bool,
}

//! Implementation modules behind the `DiskStore` facade.
//!
//! `store.rs` owns the public surface; these modules own path derivation,
//! atomic publishing, reads/scans and eviction.

pub(crate) mod evict;
pub(crate) mod io;
pub(crate) mod keys;
pub(crate) mod put;
pub(crate) mod read;

//! Records and the raw sources they are read from.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A unit of data flowing through a pipeline.
///
/// Anything cloneable and serde-serializable qualifies; `serde_json::Value`
/// covers both mapping-like (`{"image": .., "label": ..}`) and array-like
/// records.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Record for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Random-access raw sequence with a fixed length.
pub trait Source<R>: Send + Sync {
    /// Number of records. Must not change while a dataset holds the source.
    fn len(&self) -> usize;

    /// Record at `index`, or `None` when out of range.
    fn get(&self, index: usize) -> Option<R>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Record> Source<R> for Vec<R> {
    fn len(&self) -> usize {
        <[R]>::len(self)
    }

    fn get(&self, index: usize) -> Option<R> {
        <[R]>::get(self, index).cloned()
    }
}

impl<R: Record> Source<R> for Arc<[R]> {
    fn len(&self) -> usize {
        <[R]>::len(self)
    }

    fn get(&self, index: usize) -> Option<R> {
        <[R]>::get(self, index).cloned()
    }
}

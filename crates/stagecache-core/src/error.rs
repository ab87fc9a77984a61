//! Error types for the cached dataset.

/// Dataset errors.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// Index outside `[0, len)`.
    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A transform stage failed while processing an item.
    #[error("stage '{stage}' failed on index {index}: {message}")]
    Transform {
        index: usize,
        stage: String,
        message: String,
    },

    /// Eager population failed; no dataset was constructed.
    #[error("cache population failed at index {index} (stage '{stage}', {failed} failure(s)): {message}")]
    Population {
        index: usize,
        stage: String,
        message: String,
        failed: usize,
    },

    /// Durable backend unavailable or unwritable.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Stored artifact failed its integrity check.
    #[error("corrupt artifact for index {index} in namespace {namespace}: expected {expected}, got {actual}")]
    Corrupt {
        index: usize,
        namespace: String,
        expected: String,
        actual: String,
    },

    /// Record could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Invalid configuration.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl DatasetError {
    /// Exit code for CLI: 1 for integrity failures, 2 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Corrupt { .. } => 1,
            Self::IndexOutOfRange { .. }
            | Self::Transform { .. }
            | Self::Population { .. }
            | Self::Storage { .. }
            | Self::Codec { .. }
            | Self::Config { .. } => 2,
        }
    }

    /// Whether the error is retryable.
    ///
    /// Only backend availability is; a bad input item stays bad.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }

    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            message: format!("{context}: {err}"),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn transform(index: usize, stage: &str, err: &anyhow::Error) -> Self {
        Self::Transform {
            index,
            stage: stage.to_string(),
            message: format!("{err:#}"),
        }
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec {
            message: err.to_string(),
        }
    }
}

/// Result type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;

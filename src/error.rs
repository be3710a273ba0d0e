//! Error types for the MySQL Restore Operator

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Work queue key could not be built or parsed
    #[error("Invalid queue key: {0}")]
    InvalidKey(String),

    /// Restore vanished from the cache between enqueue and processing
    #[error("MySqlRestore {0} not found")]
    RestoreNotFound(String),

    /// Resource store lookup failed
    #[error("Store error: {0}")]
    Store(String),

    /// No primary member available to run the restore
    #[error("no primaries found for cluster {cluster}")]
    NoPrimary { cluster: String },

    /// Scheduling failed
    #[error("failed to schedule: {0}")]
    Schedule(#[source] Box<Error>),

    /// Writing the scheduled restore failed
    #[error("failed to update: {0}")]
    Update(#[source] Box<Error>),

    /// Write conflicted with a concurrent modification
    #[error("Conflict updating {0}")]
    Conflict(String),

    /// Caches did not report synced before the deadline
    #[error("timed out waiting for caches to sync after {0:?}")]
    CacheSyncTimeout(Duration),

    /// Shutdown requested before caches synced
    #[error("shutdown requested while waiting for caches to sync")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    /// Create an invalid key error
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Error::InvalidKey(msg.into())
    }

    /// Whether the error only reports a requested shutdown
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Whether the error is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Kube(kube::Error::Api(resp)) => resp.code == 409,
            Error::Update(inner) | Error::Schedule(inner) => inner.is_conflict(),
            _ => false,
        }
    }
}

//! 💀 SyncError: every way a reconcile can go sideways, sorted into two piles.
//!
//! Pile one: configuration problems. The user wrote something we cannot act on.
//! Retrying will not fix it, only a human with `kubectl edit` can.
//! Pile two: transient problems. The apiserver hiccuped, S3 timed out, Presto
//! was having a moment. These go back in the queue with a backoff.
//!
//! The worker asks [`SyncError::is_retryable`] and decides. Everything that comes
//! out of a collaborator arrives as `anyhow::Error` and lands in `Transient`.

use thiserror::Error;

use crate::hive::LocationError;

#[derive(Error, Debug)]
pub enum SyncError {
    /// 🔑 Not a `namespace/name` key. Never retried, never propagated.
    #[error("invalid resource key: {0:?}")]
    InvalidKey(String),

    #[error("datasource {name:?}: improperly configured, missing promsum or awsBilling configuration")]
    MissingVariant { name: String },

    #[error("datasource {name:?}: improperly configured, both promsum and awsBilling are set")]
    ConflictingVariants { name: String },

    #[error("datasource {name:?}: improperly configured datasource, awsBilling source is empty")]
    MissingAwsSource { name: String },

    #[error("no storageSpec or storageLocationName set and namespace {namespace:?} has no default StorageLocation")]
    NoDefaultStorageLocation { namespace: String },

    #[error("{count} default StorageLocations were found in namespace {namespace:?}, refusing to guess")]
    AmbiguousDefaultStorageLocation { namespace: String, count: usize },

    #[error("storage incorrectly configured on datasource {name:?}: exactly one of local or s3 must be set")]
    StorageMisconfigured { name: String },

    #[error("invalid table location: {0}")]
    InvalidLocation(#[from] LocationError),

    /// 🕰️ Might just not be in the cache yet. Worth another look later.
    #[error("StorageLocation {namespace}/{name} not found")]
    StorageLocationNotFound { namespace: String, name: String },

    /// 🌩️ Anything a collaborator threw at us: API reads and writes, manifest
    /// retrieval, DDL execution.
    #[error(transparent)]
    Transient(#[from] anyhow::Error),
}

impl SyncError {
    /// 🔄 Should the worker put this key back in the queue?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::StorageLocationNotFound { .. } | SyncError::Transient(_)
        )
    }
}

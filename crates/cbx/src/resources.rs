//! ☸️ Resources: the cluster-side nouns of cbx.
//!
//! 🎬 *[a user applies a YAML file. somewhere, a controller wakes up.]*
//!
//! Three custom resources live here, all in `chargeback.coreos.com/v1alpha1`:
//! - [`ReportDataSource`]: "please make me a table", said declaratively.
//! - [`StorageLocation`]: where table data is allowed to live.
//! - [`PrestoTable`]: the receipt. What we created and how, owned by its data source.
//!
//! Plus the two tiny helpers every controller writes exactly once and then copies
//! forever: turning an object into a `namespace/name` key, and back again. 🦆

use kube::ResourceExt;

use crate::error::SyncError;

mod presto_table;
mod report_data_source;
mod storage_location;

pub use presto_table::{PrestoTable, PrestoTableColumn, PrestoTableCreationParameters, PrestoTableSpec};
pub use report_data_source::{
    AwsBillingDataSource, PromsumDataSource, ReportDataSource, ReportDataSourceSpec,
    ReportDataSourceStatus, StorageLocationRef,
};
pub use storage_location::{
    IS_DEFAULT_STORAGE_LOCATION_ANNOTATION, LocalStorage, S3Bucket, StorageLocation,
    StorageLocationSpec,
};

/// 🔑 Builds the work-queue key for an object: `namespace/name`, or just `name`
/// for cluster-scoped things (we have none, but the format allows it).
pub fn meta_namespace_key<K: ResourceExt>(obj: &K) -> String {
    match obj.namespace() {
        Some(namespace) if !namespace.is_empty() => format!("{}/{}", namespace, obj.name_any()),
        _ => obj.name_any(),
    }
}

/// 🔓 Splits a work-queue key back into `(namespace, name)`.
///
/// `name` alone yields an empty namespace. Anything with more than one `/`, or
/// an empty name, is a key nobody should have enqueued.
pub fn split_meta_namespace_key(key: &str) -> Result<(&str, &str), SyncError> {
    let parts: Vec<&str> = key.split('/').collect();
    match parts.as_slice() {
        [name] if !name.is_empty() => Ok(("", name)),
        [namespace, name] if !name.is_empty() => Ok((namespace, name)),
        _ => Err(SyncError::InvalidKey(key.to_string())),
    }
}

//! 🗄️ Storage resolution: where does a promsum table's data live?
//!
//! Three ways to say it, checked in this order:
//! 1. nothing at all → the namespace's one default StorageLocation
//! 2. `storageLocationName` → that StorageLocation, looked up by name
//! 3. `storageSpec` → used as written
//!
//! Whichever wins must name exactly one backend: `local` or `s3`.

use kube::ResourceExt;
use tracing::{debug, info};

use crate::backends::ResourceCache;
use crate::error::SyncError;
use crate::resources::{StorageLocation, StorageLocationRef, StorageLocationSpec};

/// 📍 The answer, boiled down to what the table builder needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedStorage {
    Local,
    S3 { bucket: String, prefix: String },
}

/// 🔍 Resolves a data source's storage reference in `namespace`.
pub async fn resolve_storage<C: ResourceCache + ?Sized>(
    cache: &C,
    namespace: &str,
    data_source_name: &str,
    storage: Option<&StorageLocationRef>,
) -> Result<ResolvedStorage, SyncError> {
    let the_name = storage
        .and_then(|storage| storage.storage_location_name.as_deref())
        .filter(|name| !name.is_empty());
    let the_inline = storage.and_then(|storage| storage.storage_spec.as_ref());

    let the_spec = match (the_name, the_inline) {
        (Some(name), _) => {
            info!(storage_location = %name, "🗄️ using named StorageLocation");
            cache
                .get_storage_location(namespace, name)
                .await?
                .ok_or_else(|| SyncError::StorageLocationNotFound {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })?
                .spec
        }
        (None, Some(spec)) => spec.clone(),
        (None, None) => {
            info!("🗄️ no storageSpec or storageLocationName set, using the default StorageLocation");
            default_storage_location(cache, namespace).await?.spec
        }
    };

    storage_from_spec(&the_spec, data_source_name)
}

/// 👑 The single StorageLocation in `namespace` annotated as the default.
pub async fn default_storage_location<C: ResourceCache + ?Sized>(
    cache: &C,
    namespace: &str,
) -> Result<StorageLocation, SyncError> {
    let mut the_defaults: Vec<StorageLocation> = cache
        .list_storage_locations(namespace)
        .await?
        .into_iter()
        .filter(StorageLocation::is_default)
        .collect();

    match the_defaults.len() {
        0 => Err(SyncError::NoDefaultStorageLocation {
            namespace: namespace.to_string(),
        }),
        1 => {
            let the_default = the_defaults.remove(0);
            debug!(storage_location = %the_default.name_any(), "👑 found the default StorageLocation");
            Ok(the_default)
        }
        count => Err(SyncError::AmbiguousDefaultStorageLocation {
            namespace: namespace.to_string(),
            count,
        }),
    }
}

/// ☝️ Exactly one of `local` / `s3`, or it's misconfigured.
pub fn storage_from_spec(spec: &StorageLocationSpec, data_source_name: &str) -> Result<ResolvedStorage, SyncError> {
    match (&spec.local, &spec.s3) {
        (Some(_), None) => Ok(ResolvedStorage::Local),
        (None, Some(s3)) => Ok(ResolvedStorage::S3 {
            bucket: s3.bucket.clone(),
            prefix: s3.prefix.clone(),
        }),
        _ => Err(SyncError::StorageMisconfigured {
            name: data_source_name.to_string(),
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::backends::InMemoryStore;
    use crate::resources::{IS_DEFAULT_STORAGE_LOCATION_ANNOTATION, LocalStorage, S3Bucket};

    pub(crate) fn s3_spec(bucket: &str, prefix: &str) -> StorageLocationSpec {
        StorageLocationSpec {
            local: None,
            s3: Some(S3Bucket {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            }),
        }
    }

    pub(crate) fn local_spec() -> StorageLocationSpec {
        StorageLocationSpec {
            local: Some(LocalStorage {}),
            s3: None,
        }
    }

    pub(crate) fn storage_location(namespace: &str, name: &str, spec: StorageLocationSpec, is_default: bool) -> StorageLocation {
        let mut the_location = StorageLocation::new(name, spec);
        the_location.metadata.namespace = Some(namespace.to_string());
        if is_default {
            the_location.metadata.annotations = Some(BTreeMap::from([(
                IS_DEFAULT_STORAGE_LOCATION_ANNOTATION.to_string(),
                "true".to_string(),
            )]));
        }
        the_location
    }

    #[tokio::test]
    async fn the_one_where_nobody_volunteers_as_default() {
        let the_store = InMemoryStore::new();
        the_store
            .insert_storage_location(storage_location("metering", "not-default", local_spec(), false))
            .await;

        let the_result = resolve_storage(&the_store, "metering", "ds", None).await;
        assert!(matches!(the_result, Err(SyncError::NoDefaultStorageLocation { .. })));
        assert!(!the_result.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn the_one_where_the_one_default_wins() {
        let the_store = InMemoryStore::new();
        the_store
            .insert_storage_location(storage_location("metering", "warehouse", s3_spec("bkt", "pfx"), true))
            .await;
        the_store
            .insert_storage_location(storage_location("metering", "other", local_spec(), false))
            .await;

        let the_resolved = resolve_storage(&the_store, "metering", "ds", Some(&StorageLocationRef::default()))
            .await
            .expect("💀 exactly one default should resolve");
        assert_eq!(
            the_resolved,
            ResolvedStorage::S3 {
                bucket: "bkt".into(),
                prefix: "pfx".into()
            }
        );
    }

    #[tokio::test]
    async fn the_one_where_two_defaults_is_one_too_many() {
        let the_store = InMemoryStore::new();
        for the_name in ["a", "b"] {
            the_store
                .insert_storage_location(storage_location("metering", the_name, local_spec(), true))
                .await;
        }
        // -- a default in another namespace stays out of it
        the_store
            .insert_storage_location(storage_location("elsewhere", "c", local_spec(), true))
            .await;

        match resolve_storage(&the_store, "metering", "ds", None).await {
            Err(SyncError::AmbiguousDefaultStorageLocation { count, .. }) => assert_eq!(count, 2),
            the_other => panic!("expected an ambiguity error, got {:?}", the_other),
        }
    }

    #[tokio::test]
    async fn the_one_where_a_named_location_is_missing_for_now() {
        let the_store = InMemoryStore::new();
        let the_ref = StorageLocationRef {
            storage_spec: None,
            storage_location_name: Some("ghost".into()),
        };

        let the_error = resolve_storage(&the_store, "metering", "ds", Some(&the_ref))
            .await
            .expect_err("💀 a missing named location must not resolve");
        assert!(matches!(the_error, SyncError::StorageLocationNotFound { .. }));
        assert!(the_error.is_retryable());
    }

    #[tokio::test]
    async fn the_one_where_names_beat_inline_specs() {
        let the_store = InMemoryStore::new();
        the_store
            .insert_storage_location(storage_location("metering", "named", s3_spec("named-bkt", ""), false))
            .await;
        let the_ref = StorageLocationRef {
            storage_spec: Some(local_spec()),
            storage_location_name: Some("named".into()),
        };

        let the_resolved = resolve_storage(&the_store, "metering", "ds", Some(&the_ref))
            .await
            .expect("💀 named location exists");
        assert!(matches!(the_resolved, ResolvedStorage::S3 { ref bucket, .. } if bucket == "named-bkt"));
    }

    #[tokio::test]
    async fn the_one_where_inline_specs_skip_the_lookup() {
        let the_store = InMemoryStore::new();
        the_store.fail_reads(true).await;
        let the_ref = StorageLocationRef {
            storage_spec: Some(local_spec()),
            storage_location_name: Some(String::new()),
        };

        let the_resolved = resolve_storage(&the_store, "metering", "ds", Some(&the_ref))
            .await
            .expect("💀 inline spec needs no reads");
        assert_eq!(the_resolved, ResolvedStorage::Local);
    }

    #[test]
    fn the_one_where_storage_must_pick_a_side() {
        let the_both = StorageLocationSpec {
            local: Some(LocalStorage {}),
            s3: Some(S3Bucket::default()),
        };
        assert!(matches!(
            storage_from_spec(&the_both, "ds"),
            Err(SyncError::StorageMisconfigured { .. })
        ));
        assert!(matches!(
            storage_from_spec(&StorageLocationSpec::default(), "ds"),
            Err(SyncError::StorageMisconfigured { .. })
        ));
    }
}

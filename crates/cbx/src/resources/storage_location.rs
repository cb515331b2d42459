//! 🗄️ StorageLocation: a named, reusable "put the table data over there".

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 🏷️ The annotation that crowns a StorageLocation as the namespace default.
/// Only the exact value `"true"` counts. `"yes"`, `"True"` and `"sure why not"` do not.
pub const IS_DEFAULT_STORAGE_LOCATION_ANNOTATION: &str =
    "chargeback.coreos.com/is-default-storage-location";

/// 🗄️ Exactly one of `local` / `s3` is expected. The resolver checks, we don't trust.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[kube(
    group = "chargeback.coreos.com",
    version = "v1alpha1",
    kind = "StorageLocation",
    plural = "storagelocations",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct StorageLocationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalStorage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Bucket>,
}

/// 💾 Local (HDFS warehouse) storage. No knobs. It just is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct LocalStorage {}

/// 🪣 A bucket and a prefix inside it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3Bucket {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
}

impl StorageLocation {
    /// 👑 Does this location carry the default marker?
    pub fn is_default(&self) -> bool {
        self.annotations()
            .get(IS_DEFAULT_STORAGE_LOCATION_ANNOTATION)
            .is_some_and(|value| value == "true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_only_a_literal_true_wears_the_crown() {
        let mut the_location = StorageLocation::new("warehouse", StorageLocationSpec::default());
        assert!(!the_location.is_default());

        for (the_value, the_expected) in [("true", true), ("True", false), ("yes", false), ("", false)] {
            the_location
                .annotations_mut()
                .insert(IS_DEFAULT_STORAGE_LOCATION_ANNOTATION.to_string(), the_value.to_string());
            assert_eq!(the_location.is_default(), the_expected, "annotation value {:?}", the_value);
        }
    }

    #[test]
    fn the_one_where_an_empty_local_block_still_means_local() {
        let the_spec: StorageLocationSpec = serde_json::from_str(r#"{"local":{}}"#)
            .expect("💀 `local: {}` should parse. It's literally empty.");
        assert_eq!(the_spec.local, Some(LocalStorage {}));
        assert_eq!(the_spec.s3, None);
    }
}

//! 📦 ReportDataSource: where raw cost data comes from, and (eventually) which
//! table it landed in.
//!
//! Two flavours, pick exactly one:
//! - `promsum`: metrics rows, stored wherever a [`StorageLocationRef`] points.
//! - `awsBilling`: AWS Cost and Usage Report exports sitting in an S3 bucket.
//!
//! `status.tableName` starts empty and is set exactly once, by us. After that the
//! object is "done" as far as table creation is concerned.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::storage_location::{S3Bucket, StorageLocationSpec};

/// 🧾 The spec half of a `ReportDataSource`.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[kube(
    group = "chargeback.coreos.com",
    version = "v1alpha1",
    kind = "ReportDataSource",
    plural = "reportdatasources",
    namespaced,
    status = "ReportDataSourceStatus",
    printcolumn = r#"{"name":"Table","type":"string","jsonPath":".status.tableName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ReportDataSourceSpec {
    /// 📈 Metrics-backed data source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promsum: Option<PromsumDataSource>,
    /// 💸 Billing-export-backed data source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_billing: Option<AwsBillingDataSource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromsumDataSource {
    /// 🗄️ Where the rows go. Absent means "whatever the namespace default is".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageLocationRef>,
}

/// 🗄️ Either an inline storage spec or the name of a `StorageLocation`. Or neither,
/// in which case the default storage location gets a phone call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageLocationRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_spec: Option<StorageLocationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_location_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwsBillingDataSource {
    /// 🪣 The bucket and prefix the Cost and Usage Report is delivered to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<S3Bucket>,
}

/// ✅ Written by the controller, read by everyone else.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportDataSourceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
}

impl ReportDataSource {
    /// 🏁 The provisioned table name, if there is one. Empty strings count as "not yet".
    pub fn table_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|status| status.table_name.as_deref())
            .filter(|table_name| !table_name.is_empty())
    }
}

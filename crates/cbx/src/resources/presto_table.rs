//! 🧾 PrestoTable: the receipt for a table we created.
//!
//! One per data source, named after it, owned by it. It records the exact
//! parameters the CREATE TABLE was rendered from, so whoever comes later
//! (auditors, partition workers, a very confused on-call engineer) can see how
//! the table came to be.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::hive::{Column, CreateTableParameters};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[kube(
    group = "chargeback.coreos.com",
    version = "v1alpha1",
    kind = "PrestoTable",
    plural = "prestotables",
    namespaced,
    printcolumn = r#"{"name":"Table","type":"string","jsonPath":".spec.creationParameters.tableName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PrestoTableSpec {
    pub creation_parameters: PrestoTableCreationParameters,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrestoTableCreationParameters {
    pub table_name: String,
    pub location: String,
    pub serde_fmt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub serde_props: BTreeMap<String, String>,
    #[serde(default)]
    pub columns: Vec<PrestoTableColumn>,
    #[serde(default)]
    pub partitions: Vec<PrestoTableColumn>,
    pub external: bool,
    pub ignore_exists: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrestoTableColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

impl From<&Column> for PrestoTableColumn {
    fn from(column: &Column) -> Self {
        Self {
            name: column.name.clone(),
            column_type: column.column_type.clone(),
        }
    }
}

impl From<&CreateTableParameters> for PrestoTableCreationParameters {
    fn from(params: &CreateTableParameters) -> Self {
        Self {
            table_name: params.name.clone(),
            location: params.location.clone(),
            serde_fmt: params.serde_fmt.clone(),
            format: params.format.clone(),
            serde_props: params.serde_props.clone(),
            columns: params.columns.iter().map(PrestoTableColumn::from).collect(),
            partitions: params.partitions.iter().map(PrestoTableColumn::from).collect(),
            external: params.external,
            ignore_exists: params.ignore_exists,
        }
    }
}

//! 🧾 Names and the PrestoTable receipt.
//!
//! Both names are pure functions of the data source name, which is what makes
//! re-running a sync safe: same data source, same table, same PrestoTable.

use anyhow::{Context, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::hive::CreateTableParameters;
use crate::resources::{PrestoTable, PrestoTableCreationParameters, PrestoTableSpec, ReportDataSource};

/// 🏷️ `aws-billing` → `datasource_aws_billing`. Hive identifiers don't do dashes.
pub fn data_source_table_name(data_source_name: &str) -> String {
    format!("datasource_{}", data_source_name.replace('-', "_"))
}

/// 🏷️ `AWS_Billing` → `reportdatasource-aws-billing`. Kube names don't do underscores or capitals.
pub fn data_source_name_to_presto_table_name(data_source_name: &str) -> String {
    format!("reportdatasource-{}", data_source_name)
        .to_lowercase()
        .replace('_', "-")
}

/// 🧾 Builds the PrestoTable for a data source: same namespace, same labels,
/// owned (and garbage collected) by the data source.
pub fn build_presto_table(data_source: &ReportDataSource, params: &CreateTableParameters) -> Result<PrestoTable> {
    let the_name = data_source.name_any();
    let the_uid = data_source
        .uid()
        .with_context(|| format!("💀 ReportDataSource {} has no uid, it cannot own anything yet", the_name))?;

    let mut the_table = PrestoTable::new(
        &data_source_name_to_presto_table_name(&the_name),
        PrestoTableSpec {
            creation_parameters: PrestoTableCreationParameters::from(params),
        },
    );
    the_table.metadata.namespace = data_source.namespace();
    the_table.metadata.labels = data_source.metadata.labels.clone();
    the_table.metadata.owner_references = Some(vec![OwnerReference {
        api_version: ReportDataSource::api_version(&()).to_string(),
        kind: ReportDataSource::kind(&()).to_string(),
        name: the_name,
        uid: the_uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]);
    Ok(the_table)
}

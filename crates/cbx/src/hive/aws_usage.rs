//! 💸 AWS usage tables: the Cost and Usage Report, as Hive sees it.
//!
//! The CSV layout is whatever AWS decided this month, so the columns come from the
//! manifests themselves. One column per `category/name` pair, in the order we first
//! see them. Every billing period becomes a partition.

use std::collections::{BTreeMap, HashSet};

use super::{Column, CreateTableParameters, LocationError, s3_location};
use crate::aws::{Manifest, ManifestColumn};

pub const AWS_USAGE_SERDE_FMT: &str = "org.apache.hadoop.hive.serde2.OpenCSVSerde";

pub const BILLING_PERIOD_START_PARTITION: &str = "billing_period_start";
pub const BILLING_PERIOD_END_PARTITION: &str = "billing_period_end";

fn aws_usage_serde_props() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("serialization.format".to_string(), ",".to_string()),
        ("field.delim".to_string(), ",".to_string()),
        ("collection.delim".to_string(), "undefined".to_string()),
        ("mapkey.delim".to_string(), "undefined".to_string()),
        ("timestamp.formats".to_string(), "yyyy-MM-dd'T'HH:mm:ssZ".to_string()),
    ])
}

/// 🏷️ `lineItem` + `UnblendedCost` → `lineitem_unblendedcost`. Hive is picky about identifiers.
pub fn aws_column_name(column: &ManifestColumn) -> String {
    format!("{}_{}", column.category, column.name)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// 🔢 AWS's type names to Hive's. Anything we don't recognise stays a string.
pub fn aws_column_type(column: &ManifestColumn) -> &'static str {
    match column.column_type.as_deref() {
        Some("DateTime") => "timestamp",
        Some("BigDecimal") | Some("OptionalBigDecimal") => "double",
        _ => "string",
    }
}

fn aws_usage_columns(manifests: &[Manifest]) -> Vec<Column> {
    let mut the_seen = HashSet::new();
    manifests
        .iter()
        .flat_map(|manifest| manifest.columns.iter())
        .filter_map(|column| {
            let the_name = aws_column_name(column);
            the_seen
                .insert(the_name.clone())
                .then(|| Column::new(the_name, aws_column_type(column)))
        })
        .collect()
}

/// 🪣 An external, partitioned CSV table over the report bucket.
pub fn aws_usage_table_params(
    table_name: &str,
    bucket: &str,
    prefix: &str,
    manifests: &[Manifest],
) -> Result<CreateTableParameters, LocationError> {
    Ok(CreateTableParameters {
        name: table_name.to_string(),
        location: s3_location(bucket, prefix)?,
        serde_fmt: AWS_USAGE_SERDE_FMT.to_string(),
        format: Some("textfile".to_string()),
        serde_props: aws_usage_serde_props(),
        columns: aws_usage_columns(manifests),
        partitions: vec![
            Column::new(BILLING_PERIOD_START_PARTITION, "string"),
            Column::new(BILLING_PERIOD_END_PARTITION, "string"),
        ],
        external: true,
        ignore_exists: true,
    })
}

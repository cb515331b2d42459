//! 💸 AWS Cost and Usage Report manifests.
//!
//! Every billing period, AWS drops a `<report>-Manifest.json` next to the CSVs.
//! It lists the columns, the billing period, and which files make up the report.
//! We only need a handful of those fields, but we parse the lot so a
//! [`Manifest`] can be logged, compared, and stared at.
//!
//! 🧠 Knowledge graph:
//! - Retrieved by a `ManifestRetriever` backend (S3 in prod, in-memory in tests).
//! - Columns feed `hive::aws_usage_table_params`.
//! - Billing period + data directory feed the partition worker.

use serde::{Deserialize, Serialize};

/// 🧾 One billing-export manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Manifest {
    pub assembly_id: String,
    pub account: String,
    pub columns: Vec<ManifestColumn>,
    pub charset: String,
    pub compression: String,
    pub content_type: String,
    pub report_id: String,
    pub report_name: String,
    pub billing_period: BillingPeriod,
    pub bucket: String,
    pub report_keys: Vec<String>,
    pub additional_artifact_keys: Vec<serde_json::Value>,
}

/// 📐 A CSV column as AWS describes it: `lineItem` / `UnblendedCost` / `BigDecimal`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestColumn {
    pub category: String,
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
}

/// 📅 `20180101T000000.000Z` to `20180201T000000.000Z`, in AWS's favourite format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start: String,
    pub end: String,
}

impl Manifest {
    /// 📅 The billing period as `(YYYYMMDD, YYYYMMDD)`, the shape partitions are keyed by.
    pub fn billing_period_range(&self) -> (String, String) {
        (
            billing_period_date(&self.billing_period.start),
            billing_period_date(&self.billing_period.end),
        )
    }

    /// 📁 The directory holding this report's data files, taken from the first report key.
    pub fn data_directory(&self) -> Option<&str> {
        self.report_keys
            .first()
            .and_then(|key| key.rsplit_once('/'))
            .map(|(directory, _file)| directory)
            .filter(|directory| !directory.is_empty())
    }
}

// -- `20180101T000000.000Z` → `20180101`. Anything without a `T` is passed through as is.
fn billing_period_date(timestamp: &str) -> String {
    timestamp
        .split_once('T')
        .map(|(date, _time)| date)
        .unwrap_or(timestamp)
        .to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 🧪 A realistic-enough manifest for a report called `cur` under `prefix`.
    pub(crate) fn sample_manifest(start: &str, end: &str) -> Manifest {
        let the_period = format!("{}-{}", &start[..8], &end[..8]);
        Manifest {
            assembly_id: "4b3c2a1d".to_string(),
            account: "123456789012".to_string(),
            columns: vec![
                ManifestColumn {
                    category: "identity".into(),
                    name: "LineItemId".into(),
                    column_type: Some("String".into()),
                },
                ManifestColumn {
                    category: "lineItem".into(),
                    name: "UsageStartDate".into(),
                    column_type: Some("DateTime".into()),
                },
                ManifestColumn {
                    category: "lineItem".into(),
                    name: "UnblendedCost".into(),
                    column_type: Some("BigDecimal".into()),
                },
                ManifestColumn {
                    category: "resourceTags".into(),
                    name: "user:team-name".into(),
                    column_type: None,
                },
            ],
            charset: "UTF-8".into(),
            compression: "GZIP".into(),
            content_type: "text/csv".into(),
            report_id: "deadbeef".into(),
            report_name: "cur".into(),
            billing_period: BillingPeriod {
                start: start.to_string(),
                end: end.to_string(),
            },
            bucket: "cur-bucket".into(),
            report_keys: vec![format!("prefix/cur/{}/4b3c2a1d/cur-1.csv.gz", the_period)],
            additional_artifact_keys: Vec::new(),
        }
    }

    #[test]
    fn the_one_where_aws_json_parses_without_drama() {
        let the_raw = r#"{
            "assemblyId": "4b3c2a1d",
            "account": "123456789012",
            "columns": [
                {"category": "identity", "name": "LineItemId"},
                {"category": "lineItem", "name": "UnblendedCost", "type": "BigDecimal"}
            ],
            "charset": "UTF-8",
            "compression": "GZIP",
            "contentType": "text/csv",
            "reportId": "deadbeef",
            "reportName": "cur",
            "billingPeriod": {"start": "20180101T000000.000Z", "end": "20180201T000000.000Z"},
            "bucket": "cur-bucket",
            "reportKeys": ["prefix/cur/20180101-20180201/4b3c2a1d/cur-1.csv.gz"],
            "additionalArtifactKeys": [{"artifactType": "RedshiftCommands", "name": "x.sql"}]
        }"#;

        let the_manifest: Manifest =
            serde_json::from_str(the_raw).expect("💀 a real-looking manifest failed to parse");

        assert_eq!(the_manifest.columns.len(), 2);
        assert_eq!(the_manifest.columns[0].column_type, None);
        assert_eq!(the_manifest.columns[1].column_type.as_deref(), Some("BigDecimal"));
        assert_eq!(
            the_manifest.billing_period_range(),
            ("20180101".to_string(), "20180201".to_string())
        );
        assert_eq!(
            the_manifest.data_directory(),
            Some("prefix/cur/20180101-20180201/4b3c2a1d")
        );
    }

    #[test]
    fn the_one_where_a_manifest_with_no_files_has_no_home() {
        let mut the_manifest = sample_manifest("20180101T000000.000Z", "20180201T000000.000Z");
        the_manifest.report_keys.clear();
        assert_eq!(the_manifest.data_directory(), None);

        the_manifest.report_keys.push("orphan.csv.gz".into());
        assert_eq!(the_manifest.data_directory(), None);
    }
}

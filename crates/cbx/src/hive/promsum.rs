//! 📈 Promsum tables: one row per metric sample, JSON on disk.
//!
//! Same four columns whether the data lives in the local warehouse or in S3.
//! Only the location (and whether Hive owns the files) changes.

use std::collections::BTreeMap;

use super::{Column, CreateTableParameters, LocationError, s3_location};

pub const PROMSUM_SERDE_FMT: &str = "org.apache.hive.hcatalog.data.JsonSerDe";

/// 📁 Where managed (local) tables live on the warehouse filesystem.
pub const LOCAL_WAREHOUSE_DIR: &str = "/user/hive/warehouse";

fn promsum_columns() -> Vec<Column> {
    vec![
        Column::new("amount", "double"),
        Column::new("timestamp", "timestamp"),
        Column::new("timePrecision", "double"),
        Column::new("labels", "map<string, string>"),
    ]
}

fn promsum_serde_props() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "timestamp.formats".to_string(),
        "yyyy-MM-dd'T'HH:mm:ss.SSSZ".to_string(),
    )])
}

/// 💾 A managed table in the local warehouse. Bare path, no scheme games.
pub fn local_promsum_table_params(table_name: &str) -> CreateTableParameters {
    CreateTableParameters {
        name: table_name.to_string(),
        location: format!("{}/{}", LOCAL_WAREHOUSE_DIR, table_name),
        serde_fmt: PROMSUM_SERDE_FMT.to_string(),
        format: None,
        serde_props: promsum_serde_props(),
        columns: promsum_columns(),
        partitions: Vec::new(),
        external: false,
        ignore_exists: true,
    }
}

/// 🪣 An external table over `s3a://bucket/prefix/`.
pub fn s3_promsum_table_params(
    table_name: &str,
    bucket: &str,
    prefix: &str,
) -> Result<CreateTableParameters, LocationError> {
    Ok(CreateTableParameters {
        location: s3_location(bucket, prefix)?,
        external: true,
        ..local_promsum_table_params(table_name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_local_tables_live_in_the_warehouse() {
        let the_params = local_promsum_table_params("datasource_pod_cpu");
        assert_eq!(the_params.location, "/user/hive/warehouse/datasource_pod_cpu");
        assert!(!the_params.external);
        assert!(the_params.ignore_exists);
        assert_eq!(the_params.columns.len(), 4);
        assert!(the_params.partitions.is_empty());

        let the_ddl = the_params.render();
        assert!(the_ddl.starts_with("CREATE TABLE IF NOT EXISTS datasource_pod_cpu ( amount double, "));
        assert!(the_ddl.contains("labels map<string, string>"));
        assert!(the_ddl.contains("LOCATION \"/user/hive/warehouse/datasource_pod_cpu\""));
    }

    #[test]
    fn the_one_where_s3_tables_go_external() {
        let the_params = s3_promsum_table_params("datasource_pod_cpu", "metrics", "promsum/cpu")
            .expect("💀 a perfectly normal bucket was rejected");
        assert_eq!(the_params.location, "s3a://metrics/promsum/cpu/");
        assert!(the_params.external);
        assert_eq!(the_params.columns, promsum_columns());
        assert!(the_params.render().starts_with("CREATE EXTERNAL TABLE IF NOT EXISTS"));
    }

    #[test]
    fn the_one_where_no_bucket_means_no_table() {
        assert!(s3_promsum_table_params("t", "", "prefix").is_err());
    }
}

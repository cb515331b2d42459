//! 🐝 Hive: the DDL builder.
//!
//! 🎬 COLD OPEN. INT. QUERY ENGINE. A CREATE TABLE statement arrives. It is
//! well formed. Nobody is more surprised than the query engine.
//!
//! Pure string rendering, no I/O (except [`create_table`], which hands the
//! rendered text to a [`Queryer`] and is the only thing in here that can time out).
//!
//! 🧠 Knowledge graph:
//! - [`CreateTableParameters`]: the one normalized shape every data-source flavour
//!   produces. Rendered into DDL here, copied into a `PrestoTable` by the reconciler.
//! - [`render_create_table`]: the literal grammar the query engine accepts.
//! - [`s3_location`]: bucket + prefix → `s3a://bucket/prefix/`, always one trailing slash.
//! - [`promsum`] and [`aws_usage`]: the two table shapes, each a params builder.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::backends::Queryer;

pub mod aws_usage;
pub mod promsum;

pub use aws_usage::aws_usage_table_params;
pub use promsum::{local_promsum_table_params, s3_promsum_table_params};

/// 📐 One column: a name and a Hive type. `amount double`. That's it. That's the column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }

    /// 🖨️ `name type`, the way a CREATE TABLE wants it.
    pub fn render(&self) -> String {
        format!("{} {}", self.name, self.column_type)
    }
}

/// 📦 Everything needed to create a table, and everything we record about it afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTableParameters {
    pub name: String,
    pub location: String,
    pub serde_fmt: String,
    /// 🏷️ Optional storage format hint. Recorded, not rendered.
    pub format: Option<String>,
    pub serde_props: BTreeMap<String, String>,
    pub columns: Vec<Column>,
    pub partitions: Vec<Column>,
    pub external: bool,
    pub ignore_exists: bool,
}

impl CreateTableParameters {
    /// 🖨️ Renders the full CREATE TABLE statement, partitions included when there are any.
    pub fn render(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(Column::render).collect();
        let partitions: Vec<String> = self.partitions.iter().map(Column::render).collect();
        render_create_table_with_partitions(
            &self.name,
            &self.location,
            &self.serde_fmt,
            &self.serde_props,
            &columns,
            &partitions,
            self.external,
            self.ignore_exists,
        )
    }
}

/// 💀 A location we refuse to build.
#[derive(Error, Debug)]
pub enum LocationError {
    #[error("bucket name is empty, there is nowhere to put the table")]
    EmptyBucket,
    #[error("computed location is not a valid URI: {0}")]
    InvalidUri(#[from] url::ParseError),
    #[error("bucket {0:?} does not make a URI with a path")]
    NotHierarchical(String),
}

/// 🖨️ Renders a CREATE TABLE statement.
///
/// ```text
/// CREATE [EXTERNAL] TABLE [IF NOT EXISTS] <name> ( <col type>, ... ) ROW FORMAT SERDE '<fmt>'
///   WITH SERDEPROPERTIES ("k" = "v", ...) LOCATION "<location>"
/// ```
/// (on one line, the wrap above is for humans)
pub fn render_create_table<S: AsRef<str>>(
    name: &str,
    location: &str,
    serde_fmt: &str,
    serde_props: &BTreeMap<String, String>,
    columns: &[S],
    external: bool,
    ignore_exists: bool,
) -> String {
    render_create_table_with_partitions(
        name,
        location,
        serde_fmt,
        serde_props,
        columns,
        &[] as &[&str],
        external,
        ignore_exists,
    )
}

/// 🖨️ Same as [`render_create_table`], plus a `PARTITIONED BY ( ... )` clause right
/// after the column list when `partitions` is non-empty.
#[allow(clippy::too_many_arguments)]
pub fn render_create_table_with_partitions<S: AsRef<str>, P: AsRef<str>>(
    name: &str,
    location: &str,
    serde_fmt: &str,
    serde_props: &BTreeMap<String, String>,
    columns: &[S],
    partitions: &[P],
    external: bool,
    ignore_exists: bool,
) -> String {
    let mut the_statement = String::from("CREATE ");
    if external {
        the_statement.push_str("EXTERNAL ");
    }
    the_statement.push_str("TABLE ");
    if ignore_exists {
        the_statement.push_str("IF NOT EXISTS ");
    }
    the_statement.push_str(name);
    the_statement.push_str(&format!(" ( {} )", fmt_column_text(columns)));
    if !partitions.is_empty() {
        the_statement.push_str(&format!(" PARTITIONED BY ( {} )", fmt_column_text(partitions)));
    }
    the_statement.push_str(&format!(
        " ROW FORMAT SERDE '{}' WITH SERDEPROPERTIES ({}) LOCATION \"{}\"",
        serde_fmt,
        fmt_serde_props(serde_props),
        location
    ));
    the_statement
}

/// 🧩 Renders an `ALTER TABLE ... ADD IF NOT EXISTS PARTITION` statement.
/// Partition values are single-quoted, embedded quotes doubled.
pub fn render_add_partition(table: &str, partition_values: &[(String, String)], location: &str) -> String {
    let the_spec = partition_values
        .iter()
        .map(|(column, value)| format!("{}='{}'", column, value.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "ALTER TABLE {} ADD IF NOT EXISTS PARTITION ({}) LOCATION \"{}\"",
        table, the_spec, location
    )
}

/// 🔧 `"k" = "v", "k2" = "v2"` with both sides quoted and escaped.
fn fmt_serde_props(props: &BTreeMap<String, String>) -> String {
    props
        .iter()
        .map(|(key, value)| format!("{:?} = {:?}", key, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 🔧 `a string, b double`. Comma separated, no trailing comma, no surprises.
fn fmt_column_text<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|column| column.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}

/// 🪣 Builds the `s3a://` location for a bucket and prefix.
///
/// Joins the two as a path (duplicate and dangling slashes collapse) and forces
/// exactly one trailing `/`. Every prefix segment is percent-encoded on its own,
/// so `%`, `?` and `#` stay part of the path. Same bucket and prefix in, same URI out.
pub fn s3_location(bucket: &str, prefix: &str) -> Result<String, LocationError> {
    let mut the_segments: Vec<&str> = Vec::new();
    for segment in bucket.split('/').chain(prefix.split('/')) {
        match segment {
            "" | "." => {}
            // -- the bucket is load-bearing, `..` does not get to climb out of it
            ".." => {
                if the_segments.len() > 1 {
                    the_segments.pop();
                }
            }
            segment => the_segments.push(segment),
        }
    }
    if bucket.split('/').all(|segment| segment.is_empty() || segment == ".") {
        return Err(LocationError::EmptyBucket);
    }
    let Some((the_bucket, the_path)) = the_segments.split_first() else {
        return Err(LocationError::EmptyBucket);
    };
    let mut the_url = Url::parse(&format!("s3a://{}/", the_bucket))?;
    the_url
        .path_segments_mut()
        .map_err(|()| LocationError::NotHierarchical(the_bucket.to_string()))?
        .pop_if_empty()
        .extend(the_path)
        .push("");
    Ok(the_url.to_string())
}

/// 🚀 Renders the CREATE TABLE for `params` and runs it through the query engine.
pub async fn create_table<Q: Queryer + ?Sized>(queryer: &Q, params: &CreateTableParameters) -> Result<()> {
    let the_statement = params.render();
    tracing::debug!(table = %params.name, "🐝 executing DDL: {}", the_statement);
    queryer
        .query(&the_statement)
        .await
        .with_context(|| format!("💀 CREATE TABLE {} was rejected by the query engine", params.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_every_piece_of_the_grammar_shows_up() {
        let the_props = BTreeMap::from([("a".to_string(), "b".to_string())]);
        let the_ddl = render_create_table("t", "/loc", "fmt", &the_props, &["x string"], true, true);

        for the_piece in [
            "CREATE EXTERNAL TABLE",
            "IF NOT EXISTS",
            "t",
            "x string",
            "ROW FORMAT SERDE 'fmt'",
            "\"a\" = \"b\"",
            "LOCATION \"/loc\"",
        ] {
            assert!(the_ddl.contains(the_piece), "missing {:?} in {}", the_piece, the_ddl);
        }
        assert_eq!(
            the_ddl,
            "CREATE EXTERNAL TABLE IF NOT EXISTS t ( x string ) ROW FORMAT SERDE 'fmt' \
             WITH SERDEPROPERTIES (\"a\" = \"b\") LOCATION \"/loc\""
        );
    }

    #[test]
    fn the_one_where_managed_tables_skip_the_optional_words() {
        let the_ddl = render_create_table(
            "plain",
            "/user/hive/warehouse/plain",
            "fmt",
            &BTreeMap::new(),
            &["a int", "b string"],
            false,
            false,
        );
        assert!(the_ddl.starts_with("CREATE TABLE plain ( a int, b string )"));
        assert!(!the_ddl.contains("EXTERNAL"));
        assert!(!the_ddl.contains("IF NOT EXISTS"));
        assert!(the_ddl.contains("WITH SERDEPROPERTIES ()"));
        assert!(!the_ddl.contains(", )"), "trailing comma snuck in: {}", the_ddl);
    }

    #[test]
    fn the_one_where_every_property_shows_up_exactly_once() {
        let the_props = BTreeMap::from([
            ("field.delim".to_string(), ",".to_string()),
            ("timestamp.formats".to_string(), "yyyy-MM-dd".to_string()),
            ("quote".to_string(), "\"".to_string()),
        ]);
        let the_ddl = render_create_table("t", "/l", "f", &the_props, &["a int"], true, true);

        assert_eq!(the_ddl.matches("\"field.delim\" = \",\"").count(), 1);
        assert_eq!(the_ddl.matches("\"timestamp.formats\" = \"yyyy-MM-dd\"").count(), 1);
        assert_eq!(the_ddl.matches("\"quote\" = \"\\\"\"").count(), 1);
        assert_eq!(the_ddl.matches(", \"").count(), 2);
    }

    #[test]
    fn the_one_where_partitions_get_their_own_clause() {
        let the_params = CreateTableParameters {
            name: "usage".into(),
            location: "s3a://b/p/".into(),
            serde_fmt: "csv".into(),
            columns: vec![Column::new("cost", "double")],
            partitions: vec![
                Column::new("billing_period_start", "string"),
                Column::new("billing_period_end", "string"),
            ],
            external: true,
            ignore_exists: true,
            ..Default::default()
        };
        let the_ddl = the_params.render();
        assert!(the_ddl.contains(
            "usage ( cost double ) PARTITIONED BY ( billing_period_start string, billing_period_end string ) ROW FORMAT"
        ));
    }

    #[test]
    fn the_one_where_trailing_slashes_are_not_a_matter_of_opinion() {
        let the_expected = "s3a://bucket/prefix/";
        assert_eq!(s3_location("bucket", "prefix").expect("💀 plain join"), the_expected);
        assert_eq!(s3_location("bucket", "prefix/").expect("💀 trailing slash"), the_expected);
        assert_eq!(s3_location("bucket/", "/prefix//").expect("💀 slash soup"), the_expected);
        assert_eq!(s3_location("bucket", "").expect("💀 no prefix"), "s3a://bucket/");
        assert_eq!(
            s3_location("bucket", "a/b/../c/./d").expect("💀 dots"),
            "s3a://bucket/a/c/d/"
        );
    }

    #[test]
    fn the_one_where_the_same_inputs_always_land_in_the_same_place() {
        let the_first = s3_location("my-bucket", "reports/cost and usage").expect("💀 first");
        let the_second = s3_location("my-bucket", "reports/cost and usage").expect("💀 second");
        assert_eq!(the_first, the_second);
        assert_eq!(the_first, "s3a://my-bucket/reports/cost%20and%20usage/");
    }

    #[test]
    fn the_one_where_uri_punctuation_in_a_prefix_stays_in_the_path() {
        assert_eq!(s3_location("b", "50%off").expect("💀 percent"), "s3a://b/50%25off/");
        assert_eq!(s3_location("b", "a?x").expect("💀 question mark"), "s3a://b/a%3Fx/");
        assert_eq!(s3_location("b", "a#x/y").expect("💀 hash"), "s3a://b/a%23x/y/");
    }

    #[test]
    fn the_one_where_an_empty_bucket_is_a_hard_no() {
        assert!(matches!(s3_location("", "prefix"), Err(LocationError::EmptyBucket)));
        assert!(matches!(s3_location("/", "prefix"), Err(LocationError::EmptyBucket)));
    }

    #[test]
    fn the_one_where_partitions_are_added_politely() {
        let the_ddl = render_add_partition(
            "datasource_aws",
            &[
                ("billing_period_start".to_string(), "20180101".to_string()),
                ("billing_period_end".to_string(), "20180201".to_string()),
            ],
            "s3a://bucket/prefix/report/20180101-20180201/abc/",
        );
        assert_eq!(
            the_ddl,
            "ALTER TABLE datasource_aws ADD IF NOT EXISTS PARTITION \
             (billing_period_start='20180101', billing_period_end='20180201') \
             LOCATION \"s3a://bucket/prefix/report/20180101-20180201/abc/\""
        );

        let the_sneaky = render_add_partition("t", &[("k".to_string(), "it's".to_string())], "/l");
        assert!(the_sneaky.contains("k='it''s'"));
    }
}

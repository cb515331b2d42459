//! 🧩 The PartitionWorker: one Hive partition per billing period.
//!
//! An AWS billing table is created empty of partitions. Every data source that
//! comes through the channel has its manifests re-read, and each billing period
//! becomes `ALTER TABLE ... ADD IF NOT EXISTS PARTITION`, pointed at the directory
//! AWS wrote that period's CSVs to.
//!
//! Failures are logged and the data source is skipped. The table already exists,
//! a missing partition only means a report sees less data until the next pass.

use anyhow::{Context, Result};
use async_channel::Receiver;
use kube::ResourceExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Worker;
use crate::backends::{ManifestBackend, ManifestRetriever, QueryBackend, Queryer};
use crate::hive::aws_usage::{BILLING_PERIOD_END_PARTITION, BILLING_PERIOD_START_PARTITION};
use crate::hive::{render_add_partition, s3_location};
use crate::resources::ReportDataSource;

#[derive(Debug)]
pub(crate) struct PartitionWorker {
    rx: Receiver<ReportDataSource>,
    manifests: ManifestBackend,
    queryer: QueryBackend,
}

impl PartitionWorker {
    pub(crate) fn new(rx: Receiver<ReportDataSource>, manifests: ManifestBackend, queryer: QueryBackend) -> Self {
        Self { rx, manifests, queryer }
    }

    /// 🧩 Registers every billing period of `data_source`. Returns how many partitions were added.
    async fn register_partitions(&self, data_source: &ReportDataSource) -> Result<usize> {
        let Some(the_table) = data_source.table_name() else {
            debug!(datasource = %data_source.name_any(), "🤷 no table yet, nothing to partition");
            return Ok(0);
        };
        let Some(the_source) = data_source
            .spec
            .aws_billing
            .as_ref()
            .and_then(|aws_billing| aws_billing.source.as_ref())
        else {
            debug!(datasource = %data_source.name_any(), "🤷 not an AWS billing data source");
            return Ok(0);
        };

        let the_manifests = self
            .manifests
            .retrieve_manifests(&the_source.bucket, &the_source.prefix)
            .await
            .with_context(|| {
                format!(
                    "💀 failed to retrieve billing manifests from s3://{}/{}",
                    the_source.bucket, the_source.prefix
                )
            })?;

        let mut the_added = 0;
        for the_manifest in &the_manifests {
            let Some(the_directory) = the_manifest.data_directory() else {
                warn!(
                    table = %the_table,
                    assembly_id = %the_manifest.assembly_id,
                    "🤷 manifest lists no report files, skipping its billing period"
                );
                continue;
            };
            let (the_start, the_end) = the_manifest.billing_period_range();
            let the_location = s3_location(&the_source.bucket, the_directory)?;
            let the_statement = render_add_partition(
                the_table,
                &[
                    (BILLING_PERIOD_START_PARTITION.to_string(), the_start),
                    (BILLING_PERIOD_END_PARTITION.to_string(), the_end),
                ],
                &the_location,
            );
            self.queryer
                .query(&the_statement)
                .await
                .with_context(|| format!("💀 failed to add partition at {} to {}", the_location, the_table))?;
            the_added += 1;
        }
        Ok(the_added)
    }
}

impl Worker for PartitionWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("🧩 partition worker started");
            while let Ok(the_data_source) = self.rx.recv().await {
                match self.register_partitions(&the_data_source).await {
                    Ok(the_added) => info!(
                        datasource = %the_data_source.name_any(),
                        partitions = the_added,
                        "🧩 billing periods registered"
                    ),
                    Err(the_error) => error!(
                        datasource = %the_data_source.name_any(),
                        "💀 partition discovery failed, skipping: {:#}",
                        the_error
                    ),
                }
            }
            debug!("🏁 partition channel closed, partition worker going home");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::tests::sample_manifest;
    use crate::backends::{InMemoryManifests, RecordingQueryer};
    use crate::reconciler::tests::{aws_billing, data_source, promsum};
    use crate::resources::ReportDataSourceStatus;

    fn provisioned(name: &str) -> ReportDataSource {
        let mut the_data_source = data_source(name, aws_billing("cur-bucket", "prefix"));
        the_data_source.status = Some(ReportDataSourceStatus {
            table_name: Some(format!("datasource_{}", name.replace('-', "_"))),
        });
        the_data_source
    }

    async fn drain(items: Vec<ReportDataSource>, manifests: &InMemoryManifests, queryer: &RecordingQueryer) {
        let (the_tx, the_rx) = async_channel::bounded(items.len().max(1));
        for the_item in items {
            the_tx.try_send(the_item).expect("💀 channel sized for the test items");
        }
        the_tx.close();

        PartitionWorker::new(
            the_rx,
            ManifestBackend::InMemory(manifests.clone()),
            QueryBackend::InMemory(queryer.clone()),
        )
        .start()
        .await
        .expect("💀 partition worker panicked")
        .expect("💀 partition worker should exit when the channel closes");
    }

    #[tokio::test]
    async fn the_one_where_each_billing_period_gets_a_partition() {
        let the_manifests = InMemoryManifests::new();
        the_manifests
            .insert(
                "cur-bucket",
                "prefix",
                vec![
                    sample_manifest("20180101T000000.000Z", "20180201T000000.000Z"),
                    sample_manifest("20180201T000000.000Z", "20180301T000000.000Z"),
                ],
            )
            .await;
        let the_queryer = RecordingQueryer::new();

        drain(vec![provisioned("aws-billing")], &the_manifests, &the_queryer).await;

        assert_eq!(
            the_queryer.statements().await,
            vec![
                "ALTER TABLE datasource_aws_billing ADD IF NOT EXISTS PARTITION \
                 (billing_period_start='20180101', billing_period_end='20180201') \
                 LOCATION \"s3a://cur-bucket/prefix/cur/20180101-20180201/4b3c2a1d/\""
                    .to_string(),
                "ALTER TABLE datasource_aws_billing ADD IF NOT EXISTS PARTITION \
                 (billing_period_start='20180201', billing_period_end='20180301') \
                 LOCATION \"s3a://cur-bucket/prefix/cur/20180201-20180301/4b3c2a1d/\""
                    .to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn the_one_where_the_uninvited_are_ignored_and_failures_do_not_stop_the_line() {
        let the_manifests = InMemoryManifests::new();
        the_manifests
            .insert(
                "cur-bucket",
                "prefix",
                vec![sample_manifest("20180101T000000.000Z", "20180201T000000.000Z")],
            )
            .await;
        let the_queryer = RecordingQueryer::new();
        the_queryer.fail(true).await;

        let the_unprovisioned = data_source("fresh", aws_billing("cur-bucket", "prefix"));
        let the_promsum = data_source("cpu", promsum(None));
        drain(
            vec![the_unprovisioned, the_promsum, provisioned("a"), provisioned("b")],
            &the_manifests,
            &the_queryer,
        )
        .await;

        // -- only the two provisioned sources got as far as the query engine, and both were tried
        assert_eq!(the_queryer.statements().await.len(), 2);
        assert_eq!(the_manifests.calls().await, 2);
    }
}

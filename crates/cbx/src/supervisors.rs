//! 🎬 *[camera pans across a dimly lit control plane]*
//! 🎬 "In a world where ReportDataSources pile up unprovisioned..."
//! 🎬 "One supervisor dared to hand them out, one key at a time."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor owns the work queue, the worker pool and the partition
//! worker. Keys go in through [`Supervisor::queue`], stats come out through
//! [`Supervisor::stats`], and [`Supervisor::run`] keeps everything going until
//! it's told to stop.
//!
//! ⚠️ The workers themselves stay private. Nobody outside gets to poke a worker.

mod workers;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use async_channel::Sender;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::app_config::RuntimeConfig;
use crate::backends::{ManifestBackend, QueryBackend};
use crate::reconciler::{DataSourceReconciler, PartitionHandoff};
use crate::resources::ReportDataSource;
use crate::work_queue::WorkQueue;
use workers::{DataSourceWorker, PartitionWorker, Worker};

/// 📊 What the workers got up to. Shared, lock-free, and only ever counted up.
#[derive(Debug, Default)]
pub struct ReconcileStats {
    synced: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

impl ReconcileStats {
    pub(crate) fn record_synced(&self) {
        self.synced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            synced: self.synced.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// 📸 A point-in-time copy of [`ReconcileStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub synced: u64,
    pub retried: u64,
    /// 💀 Keys given up on: malformed keys, configuration errors, and retryable errors out of retries.
    pub dropped: u64,
}

/// 📦 The Supervisor: hands out keys, counts outcomes, turns the lights off at the end.
#[derive(Debug)]
pub struct Supervisor {
    runtime: RuntimeConfig,
    reconciler: DataSourceReconciler,
    manifests: ManifestBackend,
    queryer: QueryBackend,
    queue: Arc<WorkQueue<String>>,
    stats: Arc<ReconcileStats>,
    partition_tx: Sender<ReportDataSource>,
    partition_rx: async_channel::Receiver<ReportDataSource>,
}

impl Supervisor {
    /// 🚀 Wires the reconciler to a fresh queue and a bounded partition channel.
    ///
    /// `manifests` and `queryer` are for the partition worker, which re-reads the
    /// manifests for each table it is handed.
    pub fn new(
        runtime: RuntimeConfig,
        reconciler: DataSourceReconciler,
        manifests: ManifestBackend,
        queryer: QueryBackend,
    ) -> Self {
        let (partition_tx, partition_rx) = async_channel::bounded(runtime.partition_queue_capacity.max(1));
        let reconciler = reconciler.with_partition_handoff(PartitionHandoff {
            tx: partition_tx.clone(),
            send_timeout: runtime.partition_send_timeout(),
        });
        Self {
            queue: Arc::new(WorkQueue::new(runtime.backoff())),
            stats: Arc::new(ReconcileStats::default()),
            runtime,
            reconciler,
            manifests,
            queryer,
            partition_tx,
            partition_rx,
        }
    }

    /// 📬 The queue keys go into. Hand it to whatever watches the cluster.
    pub fn queue(&self) -> Arc<WorkQueue<String>> {
        Arc::clone(&self.queue)
    }

    pub fn stats(&self) -> Arc<ReconcileStats> {
        Arc::clone(&self.stats)
    }

    /// 🧵 Spawns `worker_count` data source workers and one partition worker.
    fn start_workers(&self) -> (Vec<JoinHandle<Result<()>>>, JoinHandle<Result<()>>) {
        let the_worker_count = self.runtime.worker_count.max(1);
        info!(workers = the_worker_count, "🧵 starting data source workers");

        let the_workers = (0..the_worker_count)
            .map(|worker_id| {
                DataSourceWorker::new(
                    worker_id,
                    self.queue(),
                    self.reconciler.clone(),
                    self.stats(),
                    self.runtime.max_retries,
                )
                .start()
            })
            .collect();
        let the_partition_worker =
            PartitionWorker::new(self.partition_rx.clone(), self.manifests.clone(), self.queryer.clone()).start();
        (the_workers, the_partition_worker)
    }

    /// 🔄 Runs until `shutdown` resolves, then drains: workers finish their current key
    /// and exit, the partition channel closes, the partition worker empties it and exits.
    pub async fn run<F>(self, shutdown: F) -> Result<StatsSnapshot>
    where
        F: Future<Output = ()>,
    {
        let (the_workers, the_partition_worker) = self.start_workers();

        shutdown.await;
        info!("🛑 shutdown requested, draining workers");
        self.queue.shut_down();

        let mut the_first_failure = None;
        for the_worker in the_workers {
            if let Err(the_error) = flatten(the_worker.await) {
                warn!("💀 data source worker ended badly: {:#}", the_error);
                the_first_failure.get_or_insert(the_error);
            }
        }

        // -- no sync can hand anything off anymore, let the partition worker finish what it has
        self.partition_tx.close();
        if let Err(the_error) = flatten(the_partition_worker.await) {
            warn!("💀 partition worker ended badly: {:#}", the_error);
            the_first_failure.get_or_insert(the_error);
        }

        let the_stats = self.stats.snapshot();
        info!(
            synced = the_stats.synced,
            retried = the_stats.retried,
            dropped = the_stats.dropped,
            "🏁 supervisor stopped"
        );
        match the_first_failure {
            Some(the_error) => Err(the_error),
            None => Ok(the_stats),
        }
    }
}

fn flatten(joined: Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.context("💀 worker task panicked or was cancelled")?
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::aws::tests::sample_manifest;
    use crate::reconciler::tests::{Harness, aws_billing, data_source};

    fn runtime() -> RuntimeConfig {
        RuntimeConfig {
            worker_count: 2,
            max_retries: 3,
            base_backoff_ms: 1,
            max_backoff_ms: 5,
            partition_queue_capacity: 4,
            partition_send_timeout_ms: 100,
        }
    }

    fn supervisor_for(harness: &Harness) -> Supervisor {
        Supervisor::new(
            runtime(),
            harness.reconciler.clone(),
            ManifestBackend::InMemory(harness.manifests.clone()),
            QueryBackend::InMemory(harness.queryer.clone()),
        )
    }

    #[tokio::test]
    async fn the_one_where_aws_tables_get_their_partitions_before_lights_out() {
        let the_harness = Harness::new();
        the_harness
            .store
            .insert_data_source(data_source("aws-billing", aws_billing("cur-bucket", "prefix")))
            .await;
        the_harness
            .manifests
            .insert(
                "cur-bucket",
                "prefix",
                vec![
                    sample_manifest("20180101T000000.000Z", "20180201T000000.000Z"),
                    sample_manifest("20180201T000000.000Z", "20180301T000000.000Z"),
                ],
            )
            .await;

        let the_supervisor = supervisor_for(&the_harness);
        let the_queue = the_supervisor.queue();
        let the_stats = the_supervisor.stats();
        the_queue.add("metering/aws-billing".to_string());

        let (the_stop_tx, the_stop_rx) = tokio::sync::oneshot::channel::<()>();
        let the_run = tokio::spawn(the_supervisor.run(async move {
            let _ = the_stop_rx.await;
        }));

        tokio::time::timeout(Duration::from_secs(2), async {
            while the_stats.snapshot().synced < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("💀 the key never got synced");
        let _ = the_stop_tx.send(());

        let the_final = the_run
            .await
            .expect("💀 supervisor task panicked")
            .expect("💀 supervisor should stop cleanly");
        assert_eq!(the_final.synced, 1);
        assert_eq!(the_final.dropped, 0);

        let the_statements = the_harness.queryer.statements().await;
        assert_eq!(the_statements.len(), 3, "one CREATE and two partitions: {:#?}", the_statements);
        assert!(the_statements[0].starts_with("CREATE EXTERNAL TABLE"));
        assert!(the_statements[1].contains("billing_period_start='20180101', billing_period_end='20180201'"));
        assert!(the_statements[2].contains("billing_period_start='20180201', billing_period_end='20180301'"));
    }

    #[tokio::test]
    async fn the_one_where_shutdown_with_nothing_to_do_is_instant() {
        let the_harness = Harness::new();
        let the_supervisor = supervisor_for(&the_harness);

        let the_final = tokio::time::timeout(Duration::from_secs(1), the_supervisor.run(async {}))
            .await
            .expect("💀 an idle supervisor should stop right away")
            .expect("💀 supervisor should stop cleanly");
        assert_eq!(the_final, StatsSnapshot::default());
    }
}

//! 🎬 *[a key comes off the queue. the worker squints at it.]*
//!
//! 🔄 The DataSourceWorker: get a key, sync it, decide its fate, repeat until
//! the queue says there is nothing left.
//!
//! Fates, in order of happiness:
//! - ✅ synced: forget its failures, move on.
//! - 🗑️ discarded: a key that doesn't even parse. Counted as dropped, never retried.
//! - 🔄 flaky: back in the queue with a backoff, if it still has retries left.
//! - 💀 hopeless: a configuration error, or out of retries. Dropped, and loudly.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, warn};

use super::Worker;
use crate::error::SyncError;
use crate::reconciler::{DataSourceReconciler, SyncContext, SyncOutcome};
use crate::supervisors::ReconcileStats;
use crate::work_queue::WorkQueue;

#[derive(Debug)]
pub(crate) struct DataSourceWorker {
    id: usize,
    queue: Arc<WorkQueue<String>>,
    reconciler: DataSourceReconciler,
    stats: Arc<ReconcileStats>,
    max_retries: u32,
}

impl DataSourceWorker {
    pub(crate) fn new(
        id: usize,
        queue: Arc<WorkQueue<String>>,
        reconciler: DataSourceReconciler,
        stats: Arc<ReconcileStats>,
        max_retries: u32,
    ) -> Self {
        Self {
            id,
            queue,
            reconciler,
            stats,
            max_retries,
        }
    }

    async fn process(&self, key: String) {
        let the_ctx = SyncContext::new(self.id, key.clone());
        let the_span = the_ctx.span();
        let the_result = self.reconciler.sync(&the_ctx).instrument(the_span.clone()).await;
        the_span.in_scope(|| self.handle_result(&key, the_result));
        self.queue.done(&key);
    }

    /// ⚖️ Decides what happens to `key` after a sync. Never blocks.
    fn handle_result(&self, key: &String, result: Result<SyncOutcome, SyncError>) {
        let the_error = match result {
            Ok(SyncOutcome::Synced) => {
                self.queue.forget(key);
                self.stats.record_synced();
                return;
            }
            Ok(SyncOutcome::Discarded) => {
                self.queue.forget(key);
                self.stats.record_dropped();
                return;
            }
            Err(the_error) => the_error,
        };

        let the_requeues = self.queue.num_requeues(key);
        if !the_error.is_retryable() {
            self.queue.forget(key);
            self.stats.record_dropped();
            error!(
                key = %key,
                attempts = the_requeues + 1,
                "💀 dropping ReportDataSource out of the queue, fix its configuration: {:#}",
                anyhow::Error::from(the_error)
            );
            return;
        }

        if the_requeues < self.max_retries {
            warn!(
                key = %key,
                attempt = the_requeues + 1,
                "🔄 error syncing ReportDataSource, will retry: {:#}",
                anyhow::Error::from(the_error)
            );
            self.queue.add_rate_limited(key.clone());
            self.stats.record_retried();
        } else {
            self.queue.forget(key);
            self.stats.record_dropped();
            error!(
                key = %key,
                attempts = the_requeues + 1,
                "💀 dropping ReportDataSource out of the queue after too many retries: {:#}",
                anyhow::Error::from(the_error)
            );
        }
    }
}

impl Worker for DataSourceWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!(worker_id = self.id, "🧵 ReportDataSource worker started");
            while let Some(the_key) = self.queue.get().await {
                self.process(the_key).await;
            }
            debug!(worker_id = self.id, "🏁 queue shut down, worker going home");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::reconciler::tests::{Harness, data_source, promsum};
    use crate::resources::{LocalStorage, ReportDataSourceSpec, StorageLocationRef, StorageLocationSpec};
    use crate::work_queue::Backoff;

    const MAX_RETRIES: u32 = 3;

    fn local_promsum() -> ReportDataSourceSpec {
        promsum(Some(StorageLocationRef {
            storage_spec: Some(StorageLocationSpec {
                local: Some(LocalStorage {}),
                s3: None,
            }),
            storage_location_name: None,
        }))
    }

    /// 🧪 One worker against `harness`, until `done` says the stats look finished.
    async fn run_until(harness: &Harness, key: &str, done: impl Fn(&ReconcileStats) -> bool) -> Arc<ReconcileStats> {
        let the_queue = Arc::new(WorkQueue::new(Backoff {
            base: Duration::from_millis(1),
            max: Duration::from_millis(4),
        }));
        let the_stats = Arc::new(ReconcileStats::default());
        let the_handle = DataSourceWorker::new(
            0,
            Arc::clone(&the_queue),
            harness.reconciler.clone(),
            Arc::clone(&the_stats),
            MAX_RETRIES,
        )
        .start();

        the_queue.add(key.to_string());
        tokio::time::timeout(Duration::from_secs(2), async {
            while !done(&the_stats) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("💀 the worker never got there");

        // -- give a stray requeue the chance to show up before we count
        tokio::time::sleep(Duration::from_millis(30)).await;
        the_queue.shut_down();
        the_handle
            .await
            .expect("💀 worker panicked")
            .expect("💀 worker should exit cleanly");
        the_stats
    }

    #[tokio::test]
    async fn the_one_where_a_good_key_is_synced_once() {
        let the_harness = Harness::new();
        the_harness.store.insert_data_source(data_source("cpu", local_promsum())).await;

        let the_stats = run_until(&the_harness, "metering/cpu", |stats| stats.snapshot().synced == 1).await;

        assert_eq!(
            the_stats.snapshot(),
            crate::supervisors::StatsSnapshot {
                synced: 1,
                retried: 0,
                dropped: 0
            }
        );
        assert_eq!(the_harness.queryer.statements().await.len(), 1);
    }

    #[tokio::test]
    async fn the_one_where_a_failing_key_gets_bound_plus_one_tries_then_the_boot() {
        let the_harness = Harness::new();
        the_harness.store.insert_data_source(data_source("cpu", local_promsum())).await;
        the_harness.queryer.fail(true).await;

        let the_stats = run_until(&the_harness, "metering/cpu", |stats| stats.snapshot().dropped == 1).await;

        // -- every attempt issues exactly one CREATE, so the statement count is the attempt count
        assert_eq!(the_harness.queryer.statements().await.len(), (MAX_RETRIES + 1) as usize);
        let the_snapshot = the_stats.snapshot();
        assert_eq!(the_snapshot.retried, MAX_RETRIES as u64);
        assert_eq!(the_snapshot.dropped, 1);
        assert_eq!(the_snapshot.synced, 0);
    }

    #[tokio::test]
    async fn the_one_where_a_config_error_is_dropped_on_the_spot() {
        let the_harness = Harness::new();
        the_harness
            .store
            .insert_data_source(data_source("confused", ReportDataSourceSpec::default()))
            .await;

        let the_stats = run_until(&the_harness, "metering/confused", |stats| stats.snapshot().dropped == 1).await;

        let the_snapshot = the_stats.snapshot();
        assert_eq!(the_snapshot.retried, 0);
        assert_eq!(the_snapshot.dropped, 1);
        assert!(the_harness.queryer.statements().await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_a_garbage_key_is_not_counted_as_synced() {
        let the_harness = Harness::new();

        let the_stats = run_until(&the_harness, "a/b/c", |stats| stats.snapshot().dropped == 1).await;

        assert_eq!(
            the_stats.snapshot(),
            crate::supervisors::StatsSnapshot {
                synced: 0,
                retried: 0,
                dropped: 1
            }
        );
        assert_eq!(the_harness.store.mutation_count().await, 0);
    }
}

//! 📡 The watch feed: cluster events in, work-queue keys out.
//!
//! Two producers, one queue:
//! - [`watch_data_sources`] follows the apiserver's watch and enqueues every
//!   ReportDataSource that shows up or changes.
//! - [`resync_data_sources`] lists on a timer and re-enqueues the ones that still
//!   have no table, for the syncs that were dropped or never saw an event.
//!
//! Neither holds on to objects. The reconciler reads the latest copy itself,
//! so all these two ever hand over is a `namespace/name`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use kube::Api;
use kube::api::ListParams;
use kube::runtime::{WatchStreamExt, watcher};
use tracing::{debug, info, warn};

use crate::resources::{ReportDataSource, meta_namespace_key};
use crate::work_queue::WorkQueue;

/// 📬 Enqueues one data source. Provisioned ones too: the sync is a no-op for them.
pub fn enqueue(queue: &WorkQueue<String>, data_source: &ReportDataSource) {
    let the_key = meta_namespace_key(data_source);
    debug!(key = %the_key, "📬 enqueueing ReportDataSource");
    queue.add(the_key);
}

/// 🔁 Enqueues every data source without a table. Returns how many went in.
pub fn enqueue_unprovisioned(queue: &WorkQueue<String>, data_sources: &[ReportDataSource]) -> usize {
    data_sources
        .iter()
        .filter(|data_source| data_source.table_name().is_none())
        .inspect(|data_source| enqueue(queue, data_source))
        .count()
}

/// 📡 Follows the watch on `api` until the queue shuts down.
///
/// Watch errors are logged and the watcher backs off and reconnects on its own.
pub async fn watch_data_sources(api: Api<ReportDataSource>, queue: Arc<WorkQueue<String>>) -> Result<()> {
    info!("📡 watching ReportDataSources");
    let the_events = watcher(api, watcher::Config::default())
        .default_backoff()
        .applied_objects();
    tokio::pin!(the_events);

    while let Some(the_event) = the_events.next().await {
        if queue.is_shutting_down() {
            break;
        }
        match the_event {
            Ok(the_data_source) => enqueue(&queue, &the_data_source),
            Err(the_error) => warn!("📡 ReportDataSource watch hiccup, backing off: {}", the_error),
        }
    }
    debug!("🏁 ReportDataSource watch finished");
    Ok(())
}

/// 🔁 Every `interval`, lists `api` and re-enqueues what is still unprovisioned.
///
/// A failed list is logged and tried again on the next tick. Returns once the
/// queue shuts down.
pub async fn resync_data_sources(
    api: Api<ReportDataSource>,
    queue: Arc<WorkQueue<String>>,
    interval: Duration,
) -> Result<()> {
    let mut the_ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
    // -- the first tick is immediate and the watch already covers startup
    the_ticker.tick().await;

    loop {
        the_ticker.tick().await;
        if queue.is_shutting_down() {
            debug!("🏁 resync loop finished");
            return Ok(());
        }
        match api
            .list(&ListParams::default())
            .await
            .context("💀 failed to list ReportDataSources for resync")
        {
            Ok(the_list) => {
                let the_count = enqueue_unprovisioned(&queue, &the_list.items);
                debug!(enqueued = the_count, "🔁 resync pass done");
            }
            Err(the_error) => warn!("{:#}", the_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::tests::{aws_billing, data_source};
    use crate::resources::ReportDataSourceStatus;
    use crate::work_queue::Backoff;

    fn with_table(mut data_source: ReportDataSource, table_name: &str) -> ReportDataSource {
        data_source.status = Some(ReportDataSourceStatus {
            table_name: Some(table_name.to_string()),
        });
        data_source
    }

    #[tokio::test]
    async fn the_one_where_a_watched_object_becomes_a_key() {
        let the_queue = WorkQueue::new(Backoff::default());
        enqueue(&the_queue, &data_source("aws-billing", aws_billing("bucket", "prefix")));
        enqueue(&the_queue, &data_source("aws-billing", aws_billing("bucket", "prefix")));

        // -- the same key twice is still one piece of work
        assert_eq!(the_queue.len(), 1);
        assert_eq!(the_queue.get().await.as_deref(), Some("metering/aws-billing"));
    }

    #[test]
    fn the_one_where_resync_skips_what_is_already_done() {
        let the_queue = WorkQueue::new(Backoff::default());
        let the_data_sources = vec![
            data_source("fresh", aws_billing("bucket", "prefix")),
            with_table(data_source("done", aws_billing("bucket", "prefix")), "datasource_done"),
            // -- an empty table name is not a table
            with_table(data_source("blank", aws_billing("bucket", "prefix")), ""),
        ];

        assert_eq!(enqueue_unprovisioned(&the_queue, &the_data_sources), 2);
        assert_eq!(the_queue.len(), 2);
    }
}

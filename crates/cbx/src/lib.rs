//! 🧾 cbx: turns ReportDataSources into query-engine tables, exactly once each.
//!
//! 🎬 *[a cluster, a bucket full of billing CSVs, and a query engine that has never
//! heard of either walk into a bar]*
//!
//! The library does the work, the CLI just points it at a config. [`run`] wires the
//! real backends together: kube for resources, S3 for billing manifests, Presto for DDL.
//! Tests and dry runs build a [`reconciler::DataSourceReconciler`] over the in-memory
//! backends instead.

use anyhow::{Context, Result};
use kube::Api;
use tracing::{info, warn};

pub mod app_config;
pub mod aws;
pub mod backends;
pub mod error;
pub mod hive;
pub mod informers;
pub mod reconciler;
pub mod resources;
pub mod supervisors;
pub mod work_queue;

pub use error::SyncError;
pub use reconciler::{DataSourceReconciler, SyncContext, SyncOutcome};
pub use supervisors::{StatsSnapshot, Supervisor};
pub use work_queue::WorkQueue;

use crate::app_config::AppConfig;
use crate::backends::{KubeStore, ManifestBackend, PrestoQueryer, QueryBackend, S3ManifestRetriever, StoreBackend};
use crate::resources::ReportDataSource;

/// 🚀 Runs the controller against the real cluster until Ctrl-C, then drains and reports.
pub async fn run(app_config: AppConfig) -> Result<StatsSnapshot> {
    let the_namespace = app_config.controller.namespace.clone();
    info!(namespace = %the_namespace, "🚀 starting ReportDataSource controller");

    let the_store = KubeStore::try_default()
        .await
        .context("💀 the controller needs a cluster to talk to")?;
    let the_manifests = ManifestBackend::S3(S3ManifestRetriever::new(&app_config.aws).await);
    let the_queryer = QueryBackend::Presto(
        PrestoQueryer::new(app_config.presto.clone()).context("💀 failed to set up the Presto client")?,
    );
    let the_client = the_store.client();

    let the_reconciler = DataSourceReconciler::new(
        the_namespace.clone(),
        StoreBackend::Kube(the_store),
        the_manifests.clone(),
        the_queryer.clone(),
    );
    let the_supervisor = Supervisor::new(app_config.runtime.clone(), the_reconciler, the_manifests, the_queryer);
    let the_queue = the_supervisor.queue();

    let the_api: Api<ReportDataSource> = Api::namespaced(the_client, &the_namespace);
    let the_watch = tokio::spawn(informers::watch_data_sources(the_api.clone(), the_supervisor.queue()));
    let the_resync = tokio::spawn(informers::resync_data_sources(
        the_api,
        the_supervisor.queue(),
        app_config.controller.resync_interval(),
    ));

    let the_result = the_supervisor
        .run(async {
            if let Err(the_error) = tokio::signal::ctrl_c().await {
                warn!("💀 could not listen for Ctrl-C, stopping now: {}", the_error);
            }
        })
        .await;

    // -- the queue is shut down by now, nothing the feed produces would be picked up
    the_watch.abort();
    the_resync.abort();
    info!(pending = the_queue.len(), "🏁 controller stopped");
    the_result
}

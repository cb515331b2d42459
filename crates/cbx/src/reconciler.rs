//! 🔄 The reconciler: one key in, at most one table out.
//!
//! 🎬 COLD OPEN. A ReportDataSource sits in etcd with an empty status. It has
//! been waiting. It does not know what a Hive table is. It is about to find out.
//!
//! What one sync does, start to finish:
//! 1. Split the key. Garbage keys are logged and dropped, they will never get better.
//! 2. Read the data source. Gone? Fine. Nothing to do.
//! 3. `status.tableName` already set? Done before we started.
//! 4. Promsum → resolve storage, create the table, record a PrestoTable.
//!    AWS billing → fetch manifests; none yet means "come back later", some means
//!    create the table and record a PrestoTable.
//! 5. Write the table name back. For AWS, pass the data source along so its
//!    billing periods become partitions.
//!
//! Everything is idempotent: DDL is `IF NOT EXISTS`, the PrestoTable name is
//! deterministic and an existing one counts as created. A sync that dies halfway
//! just runs again.
//!
//! 🧠 Knowledge graph:
//! - [`storage`]: where promsum data lives.
//! - [`table_descriptor`]: table names and the PrestoTable receipt.
//! - `crate::hive`: the DDL itself.
//! - `crate::supervisors`: who calls [`DataSourceReconciler::sync`], and what they do with the errors.

use std::time::Duration;

use anyhow::Context;
use kube::ResourceExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backends::{
    ManifestBackend, ManifestRetriever, QueryBackend, ResourceCache, ResourceWriter, StoreBackend,
};
use crate::error::SyncError;
use crate::hive::{self, CreateTableParameters};
use crate::resources::{AwsBillingDataSource, PromsumDataSource, ReportDataSource, split_meta_namespace_key};

pub mod storage;
pub mod table_descriptor;

pub use storage::{ResolvedStorage, resolve_storage};
pub use table_descriptor::{build_presto_table, data_source_name_to_presto_table_name, data_source_table_name};

/// 🪪 Who is syncing what, so one sync's log lines can find each other.
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub correlation_id: Uuid,
    pub worker_id: usize,
    pub key: String,
}

impl SyncContext {
    pub fn new(worker_id: usize, key: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            worker_id,
            key: key.into(),
        }
    }

    /// 🍞 The span every log line of this sync lives under.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "sync",
            correlation_id = %self.correlation_id,
            worker_id = self.worker_id,
            key = %self.key,
        )
    }
}

/// 🏁 What a variant handler achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The table exists and is recorded. Carries the table name to persist.
    Provisioned(String),
    /// Nothing to build yet. Not an error, nothing persisted.
    Pending,
}

/// 📋 How a sync that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Provisioned, already provisioned, gone, or not ready yet. The key needs nothing more.
    Synced,
    /// The key itself was garbage. Nothing was read or written for it.
    Discarded,
}

/// ✉️ The sending half of the partition channel, plus how long we are willing to wait on it.
#[derive(Debug, Clone)]
pub struct PartitionHandoff {
    pub tx: async_channel::Sender<ReportDataSource>,
    pub send_timeout: Duration,
}

/// 🔄 Turns ReportDataSources into tables.
#[derive(Debug, Clone)]
pub struct DataSourceReconciler {
    namespace: String,
    store: StoreBackend,
    manifests: ManifestBackend,
    queryer: QueryBackend,
    partitions: Option<PartitionHandoff>,
}

impl DataSourceReconciler {
    /// `namespace` is where StorageLocations are looked up.
    pub fn new(
        namespace: impl Into<String>,
        store: StoreBackend,
        manifests: ManifestBackend,
        queryer: QueryBackend,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            store,
            manifests,
            queryer,
            partitions: None,
        }
    }

    /// ✉️ Hands provisioned AWS data sources to a partition worker through `handoff`.
    pub fn with_partition_handoff(mut self, handoff: PartitionHandoff) -> Self {
        self.partitions = Some(handoff);
        self
    }

    /// 🔄 Reconciles the data source behind `ctx.key`.
    ///
    /// [`SyncOutcome::Synced`] covers "done", "nothing to do" and "not yet", and
    /// [`SyncOutcome::Discarded`] a key that can never be synced. An `Err` tells the
    /// worker whether another try could help, see [`SyncError::is_retryable`].
    pub async fn sync(&self, ctx: &SyncContext) -> Result<SyncOutcome, SyncError> {
        let (namespace, name) = match split_meta_namespace_key(&ctx.key) {
            Ok(parts) => parts,
            Err(the_error) => {
                error!(key = %ctx.key, "💀 {}", the_error);
                return Ok(SyncOutcome::Discarded);
            }
        };

        let Some(the_data_source) = self
            .store
            .get_data_source(namespace, name)
            .await
            .with_context(|| format!("💀 could not read ReportDataSource {}", ctx.key))?
        else {
            info!(datasource = %name, "👻 ReportDataSource {} does not exist anymore", ctx.key);
            return Ok(SyncOutcome::Synced);
        };

        if let Some(the_table_name) = the_data_source.table_name() {
            info!(datasource = %name, table = %the_table_name, "✅ existing dataSource discovered, table already provisioned");
            return Ok(SyncOutcome::Synced);
        }

        info!(datasource = %name, "🆕 new dataSource discovered, syncing");
        match self.handle_data_source(&the_data_source).await? {
            HandlerOutcome::Provisioned(the_table_name) => {
                let the_updated = self
                    .store
                    .update_data_source_table_name(&the_data_source, &the_table_name)
                    .await
                    .with_context(|| format!("💀 failed to record table {} on {}", the_table_name, ctx.key))?;
                info!(datasource = %name, table = %the_table_name, "✅ successfully synced reportDataSource");

                if the_updated.spec.aws_billing.is_some() {
                    self.hand_off_for_partitions(the_updated).await;
                }
            }
            HandlerOutcome::Pending => {
                debug!(datasource = %name, "⏳ nothing to provision yet");
            }
        }
        Ok(SyncOutcome::Synced)
    }

    /// 🎭 Dispatches on the data source flavour. Exactly one must be set.
    pub async fn handle_data_source(&self, data_source: &ReportDataSource) -> Result<HandlerOutcome, SyncError> {
        match (&data_source.spec.promsum, &data_source.spec.aws_billing) {
            (Some(promsum), None) => self.handle_promsum(data_source, promsum).await,
            (None, Some(aws_billing)) => self.handle_aws_billing(data_source, aws_billing).await,
            (Some(_), Some(_)) => Err(SyncError::ConflictingVariants {
                name: data_source.name_any(),
            }),
            (None, None) => Err(SyncError::MissingVariant {
                name: data_source.name_any(),
            }),
        }
    }

    async fn handle_promsum(
        &self,
        data_source: &ReportDataSource,
        promsum: &PromsumDataSource,
    ) -> Result<HandlerOutcome, SyncError> {
        let the_name = data_source.name_any();
        let the_table_name = data_source_table_name(&the_name);

        let the_storage = resolve_storage(&self.store, &self.namespace, &the_name, promsum.storage.as_ref()).await?;
        let the_params = match the_storage {
            ResolvedStorage::Local => {
                debug!(table = %the_table_name, "💾 creating local table");
                hive::local_promsum_table_params(&the_table_name)
            }
            ResolvedStorage::S3 { bucket, prefix } => {
                debug!(table = %the_table_name, bucket = %bucket, prefix = %prefix, "🪣 creating table backed by s3");
                hive::s3_promsum_table_params(&the_table_name, &bucket, &prefix)?
            }
        };

        self.provision(data_source, &the_params).await?;
        Ok(HandlerOutcome::Provisioned(the_table_name))
    }

    async fn handle_aws_billing(
        &self,
        data_source: &ReportDataSource,
        aws_billing: &AwsBillingDataSource,
    ) -> Result<HandlerOutcome, SyncError> {
        let the_name = data_source.name_any();
        let Some(the_source) = &aws_billing.source else {
            return Err(SyncError::MissingAwsSource { name: the_name });
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
        if the_manifests.is_empty() {
            warn!(
                datasource = %the_name,
                "⏳ no report manifests in the bucket yet, the first report has likely not been generated"
            );
            return Ok(HandlerOutcome::Pending);
        }

        let the_table_name = data_source_table_name(&the_name);
        debug!(
            table = %the_table_name,
            bucket = %the_source.bucket,
            prefix = %the_source.prefix,
            manifests = the_manifests.len(),
            "💸 creating AWS billing table"
        );
        let the_params =
            hive::aws_usage_table_params(&the_table_name, &the_source.bucket, &the_source.prefix, &the_manifests)?;

        self.provision(data_source, &the_params).await?;
        Ok(HandlerOutcome::Provisioned(the_table_name))
    }

    /// 🚀 DDL first, then the receipt. Both safe to repeat.
    async fn provision(&self, data_source: &ReportDataSource, params: &CreateTableParameters) -> Result<(), SyncError> {
        hive::create_table(&self.queryer, params).await?;

        let the_presto_table = build_presto_table(data_source, params)?;
        debug!(table = %params.name, presto_table = %the_presto_table.name_any(), "🧾 creating PrestoTable");
        self.store
            .create_presto_table(&the_presto_table)
            .await
            .with_context(|| format!("💀 failed to create PrestoTable {}", the_presto_table.name_any()))?;
        Ok(())
    }

    async fn hand_off_for_partitions(&self, data_source: ReportDataSource) {
        let Some(the_handoff) = &self.partitions else {
            return;
        };
        let the_name = data_source.name_any();
        match tokio::time::timeout(the_handoff.send_timeout, the_handoff.tx.send(data_source)).await {
            Ok(Ok(())) => debug!(datasource = %the_name, "✉️ handed off for partition discovery"),
            Ok(Err(_)) => warn!(datasource = %the_name, "📪 partition channel is closed, skipping partition discovery"),
            Err(_) => warn!(
                datasource = %the_name,
                timeout_ms = the_handoff.send_timeout.as_millis() as u64,
                "⏱️ partition channel stayed full, skipping partition discovery for now"
            ),
        }
    }
}

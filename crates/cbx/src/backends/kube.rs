//! ☸️ The real cluster. Direct apiserver reads, merge-patched status, and a
//! create that shrugs at 409.
//!
//! No informer cache here: the watch feed only produces keys, and every sync
//! reads the latest object straight from the apiserver. Slightly chattier,
//! never stale.

use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::{debug, info};

use crate::backends::{ResourceCache, ResourceWriter};
use crate::resources::{PrestoTable, ReportDataSource, StorageLocation};

/// 🏷️ Field manager name on every patch we send.
pub const FIELD_MANAGER: &str = "cbx-controller";

/// ☸️ A kube `Client`, wearing the [`ResourceCache`] and [`ResourceWriter`] hats.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- the client holds a tower stack nobody wants to read in a log line
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// 🔌 Infers a client from the environment: in-cluster service account or `~/.kube/config`.
    pub async fn try_default() -> Result<Self> {
        let the_client = Client::try_default()
            .await
            .context("💀 could not build a kube client from the environment")?;
        Ok(Self::new(the_client))
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    fn data_sources(&self, namespace: &str) -> Api<ReportDataSource> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn storage_locations(&self, namespace: &str) -> Api<StorageLocation> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn presto_tables(&self, namespace: &str) -> Api<PrestoTable> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ResourceCache for KubeStore {
    async fn get_data_source(&self, namespace: &str, name: &str) -> Result<Option<ReportDataSource>> {
        self.data_sources(namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("💀 failed to get ReportDataSource {}/{}", namespace, name))
    }

    async fn get_storage_location(&self, namespace: &str, name: &str) -> Result<Option<StorageLocation>> {
        self.storage_locations(namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("💀 failed to get StorageLocation {}/{}", namespace, name))
    }

    async fn list_storage_locations(&self, namespace: &str) -> Result<Vec<StorageLocation>> {
        let the_list = self
            .storage_locations(namespace)
            .list(&ListParams::default())
            .await
            .with_context(|| format!("💀 failed to list StorageLocations in {}", namespace))?;
        Ok(the_list.items)
    }
}

#[async_trait]
impl ResourceWriter for KubeStore {
    async fn update_data_source_table_name(
        &self,
        data_source: &ReportDataSource,
        table_name: &str,
    ) -> Result<ReportDataSource> {
        let the_namespace = data_source.namespace().unwrap_or_default();
        let the_name = data_source.name_any();
        let the_patch = json!({ "status": { "tableName": table_name } });

        debug!(datasource = %the_name, table = %table_name, "🏷️ patching status.tableName");
        self.data_sources(&the_namespace)
            .patch_status(&the_name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&the_patch))
            .await
            .with_context(|| {
                format!(
                    "💀 failed to update ReportDataSource table name for {}/{}",
                    the_namespace, the_name
                )
            })
    }

    async fn create_presto_table(&self, table: &PrestoTable) -> Result<PrestoTable> {
        let the_namespace = table.namespace().unwrap_or_default();
        let the_name = table.name_any();
        let the_api = self.presto_tables(&the_namespace);

        match the_api.create(&PostParams::default(), table).await {
            Ok(the_created) => Ok(the_created),
            Err(kube::Error::Api(the_response)) if the_response.code == 409 => {
                info!(table = %the_name, "🧾 PrestoTable already exists, keeping the one we have");
                the_api
                    .get(&the_name)
                    .await
                    .with_context(|| format!("💀 PrestoTable {}/{} exists but could not be read", the_namespace, the_name))
            }
            Err(the_error) => Err(the_error)
                .with_context(|| format!("💀 failed to create PrestoTable {}/{}", the_namespace, the_name)),
        }
    }
}

//! # Previously, on cbx...
//!
//! 🎬 The cluster was unavailable. S3 was "eventually consistent". Presto was
//! rebooting for the third time today. Someone had to pretend to be all of them.
//!
//! That someone was this module.
//!
//! Three fakes, each `Clone` around an `Arc<tokio::sync::Mutex<..>>` so a test
//! can hand one to the reconciler and still peek inside afterwards:
//! - [`InMemoryStore`]: resources in BTreeMaps, every mutation written down.
//! - [`InMemoryManifests`]: canned manifests per bucket/prefix.
//! - [`RecordingQueryer`]: says yes to every statement and remembers it.
//!
//! Each has a failure toggle, for when a test needs the world to be on fire.
//!
//! ⚠️ Not for production. No network, no disk, no heartbeat.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use kube::ResourceExt;
use tokio::sync::Mutex;

use crate::aws::Manifest;
use crate::backends::{ManifestRetriever, Queryer, ResourceCache, ResourceWriter};
use crate::resources::{PrestoTable, ReportDataSource, ReportDataSourceStatus, StorageLocation};

type ObjectKey = (String, String);

fn object_key<K: ResourceExt>(obj: &K) -> ObjectKey {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

#[derive(Debug, Default)]
struct StoreState {
    data_sources: BTreeMap<ObjectKey, ReportDataSource>,
    storage_locations: BTreeMap<ObjectKey, StorageLocation>,
    presto_tables: BTreeMap<ObjectKey, PrestoTable>,
    table_name_updates: Vec<(String, String)>,
    presto_table_creates: usize,
    fail_reads: bool,
    fail_table_name_updates: bool,
    fail_presto_table_creates: bool,
}

/// 🗃️ A cluster that fits in a HashMap. Well, three BTreeMaps. Ordered, for stable test output.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_data_source(&self, data_source: ReportDataSource) {
        let the_key = object_key(&data_source);
        self.state.lock().await.data_sources.insert(the_key, data_source);
    }

    pub async fn insert_storage_location(&self, storage_location: StorageLocation) {
        let the_key = object_key(&storage_location);
        self.state.lock().await.storage_locations.insert(the_key, storage_location);
    }

    /// 🔍 The data source as it stands now, status updates included.
    pub async fn data_source(&self, namespace: &str, name: &str) -> Option<ReportDataSource> {
        self.state
            .lock()
            .await
            .data_sources
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn presto_tables(&self) -> Vec<PrestoTable> {
        self.state.lock().await.presto_tables.values().cloned().collect()
    }

    /// 📝 Every successful `update_data_source_table_name`, as `(namespace/name, table)`.
    pub async fn table_name_updates(&self) -> Vec<(String, String)> {
        self.state.lock().await.table_name_updates.clone()
    }

    /// 🧾 How many times someone asked to create a PrestoTable, duplicates included.
    pub async fn presto_table_creates(&self) -> usize {
        self.state.lock().await.presto_table_creates
    }

    /// ✍️ Total mutating calls. Zero means we kept our hands to ourselves.
    pub async fn mutation_count(&self) -> usize {
        let the_state = self.state.lock().await;
        the_state.table_name_updates.len() + the_state.presto_table_creates
    }

    pub async fn fail_reads(&self, fail: bool) {
        self.state.lock().await.fail_reads = fail;
    }

    pub async fn fail_table_name_updates(&self, fail: bool) {
        self.state.lock().await.fail_table_name_updates = fail;
    }

    pub async fn fail_presto_table_creates(&self, fail: bool) {
        self.state.lock().await.fail_presto_table_creates = fail;
    }
}

#[async_trait]
impl ResourceCache for InMemoryStore {
    async fn get_data_source(&self, namespace: &str, name: &str) -> Result<Option<ReportDataSource>> {
        let the_state = self.state.lock().await;
        if the_state.fail_reads {
            bail!("💀 in-memory store is pretending the apiserver is down");
        }
        Ok(the_state
            .data_sources
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_storage_location(&self, namespace: &str, name: &str) -> Result<Option<StorageLocation>> {
        let the_state = self.state.lock().await;
        if the_state.fail_reads {
            bail!("💀 in-memory store is pretending the apiserver is down");
        }
        Ok(the_state
            .storage_locations
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_storage_locations(&self, namespace: &str) -> Result<Vec<StorageLocation>> {
        let the_state = self.state.lock().await;
        if the_state.fail_reads {
            bail!("💀 in-memory store is pretending the apiserver is down");
        }
        Ok(the_state
            .storage_locations
            .iter()
            .filter(|((the_namespace, _), _)| the_namespace == namespace)
            .map(|(_, storage_location)| storage_location.clone())
            .collect())
    }
}

#[async_trait]
impl ResourceWriter for InMemoryStore {
    async fn update_data_source_table_name(
        &self,
        data_source: &ReportDataSource,
        table_name: &str,
    ) -> Result<ReportDataSource> {
        let mut the_state = self.state.lock().await;
        if the_state.fail_table_name_updates {
            bail!("💀 in-memory store refused to update {}", data_source.name_any());
        }

        let mut the_updated = data_source.clone();
        the_updated.status = Some(ReportDataSourceStatus {
            table_name: Some(table_name.to_string()),
        });
        let (the_namespace, the_name) = object_key(&the_updated);
        the_state
            .table_name_updates
            .push((format!("{}/{}", the_namespace, the_name), table_name.to_string()));
        the_state
            .data_sources
            .insert((the_namespace, the_name), the_updated.clone());
        Ok(the_updated)
    }

    async fn create_presto_table(&self, table: &PrestoTable) -> Result<PrestoTable> {
        let mut the_state = self.state.lock().await;
        the_state.presto_table_creates += 1;
        if the_state.fail_presto_table_creates {
            bail!("💀 in-memory store refused to create PrestoTable {}", table.name_any());
        }
        // -- already there counts as created, same as a 409 from the real thing
        let the_existing = the_state
            .presto_tables
            .entry(object_key(table))
            .or_insert_with(|| table.clone());
        Ok(the_existing.clone())
    }
}

#[derive(Debug, Default)]
struct ManifestState {
    manifests: BTreeMap<ObjectKey, Vec<Manifest>>,
    calls: usize,
    fail: bool,
}

/// 🧾 Manifests on demand, keyed by `(bucket, prefix)`. Unknown buckets are just empty.
#[derive(Debug, Default, Clone)]
pub struct InMemoryManifests {
    state: Arc<Mutex<ManifestState>>,
}

impl InMemoryManifests {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, bucket: &str, prefix: &str, manifests: Vec<Manifest>) {
        self.state
            .lock()
            .await
            .manifests
            .insert((bucket.to_string(), prefix.to_string()), manifests);
    }

    pub async fn calls(&self) -> usize {
        self.state.lock().await.calls
    }

    pub async fn fail(&self, fail: bool) {
        self.state.lock().await.fail = fail;
    }
}

#[async_trait]
impl ManifestRetriever for InMemoryManifests {
    async fn retrieve_manifests(&self, bucket: &str, prefix: &str) -> Result<Vec<Manifest>> {
        let mut the_state = self.state.lock().await;
        the_state.calls += 1;
        if the_state.fail {
            bail!("💀 pretend S3 is having a pretend outage ({}/{})", bucket, prefix);
        }
        Ok(the_state
            .manifests
            .get(&(bucket.to_string(), prefix.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct QueryerState {
    statements: Vec<String>,
    fail: bool,
}

/// 🎙️ A query engine that executes nothing and remembers everything.
#[derive(Debug, Default, Clone)]
pub struct RecordingQueryer {
    state: Arc<Mutex<QueryerState>>,
}

impl RecordingQueryer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📜 Every statement received, including the ones we pretended to fail.
    pub async fn statements(&self) -> Vec<String> {
        self.state.lock().await.statements.clone()
    }

    pub async fn fail(&self, fail: bool) {
        self.state.lock().await.fail = fail;
    }
}

#[async_trait]
impl Queryer for RecordingQueryer {
    async fn query(&self, statement: &str) -> Result<()> {
        let mut the_state = self.state.lock().await;
        the_state.statements.push(statement.to_string());
        if the_state.fail {
            bail!("💀 recording queryer was told to say no");
        }
        Ok(())
    }
}

//! 🔌 Backends: every place the reconciler touches the outside world.
//!
//! 🎭 The reconciler is a very focused individual. It knows how to decide things.
//! It does not know how to talk to an apiserver, open an S3 bucket, or hold a
//! conversation with Presto. It delegates. Extensively. Like a good manager.
//!
//! Four seams, four traits:
//! - [`ResourceCache`]: read ReportDataSources and StorageLocations.
//! - [`ResourceWriter`]: write a table name back, create a PrestoTable.
//! - [`ManifestRetriever`]: find the AWS billing manifests under a bucket/prefix.
//! - [`Queryer`]: run one statement against the query engine.
//!
//! Each one comes in an in-memory flavour (tests, dry runs, the occasional demo)
//! and a real one. The `*Backend` enums pick between them at runtime, so nobody
//! upstream has to care which one they got.
//!
//! 🦆 (mandatory duck, carried over from a previous life)

use anyhow::Result;
use async_trait::async_trait;

use crate::aws::Manifest;
use crate::resources::{PrestoTable, ReportDataSource, StorageLocation};

pub mod in_mem;
pub mod kube;
pub mod presto;
pub mod s3;

pub use in_mem::{InMemoryManifests, InMemoryStore, RecordingQueryer};
pub use self::kube::KubeStore;
pub use presto::{PrestoConfig, PrestoQueryer};
pub use s3::{AwsConfig, S3ManifestRetriever};

// ===== Resource Cache / Writer =====

/// 📖 Read side of the cluster.
///
/// # Contract
/// - Not found is `Ok(None)`, never an error. The reconciler treats "gone" as "done".
/// - Everything else that goes wrong is an `Err`, and the reconciler will retry it.
#[async_trait]
pub trait ResourceCache: std::fmt::Debug + Send + Sync {
    async fn get_data_source(&self, namespace: &str, name: &str) -> Result<Option<ReportDataSource>>;

    async fn get_storage_location(&self, namespace: &str, name: &str) -> Result<Option<StorageLocation>>;

    async fn list_storage_locations(&self, namespace: &str) -> Result<Vec<StorageLocation>>;
}

/// ✍️ Write side of the cluster. Only two verbs, and we use them sparingly.
#[async_trait]
pub trait ResourceWriter: std::fmt::Debug + Send + Sync {
    /// 🏷️ Records `table_name` on the data source's status. Returns the updated object.
    async fn update_data_source_table_name(
        &self,
        data_source: &ReportDataSource,
        table_name: &str,
    ) -> Result<ReportDataSource>;

    /// 🧾 Creates the PrestoTable. One that already exists counts as created.
    async fn create_presto_table(&self, table: &PrestoTable) -> Result<PrestoTable>;
}

/// 🎭 Where the resources live: in a HashMap, or in an actual cluster.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    InMemory(InMemoryStore),
    Kube(KubeStore),
}

#[async_trait]
impl ResourceCache for StoreBackend {
    async fn get_data_source(&self, namespace: &str, name: &str) -> Result<Option<ReportDataSource>> {
        match self {
            StoreBackend::InMemory(store) => store.get_data_source(namespace, name).await,
            StoreBackend::Kube(store) => store.get_data_source(namespace, name).await,
        }
    }

    async fn get_storage_location(&self, namespace: &str, name: &str) -> Result<Option<StorageLocation>> {
        match self {
            StoreBackend::InMemory(store) => store.get_storage_location(namespace, name).await,
            StoreBackend::Kube(store) => store.get_storage_location(namespace, name).await,
        }
    }

    async fn list_storage_locations(&self, namespace: &str) -> Result<Vec<StorageLocation>> {
        match self {
            StoreBackend::InMemory(store) => store.list_storage_locations(namespace).await,
            StoreBackend::Kube(store) => store.list_storage_locations(namespace).await,
        }
    }
}

#[async_trait]
impl ResourceWriter for StoreBackend {
    async fn update_data_source_table_name(
        &self,
        data_source: &ReportDataSource,
        table_name: &str,
    ) -> Result<ReportDataSource> {
        match self {
            StoreBackend::InMemory(store) => store.update_data_source_table_name(data_source, table_name).await,
            StoreBackend::Kube(store) => store.update_data_source_table_name(data_source, table_name).await,
        }
    }

    async fn create_presto_table(&self, table: &PrestoTable) -> Result<PrestoTable> {
        match self {
            StoreBackend::InMemory(store) => store.create_presto_table(table).await,
            StoreBackend::Kube(store) => store.create_presto_table(table).await,
        }
    }
}

// ===== Manifest Retriever =====

/// 🧾 Finds billing manifests.
///
/// An empty list is a perfectly good answer: AWS simply hasn't written the first
/// report yet. Only "couldn't even look" is an error.
#[async_trait]
pub trait ManifestRetriever: std::fmt::Debug + Send + Sync {
    async fn retrieve_manifests(&self, bucket: &str, prefix: &str) -> Result<Vec<Manifest>>;
}

#[derive(Debug, Clone)]
pub enum ManifestBackend {
    InMemory(InMemoryManifests),
    S3(S3ManifestRetriever),
}

#[async_trait]
impl ManifestRetriever for ManifestBackend {
    async fn retrieve_manifests(&self, bucket: &str, prefix: &str) -> Result<Vec<Manifest>> {
        match self {
            ManifestBackend::InMemory(manifests) => manifests.retrieve_manifests(bucket, prefix).await,
            ManifestBackend::S3(retriever) => retriever.retrieve_manifests(bucket, prefix).await,
        }
    }
}

// ===== Queryer =====

/// 🐝 Runs one statement. Returns when the engine says it finished, errors when it says it didn't.
#[async_trait]
pub trait Queryer: std::fmt::Debug + Send + Sync {
    async fn query(&self, statement: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub enum QueryBackend {
    InMemory(RecordingQueryer),
    Presto(PrestoQueryer),
}

#[async_trait]
impl Queryer for QueryBackend {
    async fn query(&self, statement: &str) -> Result<()> {
        match self {
            QueryBackend::InMemory(queryer) => queryer.query(statement).await,
            QueryBackend::Presto(queryer) => queryer.query(statement).await,
        }
    }
}

//! 🔧 App Configuration: TOML and env vars in, one `AppConfig` out.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge." 🦆
//!
//! 🏗️ Figment does the merging. Every section has defaults, so an empty
//! environment and no file still produces a controller that runs (against
//! `http://presto:8080`, in namespace `default`, which may or may not be what you wanted).

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backends::{AwsConfig, PrestoConfig};
use crate::work_queue::Backoff;

/// 📦 Everything the controller needs to know about itself.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub presto: PrestoConfig,
    #[serde(default)]
    pub aws: AwsConfig,
}

/// ☸️ Which slice of the cluster we look after.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// 🏠 Watched for ReportDataSources, searched for StorageLocations.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// 🔁 How often unprovisioned data sources get re-enqueued, watch events or not.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            resync_interval_secs: default_resync_interval_secs(),
        }
    }
}

impl ControllerConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_resync_interval_secs() -> u64 {
    300
}

/// 🧵 Worker pool, retry, and partition hand-off knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// 🔄 Retries per key before it is dropped. A key is attempted at most `max_retries + 1` times.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_partition_queue_capacity")]
    pub partition_queue_capacity: usize,
    /// ⏱️ How long a sync waits on a full partition channel before giving up on the hand-off.
    #[serde(default = "default_partition_send_timeout_ms")]
    pub partition_send_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            partition_queue_capacity: default_partition_queue_capacity(),
            partition_send_timeout_ms: default_partition_send_timeout_ms(),
        }
    }
}

impl RuntimeConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: Duration::from_millis(self.base_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn partition_send_timeout(&self) -> Duration {
        Duration::from_millis(self.partition_send_timeout_ms)
    }
}

fn default_worker_count() -> usize {
    2
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    5
}

fn default_max_backoff_ms() -> u64 {
    1000 * 60
}

fn default_partition_queue_capacity() -> usize {
    64
}

fn default_partition_send_timeout_ms() -> u64 {
    5000
}

/// 🚀 Loads `CBX_*` env vars, then layers the TOML file on top if one was given. TOML wins.
///
/// Nested keys use a double underscore: `CBX_PRESTO__URL`, `CBX_RUNTIME__WORKER_COUNT`.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("CBX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (CBX_*).",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (CBX_*). \
                 No file was provided, this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}

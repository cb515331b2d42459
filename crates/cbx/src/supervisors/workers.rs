//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all
//! the credit in the sprint retro.
//!
//! Two kinds live here:
//! - [`DataSourceWorker`]: pulls keys off the work queue and reconciles them.
//! - [`PartitionWorker`]: drains the partition channel and registers billing periods.

use anyhow::Result;
use tokio::task::JoinHandle;

mod data_source_worker;
mod partition_worker;

pub(super) use data_source_worker::DataSourceWorker;
pub(super) use partition_worker::PartitionWorker;

/// 🏗️ A background worker, that does work. duh.
///
/// "What's the DEAL with lifetime annotations? You borrow something,
///  you give it back. It's not that hard, Jerry!"
pub(crate) trait Worker {
    /// 🚀 Start the worker. Returns a JoinHandle because we trust but verify.
    fn start(self) -> JoinHandle<Result<()>>;
}

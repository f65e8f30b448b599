//! polysync Sync - Local filesystem adapter
//!
//! Provides:
//! - [`LocalAdapter`], the adapter contract over a directory tree
//! - Push notifications backed by the OS file watcher
//! - Registration of the local adapter type with an [`AdapterRegistry`]
//!
//! ## Modules
//!
//! - [`filesystem`] - Local adapter (streamed reads, temp-file writes committed by rename)
//! - [`watcher`] - `notify` watcher feeding the change-notification queue

pub mod filesystem;
pub mod watcher;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use polysync_core::domain::AdapterTypeId;
use polysync_core::ports::IAdapter;
use polysync_core::registry::AdapterRegistry;
use serde::{Deserialize, Serialize};

pub use filesystem::LocalAdapter;
pub use watcher::ChangeWatcher;

/// Type id under which the local adapter is registered
pub const LOCAL_ADAPTER_TYPE: AdapterTypeId =
    AdapterTypeId::from_u128(0x5f3c_9a0e_41d7_4c6b_8e2a_0c1f_6b7d_3e01);

/// Settings of one local adapter instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAdapterConfig {
    /// Directory the adapter is rooted at
    pub root: PathBuf,
    /// Seconds between fallback scans while push notifications are off
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    300
}

impl LocalAdapterConfig {
    /// Creates a configuration with the default poll interval
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// Locks a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registers the local adapter type
///
/// Returns `false` if the type was already registered.
pub fn register_local_adapter(registry: &mut AdapterRegistry) -> bool {
    registry.register(LOCAL_ADAPTER_TYPE, "local", |id, config: LocalAdapterConfig| {
        let adapter = LocalAdapter::new(id, config)?;
        Ok(Arc::new(adapter) as Arc<dyn IAdapter>)
    })
}

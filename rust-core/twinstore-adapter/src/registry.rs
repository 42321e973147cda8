// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Adapter registry.
//
// Holds at most one adapter built from a `StorageConfig`. The registry is an
// ordinary value owned by whoever starts the process (the API binary, a test)
// and shared by `Arc`; there is no process-global instance. `close()` empties
// the slot so the next `adapter()` call builds a fresh, unconnected adapter.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::adapter::DocumentAdapter;
use crate::config::{BackendKind, StorageConfig};
use crate::embedded::EmbeddedAdapter;
use crate::error::StoreResult;
use crate::networked::NetworkedAdapter;

/// Build an unconnected adapter for `config`.
pub fn build_adapter(config: &StorageConfig) -> StoreResult<Arc<dyn DocumentAdapter>> {
    let adapter: Arc<dyn DocumentAdapter> = match config.backend {
        BackendKind::Embedded => Arc::new(EmbeddedAdapter::new(&config.embedded.data_dir)),
        BackendKind::Networked => Arc::new(NetworkedAdapter::new(config.networked.clone())?),
    };
    Ok(adapter)
}

/// Lazily constructed, explicitly torn down holder of the process adapter.
pub struct AdapterRegistry {
    config: StorageConfig,
    slot: RwLock<Option<Arc<dyn DocumentAdapter>>>,
}

impl AdapterRegistry {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            slot: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Whether an adapter is currently cached.
    pub async fn is_active(&self) -> bool {
        self.slot.read().await.is_some()
    }

    /// Return the cached adapter, building it on first use. The adapter is
    /// not connected by this call.
    pub async fn adapter(&self) -> StoreResult<Arc<dyn DocumentAdapter>> {
        if let Some(adapter) = self.slot.read().await.as_ref() {
            return Ok(Arc::clone(adapter));
        }

        let mut slot = self.slot.write().await;
        if let Some(adapter) = slot.as_ref() {
            return Ok(Arc::clone(adapter));
        }
        let adapter = build_adapter(&self.config)?;
        debug!(backend = %self.config.backend, "Built storage adapter");
        *slot = Some(Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Resolve the adapter and connect it.
    pub async fn init(&self) -> StoreResult<Arc<dyn DocumentAdapter>> {
        let adapter = self.adapter().await?;
        adapter.connect().await?;
        info!(backend = adapter.name(), "Storage initialized");
        Ok(adapter)
    }

    /// Close the cached adapter, if any, and clear the slot.
    ///
    /// The slot is cleared even when `close()` fails, so a later `adapter()`
    /// always starts from a fresh instance.
    pub async fn close(&self) -> StoreResult<()> {
        let adapter = self.slot.write().await.take();
        match adapter {
            Some(adapter) => {
                adapter.close().await?;
                info!(backend = adapter.name(), "Storage closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("backend", &self.config.backend)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_adapter_is_cached() {
        let dir = tempdir().unwrap();
        let registry = AdapterRegistry::new(StorageConfig::embedded(dir.path()));
        assert!(!registry.is_active().await);

        let a = registry.adapter().await.unwrap();
        let b = registry.adapter().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "embedded");
    }

    #[tokio::test]
    async fn test_close_clears_slot() {
        let dir = tempdir().unwrap();
        let registry = AdapterRegistry::new(StorageConfig::embedded(dir.path()));
        let first = registry.init().await.unwrap();
        registry.close().await.unwrap();
        assert!(!registry.is_active().await);

        let second = registry.adapter().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        // Closing twice is harmless.
        registry.close().await.unwrap();
        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_networked_adapter_is_built_unconnected() {
        let registry = AdapterRegistry::new(StorageConfig::networked("http://127.0.0.1:9"));
        let adapter = registry.adapter().await.unwrap();
        assert_eq!(adapter.name(), "networked");
        let err = adapter
            .count("projects", &crate::Filter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[test]
    fn test_build_rejects_bad_url() {
        let config = StorageConfig::networked("::nope::");
        assert!(matches!(
            build_adapter(&config),
            Err(StoreError::InvalidArgument(_))
        ));
    }
}

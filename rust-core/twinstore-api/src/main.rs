// SPDX-License-Identifier: PMPL-1.0-or-later
//! TwinStore API server binary
//!
//! Builds the storage adapter from `TWINSTORE_*` variables and serves the
//! project catalog over HTTP.

use std::sync::Arc;

use twinstore_adapter::{AdapterRegistry, StorageConfig};
use twinstore_api::{ApiConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let storage = StorageConfig::from_env()?;
    let config = ApiConfig::from_env()?;

    tracing::info!(
        backend = %storage.backend,
        "Starting TwinStore API server on {}:{}",
        config.host,
        config.port
    );

    let registry = Arc::new(AdapterRegistry::new(storage));
    registry.init().await?;

    let state = AppState::new(Arc::clone(&registry))?;
    let served = twinstore_api::serve(config, state).await;

    registry.close().await?;
    served?;

    Ok(())
}

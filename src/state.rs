//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::config::Config;
use crate::error::ConfigError;
use crate::relay::ImageRelay;
use crate::store::ImageStore;
use crate::upstream::{self, MetadataSource, UpstreamHeaders};

/// Shared application state available to all request handlers.
///
/// Built once at startup; nothing in it changes afterwards.
#[derive(Clone)]
pub struct AppState {
    /// Source of illustration metadata.
    pub metadata: Arc<dyn MetadataSource>,

    /// Image fetcher and optional store.
    pub relay: Arc<ImageRelay>,
}

impl AppState {
    /// Create a new application state from configuration.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let headers = UpstreamHeaders::new(config)?;
        let client = upstream::create_http_client(config)?;

        let metadata = upstream::build_source(config, client.clone(), &headers);
        let store = config
            .store
            .enabled
            .then(|| ImageStore::new(&config.store.directory));

        tracing::info!(
            strategy = metadata.name(),
            upstream = %config.upstream_origin(),
            store = ?store.as_ref().map(|s| s.root().display().to_string()),
            "application state initialized"
        );

        Ok(Self::from_parts(
            metadata,
            ImageRelay::new(client, headers.image, store),
        ))
    }

    /// Assembles state from already-built components.
    pub fn from_parts(metadata: Arc<dyn MetadataSource>, relay: ImageRelay) -> Self {
        Self {
            metadata,
            relay: Arc::new(relay),
        }
    }
}

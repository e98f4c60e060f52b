//! Read-only inputs of a planning run.
//!
//! Both are fetched fresh on every run. The store-backed implementation
//! reads the packer manifest and per-account target documents from the
//! KV table of the state store.

use rollover_core::{Manifest, RolloutTarget};
use rollover_state::{StateError, StateStore};
use thiserror::Error;
use tracing::debug;

use crate::BoxFuture;
use crate::catalog::ImageCatalog;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unable to read from store: {0}")]
    Store(#[from] StateError),
    #[error("manifest not found at {0}")]
    ManifestMissing(String),
    #[error("unable to parse manifest JSON: {0}")]
    Manifest(#[source] serde_json::Error),
    #[error("unable to parse config JSON at {key}: {source}")]
    Target {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Resolves the current image catalog.
pub trait CatalogSource: Send + Sync {
    fn resolve_catalog(&self) -> BoxFuture<'_, Result<ImageCatalog, SourceError>>;
}

/// Lists the rollout targets configured for an account scope.
pub trait TargetRegistry: Send + Sync {
    fn list_targets<'a>(
        &'a self,
        scope: &'a str,
    ) -> BoxFuture<'a, Result<Vec<RolloutTarget>, SourceError>>;
}

/// Catalog and registry backed by the KV table of a [`StateStore`].
#[derive(Clone)]
pub struct StoreSource {
    store: StateStore,
    manifest_key: String,
    targets_prefix: String,
    region_prefix: String,
}

impl StoreSource {
    pub fn new(
        store: StateStore,
        manifest_key: impl Into<String>,
        targets_prefix: impl Into<String>,
        region_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            manifest_key: manifest_key.into(),
            targets_prefix: targets_prefix.into(),
            region_prefix: region_prefix.into(),
        }
    }

    pub fn from_config(store: StateStore, config: &rollover_core::config::FanoutConfig) -> Self {
        Self::new(
            store,
            config.manifest_key.clone(),
            config.targets_prefix.clone(),
            config.region_prefix.clone(),
        )
    }

    /// KV prefix holding the target documents of `scope`.
    pub fn scope_prefix(&self, scope: &str) -> String {
        format!("{}/{}/", self.targets_prefix.trim_end_matches('/'), scope)
    }

    fn load_catalog(&self) -> Result<ImageCatalog, SourceError> {
        let raw = self
            .store
            .get_value(&self.manifest_key)?
            .ok_or_else(|| SourceError::ManifestMissing(self.manifest_key.clone()))?;
        let manifest: Manifest = serde_json::from_slice(&raw).map_err(SourceError::Manifest)?;
        let catalog = ImageCatalog::from_manifest(&manifest, &self.region_prefix);
        debug!(
            key = %self.manifest_key,
            builds = manifest.builds.len(),
            images = catalog.len(),
            "manifest parsed"
        );
        Ok(catalog)
    }

    fn load_targets(&self, scope: &str) -> Result<Vec<RolloutTarget>, SourceError> {
        let prefix = self.scope_prefix(scope);
        let mut targets = Vec::new();
        for (key, value) in self.store.list_values(&prefix)? {
            // Directory markers carry no document.
            if key.ends_with('/') {
                continue;
            }
            let target: RolloutTarget = serde_json::from_slice(&value)
                .map_err(|source| SourceError::Target { key: key.clone(), source })?;
            debug!(%key, arn = %target.arn, ami_type = %target.image_type, order = target.order, "target loaded");
            targets.push(target);
        }
        Ok(targets)
    }
}

impl CatalogSource for StoreSource {
    fn resolve_catalog(&self) -> BoxFuture<'_, Result<ImageCatalog, SourceError>> {
        Box::pin(async move { self.load_catalog() })
    }
}

impl TargetRegistry for StoreSource {
    fn list_targets<'a>(
        &'a self,
        scope: &'a str,
    ) -> BoxFuture<'a, Result<Vec<RolloutTarget>, SourceError>> {
        Box::pin(async move { self.load_targets(scope) })
    }
}

/*!
 * Manifest Sources
 * Asynchronous fetch of manifest text by location
 */

use super::ManifestError;
use ahash::RandomState;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Fetches raw manifest text. Parsing and validation happen in the resolver.
pub trait ManifestSource: Send + Sync {
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<String, ManifestError>>;
}

impl<S: ManifestSource + ?Sized> ManifestSource for Arc<S> {
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<String, ManifestError>> {
        (**self).fetch(location)
    }
}

/// Reads manifests from a directory
#[derive(Debug, Clone)]
pub struct FsManifestSource {
    root: PathBuf,
}

impl FsManifestSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ManifestSource for FsManifestSource {
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<String, ManifestError>> {
        let path = self.root.join(location);
        let location = location.to_string();
        async move {
            debug!(path = %path.display(), "Fetching manifest");
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|_| ManifestError::Unreachable(location))
        }
        .boxed()
    }
}

/// Fixed set of manifests held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticManifestSource {
    entries: Arc<HashMap<String, String, RandomState>>,
}

impl StaticManifestSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: impl Into<String>, text: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.entries).insert(location.into(), text.into());
        self
    }
}

impl ManifestSource for StaticManifestSource {
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<String, ManifestError>> {
        let result = self
            .entries
            .get(location)
            .cloned()
            .ok_or_else(|| ManifestError::Unreachable(location.to_string()));
        futures::future::ready(result).boxed()
    }
}

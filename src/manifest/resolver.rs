/*!
 * Manifest Resolver
 * Turns an executable name (or an inline manifest) into a launchable program
 */

use super::{Manifest, ManifestError, ManifestLocation, ManifestSource, ResolvedProgram};
use crate::core::config::KernelConfig;
use crate::core::errors::SpawnError;
use ahash::AHashSet;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves programs for spawn requests. Cheap to clone.
#[derive(Clone)]
pub struct ManifestResolver {
    source: Arc<dyn ManifestSource>,
    whitelist: Option<Arc<AHashSet<String>>>,
    suffix: String,
}

impl ManifestResolver {
    pub fn new(source: Arc<dyn ManifestSource>) -> Self {
        Self {
            source,
            whitelist: None,
            suffix: ".json".to_string(),
        }
    }

    pub fn from_config(source: Arc<dyn ManifestSource>, config: &KernelConfig) -> Self {
        let mut resolver = Self::new(source).with_suffix(config.manifest_suffix.clone());
        if let Some(names) = &config.whitelist {
            resolver = resolver.with_whitelist(names.iter().cloned());
        }
        resolver
    }

    pub fn with_whitelist<I: IntoIterator<Item = String>>(mut self, names: I) -> Self {
        self.whitelist = Some(Arc::new(names.into_iter().collect()));
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Manifest location for an executable name
    pub fn location_for(&self, executable: &str) -> String {
        format!("{}{}", executable, self.suffix)
    }

    /// Checks that need no I/O. Inline manifests bypass the whitelist.
    pub fn precheck(&self, executable: Option<&str>, inline: bool) -> Result<(), SpawnError> {
        let executable = executable.ok_or(SpawnError::EmptyArgv)?;
        if inline {
            return Ok(());
        }
        if let Some(whitelist) = &self.whitelist {
            if !whitelist.contains(executable) {
                debug!(executable, "Executable not in whitelist");
                return Err(SpawnError::NotWhitelisted(executable.to_string()));
            }
        }
        Ok(())
    }

    /// Validate an inline manifest supplied by the spawning process
    pub fn resolve_inline(
        &self,
        executable: &str,
        manifest: Value,
    ) -> Result<ResolvedProgram, SpawnError> {
        let manifest = Manifest::from_value(manifest, executable)?;
        let kind = manifest
            .kind()
            .ok_or_else(|| ManifestError::BadFormat(executable.to_string()))?;
        Ok(ResolvedProgram {
            location: ManifestLocation::Inline(manifest),
            kind,
        })
    }

    /// Fetch and validate the manifest of a named executable
    pub async fn resolve_named(&self, executable: &str) -> Result<ResolvedProgram, SpawnError> {
        self.precheck(Some(executable), false)?;

        let location = self.location_for(executable);
        let text = self.source.fetch(&location).await.map_err(|e| {
            warn!(executable, error = %e, "Manifest fetch failed");
            e
        })?;
        let manifest = Manifest::parse(&text, &location)?;
        let kind = manifest
            .kind()
            .ok_or_else(|| ManifestError::BadFormat(location.clone()))?;

        debug!(executable, %location, %kind, "Resolved manifest");
        Ok(ResolvedProgram {
            location: ManifestLocation::Named(location),
            kind,
        })
    }
}

//! svrx core version manager
//!
//! Installs and lists versions of the `svrx` package itself, using the same
//! store layout and registry as plugins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, SvrxError};
use crate::registry::Registry;
use crate::store::PackageStore;
use crate::version;

/// Tag installed when no version is given
pub const DEFAULT_TAG: &str = "latest";

pub struct CoreManager<'r> {
    store: PackageStore,
    registry: &'r dyn Registry,
}

impl<'r> CoreManager<'r> {
    /// Create a manager over `<svrx_dir>/versions`
    pub fn new(svrx_dir: &Path, registry: &'r dyn Registry) -> Self {
        Self {
            store: PackageStore::core(svrx_dir),
            registry,
        }
    }

    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    /// Installed core versions, lowest first
    pub fn local_versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self
            .store
            .list_installed()
            .into_iter()
            .map(|e| e.version)
            .collect();
        versions.reverse();
        versions
    }

    /// Published core versions, lowest first
    pub fn remote_versions(&self) -> Result<Vec<String>> {
        let published = self.registry.fetch_versions(self.store.package())?;
        let entries = version::dedupe_entries(published);
        Ok(entries.into_iter().rev().map(|e| e.version).collect())
    }

    /// Published dist-tags
    pub fn remote_tags(&self) -> Result<BTreeMap<String, String>> {
        self.registry.fetch_tags(self.store.package())
    }

    /// Turn a version or dist-tag into a concrete version
    pub fn resolve(&self, version_or_tag: &str) -> Result<String> {
        if let Some(version) = version::parse_version(version_or_tag) {
            return Ok(version.to_string());
        }

        self.remote_tags()?
            .get(version_or_tag.trim())
            .cloned()
            .ok_or_else(|| SvrxError::NoSuchVersion {
                package: self.store.package().to_string(),
                version: version_or_tag.to_string(),
            })
    }

    /// Install a version or dist-tag; returns the version and its directory.
    ///
    /// An already installed version is not downloaded again.
    pub fn install(&self, version_or_tag: &str) -> Result<(String, PathBuf)> {
        let version = self.resolve(version_or_tag)?;
        if self.store.exists(&version) {
            return Ok((version.clone(), self.store.path_for(&version)));
        }

        let package = self.store.package();
        let published = self.remote_versions()?;
        if !published.iter().any(|v| v == &version) {
            return Err(SvrxError::NoSuchVersion {
                package: package.to_string(),
                version,
            });
        }

        let path = self.store.materialize(&version, |staging| {
            self.registry.download(package, &version, staging)
        })?;
        Ok((version, path))
    }

    /// The `latest` tag when it is newer than every installed version
    pub fn available_update(&self) -> Result<Option<String>> {
        let tags = self.remote_tags()?;
        let Some(latest) = tags.get(DEFAULT_TAG) else {
            return Ok(None);
        };

        let newest_local = self.local_versions().pop();
        if version::is_newer(Some(latest), newest_local.as_deref()) {
            Ok(Some(latest.clone()))
        } else {
            Ok(None)
        }
    }
}

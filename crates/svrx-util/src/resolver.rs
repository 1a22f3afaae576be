//! Plugin resolver/installer
//!
//! `PluginManager::load` turns a `PluginRequest` into a `PluginHandle`:
//!
//! 1. an explicit `path` is used as-is,
//! 2. an explicit version is served from the local store when present,
//!    otherwise checked against the registry and downloaded,
//! 3. without a version the highest compatible local and remote versions are
//!    compared and the remote one is installed only if strictly newer.
//!
//! Every branch ends by reading the package.json of the resolved directory.

use std::path::{Path, PathBuf};
use std::thread;

use semver::Version;
use serde::Serialize;

use crate::error::{Result, SvrxError};
use crate::manifest::read_manifest;
use crate::registry::Registry;
use crate::store::PackageStore;
use crate::version::{self, Range, VersionEntry};

/// What the caller asked for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginRequest {
    /// Bare plugin name (`hello` for `svrx-plugin-hello`)
    pub plugin: String,
    /// Version of the running svrx core
    pub core_version: String,
    /// Exact version, dist-tag or range
    pub version: Option<String>,
    /// Local package directory, bypassing resolution
    pub path: Option<PathBuf>,
}

impl PluginRequest {
    pub fn new(plugin: impl Into<String>, core_version: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            core_version: core_version.into(),
            version: None,
            path: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// A resolved, installed plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginHandle {
    /// Package name from the manifest
    pub name: String,
    /// Resolved version; `None` for a version-less local package
    pub version: Option<String>,
    /// Package directory
    pub path: PathBuf,
}

/// How the `version` field of a request is interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
enum VersionRequest {
    Exact(String),
    Range(Range),
    Tag(String),
}

impl VersionRequest {
    fn classify(input: &str) -> Self {
        if let Some(version) = version::parse_version(input) {
            return Self::Exact(version.to_string());
        }
        match input.parse::<Range>() {
            Ok(range) => Self::Range(range),
            Err(_) => Self::Tag(input.trim().to_string()),
        }
    }
}

/// Resolves and installs one plugin
pub struct PluginManager<'r> {
    request: PluginRequest,
    store: PackageStore,
    registry: &'r dyn Registry,
}

impl<'r> PluginManager<'r> {
    /// Create a manager over `<svrx_dir>/plugins/<plugin>`
    pub fn new(request: PluginRequest, svrx_dir: &Path, registry: &'r dyn Registry) -> Self {
        let store = PackageStore::plugin(svrx_dir, &request.plugin);
        Self {
            request,
            store,
            registry,
        }
    }

    pub fn request(&self) -> &PluginRequest {
        &self.request
    }

    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    /// Whether `version` is installed locally
    pub fn exists(&self, version: &str) -> bool {
        self.store.exists(version)
    }

    /// Highest installed version compatible with the requested core
    pub fn local_best_fit(&self) -> Result<Option<String>> {
        let core = self.core_version()?;
        Ok(self.store.local_best_fit(&core))
    }

    /// Highest published version compatible with the requested core
    pub fn remote_best_fit(&self) -> Result<Option<String>> {
        let core = self.core_version()?;
        let entries = self.registry.fetch_versions(self.store.package())?;
        Ok(version::best_fit(&entries, &core))
    }

    /// Resolve, install if needed, and describe the plugin
    pub fn load(&self) -> Result<PluginHandle> {
        if let Some(path) = &self.request.path {
            return self.load_from_path(path);
        }

        let core = self.core_version()?;
        let version = match self.request.version.as_deref().map(VersionRequest::classify) {
            Some(VersionRequest::Exact(version)) => self.resolve_exact(&version, &core)?,
            Some(VersionRequest::Tag(tag)) => {
                let version = self.resolve_tag(&tag)?;
                self.resolve_exact(&version, &core)?
            }
            Some(VersionRequest::Range(range)) => self.resolve_best(&core, Some(&range))?,
            None => self.resolve_best(&core, None)?,
        };

        self.validate(self.store.path_for(&version), Some(version))
    }

    fn core_version(&self) -> Result<Version> {
        version::require_version(&self.request.core_version)
    }

    fn load_from_path(&self, path: &Path) -> Result<PluginHandle> {
        let manifest = read_manifest(path, self.store.package())?;

        // Compatibility of an explicit path is informational only
        if let (Some(range), Some(core)) = (
            manifest.core_range(),
            version::parse_version(&self.request.core_version),
        ) {
            if !version::satisfies(&core, Some(range)) {
                tracing::info!(
                    plugin = %self.request.plugin,
                    range,
                    core = %core,
                    "local plugin declares a different svrx range"
                );
            }
        }

        let version = manifest.version.clone();
        self.validate(path.to_path_buf(), version)
    }

    fn resolve_tag(&self, tag: &str) -> Result<String> {
        let tags = self.registry.fetch_tags(self.store.package())?;
        tags.get(tag)
            .cloned()
            .ok_or_else(|| SvrxError::NoSuchVersion {
                package: self.store.package().to_string(),
                version: tag.to_string(),
            })
    }

    fn resolve_exact(&self, version: &str, core: &Version) -> Result<String> {
        if self.store.exists(version) {
            tracing::debug!(plugin = %self.request.plugin, version, "using cached version");
            return Ok(version.to_string());
        }

        let package = self.store.package();
        let entries = version::dedupe_entries(self.registry.fetch_versions(package)?);
        if entries.is_empty() {
            return Err(SvrxError::RegistryNotFound {
                package: package.to_string(),
            });
        }

        let wanted = version::parse_version(version);
        let entry = entries
            .iter()
            .find(|e| version::parse_version(&e.version) == wanted)
            .ok_or_else(|| SvrxError::NoSuchVersion {
                package: package.to_string(),
                version: version.to_string(),
            })?;

        if !version::satisfies(core, entry.core_range.as_deref()) {
            return Err(SvrxError::VersionMismatch {
                plugin: self.request.plugin.clone(),
            });
        }

        self.install(&entry.version)?;
        Ok(entry.version.clone())
    }

    fn resolve_best(&self, core: &Version, range: Option<&Range>) -> Result<String> {
        let package = self.store.package();

        // Local scan and remote fetch are independent; run them side by side
        let (snapshot, remote) = thread::scope(|s| {
            let remote = s.spawn(|| self.registry.fetch_versions(package));
            let snapshot = self.store.snapshot();
            let remote = remote
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (snapshot, remote)
        });

        let local = in_range(snapshot.entries(), range);
        let local_best = version::best_fit(&local, core);

        let published = match remote {
            Ok(entries) => version::dedupe_entries(entries),
            Err(SvrxError::RegistryNotFound { .. }) => Vec::new(),
            Err(e @ SvrxError::RegistryUnavailable { .. }) if local_best.is_some() => {
                tracing::warn!(error = %e, "registry unavailable, using installed version");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        if published.is_empty() && snapshot.is_empty() {
            return Err(SvrxError::RegistryNotFound {
                package: package.to_string(),
            });
        }

        let remote = in_range(&published, range);
        let remote_best = version::best_fit(&remote, core);
        tracing::debug!(
            plugin = %self.request.plugin,
            local = ?local_best,
            remote = ?remote_best,
            "best fit"
        );

        if version::is_newer(remote_best.as_deref(), local_best.as_deref()) {
            if let Some(version) = remote_best {
                self.install(&version)?;
                return Ok(version);
            }
        }
        if let Some(version) = local_best {
            return Ok(version);
        }

        match range {
            Some(range) if local.is_empty() && remote.is_empty() => Err(SvrxError::NoSuchVersion {
                package: package.to_string(),
                version: range.to_string(),
            }),
            Some(_) => Err(SvrxError::VersionMismatch {
                plugin: self.request.plugin.clone(),
            }),
            None => Err(SvrxError::NoCompatibleVersion {
                plugin: self.request.plugin.clone(),
            }),
        }
    }

    fn install(&self, version: &str) -> Result<PathBuf> {
        let package = self.store.package();
        self.store.materialize(version, |staging| {
            self.registry.download(package, version, staging)
        })
    }

    /// Read the manifest of the resolved directory and build the handle
    fn validate(&self, path: PathBuf, version: Option<String>) -> Result<PluginHandle> {
        let expected = self.store.package();
        let manifest = read_manifest(&path, expected)?;

        if !manifest.is_plugin(&self.request.plugin) {
            tracing::warn!(
                expected,
                found = ?manifest.name,
                path = %path.display(),
                "plugin package name does not match"
            );
        }

        Ok(PluginHandle {
            name: manifest.name.unwrap_or_else(|| expected.to_string()),
            version,
            path,
        })
    }
}

fn in_range(entries: &[VersionEntry], range: Option<&Range>) -> Vec<VersionEntry> {
    entries
        .iter()
        .filter(|e| match (range, version::parse_version(&e.version)) {
            (Some(range), Some(v)) => range.matches(&v),
            (None, _) => true,
            (Some(_), None) => false,
        })
        .cloned()
        .collect()
}

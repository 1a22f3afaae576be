//! Local package store
//!
//! Installed versions live at `<SVRX_DIR>/plugins/<plugin>/<version>/` (and
//! `<SVRX_DIR>/versions/<version>/` for the core). The directory listing is
//! the catalogue: a version is installed iff its directory holds a readable
//! package.json.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use semver::Version;

use crate::error::{Result, SvrxError};
use crate::manifest::{plugin_package_name, try_read_manifest, MANIFEST_FILE};
use crate::version::{self, VersionEntry};

const PLUGINS_DIR: &str = "plugins";
const CORE_DIR: &str = "versions";

/// Registry package name of the core
pub const CORE_PACKAGE: &str = "svrx";

/// Filesystem catalogue of installed versions of one package
#[derive(Debug, Clone)]
pub struct PackageStore {
    /// Directory holding one subdirectory per installed version
    root: PathBuf,
    /// Registry package name
    package: String,
}

impl PackageStore {
    /// Store for a plugin (`<svrx_dir>/plugins/<plugin>`)
    pub fn plugin(svrx_dir: &Path, plugin: &str) -> Self {
        Self {
            root: svrx_dir.join(PLUGINS_DIR).join(plugin),
            package: plugin_package_name(plugin),
        }
    }

    /// Store for the svrx core (`<svrx_dir>/versions`)
    pub fn core(svrx_dir: &Path) -> Self {
        Self {
            root: svrx_dir.join(CORE_DIR),
            package: CORE_PACKAGE.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Canonical install path of a version. Does not imply existence.
    pub fn path_for(&self, version: &str) -> PathBuf {
        self.root.join(version)
    }

    /// Whether `version` is installed with a readable manifest
    pub fn exists(&self, version: &str) -> bool {
        if Version::parse(version).is_err() {
            return false;
        }
        try_read_manifest(&self.path_for(version)).is_some()
    }

    /// Scan the store. Unreadable or malformed entries are skipped.
    pub fn list_installed(&self) -> Vec<VersionEntry> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                tracing::debug!(root = %self.root.display(), error = %e, "no local store");
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        for entry in read_dir.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if Version::parse(&name).is_err() || !entry.path().is_dir() {
                continue;
            }

            match try_read_manifest(&entry.path()) {
                Some(manifest) => {
                    entries.push(VersionEntry::new(name, manifest.core_range()));
                }
                None => {
                    tracing::debug!(
                        package = %self.package,
                        version = %name,
                        "skipping installed version without a readable manifest"
                    );
                }
            }
        }

        version::sort_descending(&mut entries);
        entries
    }

    /// Scan once into an immutable snapshot
    pub fn snapshot(&self) -> LocalSnapshot {
        LocalSnapshot::new(self.list_installed())
    }

    /// Highest installed version compatible with `core`
    pub fn local_best_fit(&self, core: &Version) -> Option<String> {
        self.snapshot().best_fit(core)
    }

    /// When a version was installed (directory modification time)
    pub fn installed_at(&self, version: &str) -> Option<DateTime<Local>> {
        let modified = fs::metadata(self.path_for(version))
            .and_then(|m| m.modified())
            .ok()?;
        Some(DateTime::<Local>::from(modified))
    }

    /// Install `version` by letting `fill` populate a staging directory,
    /// then moving it into place.
    ///
    /// An existing install with a readable manifest is reused and `fill` is
    /// not called.
    pub fn materialize<F>(&self, version: &str, fill: F) -> Result<PathBuf>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let dest = self.path_for(version);
        if self.exists(version) {
            tracing::debug!(package = %self.package, version, "already installed");
            return Ok(dest);
        }

        fs::create_dir_all(&self.root)?;
        let staging = self
            .root
            .join(format!(".{}-{}.tmp", version, uuid::Uuid::new_v4()));

        if let Err(e) = fill(&staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        if !staging.join(MANIFEST_FILE).is_file() {
            let _ = fs::remove_dir_all(&staging);
            return Err(SvrxError::ManifestMissing {
                package: self.package.clone(),
                path: dest,
            });
        }

        // Another process may have finished first
        if self.exists(version) {
            let _ = fs::remove_dir_all(&staging);
            return Ok(dest);
        }
        if dest.exists() {
            fs::remove_dir_all(&dest)?;
        }

        fs::rename(&staging, &dest)?;
        Ok(dest)
    }
}

/// Installed versions captured by a single directory scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSnapshot {
    entries: Vec<VersionEntry>,
}

impl LocalSnapshot {
    pub fn new(mut entries: Vec<VersionEntry>) -> Self {
        entries = version::dedupe_entries(entries);
        version::sort_descending(&mut entries);
        Self { entries }
    }

    /// Entries, highest version first
    pub fn entries(&self) -> &[VersionEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, version: &str) -> bool {
        self.get(version).is_some()
    }

    pub fn get(&self, version: &str) -> Option<&VersionEntry> {
        let wanted = version::parse_version(version)?;
        self.entries
            .iter()
            .find(|e| version::parse_version(&e.version).as_ref() == Some(&wanted))
    }

    pub fn best_fit(&self, core: &Version) -> Option<String> {
        version::best_fit(&self.entries, core)
    }
}

//! Package registry client
//!
//! The resolver only needs three things from a registry: the published
//! versions of a package with their declared core range, the dist-tags, and a
//! way to unpack one version into a directory. `NpmRegistry` talks to an
//! npm-compatible HTTP registry; `DirRegistry` serves packages from a plain
//! directory tree (fixtures, offline mirrors).

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use flate2::read::GzDecoder;
use serde::Deserialize;
use sha2::{Digest, Sha512};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Result, SvrxError};
use crate::manifest::{lenient, try_read_manifest, PackageManifest};
use crate::version::{self, VersionEntry};

const TAGS_FILE: &str = "tags.json";

/// Source of published packages
pub trait Registry: Send + Sync {
    /// All published versions of `package` with their core ranges, highest
    /// first.
    ///
    /// Fails with `RegistryNotFound` when the package was never published.
    fn fetch_versions(&self, package: &str) -> Result<Vec<VersionEntry>>;

    /// Dist-tags of `package` (`latest`, `next`, ...)
    fn fetch_tags(&self, package: &str) -> Result<BTreeMap<String, String>>;

    /// Fetch `package@version` and unpack it into `dest`
    fn download(&self, package: &str, version: &str, dest: &Path) -> Result<()>;
}

/// Open the registry named by the configuration
pub fn open_registry(config: &Config) -> Result<Box<dyn Registry>> {
    let url = config.registry.url.trim();

    if url.starts_with("http://") || url.starts_with("https://") {
        let timeout = Duration::from_secs(config.registry.timeout_secs);
        return Ok(Box::new(NpmRegistry::new(url, timeout)?));
    }

    let path = url.strip_prefix("file://").unwrap_or(url);
    Ok(Box::new(DirRegistry::new(PathBuf::from(path))))
}

// ========== npm registry ==========

/// Registry document of one package
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Packument {
    #[serde(default)]
    pub versions: BTreeMap<String, PublishedVersion>,
    #[serde(default, rename = "dist-tags")]
    pub dist_tags: BTreeMap<String, String>,
}

/// One published version inside a packument
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishedVersion {
    #[serde(flatten)]
    pub manifest: PackageManifest,
    #[serde(default, deserialize_with = "lenient")]
    pub dist: Option<Dist>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dist {
    pub tarball: String,
    #[serde(default)]
    pub integrity: Option<String>,
}

impl Packument {
    /// Version entries, highest first
    pub fn entries(&self) -> Vec<VersionEntry> {
        let mut entries: Vec<VersionEntry> = self
            .versions
            .iter()
            .map(|(v, published)| VersionEntry::new(v.clone(), published.manifest.core_range()))
            .collect();
        version::sort_descending(&mut entries);
        entries
    }
}

/// npm-compatible HTTP registry
pub struct NpmRegistry {
    base_url: String,
    client: reqwest::blocking::Client,
    /// Packuments already fetched during this process
    cache: Mutex<HashMap<String, Arc<Packument>>>,
}

impl NpmRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("svrx-util/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SvrxError::unavailable(base_url, e))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Packument URL; scoped names keep their `@` but escape the slash
    pub fn package_url(&self, package: &str) -> String {
        format!("{}/{}", self.base_url, package.replace('/', "%2F"))
    }

    fn packument(&self, package: &str) -> Result<Arc<Packument>> {
        if let Some(doc) = self
            .cache
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(package)
        {
            return Ok(Arc::clone(doc));
        }

        let url = self.package_url(package);
        tracing::debug!(%url, "fetching package metadata");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(|e| SvrxError::unavailable(package, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SvrxError::RegistryNotFound {
                package: package.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(SvrxError::unavailable(
                package,
                format!("HTTP {} from {}", response.status(), url),
            ));
        }

        let doc: Packument = response
            .json()
            .map_err(|e| SvrxError::unavailable(package, e))?;
        let doc = Arc::new(doc);

        self.cache
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(package.to_string(), Arc::clone(&doc));

        Ok(doc)
    }

    fn fetch_tarball(&self, package: &str, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SvrxError::unavailable(package, e))?;

        if !response.status().is_success() {
            return Err(SvrxError::unavailable(
                package,
                format!("HTTP {} when downloading {}", response.status(), url),
            ));
        }

        let bytes = response
            .bytes()
            .map_err(|e| SvrxError::unavailable(package, e))?;
        Ok(bytes.to_vec())
    }
}

impl Registry for NpmRegistry {
    fn fetch_versions(&self, package: &str) -> Result<Vec<VersionEntry>> {
        Ok(self.packument(package)?.entries())
    }

    fn fetch_tags(&self, package: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.packument(package)?.dist_tags.clone())
    }

    fn download(&self, package: &str, version: &str, dest: &Path) -> Result<()> {
        let doc = self.packument(package)?;
        let published = doc
            .versions
            .get(version)
            .ok_or_else(|| SvrxError::NoSuchVersion {
                package: package.to_string(),
                version: version.to_string(),
            })?;
        let dist = published
            .dist
            .as_ref()
            .ok_or_else(|| SvrxError::unavailable(package, "no tarball published"))?;

        tracing::info!(package, version, url = %dist.tarball, "downloading");
        let bytes = self.fetch_tarball(package, &dist.tarball)?;

        if let Some(integrity) = &dist.integrity {
            if !verify_integrity(&bytes, integrity) {
                return Err(SvrxError::IntegrityMismatch {
                    package: package.to_string(),
                    version: version.to_string(),
                });
            }
        }

        unpack_tarball(&bytes[..], dest).map_err(|e| SvrxError::unavailable(package, e))
    }
}

/// Check an SRI string. Only sha512 is verified; other algorithms pass.
pub fn verify_integrity(bytes: &[u8], integrity: &str) -> bool {
    let expected: Vec<&str> = integrity
        .split_whitespace()
        .filter_map(|sri| sri.strip_prefix("sha512-"))
        .collect();
    if expected.is_empty() {
        tracing::debug!(integrity, "no sha512 integrity to verify");
        return true;
    }

    let actual = base64::engine::general_purpose::STANDARD.encode(Sha512::digest(bytes));
    expected.iter().any(|e| *e == actual)
}

/// Unpack a gzipped npm tarball into `dest`.
///
/// npm tarballs wrap everything in one top-level directory (usually
/// `package/`), which is stripped. Entries that would land outside `dest`
/// are rejected; links are skipped.
pub fn unpack_tarball<R: Read>(reader: R, dest: &Path) -> std::io::Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    fs::create_dir_all(dest)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        if !(kind.is_file() || kind.is_dir()) {
            continue;
        }

        let path = entry.path()?.to_path_buf();
        let mut components = path.components();
        components.next();
        let relative = components.as_path();

        if relative.as_os_str().is_empty() {
            continue;
        }
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("archive entry escapes destination: {}", path.display()),
            ));
        }

        let target = dest.join(relative);
        if kind.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }

    Ok(())
}

// ========== Directory registry ==========

/// Registry backed by `<root>/<package>/<version>/` directories, with an
/// optional `<root>/<package>/tags.json`
#[derive(Debug, Clone)]
pub struct DirRegistry {
    root: PathBuf,
}

impl DirRegistry {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_dir(&self, package: &str) -> Result<PathBuf> {
        let dir = self.root.join(package);
        if !dir.is_dir() {
            return Err(SvrxError::RegistryNotFound {
                package: package.to_string(),
            });
        }
        Ok(dir)
    }
}

impl Registry for DirRegistry {
    fn fetch_versions(&self, package: &str) -> Result<Vec<VersionEntry>> {
        let dir = self.package_dir(package)?;

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| SvrxError::unavailable(package, e))? {
            let entry = entry.map_err(|e| SvrxError::unavailable(package, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if version::parse_version(&name).is_none() {
                continue;
            }
            if let Some(manifest) = try_read_manifest(&entry.path()) {
                entries.push(VersionEntry::new(name, manifest.core_range()));
            }
        }

        version::sort_descending(&mut entries);
        Ok(entries)
    }

    fn fetch_tags(&self, package: &str) -> Result<BTreeMap<String, String>> {
        let dir = self.package_dir(package)?;
        let tags_path = dir.join(TAGS_FILE);

        if tags_path.is_file() {
            let content =
                fs::read_to_string(&tags_path).map_err(|e| SvrxError::unavailable(package, e))?;
            return serde_json::from_str(&content).map_err(|e| SvrxError::unavailable(package, e));
        }

        // Without tags.json, `latest` is the highest published version
        let mut tags = BTreeMap::new();
        if let Some(latest) = self.fetch_versions(package)?.into_iter().next() {
            tags.insert("latest".to_string(), latest.version);
        }
        Ok(tags)
    }

    fn download(&self, package: &str, version: &str, dest: &Path) -> Result<()> {
        let source = self.package_dir(package)?.join(version);
        if version::parse_version(version).is_none() || try_read_manifest(&source).is_none() {
            return Err(SvrxError::NoSuchVersion {
                package: package.to_string(),
                version: version.to_string(),
            });
        }

        tracing::info!(package, version, source = %source.display(), "copying");
        copy_dir_recursive(&source, dest).map_err(|e| SvrxError::unavailable(package, e))
    }
}

/// Copy directory recursively
fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());

        // Skip .git directory
        if relative.starts_with(".git") {
            continue;
        }

        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publish(root: &Path, package: &str, version: &str, range: &str) {
        let dir = root.join(package).join(version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("package.json"),
            format!(
                r#"{{"name": "{}", "version": "{}", "engines": {{"svrx": "{}"}}}}"#,
                package, version, range
            ),
        )
        .unwrap();
        fs::write(dir.join("index.js"), "module.exports = {};").unwrap();
    }

    fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_packument_entries() {
        let json = r#"{
            "name": "svrx-plugin-demo",
            "dist-tags": { "latest": "1.0.3" },
            "versions": {
                "1.0.2": {
                    "name": "svrx-plugin-demo",
                    "version": "1.0.2",
                    "engines": { "svrx": "0.0.2" },
                    "dist": { "tarball": "https://example.test/demo-1.0.2.tgz" }
                },
                "1.0.3": {
                    "name": "svrx-plugin-demo",
                    "version": "1.0.3",
                    "engines": { "svrx": ">=0.0.3 <1.0.0" },
                    "dist": { "tarball": "https://example.test/demo-1.0.3.tgz", "integrity": "sha512-abc" }
                },
                "0.9.0": { "name": "svrx-plugin-demo", "version": "0.9.0" }
            }
        }"#;

        let doc: Packument = serde_json::from_str(json).unwrap();
        let entries = doc.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].version, "1.0.3");
        assert_eq!(entries[0].core_range.as_deref(), Some(">=0.0.3 <1.0.0"));
        assert_eq!(entries[2].core_range, None);
        assert_eq!(doc.dist_tags["latest"], "1.0.3");
        assert!(doc.versions["0.9.0"].dist.is_none());
    }

    #[test]
    fn test_package_url() {
        let registry =
            NpmRegistry::new("https://registry.example.test/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            registry.package_url("svrx-plugin-demo"),
            "https://registry.example.test/svrx-plugin-demo"
        );
        assert_eq!(
            registry.package_url("@scope/pkg"),
            "https://registry.example.test/@scope%2Fpkg"
        );
    }

    #[test]
    fn test_open_registry_kinds() {
        let mut config = Config::default();
        assert!(open_registry(&config).is_ok());

        let temp = TempDir::new().unwrap();
        publish(temp.path(), "svrx-plugin-demo", "1.0.2", "*");
        config.registry.url = format!("file://{}", temp.path().display());
        let registry = open_registry(&config).unwrap();
        assert_eq!(registry.fetch_versions("svrx-plugin-demo").unwrap().len(), 1);
    }

    #[test]
    fn test_verify_integrity() {
        let bytes = b"hello tarball";
        let digest = base64::engine::general_purpose::STANDARD.encode(Sha512::digest(bytes));

        assert!(verify_integrity(bytes, &format!("sha512-{}", digest)));
        assert!(verify_integrity(
            bytes,
            &format!("sha1-whatever sha512-{}", digest)
        ));
        assert!(!verify_integrity(bytes, "sha512-AAAA"));
        assert!(verify_integrity(bytes, "sha1-unchecked"));
    }

    #[test]
    fn test_unpack_tarball_strips_top_dir() {
        let temp = TempDir::new().unwrap();
        let bytes = tarball(&[
            ("package/package.json", r#"{"name": "svrx-plugin-demo"}"#),
            ("package/lib/index.js", "module.exports = {};"),
        ]);

        let dest = temp.path().join("out");
        unpack_tarball(&bytes[..], &dest).unwrap();

        assert!(dest.join("package.json").is_file());
        assert!(dest.join("lib/index.js").is_file());
        assert!(!dest.join("package").exists());
    }

    #[test]
    fn test_unpack_tarball_rejects_escape() {
        let temp = TempDir::new().unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let content = b"evil";
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        // Write the raw name so the builder does not normalize it away
        header.as_gnu_mut().unwrap().name[..16].copy_from_slice(b"package/../../ev");
        header.set_cksum();
        builder.append(&header, &content[..]).unwrap();
        let bytes = builder.into_inner().unwrap().finish().unwrap();

        let dest = temp.path().join("out");
        assert!(unpack_tarball(&bytes[..], &dest).is_err());
        assert!(!temp.path().join("ev").exists());
    }

    #[test]
    fn test_dir_registry_versions_and_tags() {
        let temp = TempDir::new().unwrap();
        publish(temp.path(), "svrx-plugin-demo", "1.0.2", "0.0.2");
        publish(temp.path(), "svrx-plugin-demo", "1.0.3", ">=0.0.3 <1.0.0");
        fs::create_dir_all(temp.path().join("svrx-plugin-demo/not-a-version")).unwrap();

        let registry = DirRegistry::new(temp.path().to_path_buf());
        let versions = registry.fetch_versions("svrx-plugin-demo").unwrap();
        assert_eq!(
            versions,
            vec![
                VersionEntry::new("1.0.3", Some(">=0.0.3 <1.0.0")),
                VersionEntry::new("1.0.2", Some("0.0.2")),
            ]
        );

        let tags = registry.fetch_tags("svrx-plugin-demo").unwrap();
        assert_eq!(tags.get("latest").map(String::as_str), Some("1.0.3"));

        fs::write(
            temp.path().join("svrx-plugin-demo").join(TAGS_FILE),
            r#"{"latest": "1.0.2", "next": "1.0.3"}"#,
        )
        .unwrap();
        let tags = registry.fetch_tags("svrx-plugin-demo").unwrap();
        assert_eq!(tags["latest"], "1.0.2");
        assert_eq!(tags["next"], "1.0.3");
    }

    #[test]
    fn test_dir_registry_not_found() {
        let temp = TempDir::new().unwrap();
        let registry = DirRegistry::new(temp.path().to_path_buf());

        let err = registry
            .fetch_versions("svrx-plugin-not-exist-plugin")
            .unwrap_err();
        assert!(matches!(err, SvrxError::RegistryNotFound { .. }));
        assert!(err.to_string().contains("svrx-plugin-not-exist-plugin"));
    }

    #[test]
    fn test_dir_registry_download() {
        let temp = TempDir::new().unwrap();
        publish(temp.path(), "svrx-plugin-demo", "1.0.2", "0.0.2");
        fs::create_dir_all(temp.path().join("svrx-plugin-demo/1.0.2/.git")).unwrap();

        let registry = DirRegistry::new(temp.path().to_path_buf());
        let dest = temp.path().join("installed/demo/1.0.2");
        registry
            .download("svrx-plugin-demo", "1.0.2", &dest)
            .unwrap();
        assert!(dest.join("package.json").is_file());
        assert!(dest.join("index.js").is_file());
        assert!(!dest.join(".git").exists());

        let err = registry
            .download("svrx-plugin-demo", "9.9.9", &temp.path().join("x"))
            .unwrap_err();
        assert!(matches!(err, SvrxError::NoSuchVersion { .. }));
    }

    #[test]
    fn test_packument_tolerates_legacy_metadata() {
        let json = r#"{
            "versions": {
                "0.1.0": {
                    "name": "svrx-plugin-demo",
                    "engines": ["node >= 0.4"],
                    "dist": "not-an-object"
                },
                "0.2.0": {
                    "name": "svrx-plugin-demo",
                    "svrx": { "engines": ">=1.0.0" },
                    "dist": { "tarball": "https://example.test/demo-0.2.0.tgz" }
                }
            }
        }"#;

        let doc: Packument = serde_json::from_str(json).unwrap();
        assert_eq!(
            doc.entries(),
            vec![
                VersionEntry::new("0.2.0", Some(">=1.0.0")),
                VersionEntry::new("0.1.0", None),
            ]
        );
        assert!(doc.versions["0.1.0"].dist.is_none());
    }

    // ========== npm registry over HTTP ==========

    /// Run blocking registry calls off the async test runtime
    async fn with_npm<T, F>(server: &MockServer, f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(NpmRegistry) -> T + Send + 'static,
    {
        let url = server.uri();
        tokio::task::spawn_blocking(move || {
            let registry = NpmRegistry::new(&url, Duration::from_secs(5)).unwrap();
            f(registry)
        })
        .await
        .unwrap()
    }

    fn sri(bytes: &[u8]) -> String {
        format!(
            "sha512-{}",
            base64::engine::general_purpose::STANDARD.encode(Sha512::digest(bytes))
        )
    }

    fn demo_packument(server: &MockServer, integrity: &str) -> serde_json::Value {
        serde_json::json!({
            "name": "svrx-plugin-demo",
            "dist-tags": { "latest": "1.0.3" },
            "versions": {
                "1.0.2": {
                    "name": "svrx-plugin-demo",
                    "version": "1.0.2",
                    "engines": { "svrx": "0.0.2" }
                },
                "1.0.3": {
                    "name": "svrx-plugin-demo",
                    "version": "1.0.3",
                    "svrx": { "engines": ">=0.0.3 <1.0.0" },
                    "dist": {
                        "tarball": format!("{}/svrx-plugin-demo/-/svrx-plugin-demo-1.0.3.tgz", server.uri()),
                        "integrity": integrity
                    }
                }
            }
        })
    }

    #[tokio::test]
    async fn test_npm_missing_package() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/svrx-plugin-not-exist-plugin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = with_npm(&server, |registry| {
            registry
                .fetch_versions("svrx-plugin-not-exist-plugin")
                .unwrap_err()
        })
        .await;
        assert!(matches!(err, SvrxError::RegistryNotFound { .. }));
    }

    #[tokio::test]
    async fn test_npm_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/svrx-plugin-demo"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = with_npm(&server, |registry| {
            registry.fetch_versions("svrx-plugin-demo").unwrap_err()
        })
        .await;
        assert!(matches!(err, SvrxError::RegistryUnavailable { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_npm_packument_fetched_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/svrx-plugin-demo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(demo_packument(&server, "")))
            .expect(1)
            .mount(&server)
            .await;

        let (versions, tags) = with_npm(&server, |registry| {
            let versions = registry.fetch_versions("svrx-plugin-demo").unwrap();
            let tags = registry.fetch_tags("svrx-plugin-demo").unwrap();
            (versions, tags)
        })
        .await;

        assert_eq!(
            versions,
            vec![
                VersionEntry::new("1.0.3", Some(">=0.0.3 <1.0.0")),
                VersionEntry::new("1.0.2", Some("0.0.2")),
            ]
        );
        assert_eq!(tags.get("latest").map(String::as_str), Some("1.0.3"));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_npm_download_verifies_and_unpacks() {
        let server = MockServer::start().await;
        let bytes = tarball(&[
            (
                "package/package.json",
                r#"{"name": "svrx-plugin-demo", "version": "1.0.3"}"#,
            ),
            ("package/index.js", "module.exports = {};"),
        ]);
        Mock::given(method("GET"))
            .and(path("/svrx-plugin-demo"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(demo_packument(&server, &sri(&bytes))),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/svrx-plugin-demo/-/svrx-plugin-demo-1.0.3.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("demo/1.0.3");
        let target = dest.clone();
        with_npm(&server, move |registry| {
            registry
                .download("svrx-plugin-demo", "1.0.3", &target)
                .unwrap()
        })
        .await;

        assert!(dest.join("package.json").is_file());
        assert!(dest.join("index.js").is_file());
    }

    #[tokio::test]
    async fn test_npm_download_integrity_mismatch() {
        let server = MockServer::start().await;
        let bytes = tarball(&[("package/package.json", r#"{"name": "svrx-plugin-demo"}"#)]);
        Mock::given(method("GET"))
            .and(path("/svrx-plugin-demo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(demo_packument(&server, &sri(b"something else"))),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/svrx-plugin-demo/-/svrx-plugin-demo-1.0.3.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let target = temp.path().join("demo/1.0.3");
        let err = with_npm(&server, move |registry| {
            registry
                .download("svrx-plugin-demo", "1.0.3", &target)
                .unwrap_err()
        })
        .await;
        assert!(matches!(err, SvrxError::IntegrityMismatch { .. }));
        assert!(!temp.path().join("demo/1.0.3/package.json").exists());
    }

    #[tokio::test]
    async fn test_npm_download_without_dist() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/svrx-plugin-demo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(demo_packument(&server, "")))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let target = temp.path().join("demo/1.0.2");
        let (missing_dist, unknown) = with_npm(&server, move |registry| {
            let missing_dist = registry
                .download("svrx-plugin-demo", "1.0.2", &target)
                .unwrap_err();
            let unknown = registry
                .download("svrx-plugin-demo", "9.9.9", &target)
                .unwrap_err();
            (missing_dist, unknown)
        })
        .await;
        assert!(matches!(missing_dist, SvrxError::RegistryUnavailable { .. }));
        assert!(matches!(unknown, SvrxError::NoSuchVersion { .. }));
    }
}

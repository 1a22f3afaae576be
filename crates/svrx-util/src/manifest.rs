//! Package manifest (package.json)
//!
//! Only the fields the resolver reads are modelled; everything else in the
//! descriptor is ignored. Those fields are read leniently: a value of an
//! unexpected shape is treated as absent instead of failing the whole
//! descriptor.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, SvrxError};

pub const MANIFEST_FILE: &str = "package.json";

/// Name prefix every svrx plugin package carries
pub const PLUGIN_PREFIX: &str = "svrx-plugin-";

/// Registry package name of a plugin
pub fn plugin_package_name(plugin: &str) -> String {
    format!("{}{}", PLUGIN_PREFIX, plugin)
}

/// Parsed package.json
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Package name
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    /// Version
    #[serde(default, deserialize_with = "lenient")]
    pub version: Option<String>,
    /// Engine constraints (`engines.svrx` holds the core range)
    #[serde(default, deserialize_with = "lenient_engines")]
    pub engines: Option<Engines>,
    /// Top-level core range: a plain range or `{ "engines": "<range>" }`
    #[serde(default, deserialize_with = "lenient_svrx")]
    pub svrx: Option<String>,
}

/// `engines` block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engines {
    #[serde(default, deserialize_with = "lenient")]
    pub svrx: Option<String>,
}

impl PackageManifest {
    /// Core-version range this package declares compatibility with
    pub fn core_range(&self) -> Option<&str> {
        self.engines
            .as_ref()
            .and_then(|e| e.svrx.as_deref())
            .or(self.svrx.as_deref())
    }

    /// Whether the name follows the `svrx-plugin-<plugin>` convention
    pub fn is_plugin(&self, plugin: &str) -> bool {
        self.name.as_deref() == Some(plugin_package_name(plugin).as_str())
    }
}

/// Deserialize into `T`, or `None` when the value has another shape
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }

    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            tracing::debug!(%value, error = %e, "ignoring malformed package metadata");
            Ok(None)
        }
    }
}

// Legacy manifests carry `"engines": ["node >= 0.4"]`, which declares no
// svrx range at all
fn lenient_engines<'de, D>(deserializer: D) -> std::result::Result<Option<Engines>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Object(map) => Ok(Some(Engines {
            svrx: map.get("svrx").and_then(range_from_value),
        })),
        Value::Null => Ok(None),
        other => {
            tracing::debug!(value = %other, "ignoring non-object engines field");
            Ok(None)
        }
    }
}

fn lenient_svrx<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::Object(map) => map.get("engines").and_then(range_from_value),
        other => range_from_value(other),
    })
}

fn range_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(range) => Some(range.clone()),
        Value::Null => None,
        other => {
            tracing::debug!(value = %other, "ignoring non-string svrx range");
            None
        }
    }
}

/// Read package.json from a package directory.
///
/// A missing descriptor is `ManifestMissing`; `package` names the package
/// the caller expected to find there.
pub fn read_manifest(dir: &Path, package: &str) -> Result<PackageManifest> {
    let path = dir.join(MANIFEST_FILE);

    if !path.is_file() {
        return Err(SvrxError::ManifestMissing {
            package: package.to_string(),
            path: dir.to_path_buf(),
        });
    }

    let content = fs::read_to_string(&path)?;
    let manifest: PackageManifest = serde_json::from_str(&content)?;

    Ok(manifest)
}

/// Read package.json, treating any failure as absence
pub fn try_read_manifest(dir: &Path) -> Option<PackageManifest> {
    let content = fs::read_to_string(dir.join(MANIFEST_FILE)).ok()?;
    serde_json::from_str(&content).ok()
}

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SvrxError {
    #[error("no package.json found in '{path}' (no package descriptor found for '{package}')")]
    ManifestMissing { package: String, path: PathBuf },

    #[error("package '{package}' not found in registry")]
    RegistryNotFound { package: String },

    #[error("version '{version}' of '{package}' does not exist")]
    NoSuchVersion { package: String, version: String },

    #[error("version of plugin '{plugin}' is not matched to current version of svrx")]
    VersionMismatch { plugin: String },

    #[error("there's no satisfied version of plugin {plugin} for the svrx currently using")]
    NoCompatibleVersion { plugin: String },

    #[error("registry unavailable for '{package}': {reason}")]
    RegistryUnavailable { package: String, reason: String },

    #[error("integrity check failed for '{package}@{version}'")]
    IntegrityMismatch { package: String, version: String },

    #[error("no svrx version installed; run `svrx install` or pass --core")]
    CoreNotInstalled,

    #[error("Invalid version: '{version}'")]
    InvalidVersion { version: String },

    #[error("Config parse error in {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Unknown config key: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidConfigValue { key: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Home directory not found")]
    HomeNotFound,
}

pub type Result<T> = std::result::Result<T, SvrxError>;

impl SvrxError {
    pub(crate) fn unavailable(package: &str, reason: impl ToString) -> Self {
        Self::RegistryUnavailable {
            package: package.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ManifestMissing { .. } => 2,
            Self::RegistryNotFound { .. } => 3,
            Self::NoSuchVersion { .. } => 4,
            Self::VersionMismatch { .. } => 5,
            Self::NoCompatibleVersion { .. } => 6,
            Self::RegistryUnavailable { .. } | Self::IntegrityMismatch { .. } => 7,
            Self::InvalidVersion { .. } => 8,
            _ => 1,
        }
    }
}

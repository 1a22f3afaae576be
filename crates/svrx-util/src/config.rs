use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SvrxError};

const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the svrx home directory
pub const SVRX_DIR_ENV: &str = "SVRX_DIR";

/// Environment variable overriding the configured registry
pub const SVRX_REGISTRY_ENV: &str = "SVRX_REGISTRY";

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# svrx configuration file
# Location: ~/.svrx/config.toml (or $SVRX_DIR/config.toml)

[registry]
# Where core and plugin packages are published.
# An http(s) URL is treated as an npm-compatible registry, anything else
# as a local directory laid out as <package>/<version>/package.json.
# SVRX_REGISTRY overrides this value.
url = "https://registry.npmjs.org"

# Network timeout in seconds
timeout_secs = 30
"#;

/// Resolve the svrx home directory: `$SVRX_DIR`, else `~/.svrx`
pub fn svrx_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(SVRX_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    let home = dirs::home_dir().ok_or(SvrxError::HomeNotFound)?;
    Ok(home.join(".svrx"))
}

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Registry-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Registry URL or fixture directory
    #[serde(default = "default_registry")]
    pub url: String,

    /// Network timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_registry() -> String {
    DEFAULT_REGISTRY.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Config {
    /// Load config from the svrx directory, then apply environment overrides
    pub fn load(svrx_dir: &Path) -> Result<Self> {
        let mut config = Self::load_file(svrx_dir)?;
        if let Ok(url) = std::env::var(SVRX_REGISTRY_ENV) {
            if !url.trim().is_empty() {
                config.registry.url = url;
            }
        }
        Ok(config)
    }

    /// Load config.toml only, ignoring the environment
    pub fn load_file(svrx_dir: &Path) -> Result<Self> {
        let path = svrx_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content).map_err(|e| SvrxError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Save config to the svrx directory
    pub fn save(&self, svrx_dir: &Path) -> Result<()> {
        let path = svrx_dir.join(CONFIG_FILE);
        fs::create_dir_all(svrx_dir)?;

        let content = toml::to_string_pretty(self)?;

        fs::write(&path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn path(svrx_dir: &Path) -> PathBuf {
        svrx_dir.join(CONFIG_FILE)
    }

    /// Initialize config with default template (rich comments)
    pub fn init(svrx_dir: &Path) -> Result<PathBuf> {
        let path = svrx_dir.join(CONFIG_FILE);
        fs::create_dir_all(svrx_dir)?;

        if !path.exists() {
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path)
    }

    /// Get a config value by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "registry.url" => Some(self.registry.url.clone()),
            "registry.timeout_secs" => Some(self.registry.timeout_secs.to_string()),
            _ => None,
        }
    }

    /// Set a config value by dot-notation key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "registry.url" => {
                let value = value.trim();
                if value.is_empty() {
                    return Err(SvrxError::InvalidConfigValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
                self.registry.url = value.trim_end_matches('/').to_string();
                Ok(())
            }
            "registry.timeout_secs" => {
                self.registry.timeout_secs =
                    value
                        .trim()
                        .parse()
                        .map_err(|_| SvrxError::InvalidConfigValue {
                            key: key.to_string(),
                            value: value.to_string(),
                        })?;
                Ok(())
            }
            _ => Err(SvrxError::ConfigKeyNotFound {
                key: key.to_string(),
            }),
        }
    }

    /// List all config keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("registry.url".to_string(), self.registry.url.clone()),
            (
                "registry.timeout_secs".to_string(),
                self.registry.timeout_secs.to_string(),
            ),
        ]
    }
}

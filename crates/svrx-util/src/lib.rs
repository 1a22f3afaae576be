pub mod config;
pub mod core_manager;
pub mod error;
pub mod manifest;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod version;

pub use config::{svrx_dir, Config, RegistryConfig, DEFAULT_REGISTRY, SVRX_DIR_ENV};
pub use core_manager::{CoreManager, DEFAULT_TAG};
pub use error::{Result, SvrxError};
pub use manifest::{plugin_package_name, read_manifest, PackageManifest, PLUGIN_PREFIX};
pub use registry::{open_registry, DirRegistry, NpmRegistry, Registry};
pub use resolver::{PluginHandle, PluginManager, PluginRequest};
pub use store::{LocalSnapshot, PackageStore, CORE_PACKAGE};
pub use version::{best_fit, satisfies, Range, VersionEntry};

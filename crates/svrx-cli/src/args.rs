use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "svrx")]
#[command(about = "Version and plugin manager for the svrx dev server")]
#[command(version)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// svrx home directory (default: $SVRX_DIR or ~/.svrx)
    #[arg(long, global = true)]
    pub svrx_dir: Option<PathBuf>,

    /// Registry URL or directory (overrides config and $SVRX_REGISTRY)
    #[arg(long, global = true)]
    pub registry: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List svrx versions installed locally
    Ls,

    /// List remote svrx versions available for install
    LsRemote,

    /// Download and install a specific svrx <version> (default: latest)
    Install {
        /// Version or dist-tag
        version: Option<String>,
    },

    /// Resolve and install plugins
    Plugin {
        #[command(subcommand)]
        action: PluginAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum PluginAction {
    /// Resolve a plugin for an svrx version, installing it if needed
    Load {
        /// Plugin name (without the svrx-plugin- prefix)
        name: String,

        /// Exact version, dist-tag or range
        #[arg(long = "plugin-version")]
        version: Option<String>,

        /// Use a local package directory instead of resolving
        #[arg(long)]
        path: Option<PathBuf>,

        /// svrx core version (default: newest installed)
        #[arg(long)]
        core: Option<String>,

        /// Print the handle as JSON
        #[arg(long)]
        json: bool,
    },

    /// List installed versions of a plugin
    Ls {
        /// Plugin name
        name: String,

        /// Mark versions compatible with this svrx version
        #[arg(long)]
        core: Option<String>,
    },

    /// Show the best local and remote versions without installing
    Bestfit {
        /// Plugin name
        name: String,

        /// svrx core version (default: newest installed)
        #[arg(long)]
        core: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g., registry.url)
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key (e.g., registry.url)
        key: String,
        /// Value to set
        value: String,
    },
    /// List all config values
    List,
    /// Initialize config file with defaults
    Init,
    /// Show config file path
    Path,
}

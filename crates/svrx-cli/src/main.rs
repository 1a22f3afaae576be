use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use svrx_util::version;
use svrx_util::{
    open_registry, Config, CoreManager, PackageStore, PluginHandle, PluginManager, PluginRequest,
    Registry, Result, SvrxError, DEFAULT_TAG,
};

mod args;
use args::{Cli, Commands, ConfigAction, PluginAction, Shell};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Logs go to stderr; `RUST_LOG` wins over -v/-q
fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let svrx_dir = resolve_svrx_dir(cli.svrx_dir)?;
    tracing::debug!(svrx_dir = %svrx_dir.display(), "using svrx directory");

    let Some(command) = cli.command else {
        Cli::command().print_help().ok();
        return Ok(());
    };

    match command {
        Commands::Ls => {
            let registry = open_configured_registry(&svrx_dir, cli.registry)?;
            handle_ls(&svrx_dir, registry.as_ref())
        }
        Commands::LsRemote => {
            let registry = open_configured_registry(&svrx_dir, cli.registry)?;
            handle_ls_remote(&svrx_dir, registry.as_ref())
        }
        Commands::Install { version } => {
            let registry = open_configured_registry(&svrx_dir, cli.registry)?;
            handle_install(&svrx_dir, registry.as_ref(), version)
        }
        Commands::Plugin { action } => {
            let registry = open_configured_registry(&svrx_dir, cli.registry)?;
            handle_plugin(action, &svrx_dir, registry.as_ref())
        }
        Commands::Config { action } => handle_config(action, &svrx_dir),
        Commands::Completions { shell } => {
            handle_completions(shell);
            Ok(())
        }
    }
}

/// Registry from config, with `--registry` taking precedence
fn open_configured_registry(
    svrx_dir: &Path,
    registry_override: Option<String>,
) -> Result<Box<dyn Registry>> {
    let mut config = Config::load(svrx_dir)?;
    if let Some(url) = registry_override {
        config.registry.url = url;
    }
    open_registry(&config)
}

fn resolve_svrx_dir(cli_dir: Option<PathBuf>) -> Result<PathBuf> {
    match cli_dir {
        Some(dir) => Ok(dir),
        None => svrx_util::svrx_dir(),
    }
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, &mut cmd, "svrx", &mut io::stdout());
}

// ========== Core versions ==========

fn handle_ls(svrx_dir: &Path, registry: &dyn Registry) -> Result<()> {
    let manager = CoreManager::new(svrx_dir, registry);
    let versions = manager.local_versions();

    if versions.is_empty() {
        println!("There is no svrx installed.");
        println!();
        println!(
            "You can install the latest version using: {}",
            "svrx install".cyan()
        );
        return Ok(());
    }

    println!("{}", "Svrx Versions Installed:".cyan().bold());
    println!();
    println!("{}", versions.join(", "));
    println!();

    // The update hint is best effort
    match manager.available_update() {
        Ok(Some(latest)) => println!(
            "There is a new version of svrx ({}), run {} to install the latest one.",
            latest.green(),
            "svrx install".cyan()
        ),
        Ok(None) => {}
        Err(e) => tracing::debug!(error = %e, "could not check for updates"),
    }

    Ok(())
}

fn handle_ls_remote(svrx_dir: &Path, registry: &dyn Registry) -> Result<()> {
    let manager = CoreManager::new(svrx_dir, registry);
    let versions = manager.remote_versions()?;
    let tags = manager.remote_tags()?;

    println!("{}", "Available Svrx Versions:".cyan().bold());
    println!();
    println!("{}", versions.join(", "));
    println!();
    println!("{}", "Tags:".cyan().bold());
    println!();
    for (tag, version) in &tags {
        println!("{}: {}", tag.yellow(), version);
    }

    Ok(())
}

fn handle_install(svrx_dir: &Path, registry: &dyn Registry, version: Option<String>) -> Result<()> {
    let manager = CoreManager::new(svrx_dir, registry);
    let requested = version.unwrap_or_else(|| DEFAULT_TAG.to_string());

    let (version, path) = manager.install(&requested)?;
    println!(
        "{} svrx@{} {}",
        "Successfully installed".green(),
        version,
        path.display().to_string().dimmed()
    );

    Ok(())
}

// ========== Plugins ==========

fn handle_plugin(action: PluginAction, svrx_dir: &Path, registry: &dyn Registry) -> Result<()> {
    match action {
        PluginAction::Load {
            name,
            version,
            path,
            core,
            json,
        } => {
            let core = resolve_core(core, svrx_dir, registry)?;
            let mut request = PluginRequest::new(&name, core);
            request.version = version;
            request.path = path;

            let handle = PluginManager::new(request, svrx_dir, registry).load()?;
            print_handle(&handle, json)?;
        }
        PluginAction::Ls { name, core } => {
            let core = match core {
                Some(core) => Some(version::require_version(&core)?),
                None => None,
            };
            let store = PackageStore::plugin(svrx_dir, &name);
            let installed = store.list_installed();

            if installed.is_empty() {
                println!("No installed versions of {}", store.package().yellow());
                return Ok(());
            }

            println!();
            println!("{}", store.package().cyan().bold());
            println!();
            for entry in installed {
                let range = entry.core_range.as_deref().unwrap_or("*");
                let installed_at = store
                    .installed_at(&entry.version)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                let marker = match &core {
                    Some(core) if version::satisfies(core, entry.core_range.as_deref()) => {
                        "✓".green()
                    }
                    Some(_) => "✗".red(),
                    None => " ".normal(),
                };
                println!(
                    "  {} {:<12} svrx {:<20} {}",
                    marker,
                    entry.version,
                    range,
                    installed_at.dimmed()
                );
            }
            println!();
        }
        PluginAction::Bestfit { name, core } => {
            let core = resolve_core(core, svrx_dir, registry)?;
            let manager = PluginManager::new(PluginRequest::new(&name, core), svrx_dir, registry);

            let local = manager.local_best_fit()?;
            let remote = match manager.remote_best_fit() {
                Ok(remote) => remote,
                Err(SvrxError::RegistryNotFound { .. }) => None,
                Err(e) => return Err(e),
            };

            println!(
                "{} {}",
                "local: ".cyan(),
                local.as_deref().unwrap_or("-")
            );
            println!(
                "{} {}",
                "remote:".cyan(),
                remote.as_deref().unwrap_or("-")
            );
        }
    }

    Ok(())
}

/// The requested core version, or the newest installed one
fn resolve_core(core: Option<String>, svrx_dir: &Path, registry: &dyn Registry) -> Result<String> {
    if let Some(core) = core {
        return Ok(core);
    }

    CoreManager::new(svrx_dir, registry)
        .local_versions()
        .pop()
        .ok_or(SvrxError::CoreNotInstalled)
}

fn print_handle(handle: &PluginHandle, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(handle)?);
        return Ok(());
    }

    println!(
        "{} {}@{}",
        "Loaded".green(),
        handle.name,
        handle.version.as_deref().unwrap_or("(unversioned)")
    );
    println!("  {}", handle.path.display().to_string().dimmed());
    Ok(())
}

// ========== Config ==========

fn handle_config(action: ConfigAction, svrx_dir: &Path) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load(svrx_dir)?;
            match config.get(&key) {
                Some(value) => {
                    println!("{}", value);
                }
                None => {
                    return Err(SvrxError::ConfigKeyNotFound { key });
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load_file(svrx_dir)?;
            config.set(&key, &value)?;
            config.save(svrx_dir)?;
            println!("{} {} = {}", "Set:".green(), key, value);
        }
        ConfigAction::List => {
            let config = Config::load(svrx_dir)?;
            println!();
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
            println!();
        }
        ConfigAction::Path => {
            let path = Config::path(svrx_dir);
            println!("{}", path.display());
        }
        ConfigAction::Init => {
            let path = Config::init(svrx_dir)?;
            println!("{} {}", "Initialized:".green(), path.display());
        }
    }

    Ok(())
}

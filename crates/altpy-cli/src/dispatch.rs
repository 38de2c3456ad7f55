use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use altpy_core::{default_user_prefix, AltpyConfig, InstallOptions, LifecycleCommand, VersionCatalog};
use altpy_installer::{
    read_active_operation, ArtifactLayout, ArtifactStore, AssumeYes, ConfirmationProvider,
    LifecycleOrchestrator, LifecycleServices, SymlinkPublisher, SystemProcessRunner,
    TarGzExtractor,
};
use anyhow::{Context, Result};
use log::debug;

use crate::completion::{init_shell_lines, resolve_init_shell, write_completions_script};
use crate::net::{http_client, HttpArchiveFetcher, HttpVersionSource};
use crate::prompt::TerminalPrompt;
use crate::render::{
    current_output_style, format_installed_list, format_outcome_lines, render_status_line,
    CliObserver, InstalledEntry, OutputStyle, TerminalRenderer,
};
use crate::{Cli, Commands};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let Cli {
        prefix,
        yes,
        verbose: _,
        command,
    } = cli;

    if let Commands::Completions { shell } = command {
        return write_completions_script(shell, &mut io::stdout().lock());
    }

    let prefix = resolve_prefix(prefix.as_deref())?;
    let config = AltpyConfig::load(&prefix)?;
    debug!("using prefix {}", config.prefix.display());

    match command {
        Commands::Install {
            version,
            jobs,
            sha256,
        } => run_lifecycle(
            &config,
            yes,
            LifecycleCommand::Install {
                version,
                options: InstallOptions {
                    jobs,
                    expected_sha256: sha256,
                },
            },
        ),
        Commands::Remove { version } => {
            run_lifecycle(&config, yes, LifecycleCommand::Remove { version })
        }
        Commands::Clean => run_lifecycle(&config, yes, LifecycleCommand::Clean),
        Commands::List { json } => {
            let store = ArtifactStore::new(ArtifactLayout::from_config(&config));
            let installed = store.installed_versions()?;
            if json {
                let entries = installed
                    .iter()
                    .map(InstalledEntry::from)
                    .collect::<Vec<_>>();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&entries)
                        .context("failed to serialize installed versions")?
                );
            } else {
                TerminalRenderer::current().print_lines(&format_installed_list(&installed));
            }
            Ok(())
        }
        Commands::Available => {
            let source = HttpVersionSource::new(http_client()?, config.listing_url());
            let versions = VersionCatalog::new(&source).list_valid()?;
            let store = ArtifactStore::new(ArtifactLayout::from_config(&config));
            let installed = store
                .installed_versions()?
                .into_iter()
                .map(|entry| entry.version)
                .collect::<Vec<_>>();
            for version in versions {
                if installed.contains(&version) {
                    println!("{version} (installed)");
                } else {
                    println!("{version}");
                }
            }
            Ok(())
        }
        Commands::Doctor => {
            let path_env = std::env::var_os("PATH");
            let lines = doctor_lines(&config, current_output_style(), path_env.as_deref())?;
            TerminalRenderer::current().print_lines(&lines);
            Ok(())
        }
        Commands::InitShell { shell } => {
            let shell_env = std::env::var("SHELL").ok();
            let shell = resolve_init_shell(shell, shell_env.as_deref(), cfg!(windows));
            for line in init_shell_lines(&config.links_dir, shell) {
                println!("{line}");
            }
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

pub(crate) fn resolve_prefix(requested: Option<&Path>) -> Result<PathBuf> {
    match requested {
        Some(path) if path.is_absolute() => Ok(path.to_path_buf()),
        Some(path) => Ok(std::env::current_dir()
            .context("failed to resolve current directory")?
            .join(path)),
        None => default_user_prefix(),
    }
}

fn run_lifecycle(config: &AltpyConfig, assume_yes: bool, command: LifecycleCommand) -> Result<()> {
    let renderer = TerminalRenderer::current();
    let client = http_client()?;
    let versions = HttpVersionSource::new(client.clone(), config.listing_url());
    let fetcher = HttpArchiveFetcher::new(client, renderer);
    let confirmation: &dyn ConfirmationProvider = if assume_yes {
        &AssumeYes
    } else {
        &TerminalPrompt
    };
    let observer = CliObserver::new(renderer);

    let orchestrator = LifecycleOrchestrator::new(
        config,
        LifecycleServices {
            versions: &versions,
            fetcher: &fetcher,
            extractor: &TarGzExtractor,
            runner: &SystemProcessRunner,
            confirmation,
            observer: &observer,
        },
    );
    let outcome = orchestrator.execute(&command)?;
    renderer.print_lines(&format_outcome_lines(&outcome, renderer.style()));
    Ok(())
}

/// Health report for a prefix. Problems are rendered as warnings with a suggested fix.
pub(crate) fn doctor_lines(
    config: &AltpyConfig,
    style: OutputStyle,
    path_env: Option<&OsStr>,
) -> Result<Vec<String>> {
    let layout = ArtifactLayout::from_config(config);
    let store = ArtifactStore::new(layout.clone());
    let publisher = SymlinkPublisher::new(layout.clone(), config.alias_prefix.clone());
    let config_path = AltpyConfig::config_path(&config.prefix);

    let mut lines = vec![
        format!("prefix: {}", config.prefix.display()),
        format!("versions: {}", layout.artifact_root().display()),
        format!("links: {}", layout.links_dir().display()),
        format!("state: {}", layout.state_dir().display()),
        format!(
            "config: {}{}",
            config_path.display(),
            if config_path.is_file() { "" } else { " (absent)" }
        ),
        format!("source: {}", config.source_base_url),
    ];

    let installed = store.installed_versions()?;
    lines.push(render_status_line(
        style,
        "ok",
        &format!("{} version(s) installed", installed.len()),
    ));

    let on_path = path_env
        .map(|value| std::env::split_paths(value).any(|entry| entry == layout.links_dir()))
        .unwrap_or(false);
    if !on_path {
        lines.push(render_status_line(
            style,
            "warn",
            &format!(
                "{} is not on PATH; run `altpy init-shell`",
                layout.links_dir().display()
            ),
        ));
    }

    for version in store.incomplete_installs()? {
        lines.push(render_status_line(
            style,
            "warn",
            &format!("incomplete install: {version}; run `altpy remove {version}`"),
        ));
    }
    for path in store.stale_staging_paths()? {
        lines.push(render_status_line(
            style,
            "warn",
            &format!("staging leftover: {}; run `altpy clean`", path.display()),
        ));
    }
    for alias in publisher.orphaned_aliases()? {
        lines.push(render_status_line(
            style,
            "warn",
            &format!("orphaned alias: {alias}; run `altpy clean`"),
        ));
    }
    match read_active_operation(&layout) {
        Ok(Some(active)) => lines.push(render_status_line(
            style,
            "warn",
            &format!(
                "operation marker held by {} (pid={}); delete {} if no altpy process is running",
                active.operation,
                active.pid,
                layout.active_operation_path().display()
            ),
        )),
        Ok(None) => {}
        Err(err) => lines.push(render_status_line(style, "err", &format!("{err:#}"))),
    }

    Ok(lines)
}

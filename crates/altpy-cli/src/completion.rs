use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{CommandFactory, ValueEnum};
use clap_complete::Shell;

use crate::Cli;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum CliCompletionShell {
    Bash,
    Zsh,
    Fish,
    Powershell,
}

impl From<CliCompletionShell> for Shell {
    fn from(shell: CliCompletionShell) -> Self {
        match shell {
            CliCompletionShell::Bash => Shell::Bash,
            CliCompletionShell::Zsh => Shell::Zsh,
            CliCompletionShell::Fish => Shell::Fish,
            CliCompletionShell::Powershell => Shell::PowerShell,
        }
    }
}

pub(crate) fn write_completions_script<W: Write>(
    shell: CliCompletionShell,
    writer: &mut W,
) -> Result<()> {
    let mut command = Cli::command();
    let generator: Shell = shell.into();
    let mut generated = Vec::new();
    clap_complete::generate(generator, &mut command, "altpy", &mut generated);
    writer
        .write_all(&generated)
        .with_context(|| "failed writing generated completion script")
}

fn escape_single_quote_shell(value: &str) -> String {
    value.replace('\'', "'\"'\"'")
}

fn escape_ps_single_quote(value: &str) -> String {
    value.replace('\'', "''")
}

fn detect_shell_from_env(shell_env: Option<&str>) -> Option<CliCompletionShell> {
    let shell_value = shell_env?;
    let shell_token = Path::new(shell_value)
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or(shell_value)
        .to_ascii_lowercase();
    match shell_token.as_str() {
        "bash" => Some(CliCompletionShell::Bash),
        "zsh" => Some(CliCompletionShell::Zsh),
        "fish" => Some(CliCompletionShell::Fish),
        "powershell" | "pwsh" => Some(CliCompletionShell::Powershell),
        _ => None,
    }
}

pub(crate) fn resolve_init_shell(
    requested_shell: Option<CliCompletionShell>,
    shell_env: Option<&str>,
    is_windows: bool,
) -> CliCompletionShell {
    if let Some(shell) = requested_shell {
        return shell;
    }
    if let Some(shell) = detect_shell_from_env(shell_env) {
        return shell;
    }
    if is_windows {
        CliCompletionShell::Powershell
    } else {
        CliCompletionShell::Bash
    }
}

/// Shell snippet that prepends the alias directory to PATH once.
pub(crate) fn init_shell_lines(links_dir: &Path, shell: CliCompletionShell) -> Vec<String> {
    let bin = links_dir.display().to_string();
    match shell {
        CliCompletionShell::Bash | CliCompletionShell::Zsh => {
            let escaped_bin = escape_single_quote_shell(&bin);
            vec![
                format!("case \":$PATH:\" in *':{escaped_bin}:'*) ;; *)"),
                format!("  export PATH='{escaped_bin}':\"$PATH\" ;;"),
                "esac".to_string(),
            ]
        }
        CliCompletionShell::Fish => {
            let escaped_bin = escape_single_quote_shell(&bin);
            vec![
                format!("if not contains -- '{escaped_bin}' $PATH"),
                format!("    set -gx PATH '{escaped_bin}' $PATH"),
                "end".to_string(),
            ]
        }
        CliCompletionShell::Powershell => {
            let escaped_bin = escape_ps_single_quote(&bin);
            vec![
                format!(
                    "if (-not ($env:PATH -split [IO.Path]::PathSeparator | Where-Object {{ $_ -eq '{escaped_bin}' }})) {{"
                ),
                format!("  $env:PATH = '{escaped_bin}' + [IO.Path]::PathSeparator + $env:PATH"),
                "}".to_string(),
            ]
        }
    }
}

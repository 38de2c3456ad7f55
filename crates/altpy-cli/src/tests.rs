use std::collections::BTreeSet;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use altpy_core::{AltpyConfig, VersionId};
use altpy_installer::{
    claim_operation, ArchiveFetcher, ArtifactLayout, CleanReport, InstalledVersion, LifecycleOutcome,
    RemovalReport, RemovalStatus,
};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use super::*;
use crate::completion::{
    init_shell_lines, resolve_init_shell, write_completions_script, CliCompletionShell,
};
use crate::dispatch::{doctor_lines, resolve_prefix};
use crate::logging::log_level;
use crate::net::{copy_with_progress, http_client, part_path_for, HttpArchiveFetcher};
use crate::render::{
    format_installed_list, format_outcome_lines, output_style_for, render_progress_line,
    render_status_line, InstalledEntry, OutputStyle, TerminalRenderer,
};

static TEST_PREFIX_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_prefix() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_PREFIX_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "altpy-cli-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ))
}

fn version(raw: &str) -> VersionId {
    VersionId::parse(raw).expect("must parse version")
}

fn sample_installed() -> InstalledVersion {
    InstalledVersion {
        version: version("3.11.4"),
        install_root: PathBuf::from("/opt/altpy/versions/3.11.4"),
        published_aliases: ["altpy-pip3.11", "altpy-python3.11"]
            .into_iter()
            .map(String::from)
            .collect::<BTreeSet<_>>(),
        archive_sha256: None,
        installed_at_unix: 1_700_000_000,
    }
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn install_parses_build_options() {
    let cli = Cli::try_parse_from([
        "altpy", "install", "3.11.4", "--jobs", "6", "--sha256", "abc123",
    ])
    .expect("must parse");

    match cli.command {
        Commands::Install {
            version,
            jobs,
            sha256,
        } => {
            assert_eq!(version, "3.11.4");
            assert_eq!(jobs, Some(6));
            assert_eq!(sha256.as_deref(), Some("abc123"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn install_rejects_zero_jobs() {
    let err = Cli::try_parse_from(["altpy", "install", "3.11.4", "--jobs", "0"])
        .expect_err("zero jobs must be rejected");
    assert_eq!(err.kind(), ErrorKind::ValueValidation);
}

#[test]
fn install_requires_version() {
    let err = Cli::try_parse_from(["altpy", "install"]).expect_err("must require version");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn remove_rejects_extra_arguments() {
    let err = Cli::try_parse_from(["altpy", "remove", "3.9.7", "3.10.0"])
        .expect_err("must reject extra argument");
    assert_eq!(err.kind(), ErrorKind::UnknownArgument);
}

#[test]
fn global_flags_are_accepted_after_subcommand() {
    let cli = Cli::try_parse_from(["altpy", "clean", "--yes", "--prefix", "/tmp/altpy-x", "-v"])
        .expect("must parse");
    assert!(cli.yes);
    assert!(cli.verbose);
    assert_eq!(cli.prefix.as_deref(), Some(Path::new("/tmp/altpy-x")));
    assert!(matches!(cli.command, Commands::Clean));
}

#[test]
fn completions_require_known_shell() {
    let err = Cli::try_parse_from(["altpy", "completions", "tcsh"]).expect_err("must reject");
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn relative_prefix_is_made_absolute() {
    let resolved = resolve_prefix(Some(Path::new("local-altpy"))).expect("must resolve");
    assert!(resolved.is_absolute());
    assert!(resolved.ends_with("local-altpy"));

    let absolute = resolve_prefix(Some(Path::new("/srv/altpy"))).expect("must resolve");
    assert_eq!(absolute, PathBuf::from("/srv/altpy"));
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "installed 3.11.4"),
        "installed 3.11.4"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "installed 3.11.4"),
        "[OK] installed 3.11.4"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "not on PATH"),
        "[WARN] not on PATH"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "err", "marker unreadable"),
        "[ERR] marker unreadable"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "step", "alias: altpy-python3.11"),
        "[..] alias: altpy-python3.11"
    );
}

#[test]
fn output_style_requires_terminal_without_no_color() {
    assert_eq!(output_style_for(true, false), OutputStyle::Rich);
    assert_eq!(output_style_for(true, true), OutputStyle::Plain);
    assert_eq!(output_style_for(false, false), OutputStyle::Plain);
}

#[test]
fn progress_line_is_suppressed_in_plain_mode() {
    assert!(render_progress_line(OutputStyle::Plain, "download", 10, None).is_none());
    let line = render_progress_line(OutputStyle::Rich, "download", 2048, None)
        .expect("rich mode must render");
    assert!(line.contains("download"));
    assert!(line.contains("2.00 KiB"));
}

#[test]
fn install_outcome_lists_aliases() {
    let outcome = LifecycleOutcome::Installed(sample_installed());

    assert_eq!(
        format_outcome_lines(&outcome, OutputStyle::Plain),
        vec![
            "installed 3.11.4 into /opt/altpy/versions/3.11.4".to_string(),
            "alias: altpy-pip3.11".to_string(),
            "alias: altpy-python3.11".to_string(),
        ]
    );
    assert_eq!(
        format_outcome_lines(&outcome, OutputStyle::Rich)[0],
        "[OK] installed 3.11.4 into /opt/altpy/versions/3.11.4"
    );
}

#[test]
fn removal_outcome_distinguishes_repaired_installs() {
    let outcome = LifecycleOutcome::Removed(RemovalReport {
        version: version("3.9.7"),
        status: RemovalStatus::RepairedIncomplete,
        removed_aliases: Vec::new(),
    });

    assert_eq!(
        format_outcome_lines(&outcome, OutputStyle::Plain),
        vec!["removed incomplete install of 3.9.7".to_string()]
    );
}

#[test]
fn clean_outcome_reports_nothing_to_do() {
    let outcome = LifecycleOutcome::Cleaned(CleanReport {
        nothing_to_do: true,
        ..CleanReport::default()
    });

    assert_eq!(
        format_outcome_lines(&outcome, OutputStyle::Rich),
        vec!["[OK] nothing to clean".to_string()]
    );
}

#[test]
fn clean_outcome_lists_removed_versions_and_sweeps() {
    let outcome = LifecycleOutcome::Cleaned(CleanReport {
        removed: vec![RemovalReport {
            version: version("3.10.0"),
            status: RemovalStatus::Removed,
            removed_aliases: vec!["altpy-python3.10".to_string()],
        }],
        swept_staging: vec![PathBuf::from("/opt/altpy/versions/Python-3.12.0")],
        pruned_aliases: vec!["altpy-python3.7.0".to_string()],
        nothing_to_do: false,
    });

    assert_eq!(
        format_outcome_lines(&outcome, OutputStyle::Plain),
        vec![
            "removed 3.10.0".to_string(),
            "unlinked: altpy-python3.10".to_string(),
            "swept: /opt/altpy/versions/Python-3.12.0".to_string(),
            "pruned orphaned alias: altpy-python3.7.0".to_string(),
        ]
    );
}

#[test]
fn installed_list_shows_aliases_or_placeholder() {
    assert_eq!(
        format_installed_list(&[]),
        vec!["no versions installed".to_string()]
    );
    assert_eq!(
        format_installed_list(&[sample_installed()]),
        vec!["3.11.4 (altpy-pip3.11, altpy-python3.11)".to_string()]
    );
}

#[test]
fn installed_entry_serializes_to_json() {
    let installed = sample_installed();
    let value = serde_json::to_value(InstalledEntry::from(&installed)).expect("must serialize");

    assert_eq!(value["version"], "3.11.4");
    assert_eq!(value["install_root"], "/opt/altpy/versions/3.11.4");
    assert_eq!(
        value["aliases"],
        serde_json::json!(["altpy-pip3.11", "altpy-python3.11"])
    );
    assert_eq!(value["installed_at_unix"], 1_700_000_000_u64);
}

#[test]
fn init_shell_prefers_explicit_then_env_shell() {
    assert_eq!(
        resolve_init_shell(Some(CliCompletionShell::Fish), Some("/bin/zsh"), false),
        CliCompletionShell::Fish
    );
    assert_eq!(
        resolve_init_shell(None, Some("/usr/bin/zsh"), false),
        CliCompletionShell::Zsh
    );
    assert_eq!(
        resolve_init_shell(None, Some("pwsh"), false),
        CliCompletionShell::Powershell
    );
    assert_eq!(
        resolve_init_shell(None, None, true),
        CliCompletionShell::Powershell
    );
    assert_eq!(
        resolve_init_shell(None, Some("/bin/tcsh"), false),
        CliCompletionShell::Bash
    );
}

#[test]
fn init_shell_lines_export_links_dir() {
    let bash = init_shell_lines(Path::new("/home/dev/.altpy/bin"), CliCompletionShell::Bash);
    assert_eq!(
        bash,
        vec![
            "case \":$PATH:\" in *':/home/dev/.altpy/bin:'*) ;; *)".to_string(),
            "  export PATH='/home/dev/.altpy/bin':\"$PATH\" ;;".to_string(),
            "esac".to_string(),
        ]
    );

    let fish = init_shell_lines(Path::new("/home/dev/.altpy/bin"), CliCompletionShell::Fish);
    assert_eq!(fish[1], "    set -gx PATH '/home/dev/.altpy/bin' $PATH");
}

#[test]
fn init_shell_lines_escape_single_quotes() {
    let lines = init_shell_lines(Path::new("/home/o'neil/bin"), CliCompletionShell::Zsh);
    assert!(lines[1].contains("'/home/o'\"'\"'neil/bin'"));

    let ps = init_shell_lines(Path::new("C:/o'neil/bin"), CliCompletionShell::Powershell);
    assert!(ps[1].contains("'C:/o''neil/bin'"));
}

#[test]
fn completions_script_mentions_binary_name() {
    let mut output = Vec::new();
    write_completions_script(CliCompletionShell::Bash, &mut output).expect("must generate");
    let script = String::from_utf8(output).expect("script must be utf-8");
    assert!(script.contains("altpy"));
    assert!(script.contains("install"));
}

#[test]
fn copy_with_progress_reports_running_total() {
    let payload = vec![7_u8; 150_000];
    let mut reader = Cursor::new(payload.clone());
    let mut written = Vec::new();
    let mut reports = Vec::new();

    let copied = copy_with_progress(&mut reader, &mut written, |bytes| reports.push(bytes))
        .expect("must copy");

    assert_eq!(copied, 150_000);
    assert_eq!(written, payload);
    assert_eq!(reports.last().copied(), Some(150_000));
    assert!(reports.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn failed_fetch_removes_partial_download() {
    let dir = test_prefix();
    fs::create_dir_all(&dir).expect("must create download dir");
    let destination = dir.join("3.11.4.tgz");
    let part_path = part_path_for(&destination);
    fs::write(&part_path, b"partial").expect("must write partial download");
    let fetcher = HttpArchiveFetcher::new(
        http_client().expect("must build client"),
        TerminalRenderer::from_style(OutputStyle::Plain),
    );

    fetcher
        .fetch("http://127.0.0.1:9/Python-3.11.4.tgz", &destination)
        .expect_err("unreachable server must fail the fetch");

    assert!(!part_path.exists(), "partial download must be removed");
    assert!(!destination.exists());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn part_path_sits_next_to_destination() {
    assert_eq!(
        part_path_for(Path::new("/opt/altpy/versions/3.11.4.tgz")),
        PathBuf::from("/opt/altpy/versions/3.11.4.tgz.part")
    );
}

#[test]
fn log_level_follows_verbose_flag() {
    assert_eq!(log_level(false), simplelog::LevelFilter::Info);
    assert_eq!(log_level(true), simplelog::LevelFilter::Debug);
}

#[test]
fn doctor_reports_path_and_leftovers() {
    let config = AltpyConfig::for_prefix(test_prefix());
    let layout = ArtifactLayout::from_config(&config);
    fs::create_dir_all(layout.install_root_for(&version("3.9.7"))).expect("must create root");
    fs::create_dir_all(layout.build_dir_for(&version("3.12.0"))).expect("must create tree");
    let guard = claim_operation(&layout, "install").expect("must claim");

    let lines = doctor_lines(&config, OutputStyle::Rich, None).expect("must diagnose");

    assert_eq!(lines[0], format!("prefix: {}", config.prefix.display()));
    assert!(lines.contains(&"[OK] 0 version(s) installed".to_string()));
    assert!(lines
        .iter()
        .any(|line| line.starts_with("[WARN]") && line.contains("is not on PATH")));
    assert!(lines.contains(
        &"[WARN] incomplete install: 3.9.7; run `altpy remove 3.9.7`".to_string()
    ));
    assert!(lines
        .iter()
        .any(|line| line.starts_with("[WARN] staging leftover:") && line.contains("Python-3.12.0")));
    assert!(lines.iter().any(|line| line.contains(&format!(
        "operation marker held by install (pid={})",
        std::process::id()
    ))));

    drop(guard);
    let _ = fs::remove_dir_all(&config.prefix);
}

#[test]
fn doctor_accepts_links_dir_on_path() {
    let config = AltpyConfig::for_prefix(test_prefix());
    let path_env = std::env::join_paths([PathBuf::from("/usr/bin"), config.links_dir.clone()])
        .expect("must join PATH");

    let lines = doctor_lines(&config, OutputStyle::Plain, Some(path_env.as_os_str()))
        .expect("must diagnose");

    assert!(!lines.iter().any(|line| line.contains("is not on PATH")));
    assert!(lines
        .iter()
        .any(|line| line.ends_with("config.toml (absent)")));
}

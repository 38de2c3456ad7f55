use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use altpy_core::VersionId;
use altpy_installer::{
    CleanReport, InstalledVersion, LifecycleObserver, LifecycleOutcome, RemovalReport,
    RemovalStatus,
};
use anstyle::{AnsiColor, Effects, Style};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    output_style_for(
        std::io::stdout().is_terminal(),
        std::env::var_os("NO_COLOR").is_some(),
    )
}

pub(crate) fn output_style_for(is_terminal: bool, no_color: bool) -> OutputStyle {
    if is_terminal && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

pub(crate) struct TerminalProgress {
    style: OutputStyle,
    label: String,
    total: Option<u64>,
    current: u64,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    /// Announces a lifecycle step: a section header in rich mode, a plain line otherwise.
    pub(crate) fn print_step(self, title: &str) {
        match self.style {
            OutputStyle::Plain => println!("{title}"),
            OutputStyle::Rich => {
                println!();
                println!("{}", colorize(section_style(), &format!("== {title} ==")));
            }
        }
    }

    pub(crate) fn start_progress(self, label: &str, total: Option<u64>) -> TerminalProgress {
        let progress_bar = if self.style == OutputStyle::Rich {
            let progress_bar = match total {
                Some(total) => ProgressBar::new(total.max(1)),
                None => ProgressBar::new_spinner(),
            };
            let template = match total {
                Some(_) => "{spinner:.cyan.bold} {msg:<10} [{bar:24.cyan/blue}] {bytes}/{total_bytes} {elapsed_precise}",
                None => "{spinner:.cyan.bold} {msg:<10} {bytes} {elapsed_precise}",
            };
            if let Ok(style) = ProgressStyle::with_template(template) {
                progress_bar.set_style(style.tick_chars("|/-\\ ").progress_chars("=>-"));
            }
            progress_bar.set_message(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        TerminalProgress {
            style: self.style,
            label: label.to_string(),
            total,
            current: 0,
            progress_bar,
            started_at: Instant::now(),
        }
    }
}

impl TerminalProgress {
    pub(crate) fn set(&mut self, current: u64) {
        self.current = match self.total {
            Some(total) => current.min(total),
            None => current,
        };

        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.set_position(self.current);
        }
    }

    pub(crate) fn finish_success(mut self) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };

        progress_bar.finish_and_clear();
        if let Some(line) = render_progress_line(
            self.style,
            &self.label,
            self.current,
            Some(self.started_at.elapsed()),
        ) {
            println!("{line}");
        }
    }

    pub(crate) fn finish_abandon(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub(crate) fn render_progress_line(
    style: OutputStyle,
    label: &str,
    bytes: u64,
    elapsed: Option<Duration>,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }

    let suffix = elapsed
        .map(|value| format!(" in {}", format_elapsed(value)))
        .unwrap_or_default();
    Some(format!(
        "{} {}{}",
        colorize(progress_label_style(), label),
        HumanBytes(bytes),
        suffix
    ))
}

/// Streams build output and announces steps as the orchestrator reaches them.
pub(crate) struct CliObserver {
    renderer: TerminalRenderer,
}

impl CliObserver {
    pub(crate) fn new(renderer: TerminalRenderer) -> Self {
        Self { renderer }
    }
}

impl LifecycleObserver for CliObserver {
    fn step(&self, version: &VersionId, step: &str) {
        self.renderer.print_step(&format!("{step} {version}"));
    }

    fn output_line(&self, line: &str) {
        println!("{line}");
    }
}

pub(crate) fn format_outcome_lines(outcome: &LifecycleOutcome, style: OutputStyle) -> Vec<String> {
    match outcome {
        LifecycleOutcome::Installed(installed) => format_installed_lines(installed, style),
        LifecycleOutcome::Removed(removal) => format_removal_lines(removal, style),
        LifecycleOutcome::Cleaned(report) => format_clean_lines(report, style),
    }
}

fn format_installed_lines(installed: &InstalledVersion, style: OutputStyle) -> Vec<String> {
    let mut lines = vec![render_status_line(
        style,
        "ok",
        &format!(
            "installed {} into {}",
            installed.version,
            installed.install_root.display()
        ),
    )];
    lines.extend(
        installed
            .published_aliases
            .iter()
            .map(|alias| render_status_line(style, "step", &format!("alias: {alias}"))),
    );
    lines
}

fn format_removal_lines(removal: &RemovalReport, style: OutputStyle) -> Vec<String> {
    let message = match removal.status {
        RemovalStatus::Removed => format!("removed {}", removal.version),
        RemovalStatus::RepairedIncomplete => {
            format!("removed incomplete install of {}", removal.version)
        }
    };
    let mut lines = vec![render_status_line(style, "ok", &message)];
    lines.extend(
        removal
            .removed_aliases
            .iter()
            .map(|alias| render_status_line(style, "step", &format!("unlinked: {alias}"))),
    );
    lines
}

fn format_clean_lines(report: &CleanReport, style: OutputStyle) -> Vec<String> {
    let mut lines = Vec::new();
    if report.nothing_to_do {
        lines.push(render_status_line(style, "ok", "nothing to clean"));
    }
    for removal in &report.removed {
        lines.extend(format_removal_lines(removal, style));
    }
    lines.extend(report.swept_staging.iter().map(|path| {
        render_status_line(style, "step", &format!("swept: {}", path.display()))
    }));
    lines.extend(report.pruned_aliases.iter().map(|alias| {
        render_status_line(style, "step", &format!("pruned orphaned alias: {alias}"))
    }));
    lines
}

pub(crate) fn format_installed_list(installed: &[InstalledVersion]) -> Vec<String> {
    if installed.is_empty() {
        return vec!["no versions installed".to_string()];
    }
    installed
        .iter()
        .map(|entry| {
            let aliases = entry
                .published_aliases
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} ({aliases})", entry.version)
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub(crate) struct InstalledEntry<'a> {
    version: &'a str,
    install_root: &'a Path,
    aliases: Vec<&'a str>,
    installed_at_unix: u64,
}

impl<'a> From<&'a InstalledVersion> for InstalledEntry<'a> {
    fn from(installed: &'a InstalledVersion) -> Self {
        Self {
            version: installed.version.as_str(),
            install_root: &installed.install_root,
            aliases: installed
                .published_aliases
                .iter()
                .map(String::as_str)
                .collect(),
            installed_at_unix: installed.installed_at_unix,
        }
    }
}

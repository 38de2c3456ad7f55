use std::io::IsTerminal;

use altpy_installer::ConfirmationProvider;
use anyhow::{bail, Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;

/// Interactive yes/no prompt. Defaults to "no".
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TerminalPrompt;

impl ConfirmationProvider for TerminalPrompt {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        if !std::io::stdin().is_terminal() {
            bail!("stdin is not a terminal; pass --yes to confirm non-interactively");
        }
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("failed to read confirmation")
    }
}

use anyhow::Result;

/// Yes/no decision for destructive actions.
pub trait ConfirmationProvider {
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Accepts every prompt; used for `--yes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl ConfirmationProvider for AssumeYes {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        log::debug!("auto-confirmed: {prompt}");
        Ok(true)
    }
}

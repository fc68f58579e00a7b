use inquire::error::InquireError;
use inquire::{Confirm, Password, PasswordDisplayMode, Text};

use crate::core::error::BackupError;

/// Terminal input used by interactive runs.
///
/// Implementations block; callers run them on a blocking thread.
pub trait Prompter: Send + Sync {
    fn username(&self) -> Result<String, BackupError>;

    fn secret(&self, username: &str) -> Result<String, BackupError>;

    fn confirm(&self, question: &str) -> Result<bool, BackupError>;
}

/// Prompter backed by `inquire`.
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn username(&self) -> Result<String, BackupError> {
        loop {
            let name = Text::new("Share username:").prompt().map_err(map_inquire)?;
            let name = name.trim();
            if !name.is_empty() {
                return Ok(name.to_string());
            }
            eprintln!("Username must not be empty.");
        }
    }

    fn secret(&self, username: &str) -> Result<String, BackupError> {
        Password::new(&format!("Password for {}:", username))
            .with_display_mode(PasswordDisplayMode::Masked)
            .without_confirmation()
            .prompt()
            .map_err(map_inquire)
    }

    fn confirm(&self, question: &str) -> Result<bool, BackupError> {
        Confirm::new(question)
            .with_default(false)
            .prompt()
            .map_err(map_inquire)
    }
}

fn map_inquire(err: InquireError) -> BackupError {
    match err {
        InquireError::OperationInterrupted => BackupError::Interrupted,
        InquireError::OperationCanceled => BackupError::Prompt("cancelled by user".to_string()),
        other => BackupError::Prompt(other.to_string()),
    }
}

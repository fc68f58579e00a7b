use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::error::BackupError;
use crate::core::job::RunMode;
use crate::core::prompt::Prompter;

/// How the share is authenticated for this run.
///
/// Nothing here is ever written to disk or to the log.
#[derive(Clone)]
pub enum Credential {
    /// A mount.cifs credentials file; its contents are consumed by the mount.
    File(PathBuf),
    /// Username and secret entered at the terminal.
    Inline { username: String, secret: String },
}

impl Credential {
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Inline { username, .. } => f
                .debug_struct("Inline")
                .field("username", username)
                .field("secret", &"<redacted>")
                .finish(),
        }
    }
}

/// Pick the credential source for a run.
///
/// The file wins whenever it exists. Without a file, automated runs fail
/// instead of waiting on input nobody will give.
pub fn resolve(
    mode: RunMode,
    candidate: &Path,
    prompter: &dyn Prompter,
) -> Result<Credential, BackupError> {
    if candidate.is_file() {
        if candidate.to_string_lossy().contains(',') {
            return Err(BackupError::InvalidCredential(format!(
                "credentials file path {} contains ','",
                candidate.display()
            )));
        }
        warn_if_exposed(candidate);
        debug!(path = %candidate.display(), "Using credentials file");
        return Ok(Credential::File(candidate.to_path_buf()));
    }

    if !mode.is_interactive() {
        return Err(BackupError::MissingCredentials {
            path: candidate.to_path_buf(),
        });
    }

    debug!(path = %candidate.display(), "No credentials file, prompting");
    let username = prompter.username()?;
    // Joined into the comma-separated mount option string
    if username.contains(',') {
        return Err(BackupError::InvalidCredential(
            "username contains ','".to_string(),
        ));
    }
    let secret = prompter.secret(&username)?;

    Ok(Credential::Inline { username, secret })
}

/// Credentials files are expected to be mode 600.
fn warn_if_exposed(path: &Path) {
    if let Ok(metadata) = std::fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{:o}", mode & 0o777),
                "Credentials file is readable by other users, consider chmod 600"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Answers prompts with fixed values and counts how often it was asked.
    struct FixedPrompter {
        username: String,
        asked: AtomicUsize,
    }

    impl FixedPrompter {
        fn new() -> Self {
            Self::with_username("alice")
        }

        fn with_username(username: &str) -> Self {
            Self {
                username: username.to_string(),
                asked: AtomicUsize::new(0),
            }
        }
    }

    impl Prompter for FixedPrompter {
        fn username(&self) -> Result<String, BackupError> {
            self.asked.fetch_add(1, Ordering::SeqCst);
            Ok(self.username.clone())
        }

        fn secret(&self, _username: &str) -> Result<String, BackupError> {
            self.asked.fetch_add(1, Ordering::SeqCst);
            Ok("hunter2".to_string())
        }

        fn confirm(&self, _question: &str) -> Result<bool, BackupError> {
            self.asked.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[test]
    fn test_file_takes_precedence_over_terminal() {
        let temp = tempdir().unwrap();
        let file = temp.path().join(".smbcredentials");
        std::fs::write(&file, "username=alice\npassword=x\n").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o600)).unwrap();

        let prompter = FixedPrompter::new();
        let credential = resolve(RunMode::Interactive, &file, &prompter).unwrap();

        assert!(matches!(credential, Credential::File(ref p) if p == &file));
        assert_eq!(prompter.asked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_automated_without_file_fails() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("missing");

        let prompter = FixedPrompter::new();
        let err = resolve(RunMode::Automated, &file, &prompter).unwrap_err();

        assert!(matches!(err, BackupError::MissingCredentials { .. }));
        assert_eq!(prompter.asked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_interactive_without_file_prompts() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("missing");

        let prompter = FixedPrompter::new();
        let credential = resolve(RunMode::Interactive, &file, &prompter).unwrap();

        match credential {
            Credential::Inline { username, secret } => {
                assert_eq!(username, "alice");
                assert_eq!(secret, "hunter2");
            }
            other => panic!("expected inline credential, got {:?}", other),
        }
        assert_eq!(prompter.asked.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_username_with_comma_is_rejected() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("missing");

        let prompter = FixedPrompter::with_username("alice,uid=0");
        let err = resolve(RunMode::Interactive, &file, &prompter).unwrap_err();

        assert!(matches!(err, BackupError::InvalidCredential(_)));
        // Rejected before the secret is asked for
        assert_eq!(prompter.asked.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_credentials_path_with_comma_is_rejected() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("creds,uid=0");
        std::fs::write(&file, "username=alice\npassword=x\n").unwrap();

        let prompter = FixedPrompter::new();
        let err = resolve(RunMode::Automated, &file, &prompter).unwrap_err();

        assert!(matches!(err, BackupError::InvalidCredential(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credential = Credential::Inline {
            username: "alice".to_string(),
            secret: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", credential);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}

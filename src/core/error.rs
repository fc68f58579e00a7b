use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the backup stages.
///
/// Every variant except `CopyToolReportedFailure` and `CleanupFailed` ends the
/// job. Nothing here is retried.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("no credentials file at {} and no terminal to prompt on", path.display())]
    MissingCredentials { path: PathBuf },

    #[error("credentials unusable for mounting: {0}")]
    InvalidCredential(String),

    #[error("mount point {} is unavailable: {source}", path.display())]
    MountPointUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to mount {endpoint} (exit status {}): {detail}", fmt_status(*status))]
    MountFailed {
        endpoint: String,
        status: Option<i32>,
        detail: String,
    },

    #[error("source directory {} does not exist", path.display())]
    SourceMissing { path: PathBuf },

    #[error("cannot create destination {}: {source}", path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("copy tool could not be run: {0}")]
    CopyToolUnavailable(String),

    #[error("copy tool exited with status {status}")]
    CopyToolReportedFailure { status: i32 },

    #[error("cleanup of {} failed: {reason}", path.display())]
    CleanupFailed { path: PathBuf, reason: String },

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("interrupted by signal")]
    Interrupted,
}

impl BackupError {
    /// Operator hint printed next to the error in interactive mode.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingCredentials { .. } => Some(
                "create the credentials file (username=, password=, domain=; mode 600) or run from a terminal",
            ),
            Self::InvalidCredential(_) => {
                Some("usernames and the credentials file path must not contain ','")
            }
            Self::MountPointUnavailable { .. } => {
                Some("check that the mount base directory exists and is writable")
            }
            Self::MountFailed { .. } => Some(
                "check the network connection, the credentials and the share name; mounting usually needs root",
            ),
            Self::SourceMissing { .. } => Some("check the configured source_dir"),
            Self::DestinationUnwritable { .. } => {
                Some("check write permissions on the share and free space")
            }
            Self::CopyToolUnavailable(_) => Some("install rsync or use transfer_engine = \"native\""),
            Self::CopyToolReportedFailure { .. } => {
                Some("some files were not copied; see the log for details")
            }
            Self::CleanupFailed { .. } | Self::Prompt(_) | Self::Interrupted => None,
        }
    }
}

fn fmt_status(status: Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

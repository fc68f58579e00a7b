use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::error::BackupError;
use crate::core::job::RunMode;
use crate::core::prompt::Prompter;
use crate::core::transfer_engine::{TransferEngine, TransferRequest};
use crate::core::tree::{ScanResult, is_empty_dir, scan_directory};

/// Outcome record of one copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupResult {
    pub success: bool,
    /// Files and symlinks found under the destination afterwards
    pub files: u64,
    pub bytes: u64,
    /// Raw exit status of the copy tool
    pub exit_status: i32,
    pub duration_secs: u64,
}

impl BackupResult {
    /// The informational error for a copy tool that reported failure.
    pub fn failure(&self) -> Option<BackupError> {
        (!self.success).then_some(BackupError::CopyToolReportedFailure {
            status: self.exit_status,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Completed(BackupResult),
    /// The operator declined to back up an empty source
    Cancelled,
}

/// Copies the source tree into a destination folder and accounts for it.
pub struct CopyEngine {
    engine: Arc<dyn TransferEngine>,
    prompter: Arc<dyn Prompter>,
    mode: RunMode,
    cancel: CancellationToken,
}

impl CopyEngine {
    pub fn new(
        engine: Arc<dyn TransferEngine>,
        prompter: Arc<dyn Prompter>,
        mode: RunMode,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            prompter,
            mode,
            cancel,
        }
    }

    pub async fn run(
        &self,
        source: &Path,
        dest: &Path,
        progress_visible: bool,
    ) -> Result<CopyOutcome, BackupError> {
        if !source.is_dir() {
            return Err(BackupError::SourceMissing {
                path: source.to_path_buf(),
            });
        }

        let empty = is_empty_dir(source).unwrap_or_else(|e| {
            warn!(error = %e, "Could not inspect source directory");
            false
        });

        if empty {
            if self.mode.is_interactive() {
                if !self.confirm_empty_source(source).await? {
                    info!("Backup of empty source declined");
                    return Ok(CopyOutcome::Cancelled);
                }
            } else {
                warn!(source = %source.display(), "Source directory is empty, continuing");
            }
        }

        std::fs::create_dir_all(dest).map_err(|source| BackupError::DestinationUnwritable {
            path: dest.to_path_buf(),
            source,
        })?;

        let req = TransferRequest {
            source: source.to_path_buf(),
            destination: dest.to_path_buf(),
            show_progress: progress_visible,
            cancel: self.cancel.clone(),
        };

        info!(engine = self.engine.name(), "Copying");
        let output = self
            .engine
            .transfer(&req)
            .await
            .map_err(|e| BackupError::CopyToolUnavailable(format!("{:#}", e)))?;

        let scan = scan_directory(dest).await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not count copied files");
            ScanResult::default()
        });

        let result = BackupResult {
            success: output.exit_status == 0,
            files: scan.file_count(),
            bytes: scan.total_bytes,
            exit_status: output.exit_status,
            duration_secs: output.duration_secs,
        };

        if let Some(failure) = result.failure() {
            warn!(error = %failure, files = result.files, "Copy finished with errors");
        }

        Ok(CopyOutcome::Completed(result))
    }

    async fn confirm_empty_source(&self, source: &Path) -> Result<bool, BackupError> {
        let prompter = self.prompter.clone();
        let question = format!(
            "Source directory {} is empty. Back it up anyway?",
            source.display()
        );

        tokio::task::spawn_blocking(move || prompter.confirm(&question))
            .await
            .map_err(|e| BackupError::Prompt(e.to_string()))?
    }
}

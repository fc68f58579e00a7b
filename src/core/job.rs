use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, NaiveDateTime};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::core::ownership::OwnerIds;

/// Default layout of the per-run destination folder, e.g. `2025_03_04 - 18_05`.
pub const DEFAULT_FOLDER_FORMAT: &str = "%Y_%m_%d - %H_%M";

/// Whether a human is attached to the run.
///
/// Selects the credential prompt, the empty-source confirmation and
/// progress display. Computed once at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Interactive,
    Automated,
}

impl RunMode {
    pub fn detect() -> Self {
        if std::io::stdin().is_terminal() {
            Self::Interactive
        } else {
            Self::Automated
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive)
    }
}

/// Remote share address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub server: String,
    pub share: String,
}

impl RemoteEndpoint {
    /// UNC-style source argument understood by mount.cifs
    pub fn unc(&self) -> String {
        format!(
            "//{}/{}",
            self.server.trim_matches('/'),
            self.share.trim_matches('/')
        )
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unc())
    }
}

/// Configuration snapshot for one run. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub id: Uuid,
    pub source: PathBuf,
    pub endpoint: RemoteEndpoint,
    pub folder: String,
    pub credentials_file: PathBuf,
    pub mode: RunMode,
    pub started_at: DateTime<Local>,
    pub owner: OwnerIds,
    pub extra_mount_options: Vec<String>,
}

impl BackupJob {
    pub fn new(
        config: &AppConfig,
        mode: RunMode,
        started_at: DateTime<Local>,
        owner: OwnerIds,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: config.source_dir.clone(),
            endpoint: RemoteEndpoint {
                server: config.server.clone(),
                share: config.share.clone(),
            },
            folder: folder_name(started_at.naive_local(), &config.folder_format),
            credentials_file: config.credentials_file.clone(),
            mode,
            started_at,
            owner,
            extra_mount_options: config.extra_mount_options.clone(),
        }
    }
}

/// Render the destination folder name for a start time.
///
/// The format must already have passed [`validate_folder_format`].
pub fn folder_name(at: NaiveDateTime, format: &str) -> String {
    at.format(format).to_string()
}

/// Check a strftime pattern for use as a single path component.
pub fn validate_folder_format(format: &str) -> Result<(), String> {
    if format.trim().is_empty() {
        return Err("folder_format must not be empty".to_string());
    }
    if format.contains('/') {
        return Err(format!("folder_format '{}' must not contain '/'", format));
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(format!("folder_format '{}' is not a valid strftime pattern", format));
    }
    Ok(())
}

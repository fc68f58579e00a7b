use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::core::job::{DEFAULT_FOLDER_FORMAT, validate_folder_format};
use crate::core::transfer_engine::TransferEngineType;

/// Prefix for environment overrides, e.g. `SMBBK_SERVER=nas.local`.
const ENV_PREFIX: &str = "SMBBK_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Local directory whose contents are backed up
    pub source_dir: PathBuf,
    /// SMB server host name or address
    pub server: String,
    /// Share name on the server
    pub share: String,
    /// mount.cifs credentials file (username=, password=, domain=)
    pub credentials_file: PathBuf,
    /// Where the per-process mount point directory is created
    pub mount_base: PathBuf,
    /// strftime pattern for the per-run destination folder
    pub folder_format: String,
    pub transfer_engine: TransferEngineType,
    /// Extra `-o` options for mount.cifs, e.g. `vers=3.0`
    pub extra_mount_options: Vec<String>,
    /// Append-only log used by automated runs
    pub log_file: PathBuf,
    pub verbose: bool,
    pub json_logs: bool,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannelType {
    None,
    #[default]
    Desktop,
    Slack,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub channel: NotificationChannelType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_webhook: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        let state_dir = dirs::state_dir().unwrap_or_else(|| home.join(".local/state"));

        Self {
            source_dir: home.join("Documents"),
            server: String::new(),
            share: String::new(),
            credentials_file: home.join(".smbcredentials"),
            mount_base: std::env::temp_dir(),
            folder_format: DEFAULT_FOLDER_FORMAT.to_string(),
            transfer_engine: TransferEngineType::default(),
            extra_mount_options: Vec::new(),
            log_file: state_dir.join("smbbk").join("backup.log"),
            verbose: false,
            json_logs: false,
            notifications: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("smbbk").join("config.toml"))
    }

    /// Load and validate a configuration a backup can run with.
    pub fn new<T: Serialize>(config_path: Option<&Path>, cli_overrides: Option<&T>) -> Result<Self> {
        let config = Self::load(config_path, cli_overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Layered load: defaults, config file, `SMBBK_*` env, then CLI overrides.
    /// Not validated, so an incomplete setup can still be inspected.
    pub fn load<T: Serialize>(config_path: Option<&Path>, cli_overrides: Option<&T>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        match config_path {
            Some(path) => {
                if !path.is_file() {
                    bail!("Config file {} does not exist", path.display());
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(path) = Self::default_path() {
                    figment = figment.merge(Toml::file(path));
                }
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(overrides) = cli_overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        figment.extract().context("Failed to load configuration")
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            bail!("No server configured (set `server` in the config file, SMBBK_SERVER or --server)");
        }
        if self.share.trim().is_empty() {
            bail!("No share configured (set `share` in the config file, SMBBK_SHARE or --share)");
        }
        validate_folder_format(&self.folder_format).map_err(anyhow::Error::msg)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

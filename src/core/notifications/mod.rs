mod desktop;
mod slack;

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{NotificationChannelType, NotificationConfig};

pub use desktop::DesktopNotifier;
pub use slack::SlackNotifier;

/// Events that trigger notifications
#[derive(Debug, Clone)]
pub enum JobEvent {
    Started {
        job_id: String,
        source: PathBuf,
        endpoint: String,
        folder: String,
    },
    Completed {
        job_id: String,
        endpoint: String,
        folder: String,
        files: u64,
        total_bytes: u64,
        duration_secs: u64,
        /// Non-zero when the copy tool reported errors
        exit_status: i32,
    },
    Failed {
        job_id: String,
        endpoint: String,
        error: String,
    },
}

impl JobEvent {
    /// One-line title and a short body, for channels without rich formatting.
    pub fn summary(&self) -> (String, String) {
        match self {
            JobEvent::Started {
                source,
                endpoint,
                folder,
                ..
            } => (
                "Backup started".to_string(),
                format!("{} → {}/{}", source.display(), endpoint, folder),
            ),
            JobEvent::Completed {
                endpoint,
                folder,
                files,
                total_bytes,
                duration_secs,
                exit_status,
                ..
            } => {
                let title = if *exit_status == 0 {
                    "Backup complete".to_string()
                } else {
                    format!("Backup completed with errors (status {})", exit_status)
                };
                (
                    title,
                    format!(
                        "{} files, {} in {}s → {}/{}",
                        files,
                        human_size(*total_bytes),
                        duration_secs,
                        endpoint,
                        folder
                    ),
                )
            }
            JobEvent::Failed {
                endpoint, error, ..
            } => ("Backup failed".to_string(), format!("{}: {}", endpoint, error)),
        }
    }

    pub fn is_failure(&self) -> bool {
        match self {
            JobEvent::Failed { .. } => true,
            JobEvent::Completed { exit_status, .. } => *exit_status != 0,
            JobEvent::Started { .. } => false,
        }
    }
}

/// Trait for notification channel implementations (desktop, Slack, etc.)
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, event: JobEvent) -> Result<()>;
}

/// Factory function to create a notifier based on config
pub fn create_notifier(config: &NotificationConfig) -> Option<Arc<dyn NotificationChannel>> {
    match &config.channel {
        NotificationChannelType::None => None,
        NotificationChannelType::Desktop => Some(Arc::new(DesktopNotifier::default())),
        NotificationChannelType::Slack => {
            let webhook = config.slack_webhook.as_ref()?;
            if webhook.is_empty() {
                return None;
            }
            Some(Arc::new(SlackNotifier::new(webhook.clone())))
        }
    }
}

pub(crate) fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(5 * 1024 * 1024 * 1024), "5.0 GiB");
    }

    #[test]
    fn test_completed_with_errors_is_a_failure() {
        let event = JobEvent::Completed {
            job_id: "0192".to_string(),
            endpoint: "//nas/backup".to_string(),
            folder: "2025_03_04 - 18_05".to_string(),
            files: 3,
            total_bytes: 10,
            duration_secs: 1,
            exit_status: 23,
        };
        assert!(event.is_failure());
        let (title, body) = event.summary();
        assert!(title.contains("23"));
        assert!(body.contains("3 files"));
        assert!(body.contains("//nas/backup/2025_03_04 - 18_05"));
    }

    #[test]
    fn test_no_notifier_without_webhook() {
        let config = NotificationConfig {
            channel: NotificationChannelType::Slack,
            slack_webhook: None,
        };
        assert!(create_notifier(&config).is_none());

        let config = NotificationConfig {
            channel: NotificationChannelType::None,
            slack_webhook: Some("https://hooks.slack.com/x".to_string()),
        };
        assert!(create_notifier(&config).is_none());
    }
}

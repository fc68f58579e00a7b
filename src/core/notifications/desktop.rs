use super::{JobEvent, NotificationChannel};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Sends freedesktop notifications through `notify-send`.
pub struct DesktopNotifier {
    program: String,
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self {
            program: "notify-send".to_string(),
        }
    }
}

impl DesktopNotifier {
    fn command(&self, event: &JobEvent) -> Command {
        let (title, body) = event.summary();
        let urgency = if event.is_failure() { "critical" } else { "normal" };

        let mut cmd = Command::new(&self.program);
        cmd.args(["--app-name", "smbbk", "--urgency", urgency])
            .arg(title)
            .arg(body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl NotificationChannel for DesktopNotifier {
    async fn notify(&self, event: JobEvent) -> Result<()> {
        let status = self.command(&event).status().await?;
        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        Ok(())
    }
}

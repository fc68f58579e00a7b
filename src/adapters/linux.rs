use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::mount::{MntFlags, umount2};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::core::mount::{MountFailure, MountRequest, Mounter, UnmountOutcome};

/// Mounts SMB shares with `mount -t cifs`.
pub struct CifsMounter {
    mount_program: String,
    umount_program: String,
}

impl Default for CifsMounter {
    fn default() -> Self {
        Self {
            mount_program: "mount".to_string(),
            umount_program: "umount".to_string(),
        }
    }
}

impl CifsMounter {
    fn command(&self, request: &MountRequest) -> Command {
        let mut cmd = Command::new(&self.mount_program);
        cmd.args(["-t", "cifs"])
            .arg(request.endpoint.unc())
            .arg(&request.mount_point)
            .arg("-o")
            .arg(request.options_arg())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // mount.cifs reads the secret from PASSWD so it never shows in ps
        if let Some(secret) = &request.secret {
            cmd.env("PASSWD", secret);
        }

        cmd
    }

    /// Fallback for user mounts: the setuid umount binary handles `user` fstab entries.
    fn unmount_with_program(&self, mount_point: &Path) -> anyhow::Result<UnmountOutcome> {
        let output = std::process::Command::new(&self.umount_program)
            .arg(mount_point)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {}", self.umount_program))?;

        if output.status.success() {
            return Ok(UnmountOutcome::Unmounted);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("not mounted") {
            return Ok(UnmountOutcome::NotMounted);
        }

        Err(anyhow!(
            "{} exited with {}: {}",
            self.umount_program,
            output.status,
            stderr.trim()
        ))
    }
}

#[async_trait]
impl Mounter for CifsMounter {
    async fn mount(&self, request: &MountRequest) -> Result<(), MountFailure> {
        debug!(request = ?request, "Running mount.cifs");

        let output = self.command(request).output().await.map_err(|e| MountFailure {
            status: None,
            detail: format!("failed to run {}: {}", self.mount_program, e),
        })?;

        if output.status.success() {
            return Ok(());
        }

        Err(MountFailure {
            status: output.status.code(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    fn unmount(&self, mount_point: &Path) -> anyhow::Result<UnmountOutcome> {
        match umount2(mount_point, MntFlags::empty()) {
            Ok(()) => Ok(UnmountOutcome::Unmounted),
            Err(Errno::EINVAL) | Err(Errno::ENOENT) => Ok(UnmountOutcome::NotMounted),
            Err(Errno::EBUSY) => {
                warn!(mount_point = %mount_point.display(), "Share busy, detaching lazily");
                umount2(mount_point, MntFlags::MNT_DETACH)
                    .map(|_| UnmountOutcome::Unmounted)
                    .map_err(|e| anyhow!("lazy unmount of {} failed: {}", mount_point.display(), e))
            }
            Err(Errno::EPERM) => self.unmount_with_program(mount_point),
            Err(e) => Err(anyhow!("unmount of {} failed: {}", mount_point.display(), e)),
        }
    }
}

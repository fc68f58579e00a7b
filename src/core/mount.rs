//! Scoped attachment of the remote share to a private mount point.
//!
//! [`ShareMount::acquire`] hands out a [`MountHandle`] that owns both the
//! mount-point directory and the mount itself. The handle is released exactly
//! once: either explicitly through [`MountHandle::release`] or, failing that,
//! when it is dropped (early return, panic, or a cancelled future).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::core::credentials::Credential;
use crate::core::error::BackupError;
use crate::core::job::{BackupJob, RemoteEndpoint};

/// Why the mount tool refused to attach the share.
#[derive(Debug, Clone)]
pub struct MountFailure {
    /// Exit status of the mount tool, if it ran to completion
    pub status: Option<i32>,
    pub detail: String,
}

/// Result of a detach attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountOutcome {
    Unmounted,
    /// Nothing was attached at the mount point
    NotMounted,
}

/// Everything a mounter needs to attach one share.
#[derive(Clone)]
pub struct MountRequest {
    pub endpoint: RemoteEndpoint,
    pub mount_point: PathBuf,
    /// Comma-joined into `-o`; never carries a secret
    pub options: Vec<String>,
    /// Inline secret, handed to the tool out of band
    pub secret: Option<String>,
}

impl MountRequest {
    pub fn new(job: &BackupJob, credential: &Credential, mount_point: PathBuf) -> Self {
        let (mut options, secret) = match credential {
            Credential::File(path) => (vec![format!("credentials={}", path.display())], None),
            Credential::Inline { username, secret } => {
                (vec![format!("username={}", username)], Some(secret.clone()))
            }
        };

        options.push(job.owner.as_mount_options());
        options.extend(
            job.extra_mount_options
                .iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty()),
        );

        Self {
            endpoint: job.endpoint.clone(),
            mount_point,
            options,
            secret,
        }
    }

    pub fn options_arg(&self) -> String {
        self.options.join(",")
    }
}

impl fmt::Debug for MountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountRequest")
            .field("endpoint", &self.endpoint)
            .field("mount_point", &self.mount_point)
            .field("options", &self.options)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Capability to attach and detach a network share.
#[async_trait]
pub trait Mounter: Send + Sync {
    async fn mount(&self, request: &MountRequest) -> Result<(), MountFailure>;

    /// Detach whatever is mounted at `mount_point`.
    /// NOTE: This is blocking; it also runs from `Drop`.
    fn unmount(&self, mount_point: &Path) -> anyhow::Result<UnmountOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MountState {
    Unmounted,
    /// The mount tool was started but has not reported back
    Pending,
    Mounted,
}

/// Creates mount points and mounts shares onto them.
pub struct ShareMount {
    mounter: Arc<dyn Mounter>,
    base: PathBuf,
}

impl ShareMount {
    pub fn new(mounter: Arc<dyn Mounter>, base: impl Into<PathBuf>) -> Self {
        Self {
            mounter,
            base: base.into(),
        }
    }

    /// Mount point for this process. The PID keeps concurrent runs apart.
    pub fn mount_point(&self) -> PathBuf {
        self.base.join(format!("smbbk-{}", std::process::id()))
    }

    pub async fn acquire(
        &self,
        job: &BackupJob,
        credential: &Credential,
    ) -> Result<MountHandle, BackupError> {
        let mount_point = self.mount_point();

        std::fs::create_dir(&mount_point).map_err(|source| {
            BackupError::MountPointUnavailable {
                path: mount_point.clone(),
                source,
            }
        })?;

        // From here on the directory belongs to the handle
        let mut handle = MountHandle {
            mounter: self.mounter.clone(),
            mount_point: mount_point.clone(),
            endpoint: job.endpoint.clone(),
            state: MountState::Pending,
            released: false,
        };

        let request = MountRequest::new(job, credential, mount_point);
        info!(
            endpoint = %job.endpoint,
            mount_point = %request.mount_point.display(),
            credentials = if credential.is_file() { "file" } else { "inline" },
            "Mounting share"
        );

        match self.mounter.mount(&request).await {
            Ok(()) => {
                handle.state = MountState::Mounted;
                info!(endpoint = %job.endpoint, "Share mounted");
                Ok(handle)
            }
            Err(failure) => {
                handle.state = MountState::Unmounted;
                if let Err(e) = handle.release() {
                    warn!(error = %e, "Cleanup after failed mount did not complete");
                }
                Err(BackupError::MountFailed {
                    endpoint: job.endpoint.to_string(),
                    status: failure.status,
                    detail: failure.detail,
                })
            }
        }
    }
}

/// An acquired mount point. Released once, on every exit path.
pub struct MountHandle {
    mounter: Arc<dyn Mounter>,
    mount_point: PathBuf,
    endpoint: RemoteEndpoint,
    state: MountState,
    released: bool,
}

impl MountHandle {
    pub fn path(&self) -> &Path {
        &self.mount_point
    }

    pub fn is_mounted(&self) -> bool {
        self.state == MountState::Mounted
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Unmount and remove the mount point.
    ///
    /// Idempotent: only the first call does any work. Failures are reported
    /// as `CleanupFailed` for logging; they are never a job verdict.
    pub fn release(&mut self) -> Result<(), BackupError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut problems = Vec::new();

        if self.state != MountState::Unmounted {
            match self.mounter.unmount(&self.mount_point) {
                Ok(UnmountOutcome::Unmounted) => {
                    info!(endpoint = %self.endpoint, "Share unmounted");
                }
                Ok(UnmountOutcome::NotMounted) => {
                    debug!(mount_point = %self.mount_point.display(), "Nothing mounted, skipping unmount");
                }
                Err(e) => problems.push(format!("unmount: {:#}", e)),
            }
            self.state = MountState::Unmounted;
        }

        match std::fs::remove_dir(&self.mount_point) {
            Ok(()) => debug!(mount_point = %self.mount_point.display(), "Removed mount point"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => problems.push(format!("remove mount point: {}", e)),
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(BackupError::CleanupFailed {
                path: self.mount_point.clone(),
                reason: problems.join("; "),
            })
        }
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(mount_point = %self.mount_point.display(), "Mount handle dropped without release, cleaning up");
        if let Err(e) = self.release() {
            error!(error = %e, "Cleanup failed");
        }
    }
}

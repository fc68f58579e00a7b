use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use tracing::info;

use crate::core::mount::{MountFailure, MountRequest, Mounter, UnmountOutcome};

/// A pretend share backed by a local directory.
///
/// While "mounted" the mount point is an ordinary empty directory. On unmount
/// whatever was written there is moved into `remote_root`, which is how the
/// contents land on the share.
pub struct SimulatedMounter {
    remote_root: PathBuf,
    /// Exit status to fail every mount with
    fail_with: Option<i32>,
    mounted: Mutex<HashSet<PathBuf>>,
    mount_calls: AtomicUsize,
    unmount_calls: AtomicUsize,
}

impl SimulatedMounter {
    pub fn new(remote_root: impl Into<PathBuf>) -> Self {
        Self {
            remote_root: remote_root.into(),
            fail_with: None,
            mounted: Mutex::new(HashSet::new()),
            mount_calls: AtomicUsize::new(0),
            unmount_calls: AtomicUsize::new(0),
        }
    }

    /// A mounter whose every mount fails with `status`.
    pub fn failing(remote_root: impl Into<PathBuf>, status: i32) -> Self {
        Self {
            fail_with: Some(status),
            ..Self::new(remote_root)
        }
    }

    pub fn remote_root(&self) -> &Path {
        &self.remote_root
    }

    pub fn mount_calls(&self) -> usize {
        self.mount_calls.load(Ordering::SeqCst)
    }

    pub fn unmount_calls(&self) -> usize {
        self.unmount_calls.load(Ordering::SeqCst)
    }

    pub fn is_mounted(&self, mount_point: &Path) -> bool {
        self.lock_mounted().contains(mount_point)
    }

    fn lock_mounted(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.mounted.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move everything under the mount point onto the share. Entries that
    /// cannot land are dropped so the mount point is always left empty, the
    /// way a real unmount leaves it.
    fn flush_to_remote(&self, mount_point: &Path) -> anyhow::Result<()> {
        let mut rejected = Vec::new();

        for entry in fs::read_dir(mount_point)
            .with_context(|| format!("Failed to read {}", mount_point.display()))?
        {
            let entry = entry?;
            let target = self.remote_root.join(entry.file_name());
            let moved = if target.exists() {
                Err(anyhow!("{} already exists on the share", target.display()))
            } else {
                fs::rename(entry.path(), &target).with_context(|| {
                    format!("Failed to move {} to the share", entry.path().display())
                })
            };

            if let Err(e) = moved {
                discard(&entry.path())?;
                rejected.push(format!("{:#}", e));
            }
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(rejected.join("; ")))
        }
    }
}

fn discard(path: &Path) -> anyhow::Result<()> {
    let result = if path.symlink_metadata()?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.with_context(|| format!("Failed to clear {}", path.display()))
}

#[async_trait]
impl Mounter for SimulatedMounter {
    async fn mount(&self, request: &MountRequest) -> Result<(), MountFailure> {
        self.mount_calls.fetch_add(1, Ordering::SeqCst);
        info!(endpoint = %request.endpoint, "(Simulated) Mounting share");

        if let Some(status) = self.fail_with {
            return Err(MountFailure {
                status: Some(status),
                detail: "mount error(112): Host is down".to_string(),
            });
        }

        if !self.remote_root.is_dir() {
            return Err(MountFailure {
                status: Some(32),
                detail: format!("share directory {} not found", self.remote_root.display()),
            });
        }

        self.lock_mounted().insert(request.mount_point.clone());
        Ok(())
    }

    fn unmount(&self, mount_point: &Path) -> anyhow::Result<UnmountOutcome> {
        self.unmount_calls.fetch_add(1, Ordering::SeqCst);

        if !self.lock_mounted().remove(mount_point) {
            return Ok(UnmountOutcome::NotMounted);
        }

        self.flush_to_remote(mount_point)?;
        info!(mount_point = %mount_point.display(), "(Simulated) Unmounted share");
        Ok(UnmountOutcome::Unmounted)
    }
}

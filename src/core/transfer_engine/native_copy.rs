use crate::core::transfer_engine::{
    STATUS_INTERRUPTED, STATUS_PARTIAL_TRANSFER, TransferEngine, TransferOutput, TransferRequest,
};
use crate::core::tree::{FileInfo, scan_directory_blocking};
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::future::Future;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::pin::Pin;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Buffer size for file I/O operations (128KB for optimal throughput)
const BUFFER_SIZE: usize = 128 * 1024;

/// In-process copy engine for hosts without rsync.
///
/// Mirrors what `rsync -a` does for a fresh destination:
/// - Recreates the directory structure with source permissions
/// - Copies file contents, permissions and timestamps
/// - Recreates symbolic links without following them
///
/// Per-file failures do not stop the copy; they turn the exit status into
/// [`STATUS_PARTIAL_TRANSFER`].
pub struct NativeCopyEngine {
    /// Whether to fsync each file after writing (safer but slower)
    pub sync_files: bool,
}

impl Default for NativeCopyEngine {
    fn default() -> Self {
        Self { sync_files: true }
    }
}

impl TransferEngine for NativeCopyEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    fn transfer(
        &self,
        req: &TransferRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransferOutput>> + Send>> {
        let req = req.clone();
        let sync_files = self.sync_files;

        let span = info_span!(
            "native_copy_transfer",
            source = %req.source.display(),
            destination = %req.destination.display()
        );

        Box::pin(
            async move {
                info!("Starting native copy transfer");
                let start_time = Instant::now();

                let exit_status = tokio::task::spawn_blocking(move || {
                    copy_tree(&req.source, &req.destination, sync_files, &req.cancel)
                })
                .await??;

                let duration_secs = start_time.elapsed().as_secs();
                info!(exit_status, duration_secs, "Native copy transfer finished");

                Ok(TransferOutput {
                    exit_status,
                    duration_secs,
                })
            }
            .instrument(span),
        )
    }
}

/// Copy the contents of `source` into the existing `destination`.
fn copy_tree(
    source: &Path,
    destination: &Path,
    sync_files: bool,
    cancel: &CancellationToken,
) -> Result<i32> {
    let scan = scan_directory_blocking(source).context("Failed to scan source directory")?;

    info!(
        total_files = scan.files.len(),
        total_bytes = scan.total_bytes,
        total_dirs = scan.directories.len(),
        "Scan complete"
    );

    let mut failures: usize = scan.unreadable_dirs;

    for dir_path in &scan.directories {
        let dest_dir = destination.join(dir_path.strip_prefix(source)?);
        if let Err(e) = fs::create_dir_all(&dest_dir) {
            error!(path = %dest_dir.display(), error = %e, "Failed to create directory");
            failures += 1;
        }
    }

    for file_info in &scan.files {
        if cancel.is_cancelled() {
            warn!("Copy cancelled");
            return Ok(STATUS_INTERRUPTED);
        }

        let relative = file_info.path.strip_prefix(source)?;
        let dest_path = destination.join(relative);

        debug!(file = %relative.display(), size = file_info.size, "Copying file");

        if let Err(e) = copy_single_file(file_info, &dest_path, sync_files) {
            error!(file = %relative.display(), error = %format!("{:#}", e), "Failed to copy file");
            failures += 1;
        }
    }

    for link in &scan.symlinks {
        let dest_link = destination.join(link.strip_prefix(source)?);
        if let Err(e) = copy_symlink(link, &dest_link) {
            error!(link = %dest_link.display(), error = %format!("{:#}", e), "Failed to copy symlink");
            failures += 1;
        }
    }

    // Directory metadata last: a read-only source dir must not block its
    // children, and creating entries bumps mtimes
    for dir_path in scan.directories.iter().rev() {
        let dest_dir = destination.join(dir_path.strip_prefix(source)?);
        let permissions = fs::metadata(dir_path).map(|m| m.permissions());
        if let Err(e) = permissions.and_then(|p| fs::set_permissions(&dest_dir, p)) {
            debug!(path = %dest_dir.display(), error = %e, "Failed to set directory permissions");
        }
        if let Err(e) = preserve_timestamps(dir_path, &dest_dir) {
            debug!(path = %dest_dir.display(), error = %e, "Failed to preserve directory timestamps");
        }
    }

    if failures > 0 {
        warn!(failures, "Copy finished with errors");
        Ok(STATUS_PARTIAL_TRANSFER)
    } else {
        Ok(0)
    }
}

/// Copy a single file with metadata preservation
fn copy_single_file(file_info: &FileInfo, dest: &Path, sync_file: bool) -> Result<u64> {
    let source = &file_info.path;
    let source_metadata = fs::metadata(source).context("Failed to read source metadata")?;

    let source_file = File::open(source).context("Failed to open source file")?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, source_file);

    let dest_file = File::create(dest).context("Failed to create destination file")?;
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, dest_file);

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_written: u64 = 0;

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .context("Failed to read from source")?;

        if bytes_read == 0 {
            break;
        }

        writer
            .write_all(&buffer[..bytes_read])
            .context("Failed to write to destination")?;

        bytes_written += bytes_read as u64;
    }

    writer.flush().context("Failed to flush destination file")?;

    if sync_file {
        let inner = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to get inner file handle: {}", e.error()))?;
        inner.sync_all().context("Failed to sync file")?;
    }

    // Permission and timestamp errors are common on SMB shares; not fatal
    if let Err(e) = fs::set_permissions(dest, source_metadata.permissions()) {
        debug!(dest = %dest.display(), error = %e, "Failed to set file permissions");
    }

    if let Err(e) = preserve_timestamps(source, dest) {
        debug!(dest = %dest.display(), error = %e, "Failed to preserve file timestamps");
    }

    Ok(bytes_written)
}

fn copy_symlink(link: &Path, dest: &Path) -> Result<()> {
    let target = fs::read_link(link).context("Failed to read symlink")?;
    std::os::unix::fs::symlink(&target, dest).context("Failed to create symlink")?;

    let metadata = fs::symlink_metadata(link)?;
    let atime = filetime::FileTime::from_last_access_time(&metadata);
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    if let Err(e) = filetime::set_symlink_file_times(dest, atime, mtime) {
        debug!(dest = %dest.display(), error = %e, "Failed to preserve symlink timestamps");
    }
    Ok(())
}

/// Preserve access and modification timestamps from source to destination
fn preserve_timestamps(source: &Path, dest: &Path) -> Result<()> {
    let source_metadata = fs::metadata(source)?;

    let atime = filetime::FileTime::from_last_access_time(&source_metadata);
    let mtime = filetime::FileTime::from_last_modification_time(&source_metadata);

    filetime::set_file_times(dest, atime, mtime)?;
    Ok(())
}

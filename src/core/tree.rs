use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing::warn;

/// Result of walking a directory tree
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Regular files found
    pub files: Vec<FileInfo>,
    /// Directories found, parents before children
    pub directories: Vec<PathBuf>,
    /// Symbolic links found (not followed)
    pub symlinks: Vec<PathBuf>,
    /// Total size of all regular files in bytes
    pub total_bytes: u64,
    /// Subdirectories that could not be listed; their contents are missing
    pub unreadable_dirs: usize,
}

impl ScanResult {
    /// Entries that count as copied files: regular files and symlinks
    pub fn file_count(&self) -> u64 {
        (self.files.len() + self.symlinks.len()) as u64
    }
}

/// Information about a file to copy
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size: u64,
}

/// Scan a directory recursively on a blocking thread.
pub async fn scan_directory(root: &Path) -> Result<ScanResult> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || scan_directory_blocking(&root)).await?
}

/// Walk `root`. Only a failure to list `root` itself is an error; unreadable
/// subdirectories are logged and counted in [`ScanResult::unreadable_dirs`].
pub fn scan_directory_blocking(root: &Path) -> Result<ScanResult> {
    let mut result = ScanResult::default();
    scan_directory_recursive(root, &mut result)?;
    Ok(result)
}

/// Whether a directory has no entries at all.
pub fn is_empty_dir(path: &Path) -> Result<bool> {
    let mut entries = fs::read_dir(path)
        .map_err(|e| anyhow!("Failed to read directory {}: {}", path.display(), e))?;
    Ok(entries.next().is_none())
}

fn scan_directory_recursive(current: &Path, result: &mut ScanResult) -> Result<()> {
    let entries = fs::read_dir(current)
        .map_err(|e| anyhow!("Failed to read directory {}: {}", current.display(), e))?;

    for entry in entries {
        let entry = entry.map_err(|e| anyhow!("Failed to read directory entry: {}", e))?;
        let path = entry.path();

        let metadata = match path.symlink_metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        let file_type = metadata.file_type();
        if file_type.is_dir() {
            result.directories.push(path.clone());
            if let Err(e) = scan_directory_recursive(&path, result) {
                warn!(path = %path.display(), error = %e, "Skipping unreadable directory");
                result.unreadable_dirs += 1;
            }
        } else if file_type.is_symlink() {
            result.symlinks.push(path);
        } else if file_type.is_file() {
            result.total_bytes += metadata.len();
            result.files.push(FileInfo {
                path,
                size: metadata.len(),
            });
        }
        // Sockets, fifos and device nodes are not backed up
    }

    Ok(())
}

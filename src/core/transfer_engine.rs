mod native_copy;
mod rsync;
mod simulated;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use native_copy::NativeCopyEngine;
pub use rsync::RsyncEngine;
pub use simulated::SimulatedEngine;

/// Exit status used when some files could not be copied (rsync's code 23).
pub const STATUS_PARTIAL_TRANSFER: i32 = 23;

/// Exit status used when a copy stopped on cancellation (rsync's code 20).
pub const STATUS_INTERRUPTED: i32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TransferEngineType {
    #[default]
    Rsync,
    Native,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Directory whose contents are copied
    pub source: PathBuf,
    /// Existing directory that receives the contents
    pub destination: PathBuf,
    /// Show the tool's own progress display on the terminal
    pub show_progress: bool,
    pub cancel: CancellationToken,
}

/// What the copy tool reported once it finished.
#[derive(Debug, Clone)]
pub struct TransferOutput {
    /// Raw exit status; non-zero means some or all files were not copied
    pub exit_status: i32,
    pub duration_secs: u64,
}

/// Capability to copy a directory tree, preserving permissions, timestamps
/// and symbolic links.
///
/// An `Err` means the tool could not be run at all. A tool that ran and
/// failed returns `Ok` with a non-zero `exit_status`.
pub trait TransferEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn transfer(
        &self,
        req: &TransferRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransferOutput>> + Send>>;
}

pub fn create_engine(engine_type: TransferEngineType) -> Arc<dyn TransferEngine> {
    match engine_type {
        TransferEngineType::Rsync => Arc::new(RsyncEngine::default()),
        TransferEngineType::Native => Arc::new(NativeCopyEngine::default()),
    }
}

use crate::core::transfer_engine::{
    STATUS_INTERRUPTED, TransferEngine, TransferOutput, TransferRequest,
};
use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tokio::time::{Duration, sleep};
use tracing::info;

/// Engine that copies nothing and reports a fixed exit status.
///
/// Used for `--simulation` runs and to inject copy failures in tests.
pub struct SimulatedEngine {
    pub exit_status: i32,
    /// How long the pretend copy takes
    pub delay: Duration,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self {
            exit_status: 0,
            delay: Duration::from_millis(500),
        }
    }
}

impl TransferEngine for SimulatedEngine {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn transfer(
        &self,
        req: &TransferRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransferOutput>> + Send>> {
        let req = req.clone();
        let exit_status = self.exit_status;
        let delay = self.delay;

        Box::pin(async move {
            let start_time = Instant::now();
            info!(
                source = %req.source.display(),
                destination = %req.destination.display(),
                "(Simulated) Transferring"
            );

            let exit_status = tokio::select! {
                _ = sleep(delay) => exit_status,
                _ = req.cancel.cancelled() => STATUS_INTERRUPTED,
            };

            Ok(TransferOutput {
                exit_status,
                duration_secs: start_time.elapsed().as_secs(),
            })
        })
    }
}

//! Turns SIGINT/SIGTERM into cancellation of the running job.

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Spawn a task that cancels `token` on the first interrupt or terminate signal.
///
/// Installing the handlers replaces the default "die immediately" behavior,
/// so the job gets to release its mount before the process exits.
pub fn listen(token: CancellationToken) {
    tokio::spawn(async move {
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Failed to install SIGINT handler");
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = interrupt.recv() => warn!("Received SIGINT, aborting backup"),
            _ = terminate.recv() => warn!("Received SIGTERM, aborting backup"),
            _ = token.cancelled() => return,
        }

        token.cancel();
    });
}

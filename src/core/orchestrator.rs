use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::context::AppContext;
use crate::core::copy::{BackupResult, CopyEngine, CopyOutcome};
use crate::core::credentials::{self, Credential};
use crate::core::error::BackupError;
use crate::core::job::BackupJob;
use crate::core::mount::{Mounter, ShareMount};
use crate::core::notifications::{JobEvent, NotificationChannel};
use crate::core::prompt::Prompter;
use crate::core::transfer_engine::TransferEngine;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of one backup job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Init,
    CredentialResolved,
    Mounted,
    Copying,
    Succeeded,
    FailedCopy,
    Released,
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Final classification of a run.
#[derive(Debug)]
pub enum Verdict {
    Succeeded(BackupResult),
    /// The copy tool reported errors; the partial copy stays on the share
    CopyFailed(BackupResult),
    /// The operator declined to back up an empty source
    Cancelled,
    Failed(BackupError),
}

impl Verdict {
    /// Process exit code. A copy that ran with errors is reported, not fatal.
    pub fn exit_code(&self) -> u8 {
        match self {
            Verdict::Succeeded(_) | Verdict::CopyFailed(_) | Verdict::Cancelled => 0,
            Verdict::Failed(_) => 1,
        }
    }

    pub fn result(&self) -> Option<&BackupResult> {
        match self {
            Verdict::Succeeded(r) | Verdict::CopyFailed(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct JobReport {
    pub job: BackupJob,
    /// Every state the job passed through, in order
    pub states: Vec<JobState>,
    pub verdict: Verdict,
}

impl JobReport {
    pub fn exit_code(&self) -> u8 {
        self.verdict.exit_code()
    }
}

/// Drives one job: credentials, mount, copy, release.
pub struct Orchestrator {
    ctx: AppContext,
    mounter: Arc<dyn Mounter>,
    engine: Arc<dyn TransferEngine>,
    prompter: Arc<dyn Prompter>,
    notifier: Option<Arc<dyn NotificationChannel>>,
}

impl Orchestrator {
    pub fn new(
        ctx: AppContext,
        mounter: Arc<dyn Mounter>,
        engine: Arc<dyn TransferEngine>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            ctx,
            mounter,
            engine,
            prompter,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Option<Arc<dyn NotificationChannel>>) -> Self {
        self.notifier = notifier;
        self
    }

    pub async fn run(&self, job: BackupJob) -> JobReport {
        let mut states = vec![JobState::Init];
        let job_id = job.id.to_string();

        info!(
            job_id = %job_id,
            source = %job.source.display(),
            endpoint = %job.endpoint,
            folder = %job.folder,
            mode = ?job.mode,
            "Backup starting"
        );

        self.notify(
            &job,
            JobEvent::Started {
                job_id: job_id.clone(),
                source: job.source.clone(),
                endpoint: job.endpoint.to_string(),
                folder: job.folder.clone(),
            },
        )
        .await;

        let verdict = self.execute(&job, &mut states).await;

        let event = match &verdict {
            Verdict::Succeeded(result) | Verdict::CopyFailed(result) => {
                info!(
                    job_id = %job_id,
                    files = result.files,
                    bytes = result.bytes,
                    exit_status = result.exit_status,
                    duration_secs = result.duration_secs,
                    "Backup finished"
                );
                Some(JobEvent::Completed {
                    job_id: job_id.clone(),
                    endpoint: job.endpoint.to_string(),
                    folder: job.folder.clone(),
                    files: result.files,
                    total_bytes: result.bytes,
                    duration_secs: result.duration_secs,
                    exit_status: result.exit_status,
                })
            }
            Verdict::Cancelled => {
                info!(job_id = %job_id, "Backup cancelled by user");
                None
            }
            Verdict::Failed(e) => {
                error!(job_id = %job_id, error = %e, "Backup failed");
                Some(JobEvent::Failed {
                    job_id: job_id.clone(),
                    endpoint: job.endpoint.to_string(),
                    error: e.to_string(),
                })
            }
        };

        if let Some(event) = event {
            let sent = self.notify(&job, event);
            if self.ctx.cancel.is_cancelled() {
                // Already interrupted: the report still goes out, bounded by the timeout
                sent.await;
            } else {
                tokio::select! {
                    _ = sent => {}
                    _ = self.ctx.cancel.cancelled() => warn!("Final notification abandoned on signal"),
                }
            }
        }
        let verdict = self.interrupted_late(verdict);

        advance(&mut states, JobState::Done);

        JobReport {
            job,
            states,
            verdict,
        }
    }

    async fn execute(&self, job: &BackupJob, states: &mut Vec<JobState>) -> Verdict {
        let cancel = self.ctx.cancel.clone();

        let credential = tokio::select! {
            r = self.resolve_credential(job) => r,
            _ = cancel.cancelled() => Err(BackupError::Interrupted),
        };
        let credential = match credential {
            Ok(c) => c,
            Err(e) => return Verdict::Failed(e),
        };
        advance(states, JobState::CredentialResolved);

        // A dropped acquire future releases its half-built handle
        let share = ShareMount::new(self.mounter.clone(), &self.ctx.config.mount_base);
        let acquired = tokio::select! {
            r = share.acquire(job, &credential) => r,
            _ = cancel.cancelled() => Err(BackupError::Interrupted),
        };
        drop(credential);

        let mut handle = match acquired {
            Ok(h) => h,
            Err(e) => {
                advance(states, JobState::Released);
                return Verdict::Failed(e);
            }
        };
        advance(states, JobState::Mounted);

        let destination = handle.path().join(&job.folder);
        let copy = CopyEngine::new(
            self.engine.clone(),
            self.prompter.clone(),
            job.mode,
            cancel.clone(),
        );

        advance(states, JobState::Copying);
        let copied = tokio::select! {
            r = copy.run(&job.source, &destination, job.mode.is_interactive()) => r,
            _ = cancel.cancelled() => Err(BackupError::Interrupted),
        };

        let verdict = match copied {
            Ok(CopyOutcome::Completed(result)) if result.success => {
                advance(states, JobState::Succeeded);
                Verdict::Succeeded(result)
            }
            Ok(CopyOutcome::Completed(result)) => {
                advance(states, JobState::FailedCopy);
                Verdict::CopyFailed(result)
            }
            Ok(CopyOutcome::Cancelled) => Verdict::Cancelled,
            Err(e) => Verdict::Failed(e),
        };

        // Cleanup problems are logged; they never replace the verdict
        if let Err(e) = handle.release() {
            error!(error = %e, "Failed to release share");
        }
        advance(states, JobState::Released);

        self.interrupted_late(verdict)
    }

    /// A signal that lands after the copy stage still fails the run.
    fn interrupted_late(&self, verdict: Verdict) -> Verdict {
        if !self.ctx.cancel.is_cancelled() || matches!(verdict, Verdict::Failed(_)) {
            return verdict;
        }
        warn!(verdict = ?verdict, "Signal received after the copy finished");
        Verdict::Failed(BackupError::Interrupted)
    }

    async fn resolve_credential(&self, job: &BackupJob) -> Result<Credential, BackupError> {
        let prompter = self.prompter.clone();
        let mode = job.mode;
        let candidate = job.credentials_file.clone();

        tokio::task::spawn_blocking(move || credentials::resolve(mode, &candidate, prompter.as_ref()))
            .await
            .map_err(|e| BackupError::Prompt(e.to_string()))?
    }

    /// Best effort; only automated runs notify.
    async fn notify(&self, job: &BackupJob, event: JobEvent) {
        if job.mode.is_interactive() {
            return;
        }
        let Some(notifier) = &self.notifier else {
            return;
        };

        match tokio::time::timeout(NOTIFY_TIMEOUT, notifier.notify(event)).await {
            Ok(Ok(())) => debug!("Notification sent"),
            Ok(Err(e)) => warn!(error = %e, "Failed to send notification"),
            Err(_) => warn!("Notification timed out"),
        }
    }
}

fn advance(states: &mut Vec<JobState>, next: JobState) {
    debug!(state = %next, "Job state");
    states.push(next);
}

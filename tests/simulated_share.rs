//! End-to-end runs of the backup orchestrator against a simulated share.
//!
//! The simulated mounter moves whatever was written to the mount point into
//! a local "remote" directory on unmount, so these tests can inspect what
//! would have landed on the share.

use async_trait::async_trait;
use chrono::{Local, TimeZone};
use smbbk::adapters::SimulatedMounter;
use smbbk::config::AppConfig;
use smbbk::context::AppContext;
use smbbk::core::mount::{MountFailure, MountRequest, Mounter, UnmountOutcome};
use smbbk::core::transfer_engine::{NativeCopyEngine, SimulatedEngine, TransferEngine};
use smbbk::core::{
    BackupError, BackupJob, JobState, Orchestrator, OwnerIds, Prompter, RunMode, Verdict,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

const FOLDER: &str = "2025_03_04 - 18_05";

/// Answers every prompt the same way and counts the questions.
struct ScriptedPrompter {
    confirm: bool,
    asked: AtomicUsize,
}

impl ScriptedPrompter {
    fn new(confirm: bool) -> Arc<Self> {
        Arc::new(Self {
            confirm,
            asked: AtomicUsize::new(0),
        })
    }

    fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl Prompter for ScriptedPrompter {
    fn username(&self) -> Result<String, BackupError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok("alice".to_string())
    }

    fn secret(&self, _username: &str) -> Result<String, BackupError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok("hunter2".to_string())
    }

    fn confirm(&self, _question: &str) -> Result<bool, BackupError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.confirm)
    }
}

/// Delegates to a simulated share and delivers a signal while unmounting.
struct SignalDuringUnmount {
    inner: SimulatedMounter,
    cancel: CancellationToken,
}

#[async_trait]
impl Mounter for SignalDuringUnmount {
    async fn mount(&self, request: &MountRequest) -> Result<(), MountFailure> {
        self.inner.mount(request).await
    }

    fn unmount(&self, mount_point: &Path) -> anyhow::Result<UnmountOutcome> {
        self.cancel.cancel();
        self.inner.unmount(mount_point)
    }
}

/// Temp layout for one run: source tree, credentials file, mount base, share.
struct Fixture {
    _temp: TempDir,
    source: PathBuf,
    credentials: PathBuf,
    mount_base: PathBuf,
    remote: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempdir().unwrap();
        let source = temp.path().join("source");
        let credentials = temp.path().join(".smbcredentials");
        let mount_base = temp.path().join("mnt");
        let remote = temp.path().join("remote");

        fs::create_dir(&source).unwrap();
        fs::create_dir(&mount_base).unwrap();
        fs::create_dir(&remote).unwrap();
        fs::write(&credentials, "username=alice\npassword=secret\ndomain=WORKGROUP\n").unwrap();

        Self {
            _temp: temp,
            source,
            credentials,
            mount_base,
            remote,
        }
    }

    fn write(&self, relative: &str, content: &[u8]) {
        let path = self.source.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn config(&self) -> AppConfig {
        AppConfig {
            source_dir: self.source.clone(),
            server: "nas.local".to_string(),
            share: "backup".to_string(),
            credentials_file: self.credentials.clone(),
            mount_base: self.mount_base.clone(),
            ..Default::default()
        }
    }

    fn job(&self, mode: RunMode) -> BackupJob {
        let started = Local.with_ymd_and_hms(2025, 3, 4, 18, 5, 0).unwrap();
        BackupJob::new(
            &self.config(),
            mode,
            started,
            OwnerIds {
                uid: 1000,
                gid: 1000,
            },
        )
    }

    fn mount_point(&self) -> PathBuf {
        self.mount_base.join(format!("smbbk-{}", std::process::id()))
    }

    fn orchestrator(
        &self,
        mode: RunMode,
        mounter: Arc<SimulatedMounter>,
        engine: Arc<dyn TransferEngine>,
        prompter: Arc<ScriptedPrompter>,
    ) -> (Orchestrator, AppContext) {
        let ctx = AppContext::new(self.config(), mode);
        let orchestrator = Orchestrator::new(ctx.clone(), mounter, engine, prompter);
        (orchestrator, ctx)
    }
}

fn assert_released(fixture: &Fixture, mounter: &SimulatedMounter) {
    assert!(
        !fixture.mount_point().exists(),
        "mount point must be removed"
    );
    assert!(!mounter.is_mounted(&fixture.mount_point()));
}

fn count_files(dir: &Path) -> usize {
    let mut count = 0;
    for entry in fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        if entry.file_type().unwrap().is_dir() {
            count += count_files(&entry.path());
        } else {
            count += 1;
        }
    }
    count
}

#[tokio::test]
async fn test_successful_backup_lands_in_timestamp_folder() {
    let fixture = Fixture::new();
    fixture.write("notes.txt", b"hello world");
    fixture.write("photos/2024/a.jpg", &vec![7u8; 4096]);
    fixture.write("photos/2024/b.jpg", &vec![8u8; 1000]);

    let mounter = Arc::new(SimulatedMounter::new(&fixture.remote));
    let (orchestrator, _ctx) = fixture.orchestrator(
        RunMode::Automated,
        mounter.clone(),
        Arc::new(NativeCopyEngine { sync_files: false }),
        ScriptedPrompter::new(true),
    );

    let report = orchestrator.run(fixture.job(RunMode::Automated)).await;

    let result = match &report.verdict {
        Verdict::Succeeded(result) => result.clone(),
        other => panic!("expected success, got {:?}", other),
    };
    assert_eq!(result.files, 3);
    assert_eq!(result.bytes, 11 + 4096 + 1000);
    assert_eq!(result.exit_status, 0);
    assert_eq!(report.exit_code(), 0);

    assert_eq!(
        report.states,
        vec![
            JobState::Init,
            JobState::CredentialResolved,
            JobState::Mounted,
            JobState::Copying,
            JobState::Succeeded,
            JobState::Released,
            JobState::Done,
        ]
    );

    let landed = fixture.remote.join(FOLDER);
    assert_eq!(fs::read(landed.join("notes.txt")).unwrap(), b"hello world");
    assert_eq!(count_files(&landed), 3);

    assert_released(&fixture, &mounter);
    assert_eq!(mounter.mount_calls(), 1);
    assert_eq!(mounter.unmount_calls(), 1);
}

#[tokio::test]
async fn test_mount_failure_short_circuits_copy() {
    let fixture = Fixture::new();
    fixture.write("a.txt", b"a");

    let mounter = Arc::new(SimulatedMounter::failing(&fixture.remote, 32));
    let (orchestrator, _ctx) = fixture.orchestrator(
        RunMode::Automated,
        mounter.clone(),
        Arc::new(NativeCopyEngine::default()),
        ScriptedPrompter::new(true),
    );

    let report = orchestrator.run(fixture.job(RunMode::Automated)).await;

    match &report.verdict {
        Verdict::Failed(BackupError::MountFailed {
            endpoint, status, ..
        }) => {
            assert_eq!(endpoint, "//nas.local/backup");
            assert_eq!(*status, Some(32));
        }
        other => panic!("expected MountFailed, got {:?}", other),
    }
    assert_eq!(report.exit_code(), 1);
    assert!(!report.states.contains(&JobState::Copying));
    assert!(report.states.contains(&JobState::Released));

    assert!(!fixture.remote.join(FOLDER).exists());
    assert_released(&fixture, &mounter);
    assert_eq!(mounter.unmount_calls(), 0);
}

#[tokio::test]
async fn test_missing_credentials_in_automated_mode() {
    let fixture = Fixture::new();
    fs::remove_file(&fixture.credentials).unwrap();

    let mounter = Arc::new(SimulatedMounter::new(&fixture.remote));
    let prompter = ScriptedPrompter::new(true);
    let (orchestrator, _ctx) = fixture.orchestrator(
        RunMode::Automated,
        mounter.clone(),
        Arc::new(NativeCopyEngine::default()),
        prompter.clone(),
    );

    let report = orchestrator.run(fixture.job(RunMode::Automated)).await;

    assert!(matches!(
        report.verdict,
        Verdict::Failed(BackupError::MissingCredentials { .. })
    ));
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.states, vec![JobState::Init, JobState::Done]);
    assert_eq!(mounter.mount_calls(), 0);
    assert_eq!(prompter.asked(), 0);
    assert!(!fixture.mount_point().exists());
}

#[tokio::test]
async fn test_credentials_file_wins_over_terminal() {
    let fixture = Fixture::new();
    fixture.write("a.txt", b"a");

    let mounter = Arc::new(SimulatedMounter::new(&fixture.remote));
    let prompter = ScriptedPrompter::new(true);
    let (orchestrator, _ctx) = fixture.orchestrator(
        RunMode::Interactive,
        mounter.clone(),
        Arc::new(NativeCopyEngine::default()),
        prompter.clone(),
    );

    let report = orchestrator.run(fixture.job(RunMode::Interactive)).await;

    assert!(matches!(report.verdict, Verdict::Succeeded(_)));
    assert_eq!(prompter.asked(), 0);
}

#[tokio::test]
async fn test_interactive_without_file_prompts_for_credentials() {
    let fixture = Fixture::new();
    fs::remove_file(&fixture.credentials).unwrap();
    fixture.write("a.txt", b"a");

    let mounter = Arc::new(SimulatedMounter::new(&fixture.remote));
    let prompter = ScriptedPrompter::new(true);
    let (orchestrator, _ctx) = fixture.orchestrator(
        RunMode::Interactive,
        mounter.clone(),
        Arc::new(NativeCopyEngine::default()),
        prompter.clone(),
    );

    let report = orchestrator.run(fixture.job(RunMode::Interactive)).await;

    assert!(matches!(report.verdict, Verdict::Succeeded(_)));
    // username + secret
    assert_eq!(prompter.asked(), 2);
}

#[tokio::test]
async fn test_empty_source_in_automated_mode_succeeds() {
    let fixture = Fixture::new();

    let mounter = Arc::new(SimulatedMounter::new(&fixture.remote));
    let (orchestrator, _ctx) = fixture.orchestrator(
        RunMode::Automated,
        mounter.clone(),
        Arc::new(NativeCopyEngine::default()),
        ScriptedPrompter::new(false),
    );

    let report = orchestrator.run(fixture.job(RunMode::Automated)).await;

    match &report.verdict {
        Verdict::Succeeded(result) => {
            assert_eq!(result.files, 0);
            assert_eq!(result.bytes, 0);
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert!(fixture.remote.join(FOLDER).is_dir());
    assert_released(&fixture, &mounter);
}

#[tokio::test]
async fn test_empty_source_declined_interactively() {
    let fixture = Fixture::new();

    let mounter = Arc::new(SimulatedMounter::new(&fixture.remote));
    let (orchestrator, _ctx) = fixture.orchestrator(
        RunMode::Interactive,
        mounter.clone(),
        Arc::new(NativeCopyEngine::default()),
        ScriptedPrompter::new(false),
    );

    let report = orchestrator.run(fixture.job(RunMode::Interactive)).await;

    assert!(matches!(report.verdict, Verdict::Cancelled));
    assert_eq!(report.exit_code(), 0);
    assert!(report.states.contains(&JobState::Released));
    assert!(!fixture.remote.join(FOLDER).exists());
    assert_released(&fixture, &mounter);
}

#[tokio::test]
async fn test_copy_tool_failure_is_reported_not_fatal() {
    let fixture = Fixture::new();
    fixture.write("a.txt", b"a");

    let mounter = Arc::new(SimulatedMounter::new(&fixture.remote));
    let (orchestrator, _ctx) = fixture.orchestrator(
        RunMode::Automated,
        mounter.clone(),
        Arc::new(SimulatedEngine {
            exit_status: 23,
            delay: Duration::from_millis(10),
        }),
        ScriptedPrompter::new(true),
    );

    let report = orchestrator.run(fixture.job(RunMode::Automated)).await;

    match &report.verdict {
        Verdict::CopyFailed(result) => {
            assert!(!result.success);
            assert_eq!(result.exit_status, 23);
        }
        other => panic!("expected CopyFailed, got {:?}", other),
    }
    assert_eq!(report.exit_code(), 0);
    assert!(report.states.contains(&JobState::FailedCopy));
    assert_released(&fixture, &mounter);
}

#[tokio::test]
async fn test_missing_source_still_releases() {
    let fixture = Fixture::new();
    fs::remove_dir(&fixture.source).unwrap();

    let mounter = Arc::new(SimulatedMounter::new(&fixture.remote));
    let (orchestrator, _ctx) = fixture.orchestrator(
        RunMode::Automated,
        mounter.clone(),
        Arc::new(NativeCopyEngine::default()),
        ScriptedPrompter::new(true),
    );

    let report = orchestrator.run(fixture.job(RunMode::Automated)).await;

    assert!(matches!(
        report.verdict,
        Verdict::Failed(BackupError::SourceMissing { .. })
    ));
    assert_eq!(report.exit_code(), 1);
    assert!(report.states.contains(&JobState::Released));
    assert!(!fixture.remote.join(FOLDER).exists());
    assert_released(&fixture, &mounter);
    assert_eq!(mounter.unmount_calls(), 1);
}

#[tokio::test]
async fn test_interrupt_during_copy_releases_mount() {
    let fixture = Fixture::new();
    fixture.write("a.txt", b"a");

    let mounter = Arc::new(SimulatedMounter::new(&fixture.remote));
    let (orchestrator, ctx) = fixture.orchestrator(
        RunMode::Automated,
        mounter.clone(),
        Arc::new(SimulatedEngine {
            exit_status: 0,
            delay: Duration::from_secs(30),
        }),
        ScriptedPrompter::new(true),
    );

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        orchestrator.run(fixture.job(RunMode::Automated)),
    )
    .await
    .expect("interrupt should end the run promptly");

    assert!(matches!(
        report.verdict,
        Verdict::Failed(BackupError::Interrupted)
    ));
    assert_eq!(report.exit_code(), 1);
    assert!(report.states.contains(&JobState::Copying));
    assert!(report.states.contains(&JobState::Released));
    assert_released(&fixture, &mounter);
    assert_eq!(mounter.unmount_calls(), 1);
}

#[tokio::test]
async fn test_signal_during_release_fails_the_run() {
    let fixture = Fixture::new();
    fixture.write("a.txt", b"a");

    let ctx = AppContext::new(fixture.config(), RunMode::Automated);
    let mounter = Arc::new(SignalDuringUnmount {
        inner: SimulatedMounter::new(&fixture.remote),
        cancel: ctx.cancel.clone(),
    });
    let orchestrator = Orchestrator::new(
        ctx.clone(),
        mounter.clone(),
        Arc::new(NativeCopyEngine { sync_files: false }),
        ScriptedPrompter::new(true),
    );

    let report = orchestrator.run(fixture.job(RunMode::Automated)).await;

    assert!(ctx.cancel.is_cancelled());
    assert!(matches!(
        report.verdict,
        Verdict::Failed(BackupError::Interrupted)
    ));
    assert_eq!(report.exit_code(), 1);
    // The copy itself completed and the share was still released
    assert!(report.states.contains(&JobState::Succeeded));
    assert!(report.states.contains(&JobState::Released));
    assert_released(&fixture, &mounter.inner);
    assert_eq!(mounter.inner.unmount_calls(), 1);
}

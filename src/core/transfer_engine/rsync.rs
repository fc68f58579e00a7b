use crate::core::transfer_engine::{TransferEngine, TransferOutput, TransferRequest};
use crate::logging::LogThrottle;
use anyhow::{Result, anyhow};
use regex::Regex;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader},
    process::Command,
};
use tracing::{debug, info, warn};

/// Copies with the external `rsync` binary in archive mode.
pub struct RsyncEngine {
    pub program: PathBuf,
}

impl Default for RsyncEngine {
    fn default() -> Self {
        Self {
            program: PathBuf::from("rsync"),
        }
    }
}

impl RsyncEngine {
    fn command(&self, req: &TransferRequest) -> Command {
        let mut cmd = Command::new(&self.program);

        // -a: recurse, keep permissions, times and symlinks
        cmd.arg("-a").arg("--info=progress2");

        if req.show_progress {
            cmd.arg("--human-readable")
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            cmd.arg("--no-inc-recursive")
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        // trailing slash to copy contents
        let mut source = req.source.clone().into_os_string();
        source.push("/");

        cmd.arg(source)
            .arg(&req.destination)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        cmd
    }
}

impl TransferEngine for RsyncEngine {
    fn name(&self) -> &'static str {
        "rsync"
    }

    fn transfer(
        &self,
        req: &TransferRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransferOutput>> + Send>> {
        let mut cmd = self.command(req);
        let req = req.clone();

        Box::pin(async move {
            let start_time = Instant::now();
            info!(
                source = %req.source.display(),
                destination = %req.destination.display(),
                "Starting rsync transfer"
            );

            let mut child_process = cmd
                .spawn()
                .map_err(|e| anyhow!("Failed to spawn rsync process: {}", e))?;

            let stderr_task = child_process.stderr.take().map(|stderr| {
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        warn!(line = %line, "rsync");
                    }
                })
            });

            if let Some(stdout) = child_process.stdout.take() {
                log_progress(stdout).await;
            }

            let status = child_process
                .wait()
                .await
                .map_err(|e| anyhow!("Failed to wait for rsync: {}", e))?;

            if let Some(task) = stderr_task {
                let _ = task.await;
            }

            // Killed by a signal leaves no exit code
            let exit_status = status.code().unwrap_or(-1);
            let duration_secs = start_time.elapsed().as_secs();

            info!(exit_status, duration_secs, "rsync finished");

            Ok(TransferOutput {
                exit_status,
                duration_secs,
            })
        })
    }
}

/// Parse `--info=progress2` output and log it at debug level, throttled.
async fn log_progress<R: AsyncRead + Unpin>(stdout: R) {
    let mut reader = BufReader::new(stdout);
    let throttle = LogThrottle::new(Duration::from_secs(5));

    let mut line_buffer = Vec::new();
    let mut byte_buffer = [0u8; 1];

    while let Ok(n) = reader.read(&mut byte_buffer).await {
        if n == 0 {
            break;
        }

        let b = byte_buffer[0];

        // progress2 redraws with carriage returns
        if b == b'\r' || b == b'\n' {
            if line_buffer.is_empty() {
                continue;
            }

            let line = String::from_utf8_lossy(&line_buffer);
            if let Some((bytes_copied, percentage)) = parse_progress_line(&line) {
                if throttle.should_log() || percentage == 100 {
                    debug!(bytes_copied, percentage, "Transfer progress");
                }
            }

            line_buffer.clear();
        } else {
            line_buffer.push(b);
        }
    }
}

/// Extract bytes and percentage from a line like `  12,345,678   45%  10.2MB/s ...`.
fn parse_progress_line(line: &str) -> Option<(u64, u8)> {
    let re = progress_regex();
    let capts = re.captures(line)?;

    let bytes_copied = capts.get(1)?.as_str().replace(',', "").parse().ok()?;
    let percentage = capts.get(2)?.as_str().parse().ok()?;

    Some((bytes_copied, percentage))
}

fn progress_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([\d,]+)\s+(\d+)%").expect("valid progress regex"))
}

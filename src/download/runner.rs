//! Drives one run of a job: admission, precondition checks, subprocess
//! spawn, output streaming, stop handling and exit classification.

use super::control::{RunControl, StopReason};
use super::error::{JobError, JobResult};
use super::format::FormatResolver;
use super::job::{DownloadJob, JobRequest, JobStatus};
use super::progress::{self, ProgressReading};
use super::queue::JobEntry;
use super::tool_errors;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};

/// Message stored on a job canceled by the caller
pub const CANCELED_MESSAGE: &str = "Canceled by user.";

pub const DEFAULT_EXECUTABLE: &str = "yt-dlp";
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// How to reach the external downloader
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub executable: PathBuf,
    pub probe_timeout: Duration,
    /// Passed before the resolver's arguments on every run
    pub extra_args: Vec<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            extra_args: Vec::new(),
        }
    }
}

impl ToolSettings {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }

    fn not_found_message(&self) -> String {
        format!(
            "Downloader '{}' was not found or is not executable. Install yt-dlp and make sure it is on PATH, or set tool.executable in settings.toml.",
            self.executable.display()
        )
    }
}

/// Ask the tool for its version; doubles as the availability probe
pub async fn tool_version(settings: &ToolSettings) -> JobResult<String> {
    let probe = Command::new(&settings.executable)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(settings.probe_timeout, probe).await {
        Ok(Ok(output)) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            tracing::debug!("Downloader probe ok: {} {}", settings.executable.display(), version);
            Ok(version)
        }
        Ok(Ok(output)) => {
            tracing::warn!(
                "Downloader probe exited with {}: {}",
                output.status,
                settings.executable.display()
            );
            Err(JobError::environment(settings.not_found_message()))
        }
        Ok(Err(e)) => {
            tracing::warn!("Downloader probe failed to start: {}", e);
            Err(JobError::environment(settings.not_found_message()))
        }
        Err(_) => {
            tracing::warn!(
                "Downloader probe timed out after {:?}: {}",
                settings.probe_timeout,
                settings.executable.display()
            );
            Err(JobError::environment(settings.not_found_message()))
        }
    }
}

/// Check the request before anything touches the filesystem or spawns
pub fn validate_request(request: &JobRequest) -> JobResult<()> {
    let url = request.url.trim();
    if url.is_empty() {
        return Err(JobError::invalid("URL is empty"));
    }

    let parsed = url::Url::parse(url)
        .map_err(|_| JobError::invalid(format!("'{}' is not a valid URL", url)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(JobError::invalid("Please enter a valid HTTP/HTTPS URL"));
    }
    if parsed.host_str().is_none() {
        return Err(JobError::invalid(format!("'{}' has no host", url)));
    }

    if request.output_directory.as_os_str().is_empty() {
        return Err(JobError::invalid("Output directory is empty"));
    }

    Ok(())
}

/// Create the output directory if needed
pub async fn prepare_output_dir(dir: &Path) -> JobResult<()> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(JobError::environment(format!(
            "Output path '{}' exists but is not a directory",
            dir.display()
        ))),
        Err(_) => tokio::fs::create_dir_all(dir).await.map_err(|e| {
            JobError::environment(format!(
                "Cannot create output directory '{}': {}",
                dir.display(),
                e
            ))
        }),
    }
}

/// Admission gate: the semaphore jobs wait on and the limit it was built with.
/// Replaced wholesale when the limit changes.
#[derive(Debug, Clone)]
pub struct Gate {
    pub limit: usize,
    pub slots: Arc<Semaphore>,
}

impl Gate {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            slots: Arc::new(Semaphore::new(limit)),
        }
    }
}

/// How a run ended
#[derive(Debug)]
enum RunOutcome {
    Completed,
    Stopped(StopReason),
    Failed(JobError),
}

pub struct JobRunner {
    tool: ToolSettings,
    resolver: Arc<dyn FormatResolver>,
    gate: watch::Receiver<Gate>,
}

impl JobRunner {
    pub fn new(tool: ToolSettings, resolver: Arc<dyn FormatResolver>, gate: watch::Receiver<Gate>) -> Self {
        Self { tool, resolver, gate }
    }

    pub fn tool(&self) -> &ToolSettings {
        &self.tool
    }

    /// Run the job once, start to finish. The admission slot is held for the
    /// whole run and released when this returns.
    pub async fn run(&self, entry: Arc<JobEntry>, control: RunControl) {
        let job_id = entry.id();

        let Some(_permit) = self.admit(&control).await else {
            let reason = control.reason().unwrap_or(StopReason::Cancel);
            tracing::info!(%job_id, "Stopped before admission ({:?})", reason);
            self.finish(&entry, RunOutcome::Stopped(reason)).await;
            return;
        };

        let job = entry
            .update(|job| {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                job.error_message = None;
                job.log_info(format!("Starting download: {}", job.request.url));
            })
            .await;
        tracing::info!(%job_id, url = %job.request.url, attempt = job.attempt, "Job admitted");

        let outcome = self.execute(&entry, &job.request, &control).await;
        self.finish(&entry, outcome).await;
    }

    /// Fail a job whose request was rejected before it ever ran
    pub async fn reject(&self, entry: &JobEntry, error: JobError) {
        self.finish(entry, RunOutcome::Failed(error)).await;
    }

    /// Wait for a slot on the current gate, following gate swaps, unless
    /// the run is stopped first
    async fn admit(&self, control: &RunControl) -> Option<OwnedSemaphorePermit> {
        let mut gate = self.gate.clone();
        loop {
            let semaphore = gate.borrow_and_update().slots.clone();
            // A swap wins over a permit freed on the old gate in the same poll
            tokio::select! {
                biased;
                _ = control.stopped() => return None,
                changed = gate.changed() => {
                    if changed.is_err() {
                        // Manager is gone; keep the last gate
                        return tokio::select! {
                            biased;
                            _ = control.stopped() => None,
                            permit = semaphore.acquire_owned() => permit.ok(),
                        };
                    }
                }
                permit = semaphore.clone().acquire_owned() => {
                    if let Ok(permit) = permit {
                        return Some(permit);
                    }
                    // Closed gate: wait for its replacement
                    if gate.changed().await.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    async fn execute(&self, entry: &JobEntry, request: &JobRequest, control: &RunControl) -> RunOutcome {
        if let Err(e) = prepare_output_dir(&request.output_directory).await {
            return RunOutcome::Failed(e);
        }
        tokio::select! {
            biased;
            _ = control.stopped() => {
                return RunOutcome::Stopped(control.reason().unwrap_or(StopReason::Cancel));
            }
            probed = tool_version(&self.tool) => {
                if let Err(e) = probed {
                    return RunOutcome::Failed(e);
                }
            }
        }

        let resolved = match self
            .resolver
            .resolve(&request.quality, &request.output_directory, &request.url)
        {
            Ok(args) => args,
            Err(e) => return RunOutcome::Failed(e),
        };
        let mut args = self.tool.extra_args.clone();
        args.extend(resolved);

        if let Some(reason) = control.reason() {
            return RunOutcome::Stopped(reason);
        }

        self.spawn_and_watch(entry, &args, control).await
    }

    async fn spawn_and_watch(&self, entry: &JobEntry, args: &[String], control: &RunControl) -> RunOutcome {
        let job_id = entry.id();
        tracing::debug!(%job_id, "Spawning {} {:?}", self.tool.executable.display(), args);

        let mut command = Command::new(&self.tool.executable);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so a stop can take down helpers (ffmpeg etc.) too
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return RunOutcome::Failed(JobError::environment(format!(
                    "Failed to start '{}': {}",
                    self.tool.executable.display(),
                    e
                )));
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            terminate(&mut child).await;
            return RunOutcome::Failed(JobError::environment("Downloader output could not be captured"));
        };

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_open = true;
        let mut err_open = true;
        let mut error_text = String::new();

        let status: std::io::Result<ExitStatus> = loop {
            tokio::select! {
                biased;
                _ = control.stopped() => {
                    terminate(&mut child).await;
                    let reason = control.reason().unwrap_or(StopReason::Cancel);
                    tracing::info!(%job_id, "Downloader killed ({:?})", reason);
                    return RunOutcome::Stopped(reason);
                }
                line = out_lines.next_line(), if out_open => match line {
                    Ok(Some(line)) => self.handle_line(entry, &line).await,
                    Ok(None) => out_open = false,
                    Err(e) => {
                        tracing::warn!(%job_id, "stdout read failed: {}", e);
                        out_open = false;
                    }
                },
                line = err_lines.next_line(), if err_open => match line {
                    Ok(Some(line)) => {
                        error_text.push_str(&line);
                        error_text.push('\n');
                        self.handle_line(entry, &line).await;
                    }
                    Ok(None) => err_open = false,
                    Err(e) => {
                        tracing::warn!(%job_id, "stderr read failed: {}", e);
                        err_open = false;
                    }
                },
                status = child.wait(), if !out_open && !err_open => break status,
            }
        };

        if let Some(reason) = control.reason() {
            return RunOutcome::Stopped(reason);
        }

        match status {
            Ok(status) if status.success() => RunOutcome::Completed,
            Ok(status) => {
                tracing::warn!(%job_id, "Downloader exited with {}", status);
                RunOutcome::Failed(JobError::Process(tool_errors::classify(&error_text)))
            }
            Err(e) => RunOutcome::Failed(JobError::Process(format!(
                "Lost track of the downloader process: {}",
                e
            ))),
        }
    }

    async fn handle_line(&self, entry: &JobEntry, line: &str) {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return;
        }
        tracing::trace!(job_id = %entry.id(), "{}", line);

        if let Some(path) = progress::parse_destination(line) {
            entry
                .update(|job| {
                    if let Some(name) = path.file_name() {
                        job.title = name.to_string_lossy().into_owned();
                    }
                    job.output_path = Some(path);
                })
                .await;
            return;
        }

        if let Some(reading) = progress::parse(line) {
            entry.update(|job| apply_reading(job, reading)).await;
        }
    }

    async fn finish(&self, entry: &JobEntry, outcome: RunOutcome) {
        let job_id = entry.id();
        match outcome {
            RunOutcome::Completed => {
                tracing::info!(%job_id, "Download completed");
                entry
                    .update(|job| {
                        job.status = JobStatus::Completed;
                        job.progress_percent = 100;
                        if job.bytes_total > 0 {
                            job.bytes_downloaded = job.bytes_total;
                        }
                        job.error_message = None;
                        job.finished_at = Some(Utc::now());
                        job.log_info("Download completed".to_string());
                    })
                    .await;
            }
            RunOutcome::Stopped(StopReason::Pause) => {
                entry
                    .update(|job| {
                        job.status = JobStatus::Paused;
                        job.transfer_rate = 0.0;
                        job.error_message = None;
                        job.log_info("Paused by user".to_string());
                    })
                    .await;
            }
            RunOutcome::Stopped(StopReason::Cancel) => {
                entry
                    .update(|job| {
                        job.status = JobStatus::Canceled;
                        job.transfer_rate = 0.0;
                        job.error_message = Some(CANCELED_MESSAGE.to_string());
                        job.finished_at = Some(Utc::now());
                        job.log_warn("Canceled by user".to_string());
                    })
                    .await;
            }
            RunOutcome::Failed(e) => {
                tracing::error!(%job_id, kind = e.kind(), "Download failed: {}", e);
                let message = e.to_string();
                entry
                    .update(|job| {
                        job.status = JobStatus::Failed;
                        job.transfer_rate = 0.0;
                        job.finished_at = Some(Utc::now());
                        job.log_error(format!("Download failed: {}", message));
                        job.error_message = Some(message);
                    })
                    .await;
            }
        }
    }
}

/// Fold a reading into the record; percentage never goes backwards within a run
pub fn apply_reading(job: &mut DownloadJob, reading: ProgressReading) {
    job.progress_percent = job.progress_percent.max(reading.percent);
    if let Some(transfer) = reading.transfer {
        job.bytes_downloaded = transfer.bytes_downloaded;
        job.bytes_total = transfer.bytes_total;
        job.transfer_rate = transfer.rate;
    }
}

/// Kill the downloader and everything it started, then reap it
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: plain syscall; the child leads its own process group
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    #[cfg(windows)]
    if let Some(pid) = child.id() {
        let killed = Command::new("taskkill")
            .args(tree_kill_args(pid))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = killed {
            tracing::debug!("taskkill failed for {}: {}", pid, e);
        }
    }
    if let Err(e) = child.kill().await {
        tracing::debug!("Kill after group kill: {}", e);
    }
}

/// `taskkill` arguments that force-kill `pid` and its whole process tree
#[cfg_attr(not(windows), allow(dead_code))]
fn tree_kill_args(pid: u32) -> [String; 4] {
    ["/PID".to_string(), pid.to_string(), "/T".to_string(), "/F".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::progress::TransferStats;
    use pretty_assertions::assert_eq;

    fn request(url: &str, dir: &str) -> JobRequest {
        JobRequest::new(url, "Best", dir)
    }

    #[test]
    fn test_validate_request() {
        assert!(validate_request(&request("https://example.com/watch?v=1", "/tmp")).is_ok());
        assert!(validate_request(&request("http://example.com", "/tmp")).is_ok());

        for url in ["", "   ", "example.com/video", "ftp://example.com/file", "file:///etc/passwd"] {
            assert!(
                matches!(validate_request(&request(url, "/tmp")), Err(JobError::InvalidRequest(_))),
                "{} should be rejected",
                url
            );
        }

        assert!(matches!(
            validate_request(&request("https://example.com", "")),
            Err(JobError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_apply_reading_is_monotonic() {
        let mut job = DownloadJob::new(request("https://example.com", "/tmp"));
        apply_reading(
            &mut job,
            ProgressReading {
                percent: 50,
                transfer: Some(TransferStats {
                    bytes_downloaded: 50,
                    bytes_total: 100,
                    rate: 10.0,
                }),
            },
        );
        apply_reading(&mut job, ProgressReading { percent: 5, transfer: None });

        assert_eq!(job.progress_percent, 50);
        assert_eq!(job.bytes_downloaded, 50);
        assert_eq!(job.bytes_total, 100);
        assert_eq!(job.transfer_rate, 10.0);
    }

    #[tokio::test]
    async fn test_prepare_output_dir_creates_nested() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("a").join("b");
        prepare_output_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_prepare_output_dir_rejects_file() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            prepare_output_dir(&file).await,
            Err(JobError::Environment(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_tool_is_environment_error() {
        let settings = ToolSettings::new("/definitely/not/here/yt-dlp");
        let err = tool_version(&settings).await.unwrap_err();
        assert!(matches!(err, JobError::Environment(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_tree_kill_args_cover_children() {
        assert_eq!(tree_kill_args(4242), ["/PID", "4242", "/T", "/F"].map(String::from));
    }

    #[tokio::test]
    async fn test_gate_swap_wins_over_old_permit() {
        let (gate_tx, gate_rx) = watch::channel(Gate::new(1));
        let runner = Arc::new(JobRunner::new(
            ToolSettings::default(),
            Arc::new(crate::download::format::PresetResolver),
            gate_rx,
        ));
        let old = gate_tx.borrow().slots.clone().try_acquire_owned().unwrap();

        let admitting = runner.clone();
        let waiter = tokio::spawn(async move {
            let control = RunControl::new();
            admitting.admit(&control).await.is_some()
        });
        // Let the waiter park on the old gate
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Swap and free an old slot before the waiter runs again
        let next = Gate::new(1);
        let held = next.slots.clone().try_acquire_owned().unwrap();
        gate_tx.send_replace(next);
        drop(old);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn test_gate_limit_is_clamped() {
        let gate = Gate::new(0);
        assert_eq!(gate.limit, 1);
        assert_eq!(gate.slots.available_permits(), 1);
        assert_eq!(Gate::new(3).slots.available_permits(), 3);
    }
}

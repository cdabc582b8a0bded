#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use ytq::download::job::{DownloadJob, JobId, JobRequest, JobStatus};
use ytq::download::manager::DownloadManager;
use ytq::download::queue::JobObserver;
use ytq::download::runner::ToolSettings;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A stand-in downloader: a shell script that answers `--version`,
/// appends its arguments to `invocations.log`, then runs `body`.
pub struct FakeTool {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl FakeTool {
    pub fn new(body: &str) -> Self {
        Self::with_body(|_| body.to_string())
    }

    /// Like `new`, with a body that can refer to files in the tool's directory
    pub fn with_body(body: impl FnOnce(&Path) -> String) -> Self {
        Self::with_probe("echo 2024.01.01", body)
    }

    /// Full control: `probe` answers `--version`, `body` handles real runs
    pub fn with_probe(probe: &str, body: impl FnOnce(&Path) -> String) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake-dl");
        let log = dir.path().join("invocations.log");
        let script = format!(
            "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then {}; exit 0; fi\necho \"$@\" >> '{}'\n{}\n",
            probe,
            log.display(),
            body(dir.path())
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, path }
    }

    /// Argument lines of every real (non-probe) invocation
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("invocations.log"))
            .map(|content| content.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn settings(&self) -> ToolSettings {
        let mut settings = ToolSettings::new(&self.path);
        settings.probe_timeout = Duration::from_secs(5);
        settings
    }

    pub fn manager(&self, max_concurrent: usize) -> DownloadManager {
        DownloadManager::with_config(max_concurrent, self.settings())
    }

    /// File the script can write to, inside the tool's temp dir
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Tool that reports a destination, three progress lines, then exits 0
pub fn succeeding_tool() -> FakeTool {
    FakeTool::new(
        r#"echo "[download] Destination: /tmp/ytq-test/clip.mp4"
echo "[download]  10.0% of 10.00MiB at 1.00MiB/s ETA 00:09"
echo "[download]  55.5% of 10.00MiB at 2.00MiB/s ETA 00:02"
echo "[download]  30%"
echo "[download] 100% of 10.00MiB at 2.00MiB/s ETA 00:00"
exit 0"#,
    )
}

/// Tool that makes some progress, prints `error_line` on stderr and exits 1
pub fn failing_tool(error_line: &str) -> FakeTool {
    FakeTool::new(&format!(
        "echo \"[download]  40.0% of 1.00MiB at 100.00KiB/s\"\necho '{}' >&2\nexit 1",
        error_line
    ))
}

/// Tool that records its pid in `pid` and sleeps until killed
pub fn hanging_tool() -> FakeTool {
    FakeTool::with_body(|dir| {
        format!(
            "echo $$ > '{}'\necho \"[download]   1.0% of 10.00MiB at 1.00MiB/s\"\nexec sleep 30",
            dir.join("pid").display()
        )
    })
}

/// Tool that starts a helper process, records both pids, and waits on the helper
pub fn forking_tool() -> FakeTool {
    FakeTool::with_body(|dir| {
        format!(
            "sleep 30 >/dev/null 2>&1 &\necho $! > '{}'\necho $$ > '{}'\necho \"[download]   1.0% of 10.00MiB at 1.00MiB/s\"\nwait",
            dir.join("helper").display(),
            dir.join("pid").display()
        )
    })
}

/// Tool whose `--version` hangs; real runs succeed at once
pub fn slow_probe_tool() -> FakeTool {
    FakeTool::with_probe("sleep 30", |_| "exit 0".to_string())
}

/// Tool that takes a moment and succeeds
pub fn slow_tool(seconds: &str) -> FakeTool {
    FakeTool::new(&format!(
        "echo \"[download]  50.0% of 1.00MiB at 1.00MiB/s\"\nsleep {}\nexit 0",
        seconds
    ))
}

pub fn request(url: &str, output_dir: &Path) -> JobRequest {
    JobRequest::new(url, "Best", output_dir)
}

/// Poll until the job reaches `status` or the timeout elapses
pub async fn wait_for_status(manager: &DownloadManager, id: JobId, status: JobStatus) -> DownloadJob {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    loop {
        let job = manager.get(id).await.expect("job should exist");
        if job.status == status {
            return job;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("job {} stuck in {:?}, expected {:?}", id, job.status, status);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until the file exists with some content (the fake tool has started)
pub async fn wait_for_file(path: &Path) {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    let has_content = || {
        std::fs::read_to_string(path)
            .map(|content| !content.trim().is_empty())
            .unwrap_or(false)
    };
    while !has_content() {
        if tokio::time::Instant::now() >= deadline {
            panic!("{} never appeared", path.display());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until the tool has been started `count` times
pub async fn wait_for_invocations(tool: &FakeTool, count: usize) {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while tool.invocations().len() < count {
        if tokio::time::Instant::now() >= deadline {
            panic!("tool started {} times, expected {}", tool.invocations().len(), count);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Every snapshot the observer saw, per job, in delivery order
#[derive(Clone, Default)]
pub struct Recorder {
    pub snapshots: Arc<Mutex<HashMap<JobId, Vec<DownloadJob>>>>,
}

impl Recorder {
    pub fn observer(&self) -> JobObserver {
        let snapshots = self.snapshots.clone();
        Arc::new(move |job: &DownloadJob| {
            snapshots.lock().unwrap().entry(job.id).or_default().push(job.clone());
        })
    }

    pub fn history(&self, id: JobId) -> Vec<DownloadJob> {
        self.snapshots.lock().unwrap().get(&id).cloned().unwrap_or_default()
    }

    pub fn statuses(&self, id: JobId) -> Vec<JobStatus> {
        let mut statuses: Vec<JobStatus> = Vec::new();
        for job in self.history(id) {
            if statuses.last() != Some(&job.status) {
                statuses.push(job.status);
            }
        }
        statuses
    }
}

/// Observer that tracks the largest number of jobs seen Running at once
#[derive(Clone, Default)]
pub struct RunningGauge {
    current: Arc<Mutex<HashMap<JobId, JobStatus>>>,
    pub max_running: Arc<Mutex<usize>>,
}

impl RunningGauge {
    pub fn observer(&self) -> JobObserver {
        let gauge = self.clone();
        Arc::new(move |job: &DownloadJob| {
            let mut current = gauge.current.lock().unwrap();
            current.insert(job.id, job.status);
            let running = current.values().filter(|s| **s == JobStatus::Running).count();
            let mut max = gauge.max_running.lock().unwrap();
            *max = (*max).max(running);
        })
    }

    pub fn max(&self) -> usize {
        *self.max_running.lock().unwrap()
    }
}

/// Whether the process is still executing. Zombies count as gone: a killed
/// helper may sit unreaped under an init that never collects it.
pub fn process_running(pid: &str) -> bool {
    let pid = pid.trim();
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // State is the first field after the parenthesised command name
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X"),
        Err(_) if Path::new("/proc/self/stat").exists() => false,
        Err(_) => process_alive(pid),
    }
}

/// Poll until the process is no longer running
pub async fn wait_for_exit(pid: &str) {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while process_running(pid) {
        if tokio::time::Instant::now() >= deadline {
            panic!("process {} is still running", pid.trim());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Whether a process with this pid still exists
pub fn process_alive(pid: &str) -> bool {
    std::process::Command::new("kill")
        .args(["-0", pid.trim()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

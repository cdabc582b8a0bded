use crate::download::job::{DownloadJob, JobStatus};

/// Format bytes into human-readable string (KB, MB, GB)
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec.max(0.0) as u64))
}

fn status_icon(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "…",
        JobStatus::Running => "↓",
        JobStatus::Paused => "⏸",
        JobStatus::Completed => "✓",
        JobStatus::Failed => "✗",
        JobStatus::Canceled => "-",
    }
}

/// One line per job for the live view
pub fn format_progress_line(job: &DownloadJob) -> String {
    let mut line = format!(
        "{} [{:3}%] {}",
        status_icon(job.status),
        job.progress_percent,
        job.title
    );

    if job.status == JobStatus::Running && job.bytes_total > 0 {
        line.push_str(&format!(
            "  {} / {}",
            format_bytes(job.bytes_downloaded),
            format_bytes(job.bytes_total)
        ));
        if job.transfer_rate > 0.0 {
            line.push_str(&format!("  {}", format_rate(job.transfer_rate)));
        }
        if let Some(eta) = job.eta_display() {
            line.push_str(&format!("  ETA {}", eta));
        }
    }

    if let Some(message) = &job.error_message {
        line.push_str(&format!("  ({})", message));
    }

    line
}

/// Full record, used for the final report of jobs that did not complete
pub fn format_job_details(job: &DownloadJob) -> String {
    let mut output = String::new();
    output.push_str(&format!("ID: {}\n", job.id));
    output.push_str(&format!("URL: {}\n", job.request.url));
    output.push_str(&format!("Title: {}\n", job.title));
    output.push_str(&format!("Quality: {}\n", job.request.quality));
    output.push_str(&format!("Status: {:?}\n", job.status));
    if let Some(path) = &job.output_path {
        output.push_str(&format!("File: {}\n", path.display()));
    }
    if let Some(message) = &job.error_message {
        output.push_str(&format!("Error: {}\n", message));
    }
    for entry in &job.logs {
        output.push_str(&format!(
            "  {} {:?} {}\n",
            entry.timestamp.format("%H:%M:%S"),
            entry.level,
            entry.message
        ));
    }
    output
}

/// Human or JSON listing
pub fn format_jobs(jobs: &[DownloadJob], json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(jobs).unwrap_or_else(|_| "[]".to_string());
    }
    if jobs.is_empty() {
        return "No downloads in queue".to_string();
    }
    jobs.iter()
        .map(format_progress_line)
        .collect::<Vec<_>>()
        .join("\n")
}

use super::error;
use super::output;
use super::{Commands, ConfigAction};
use crate::app::config::Config;
use crate::download::format::QUALITY_PRESETS;
use crate::download::job::{DownloadJob, JobRequest, JobStatus};
use crate::download::manager::DownloadManager;
use crate::download::queue::JobObserver;
use anyhow::Result;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const REFRESH_INTERVAL: Duration = Duration::from_millis(500);

/// Handle a CLI command and return exit code
pub async fn handle_command(command: Commands, config: Config, manager: DownloadManager) -> i32 {
    let result = match command {
        Commands::Get { urls, quality, output, json } => {
            handle_get(urls, quality, output, json, &config, &manager).await
        }
        Commands::Qualities => handle_qualities(&config),
        Commands::Probe => handle_probe(&manager).await,
        Commands::Config { action } => handle_config(action, config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            error::ERROR
        }
    }
}

/// Enqueue every URL and render progress until nothing is left to run
async fn handle_get(
    urls: Vec<String>,
    quality: Option<String>,
    output_dir: Option<PathBuf>,
    json: bool,
    config: &Config,
    manager: &DownloadManager,
) -> Result<i32> {
    let quality = quality.unwrap_or_else(|| config.download.default_quality.clone());
    let output_dir = output_dir.unwrap_or_else(|| config.download.default_directory.clone());

    // Status transitions are forwarded to the render loop
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<String>();
    let observer = transition_observer(events_tx);

    for url in &urls {
        let request = JobRequest::new(url.as_str(), quality.as_str(), output_dir.as_path());
        let id = manager.enqueue(request, Some(observer.clone())).await;
        tracing::info!(job_id = %id, "Enqueued {}", url);
    }
    drop(observer);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                let paused = manager.pause_all().await;
                clear_line()?;
                println!("Interrupted: paused {} download(s)", paused);
                break;
            }
            _ = tokio::time::sleep(REFRESH_INTERVAL) => {
                while let Ok(event) = events_rx.try_recv() {
                    clear_line()?;
                    println!("{}", event);
                }
                render_status(manager).await?;
                if !manager.has_unfinished().await {
                    break;
                }
            }
        }
    }

    manager.wait_idle().await;
    while let Ok(event) = events_rx.try_recv() {
        clear_line()?;
        println!("{}", event);
    }
    clear_line()?;

    let jobs = manager.list().await;
    if json {
        println!("{}", output::format_jobs(&jobs, true));
    } else {
        for job in jobs.iter().filter(|job| job.status != JobStatus::Completed) {
            println!("{}", output::format_job_details(job));
        }
        println!("{}", manager.summary().await.status_line());
    }

    let all_completed = jobs.iter().all(|job| job.status == JobStatus::Completed);
    Ok(if all_completed { error::SUCCESS } else { error::ERROR })
}

/// Observer that reports each status change once, as a printable line
fn transition_observer(events: mpsc::UnboundedSender<String>) -> JobObserver {
    let last_status: Mutex<HashMap<uuid::Uuid, JobStatus>> = Mutex::new(HashMap::new());
    Arc::new(move |job: &DownloadJob| {
        let changed = match last_status.lock() {
            Ok(mut seen) => seen.insert(job.id, job.status) != Some(job.status),
            Err(_) => false,
        };
        if changed && job.status != JobStatus::Queued {
            // Receiver gone means the command is already exiting
            let _ = events.send(output::format_progress_line(job));
        }
    })
}

async fn render_status(manager: &DownloadManager) -> Result<()> {
    let jobs = manager.list().await;
    let running: Vec<&DownloadJob> = jobs.iter().filter(|job| job.status == JobStatus::Running).collect();

    let line = match running.as_slice() {
        [job] => output::format_progress_line(job),
        _ => manager.summary().await.status_line(),
    };
    print!("\r{}\x1b[K", line);
    io::stdout().flush()?;
    Ok(())
}

fn clear_line() -> Result<()> {
    print!("\r\x1b[K");
    io::stdout().flush()?;
    Ok(())
}

fn handle_qualities(config: &Config) -> Result<i32> {
    for label in QUALITY_PRESETS {
        let marker = if *label == config.download.default_quality { "*" } else { " " };
        println!("{} {}", marker, label);
    }
    Ok(error::SUCCESS)
}

async fn handle_probe(manager: &DownloadManager) -> Result<i32> {
    match manager.probe_tool().await {
        Ok(version) => {
            println!("Downloader available: {}", version);
            Ok(error::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(error::TOOL_UNAVAILABLE)
        }
    }
}

fn handle_config(action: ConfigAction, mut config: Config) -> Result<i32> {
    match action {
        ConfigAction::Get { key } => {
            println!("{}", get_config_value(&config, &key)?);
            Ok(error::SUCCESS)
        }
        ConfigAction::Set { key, value } => {
            if let Err(e) = set_config_value(&mut config, &key, &value) {
                eprintln!("Error: {}", e);
                return Ok(error::INVALID_INPUT);
            }
            config.save()?;
            println!("Configuration updated: {} = {}", key, value);
            Ok(error::SUCCESS)
        }
        ConfigAction::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
            Ok(error::SUCCESS)
        }
        ConfigAction::Path => {
            println!("{}", crate::util::paths::get_app_config_path()?.display());
            Ok(error::SUCCESS)
        }
    }
}

/// Get configuration value by dot notation key
fn get_config_value(config: &Config, key: &str) -> Result<String> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["download", "default_directory"] => Ok(config.download.default_directory.display().to_string()),
        ["download", "max_concurrent"] => Ok(config.download.max_concurrent.to_string()),
        ["download", "default_quality"] => Ok(config.download.default_quality.clone()),
        ["tool", "executable"] => Ok(config.tool.executable.display().to_string()),
        ["tool", "probe_timeout_secs"] => Ok(config.tool.probe_timeout_secs.to_string()),
        ["tool", "extra_args"] => Ok(config.tool.extra_args.join(" ")),
        _ => Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }
}

/// Set configuration value by dot notation key
fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["download", "default_directory"] => config.download.default_directory = PathBuf::from(value),
        ["download", "max_concurrent"] => {
            let max: usize = value.parse()?;
            if max == 0 {
                anyhow::bail!("download.max_concurrent must be at least 1");
            }
            config.download.max_concurrent = max;
        }
        ["download", "default_quality"] => config.download.default_quality = value.to_string(),
        ["tool", "executable"] => config.tool.executable = PathBuf::from(value),
        ["tool", "probe_timeout_secs"] => config.tool.probe_timeout_secs = value.parse()?,
        ["tool", "extra_args"] => {
            config.tool.extra_args = value.split_whitespace().map(str::to_string).collect();
        }
        _ => return Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }

    Ok(())
}

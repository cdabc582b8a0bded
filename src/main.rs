use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use ytq::{
    app::config::Config,
    cli::{self, Cli},
    download::manager::DownloadManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first to get verbose flag and config override
    let cli = Cli::parse();

    if let Some(ref config_dir) = cli.config {
        ytq::util::paths::set_config_dir_override(Some(config_dir.clone()));
    }

    let logs_dir = ytq::util::paths::get_logs_dir().unwrap_or_else(|_| PathBuf::from("."));
    std::fs::create_dir_all(&logs_dir).ok();

    // Daily rotating JSON log file
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "app.jsonl");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let log_level = if cli.verbose {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(tracing_subscriber::filter::LevelFilter::from_level(log_level)),
        )
        .init();

    tracing::info!("Starting ytq {}", env!("CARGO_PKG_VERSION"));
    tracing::trace!("CLI arguments: {:?}", cli);

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load config, using defaults: {:#}", e);
            eprintln!("Warning: {:#}", e);
            Config::default()
        }
    };
    tracing::info!("Config loaded: {:?}", config);

    // Command-line overrides apply to this run only, never to the saved file
    let mut effective = config.clone();
    if let Some(jobs) = cli.jobs {
        effective.download.max_concurrent = jobs.max(1);
    }
    if let Some(ref tool) = cli.tool {
        effective.tool.executable = tool.clone();
    }

    let manager = DownloadManager::from_config(&effective);
    let exit_code = cli::handler::handle_command(cli.command, config, manager).await;

    // Flush the log writer before exiting
    drop(guard);
    std::process::exit(exit_code);
}

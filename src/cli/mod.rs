use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod error;
pub mod handler;
pub mod output;

/// ytq - a download queue in front of yt-dlp
#[derive(Parser, Debug)]
#[command(name = "ytq")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Override config directory path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (TRACE level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Maximum simultaneous downloads (overrides settings)
    #[arg(short = 'j', long, global = true, value_name = "N")]
    pub jobs: Option<usize>,

    /// Downloader executable (overrides settings)
    #[arg(long, global = true, value_name = "PATH")]
    pub tool: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download one or more URLs and show live progress
    Get {
        /// URLs to download
        #[arg(required = true)]
        urls: Vec<String>,

        /// Quality preset label or raw format selector
        #[arg(long, short)]
        quality: Option<String>,

        /// Output directory
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Print the final job records as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the quality presets
    Qualities,

    /// Check that the downloader is installed and print its version
    Probe,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the whole configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Get a value by dot notation key (e.g. download.max_concurrent)
    Get { key: String },

    /// Set a value and save
    Set { key: String, value: String },

    /// Print the settings file location
    Path,
}

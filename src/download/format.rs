//! Mapping from a quality label to the downloader's argument vector.
//!
//! The runner only sees the [`FormatResolver`] trait; the label vocabulary
//! lives entirely in [`PresetResolver`] and can be swapped out.

use super::error::JobError;
use std::path::Path;

/// Output file name template handed to the tool
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Builds the full argument list for one download
pub trait FormatResolver: Send + Sync {
    fn resolve(&self, quality: &str, output_dir: &Path, url: &str) -> Result<Vec<String>, JobError>;
}

/// Quality labels offered to users, in display order
pub const QUALITY_PRESETS: &[&str] = &[
    "Best Video (4K/1080p/720p)",
    "4K Video (2160p)",
    "1080p Video",
    "720p Video",
    "480p Video",
    "360p Video",
    "Audio Only - Best Quality",
    "Audio Only - MP3 320kbps",
    "Audio Only - MP3 256kbps",
    "Audio Only - MP3 128kbps",
    "Audio Only - AAC Best",
    "Audio Only - FLAC",
    "Audio Only - OGG",
    "Video + Audio - Best",
    "Video + Audio - 1080p + Best Audio",
    "Video + Audio - 720p + Best Audio",
];

pub const DEFAULT_QUALITY: &str = "Best Video (4K/1080p/720p)";

/// Default policy: yt-dlp format expressions for the preset labels.
/// Labels it does not know are passed through as raw format selectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresetResolver;

impl PresetResolver {
    /// Format selector for a label
    pub fn format_selector(quality: &str) -> &str {
        match quality {
            "Best Video (4K/1080p/720p)" => "bestvideo[height<=2160]+bestaudio/best",
            "4K Video (2160p)" => "bestvideo[height<=2160]/best[height<=2160]",
            "1080p Video" => "bestvideo[height<=1080]/best[height<=1080]",
            "720p Video" => "bestvideo[height<=720]/best[height<=720]",
            "480p Video" => "bestvideo[height<=480]/best[height<=480]",
            "360p Video" => "bestvideo[height<=360]/best[height<=360]",

            "Audio Only - Best Quality" => "bestaudio/best",
            "Audio Only - MP3 320kbps" => "bestaudio[ext=mp3]/bestaudio",
            "Audio Only - MP3 256kbps" => "bestaudio[abr<=256]/bestaudio",
            "Audio Only - MP3 128kbps" => "bestaudio[abr<=128]/bestaudio",
            "Audio Only - AAC Best" => "bestaudio[ext=m4a]/bestaudio",
            "Audio Only - FLAC" => "bestaudio[ext=flac]/bestaudio",
            "Audio Only - OGG" => "bestaudio[ext=ogg]/bestaudio",

            "Video + Audio - Best" => "best",
            "Video + Audio - 1080p + Best Audio" => "bestvideo[height<=1080]+bestaudio/best[height<=1080]",
            "Video + Audio - 720p + Best Audio" => "bestvideo[height<=720]+bestaudio/best[height<=720]",

            // Legacy labels
            "Best" => "best",
            "Good (720p)" => "bestvideo[height<=720]+bestaudio/best[height<=720]",
            "Data Saver (480p)" => "bestvideo[height<=480]+bestaudio/best[height<=480]",

            raw => raw,
        }
    }

    /// Post-processing arguments for audio-only labels
    pub fn audio_args(quality: &str) -> &'static [&'static str] {
        if !quality.contains("Audio Only") {
            return &[];
        }
        match quality {
            "Audio Only - MP3 320kbps" => &["--extract-audio", "--audio-format", "mp3", "--audio-quality", "320K"],
            "Audio Only - MP3 256kbps" => &["--extract-audio", "--audio-format", "mp3", "--audio-quality", "256K"],
            "Audio Only - MP3 128kbps" => &["--extract-audio", "--audio-format", "mp3", "--audio-quality", "128K"],
            "Audio Only - AAC Best" => &["--extract-audio", "--audio-format", "aac"],
            "Audio Only - FLAC" => &["--extract-audio", "--audio-format", "flac"],
            "Audio Only - OGG" => &["--extract-audio", "--audio-format", "vorbis"],
            _ => &["--extract-audio", "--audio-format", "mp3", "--audio-quality", "0"],
        }
    }
}

impl FormatResolver for PresetResolver {
    fn resolve(&self, quality: &str, output_dir: &Path, url: &str) -> Result<Vec<String>, JobError> {
        let quality = quality.trim();
        if quality.is_empty() {
            return Err(JobError::InvalidRequest("No quality selected".to_string()));
        }
        if quality.starts_with('-') {
            return Err(JobError::InvalidRequest(format!(
                "Invalid quality selector '{}'",
                quality
            )));
        }

        let output = output_dir.join(OUTPUT_TEMPLATE);
        let mut args = vec![
            "--newline".to_string(),
            "-f".to_string(),
            Self::format_selector(quality).to_string(),
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        args.extend(Self::audio_args(quality).iter().map(|a| a.to_string()));
        args.push("--".to_string());
        args.push(url.to_string());

        Ok(args)
    }
}

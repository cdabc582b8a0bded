//! Progress line parsing for the downloader's text output.
//!
//! Two grammars are tried in order:
//! 1. `<pct>% of <size><unit> at <rate><unit>/s` (detailed)
//! 2. a standalone `<pct>%` (bare)
//!
//! Lines matching neither yield `None` and must not touch the job record.

use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

static DETAILED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d+(?:\.\d+)?)%\s+of\s+~?\s*(\d+(?:\.\d+)?)\s*([a-z]+)\s+at\s+(\d+(?:\.\d+)?)\s*([a-z]+)/s",
    )
    .expect("Invalid regex pattern")
});

static BARE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\d.])(\d+(?:\.\d+)?)%").expect("Invalid regex pattern")
});

static DESTINATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(?:download|ExtractAudio|Merger)\]\s+(?:Destination:\s+|Merging formats into\s+)(.+?)\s*$")
        .expect("Invalid regex pattern")
});

static ALREADY_DOWNLOADED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\]\s+(.+?)\s+has already been downloaded").expect("Invalid regex pattern")
});

const KIB: f64 = 1024.0;

/// Byte counters extracted from a detailed progress line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferStats {
    pub bytes_downloaded: u64,
    pub bytes_total: u64,
    /// Bytes per second
    pub rate: f64,
}

/// One structured reading taken from a line of tool output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReading {
    /// Clamped to 0..=100
    pub percent: u8,
    /// `None` for the bare-percentage grammar: byte fields keep their previous values
    pub transfer: Option<TransferStats>,
}

/// Parse one output line into a progress reading
pub fn parse(line: &str) -> Option<ProgressReading> {
    parse_detailed(line).or_else(|| parse_bare(line))
}

fn parse_detailed(line: &str) -> Option<ProgressReading> {
    let caps = DETAILED_PATTERN.captures(line)?;

    let pct = parse_number(&caps[1])?.clamp(0.0, 100.0);
    let size = parse_number(&caps[2])?;
    let rate = parse_number(&caps[4])?;

    let bytes_total = (size * size_multiplier(&caps[3])).round() as u64;
    let rate = rate * rate_multiplier(&caps[5]);
    let bytes_downloaded = (bytes_total as f64 * pct / 100.0).round() as u64;

    Some(ProgressReading {
        percent: pct as u8,
        transfer: Some(TransferStats {
            bytes_downloaded,
            bytes_total,
            rate,
        }),
    })
}

fn parse_bare(line: &str) -> Option<ProgressReading> {
    let caps = BARE_PATTERN.captures(line)?;
    let pct = parse_number(&caps[1])?.clamp(0.0, 100.0);

    Some(ProgressReading {
        percent: pct as u8,
        transfer: None,
    })
}

fn parse_number(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

/// Size units are 1024-based whether or not they carry the `i`.
/// Unknown units are taken as raw bytes.
fn size_multiplier(unit: &str) -> f64 {
    match unit.to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "KB" | "KIB" => KIB,
        "MB" | "MIB" => KIB * KIB,
        "GB" | "GIB" => KIB * KIB * KIB,
        "TB" | "TIB" => KIB * KIB * KIB * KIB,
        _ => 1.0,
    }
}

/// Rate units stop at gigabytes; anything else is raw bytes per second
fn rate_multiplier(unit: &str) -> f64 {
    match unit.to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "KB" | "KIB" => KIB,
        "MB" | "MIB" => KIB * KIB,
        "GB" | "GIB" => KIB * KIB * KIB,
        _ => 1.0,
    }
}

/// Output file announced by the tool, if this line names one
pub fn parse_destination(line: &str) -> Option<PathBuf> {
    let line = line.trim();
    let caps = DESTINATION_PATTERN
        .captures(line)
        .or_else(|| ALREADY_DOWNLOADED_PATTERN.captures(line))?;
    let path = caps[1].trim_matches('"');
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

/// Marker the downloader puts in front of fatal error lines
pub const ERROR_MARKER: &str = "ERROR:";

/// Message used when the tool failed without printing any error line
pub const GENERIC_FAILURE: &str =
    "Download failed. The downloader exited with an error; check the URL and try again.";

/// Failure category recognized in the tool's error output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorCategory {
    Unavailable,
    Private,
    NoCompatibleFormat,
    UnsupportedSite,
    Network,
    AgeRestricted,
    RegionBlocked,
    Copyright,
    LiveInProgress,
    SubscriptionRequired,
    AuthRequired,
    Permission,
    DiskSpace,
}

struct Rule {
    category: ToolErrorCategory,
    needles: &'static [&'static str],
    message: &'static str,
}

// Checked in order; first hit wins. Needles are lowercase.
const RULES: &[Rule] = &[
    Rule {
        category: ToolErrorCategory::Unavailable,
        needles: &["video unavailable", "has been removed", "no longer available", "does not exist"],
        message: "This video is unavailable or has been removed.",
    },
    Rule {
        category: ToolErrorCategory::Private,
        needles: &["private video", "this video is private"],
        message: "This video is private. Only the uploader or approved viewers can download it.",
    },
    Rule {
        category: ToolErrorCategory::NoCompatibleFormat,
        needles: &["requested format is not available", "no video formats found", "no compatible format"],
        message: "The selected quality is not available for this video. Try a different quality.",
    },
    Rule {
        category: ToolErrorCategory::UnsupportedSite,
        needles: &["unsupported url", "no suitable extractor"],
        message: "This website is not supported by the downloader.",
    },
    Rule {
        category: ToolErrorCategory::Network,
        needles: &[
            "timed out",
            "timeout",
            "unable to download webpage",
            "connection refused",
            "connection reset",
            "network is unreachable",
            "name or service not known",
            "getaddrinfo failed",
            "temporary failure in name resolution",
        ],
        message: "Network error. Check your internet connection and try again.",
    },
    Rule {
        category: ToolErrorCategory::AgeRestricted,
        needles: &["age-restricted", "age restricted", "confirm your age", "inappropriate for some users"],
        message: "This video is age-restricted and requires a signed-in account.",
    },
    Rule {
        category: ToolErrorCategory::RegionBlocked,
        needles: &["not available in your country", "available in your country", "geo restrict", "geo-restrict", "blocked in your country"],
        message: "This video is not available in your region.",
    },
    Rule {
        category: ToolErrorCategory::Copyright,
        needles: &["copyright", "takedown", "dmca"],
        message: "This video was taken down due to a copyright claim.",
    },
    Rule {
        category: ToolErrorCategory::LiveInProgress,
        needles: &["this live event", "live stream", "is currently live", "premieres in", "is not finished"],
        message: "This is a live stream that has not finished yet. Try again after it ends.",
    },
    Rule {
        category: ToolErrorCategory::SubscriptionRequired,
        needles: &["members-only", "members only", "join this channel", "requires a subscription", "premium members", "requires payment"],
        message: "This video requires a paid subscription or channel membership.",
    },
    Rule {
        category: ToolErrorCategory::AuthRequired,
        needles: &["sign in", "login required", "log in", "authentication", "account required"],
        message: "This video requires signing in. Provide credentials or cookies to the downloader.",
    },
    Rule {
        category: ToolErrorCategory::Permission,
        needles: &["permission denied", "access is denied", "errno 13", "read-only file system"],
        message: "Cannot write to the output folder: permission denied. Choose a different folder.",
    },
    Rule {
        category: ToolErrorCategory::DiskSpace,
        needles: &["no space left", "disk full", "not enough space", "errno 28"],
        message: "Not enough disk space to finish the download.",
    },
];

/// Classified failure extracted from the tool's error stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolErrorInfo {
    pub category: Option<ToolErrorCategory>,
    pub message: String,
}

impl ToolErrorInfo {
    /// Classify the accumulated error-stream text.
    ///
    /// Only the first line carrying [`ERROR_MARKER`] is considered. Same input,
    /// same output.
    pub fn from_stderr(stderr: &str) -> Self {
        let Some(detail) = stderr.lines().find_map(error_detail) else {
            return Self {
                category: None,
                message: GENERIC_FAILURE.to_string(),
            };
        };

        let lower = detail.to_lowercase();
        for rule in RULES {
            if rule.needles.iter().any(|needle| lower.contains(needle)) {
                return Self {
                    category: Some(rule.category),
                    message: rule.message.to_string(),
                };
            }
        }

        let message = if detail.is_empty() {
            GENERIC_FAILURE.to_string()
        } else {
            detail.to_string()
        };
        Self {
            category: None,
            message,
        }
    }
}

/// Text after the marker, if the line carries one
fn error_detail(line: &str) -> Option<&str> {
    let idx = line.find(ERROR_MARKER)?;
    Some(line[idx + ERROR_MARKER.len()..].trim())
}

/// User-facing message for a failed run
pub fn classify(stderr: &str) -> String {
    ToolErrorInfo::from_stderr(stderr).message
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_private_video() {
        let stderr = "WARNING: something minor\nERROR: [youtube] abc123: Private video. Sign in if you've been granted access to this video\n";
        let info = ToolErrorInfo::from_stderr(stderr);
        assert_eq!(info.category, Some(ToolErrorCategory::Private));
        assert_eq!(classify(stderr), info.message);
    }

    #[test]
    fn test_unavailable_wins_over_later_rules() {
        let info = ToolErrorInfo::from_stderr("ERROR: [youtube] x: Video unavailable. This video is private");
        assert_eq!(info.category, Some(ToolErrorCategory::Unavailable));
    }

    #[test]
    fn test_each_category() {
        let cases = [
            ("ERROR: Requested format is not available", ToolErrorCategory::NoCompatibleFormat),
            ("ERROR: Unsupported URL: https://example.com/", ToolErrorCategory::UnsupportedSite),
            ("ERROR: Unable to download webpage: <urlopen error timed out>", ToolErrorCategory::Network),
            ("ERROR: [youtube] x: Sign in to confirm your age. This video may be inappropriate for some users.", ToolErrorCategory::AgeRestricted),
            ("ERROR: [youtube] x: The uploader has not made this video available in your country", ToolErrorCategory::RegionBlocked),
            ("ERROR: [youtube] x: This video contains content from SME, who has blocked it on copyright grounds", ToolErrorCategory::Copyright),
            ("ERROR: [youtube] x: This live event will begin in 3 hours", ToolErrorCategory::LiveInProgress),
            ("ERROR: [youtube] x: Join this channel to get access to members-only content", ToolErrorCategory::SubscriptionRequired),
            ("ERROR: [vimeo] x: Login required to access this video", ToolErrorCategory::AuthRequired),
            ("ERROR: unable to open for writing: [Errno 13] Permission denied: '/root/x.mp4'", ToolErrorCategory::Permission),
            ("ERROR: unable to write data: [Errno 28] No space left on device", ToolErrorCategory::DiskSpace),
        ];
        for (stderr, expected) in cases {
            assert_eq!(ToolErrorInfo::from_stderr(stderr).category, Some(expected), "{}", stderr);
        }
    }

    #[test]
    fn test_only_first_marker_line_counts() {
        let stderr = "ERROR: something odd happened\nERROR: Private video\n";
        assert_eq!(classify(stderr), "something odd happened");
    }

    #[test]
    fn test_unmatched_marker_returns_raw_text() {
        assert_eq!(classify("ERROR: [generic] weird failure 42"), "[generic] weird failure 42");
    }

    #[test]
    fn test_no_marker_is_generic() {
        assert_eq!(classify("Traceback (most recent call last):\n  boom"), GENERIC_FAILURE);
        assert_eq!(classify(""), GENERIC_FAILURE);
    }

    #[test]
    fn test_is_deterministic() {
        let stderr = "ERROR: connection reset by peer";
        assert_eq!(classify(stderr), classify(stderr));
    }
}

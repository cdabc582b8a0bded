use thiserror::Error;

/// Why a run ended without completing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Bad URL, empty paths, or an unusable quality selector
    #[error("{0}")]
    InvalidRequest(String),

    /// Output directory or downloader executable unusable
    #[error("{0}")]
    Environment(String),

    /// The downloader ran and exited non-zero (message already classified)
    #[error("{0}")]
    Process(String),
}

/// Result type for job operations
pub type JobResult<T> = Result<T, JobError>;

impl JobError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn environment(message: impl Into<String>) -> Self {
        Self::Environment(message.into())
    }

    /// Short category name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Environment(_) => "environment",
            Self::Process(_) => "process",
        }
    }
}

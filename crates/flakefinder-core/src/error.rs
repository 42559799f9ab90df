//! Error types for the flakefinder pipeline.

use std::time::Duration;

/// Invalid configuration, input files or a failed pipeline task.
pub const EXIT_CONFIG_ERROR: i32 = 1;
/// Upstream stayed unavailable past the retry budget.
pub const EXIT_UPSTREAM_UNAVAILABLE: i32 = 3;
/// Upstream answered with something the pipeline cannot use.
pub const EXIT_PROTOCOL_ERROR: i32 = 4;
/// Reading or writing local files failed.
pub const EXIT_IO_ERROR: i32 = 5;

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum FinderError {
    /// Build, artifact or object does not exist (permanent gap).
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Upstream temporarily unavailable (gateway timeout, rate limit, client timeout).
    #[error("upstream unavailable: {message}")]
    Unavailable {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Upstream answered with a status the pipeline does not understand.
    #[error("unexpected status {status} for {resource}: {message}")]
    UnexpectedStatus {
        status: u16,
        resource: String,
        message: String,
    },

    /// Transport failure that is not a timeout.
    #[error("network error: {message}")]
    Network { message: String },

    /// Response body could not be decoded.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Transient failures persisted past the retry budget.
    #[error("retries exhausted for {resource} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        resource: String,
        attempts: u32,
        last_error: String,
    },

    /// Fatal error while processing one build of one lane.
    #[error("lane {lane}, build {build}: {source}")]
    Build {
        lane: String,
        build: u64,
        #[source]
        source: Box<FinderError>,
    },

    /// JUnit artifact could not be parsed.
    #[error("junit parse error: {message}")]
    Junit { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Local I/O while writing reports or reading input files.
    #[error("io error on {path}: {message}")]
    Io { path: String, message: String },

    /// A pipeline task panicked or its channel closed early.
    #[error("pipeline task failed: {message}")]
    Task { message: String },
}

impl FinderError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => EXIT_CONFIG_ERROR,
            Self::Task { .. } => EXIT_CONFIG_ERROR,

            // Upstream gave up on us
            Self::Unavailable { .. } => EXIT_UPSTREAM_UNAVAILABLE,
            Self::RetriesExhausted { .. } => EXIT_UPSTREAM_UNAVAILABLE,
            Self::Network { .. } => EXIT_UPSTREAM_UNAVAILABLE,

            // Protocol problems need an operator
            Self::NotFound { .. } => EXIT_PROTOCOL_ERROR,
            Self::UnexpectedStatus { .. } => EXIT_PROTOCOL_ERROR,
            Self::InvalidResponse { .. } => EXIT_PROTOCOL_ERROR,
            Self::Junit { .. } => EXIT_PROTOCOL_ERROR,

            Self::Io { .. } => EXIT_IO_ERROR,

            Self::Build { source, .. } => source.exit_code(),
        }
    }

    /// Whether the error is transient and worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Whether the error denotes a permanent gap rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Attach lane and build number to a fatal error.
    pub fn in_build(self, lane: &str, build: u64) -> Self {
        match self {
            already @ Self::Build { .. } => already,
            other => Self::Build {
                lane: lane.to_string(),
                build,
                source: Box::new(other),
            },
        }
    }

    pub(crate) fn task(message: impl std::fmt::Display) -> Self {
        Self::Task {
            message: message.to_string(),
        }
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for FinderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Unavailable {
                message: err.to_string(),
                retry_after: None,
            }
        } else if err.is_decode() {
            Self::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}

/// Result type for pipeline operations.
pub type FinderResult<T> = Result<T, FinderError>;

//! Error taxonomy for the image retrieval core.
//!
//! One typed error sum, matching the boundary kinds in the coordinator's
//! external interface: `invalid_url`, `timeout`, `not_found`, `network_error`,
//! `decode_failed`, `cancelled`, `unknown`.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type DownloaderResult<T> = Result<T, DownloaderError>;

// Note: every variant is plain owned data (no `std::io::Error`/`reqwest::Error`
// field) so `DownloaderError` can derive `Clone` -- required because the
// dispatcher delivers one identical terminal outcome to every subscriber of
// a `DispatchRecord`.
#[derive(Error, Debug, Clone)]
pub enum DownloaderError {
    #[error("invalid url: {reason}")]
    InvalidUrl { reason: String },

    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("resource not found: {url}")]
    NotFound { url: String },

    #[error("network error: {cause}")]
    NetworkError { cause: String, retryable: bool },

    #[error("decode failed: {cause}")]
    DecodeFailed { cause: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("io error at {path}: {message}")]
    Io { path: String, message: String },

    #[error("unknown error: {cause}")]
    Unknown { cause: String },
}

impl DownloaderError {
    pub fn invalid_url(reason: impl Into<String>) -> Self {
        DownloaderError::InvalidUrl {
            reason: reason.into(),
        }
    }

    pub fn not_found(url: impl Into<String>) -> Self {
        DownloaderError::NotFound { url: url.into() }
    }

    pub fn network(cause: impl fmt::Display, retryable: bool) -> Self {
        DownloaderError::NetworkError {
            cause: cause.to_string(),
            retryable,
        }
    }

    pub fn decode(cause: impl fmt::Display) -> Self {
        DownloaderError::DecodeFailed {
            cause: cause.to_string(),
        }
    }

    /// Maps an HTTP status code to the appropriate error kind, per the
    /// retry policy's classification of transport failures.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => DownloaderError::NotFound {
                url: String::new(),
            },
            408 | 429 => DownloaderError::NetworkError {
                cause: format!("http status {status}"),
                retryable: true,
            },
            500..=599 => DownloaderError::NetworkError {
                cause: format!("http status {status}"),
                retryable: true,
            },
            400..=499 => DownloaderError::NetworkError {
                cause: format!("http status {status}"),
                retryable: false,
            },
            _ => DownloaderError::Unknown {
                cause: format!("unexpected http status {status}"),
            },
        }
    }

    /// Whether this error is, by its own kind, eligible for retry before
    /// the attempt-count/cancellation checks in [`crate::retry::RetryPolicy`]
    /// are applied.
    pub fn is_retryable_kind(&self) -> bool {
        match self {
            DownloaderError::NetworkError { retryable, .. } => *retryable,
            DownloaderError::Timeout { .. } => true,
            DownloaderError::Cancelled
            | DownloaderError::InvalidUrl { .. }
            | DownloaderError::DecodeFailed { .. }
            | DownloaderError::NotFound { .. } => false,
            DownloaderError::Io { .. } | DownloaderError::Unknown { .. } => false,
        }
    }
}

impl From<std::io::Error> for DownloaderError {
    fn from(source: std::io::Error) -> Self {
        DownloaderError::Io {
            path: String::new(),
            message: source.to_string(),
        }
    }
}

impl From<reqwest::Error> for DownloaderError {
    fn from(source: reqwest::Error) -> Self {
        if source.is_timeout() {
            DownloaderError::Timeout { elapsed_ms: 0 }
        } else if let Some(status) = source.status() {
            DownloaderError::from_status(status.as_u16())
        } else {
            DownloaderError::NetworkError {
                cause: source.to_string(),
                retryable: true,
            }
        }
    }
}

impl From<image::ImageError> for DownloaderError {
    fn from(source: image::ImageError) -> Self {
        DownloaderError::DecodeFailed {
            cause: source.to_string(),
        }
    }
}

//! Error types for threadcard operations.
//!
//! Errors are split along the two failure domains of the pipeline:
//! [`ParseError`] for pages that were fetched but could not be interpreted,
//! and [`DownloadError`] for resources that could not be retrieved. Both
//! convert into the crate-wide [`ThreadcardError`].
//!
//! # Example
//!
//! ```rust
//! use threadcard_core::{DownloadError, ThreadcardError};
//!
//! let err: ThreadcardError = DownloadError::ZeroSize { url: "https://example.com/a.png".into() }.into();
//! assert!(err.to_string().contains("empty"));
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// A page was fetched but is not interpretable as a forum post.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The request ended on a page the extractor does not follow.
    ///
    /// Discuz sends guests without permission to the login page; a thread
    /// moved to another host ends up here as well.
    #[error("Redirected from {from} to {to}")]
    Redirect { from: String, to: String },

    /// The page answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Network errors while fetching the page.
    #[error("Page request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A CSS selector could not be compiled.
    #[error("Invalid selector: {0}")]
    Selector(String),

    /// The forum served its message page instead of the thread
    /// (deleted, under review, or restricted).
    #[error("Thread unavailable: {0}")]
    Unavailable(String),

    /// The route matched but did not capture a group the extractor needs.
    #[error("Route match is missing capture group `{0}`")]
    MissingCapture(String),
}

/// A remote resource could not be downloaded into the cache.
///
/// This type is `Clone` so that a memoised failure can be handed out again
/// every time a pending media reference is resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    /// The server kept answering 429 until the retry budget ran out.
    #[error("Download rate limited: {url}")]
    RateLimited { url: String },

    /// Reserved for a size cap; the downloader does not enforce one yet.
    #[error("Download of {url} exceeds size limit ({size} > {limit} bytes)")]
    SizeLimit { url: String, size: u64, limit: u64 },

    /// The server advertised or delivered an empty body.
    #[error("Download returned an empty body: {url}")]
    ZeroSize { url: String },

    /// Any other terminal failure.
    #[error("Download failed for {url}: {reason}")]
    Failed { url: String, reason: String },

    /// The task driving the download was cancelled or panicked.
    #[error("Download task aborted: {0}")]
    Aborted(String),
}

/// Main error type for threadcard operations.
#[derive(Error, Debug)]
pub enum ThreadcardError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Invalid configuration values.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration file could not be read.
    #[error("Failed to read config file at {path}: {source}")]
    ConfigIo { path: PathBuf, source: std::io::Error },

    /// The configuration file is not valid TOML for [`Config`](crate::Config).
    #[error("Failed to parse config file at {path}: {source}")]
    ConfigParse { path: PathBuf, source: toml::de::Error },

    /// A route pattern failed to compile.
    #[error("Invalid route pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Card drawing failed before encoding.
    #[error("Render error: {0}")]
    Render(String),

    /// Card encoding failed.
    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors reported by the host transport.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for [`ThreadcardError`].
pub type Result<T> = std::result::Result<T, ThreadcardError>;

/// Result type alias for [`DownloadError`].
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_display() {
        let err = ParseError::Redirect { from: "https://keylol.com/t1-1-1".into(), to: "https://keylol.com/member.php".into() };
        let msg = err.to_string();
        assert!(msg.contains("t1-1-1"));
        assert!(msg.contains("member.php"));
    }

    #[test]
    fn test_download_error_is_transparent() {
        let err: ThreadcardError = DownloadError::RateLimited { url: "https://example.com/x".into() }.into();
        assert_eq!(err.to_string(), "Download rate limited: https://example.com/x");
    }

    #[test]
    fn test_status_error() {
        let err = ParseError::Status { url: "https://keylol.com/t9-1-1".into(), status: 404 };
        assert!(err.to_string().contains("404"));
    }
}

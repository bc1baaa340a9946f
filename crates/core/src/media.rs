//! Lazy media references.
//!
//! A [`MediaRef`] is either a file already on disk or a download that is
//! still in flight. Pending references wrap a shared, memoised future: the
//! download runs at most once, and every call to [`MediaRef::resolve`] after
//! the first completion returns the same path or the same error.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::{DownloadError, DownloadResult};

type PendingPath = Shared<BoxFuture<'static, DownloadResult<PathBuf>>>;

/// Reference to a media file that may still be downloading.
#[derive(Clone)]
pub enum MediaRef {
    /// The file is already in the cache.
    Resolved(PathBuf),
    /// A download that resolves to the cached file.
    Pending(PendingPath),
}

impl MediaRef {
    /// Wraps a local path.
    pub fn resolved(path: impl Into<PathBuf>) -> Self {
        Self::Resolved(path.into())
    }

    /// Wraps a download future without starting it; it runs on the first `resolve`.
    pub fn pending<F>(download: F) -> Self
    where
        F: Future<Output = DownloadResult<PathBuf>> + Send + 'static,
    {
        Self::Pending(download.boxed().shared())
    }

    /// Starts the download on the tokio runtime right away.
    ///
    /// Siblings spawned this way progress concurrently and fail independently;
    /// the outcome is only observed when the reference is resolved.
    pub fn spawn<F>(download: F) -> Self
    where
        F: Future<Output = DownloadResult<PathBuf>> + Send + 'static,
    {
        let handle = tokio::spawn(download);
        Self::pending(async move { handle.await.unwrap_or_else(|e| Err(DownloadError::Aborted(e.to_string()))) })
    }

    /// Waits for the file and returns its path.
    pub async fn resolve(&self) -> DownloadResult<PathBuf> {
        match self {
            Self::Resolved(path) => Ok(path.clone()),
            Self::Pending(download) => download.clone().await,
        }
    }

    /// The path, if it is known without waiting.
    pub fn path_now(&self) -> Option<&Path> {
        match self {
            Self::Resolved(path) => Some(path),
            Self::Pending(download) => download.peek().and_then(|r| r.as_ref().ok()).map(PathBuf::as_path),
        }
    }

    /// Whether the reference resolved successfully already.
    pub fn is_ready(&self) -> bool {
        self.path_now().is_some()
    }
}

impl fmt::Debug for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(path) => f.debug_tuple("Resolved").field(path).finish(),
            Self::Pending(download) => match download.peek() {
                Some(outcome) => f.debug_tuple("Pending").field(outcome).finish(),
                None => f.write_str("Pending(<in flight>)"),
            },
        }
    }
}

impl From<PathBuf> for MediaRef {
    fn from(path: PathBuf) -> Self {
        Self::Resolved(path)
    }
}

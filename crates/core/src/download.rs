//! Media downloading into the on-disk cache.
//!
//! The [`Downloader`] owns the process-wide [`HttpSession`]; extractors borrow
//! the same session for page requests. Downloads are retried with linear
//! backoff and streamed into a private temporary file that is renamed into
//! the cache directory once complete, so concurrent downloads never share a
//! partially written file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Proxy, StatusCode};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::error::{DownloadError, DownloadResult};
use crate::{Result, ThreadcardError};

/// Lazily-built HTTP clients shared across the pipeline.
///
/// reqwest binds proxies to clients, so one client is kept per proxy
/// address (`None` for direct connections). A closed session rebuilds its
/// clients on the next request.
#[derive(Debug)]
pub struct HttpSession {
    timeout: Duration,
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl HttpSession {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, clients: Mutex::new(HashMap::new()) }
    }

    /// Client for the given proxy, built on first use.
    pub fn client(&self, proxy: Option<&str>) -> std::result::Result<Client, reqwest::Error> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let key = proxy.map(String::from);
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder().timeout(self.timeout);
        if let Some(proxy) = proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        let client = builder.build()?;
        debug!(proxy = ?key, "http client created");
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Drops every client; in-flight requests keep their own handles.
    pub fn close(&self) {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Whether any client is currently alive.
    pub fn is_open(&self) -> bool {
        !self.clients.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Why one download attempt failed.
#[derive(Debug)]
enum AttemptError {
    RateLimited,
    ZeroSize,
    Other(String),
}

/// Retrying, caching file downloader.
#[derive(Debug)]
pub struct Downloader {
    session: HttpSession,
    cache_dir: PathBuf,
    retries: u32,
    backoff: Duration,
}

impl Downloader {
    /// Creates the downloader and its cache directory.
    pub fn new(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.cache_dir).map_err(ThreadcardError::Io)?;
        Ok(Self {
            session: HttpSession::new(config.timeout()),
            cache_dir: config.cache_dir.clone(),
            retries: config.download_retry_times,
            backoff: config.retry_backoff(),
        })
    }

    /// The shared HTTP session.
    pub fn session(&self) -> &HttpSession {
        &self.session
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Downloads `url` into the cache and returns the file path.
    ///
    /// `filename` defaults to [`filename_from_url`]. The request
    /// is attempted once plus the configured number of retries, sleeping
    /// `(1 + attempt)` backoff units in between.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::RateLimited`] when the last attempt got HTTP 429
    /// - [`DownloadError::ZeroSize`] when the last attempt got an empty body
    /// - [`DownloadError::Failed`] for anything else
    pub async fn fetch(
        &self, url: &str, headers: Option<&HeaderMap>, proxy: Option<&str>, filename: Option<&str>,
    ) -> DownloadResult<PathBuf> {
        let name = match filename {
            Some(name) => sanitize_filename(name),
            None => filename_from_url(url),
        };
        let path = self.cache_dir.join(name);

        let mut attempt = 0;
        loop {
            let outcome = match self.session.client(proxy) {
                Ok(client) => self.attempt(&client, url, headers, &path).await,
                Err(e) => Err(AttemptError::Other(e.to_string())),
            };

            let failure = match outcome {
                Ok(size) => {
                    debug!(url, path = %path.display(), size, "download complete");
                    return Ok(path);
                }
                Err(failure) => failure,
            };

            if attempt >= self.retries {
                warn!(url, attempts = attempt + 1, ?failure, "download failed");
                return Err(match failure {
                    AttemptError::RateLimited => DownloadError::RateLimited { url: url.to_string() },
                    AttemptError::ZeroSize => DownloadError::ZeroSize { url: url.to_string() },
                    AttemptError::Other(reason) => DownloadError::Failed { url: url.to_string(), reason },
                });
            }

            debug!(url, attempt, ?failure, "download attempt failed, retrying");
            tokio::time::sleep(self.backoff * (1 + attempt)).await;
            attempt += 1;
        }
    }

    /// One request, streamed into `path`. Returns the number of bytes written.
    async fn attempt(
        &self, client: &Client, url: &str, headers: Option<&HeaderMap>, path: &Path,
    ) -> std::result::Result<u64, AttemptError> {
        let mut request = client.get(url);
        if let Some(headers) = headers {
            request = request.headers(headers.clone());
        }

        let mut response = request.send().await.map_err(|e| AttemptError::Other(e.to_string()))?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::RateLimited);
        }
        if !status.is_success() {
            return Err(AttemptError::Other(format!("HTTP {}", status)));
        }
        if response.content_length() == Some(0) {
            return Err(AttemptError::ZeroSize);
        }

        let part = partial_path(path);
        let mut file = fs::File::create(&part).await.map_err(|e| AttemptError::Other(e.to_string()))?;
        let mut written = 0u64;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = file.write_all(&chunk).await {
                        discard(&part).await;
                        return Err(AttemptError::Other(e.to_string()));
                    }
                    written += chunk.len() as u64;
                }
                Ok(None) => break,
                Err(e) => {
                    discard(&part).await;
                    return Err(AttemptError::Other(e.to_string()));
                }
            }
        }
        if let Err(e) = file.flush().await {
            discard(&part).await;
            return Err(AttemptError::Other(e.to_string()));
        }
        drop(file);

        let on_disk = fs::metadata(&part).await.map(|m| m.len()).unwrap_or(written);
        if on_disk == 0 {
            discard(&part).await;
            return Err(AttemptError::ZeroSize);
        }

        if let Err(e) = fs::rename(&part, path).await {
            discard(&part).await;
            return Err(AttemptError::Other(e.to_string()));
        }

        Ok(on_disk)
    }

    /// Closes the shared session.
    pub async fn close(&self) {
        self.session.close();
    }
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "could not remove partial download");
    }
}

/// Cache file name for a URL: a hash of the full URL followed by its last
/// non-empty path segment, so URLs sharing a basename get distinct files.
pub fn filename_from_url(url: &str) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|mut s| s.rfind(|seg| !seg.is_empty()).map(String::from)));

    match segment {
        Some(segment) => format!("{}_{}", hashed_name(url), sanitize_filename(&segment)),
        None => hashed_name(url),
    }
}

/// Unique sibling of `path` that one attempt writes into before the rename.
fn partial_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{}.{}.part", name, uuid::Uuid::new_v4().simple()))
}

/// Replaces characters that are unsafe in file names.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() { hashed_name(name) } else { cleaned.to_string() }
}

fn hashed_name(input: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(input.as_bytes()));
    digest[..16].to_string()
}

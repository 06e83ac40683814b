//! Artifact caches
//!
//! A cache stores the declared outputs and log of a task under its hash.
//! Backends share the [`CacheBackend`] contract:
//!
//! - [`FsCache`] keeps `<hash>.tar.zst` archives in a local directory
//! - [`HttpCache`] talks to a remote artifact server
//! - [`CacheMultiplexer`] layers several backends
//! - [`AsyncCache`] moves uploads onto a bounded worker pool
//!
//! [`open_cache`] assembles the stack from [`CacheOpts`].

mod archive;
mod async_cache;
mod fs;
mod http;
mod multiplexer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use baton_core::config::CacheConfig;

pub use archive::{restore_archive, write_archive, CacheReader, CacheWriter};
pub use async_cache::AsyncCache;
pub use fs::{CacheMetadata, CacheStats, FsCache, PruneStats};
pub use http::{HttpCache, RemoteCacheOpts};
pub use multiplexer::CacheMultiplexer;

/// Where a cache hit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    Local,
    Remote,
}

impl std::fmt::Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Details of a cache hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHitMetadata {
    pub source: CacheSource,
    /// Duration of the original run, in milliseconds
    pub time_saved: u64,
}

/// A cache hit with the files it restored, relative to the anchor
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub metadata: CacheHitMetadata,
    pub files: Vec<PathBuf>,
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid cache archive: {0}")]
    Archive(String),

    #[error("Invalid cache metadata: {0}")]
    InvalidMetadata(#[from] serde_json::Error),

    #[error("Remote cache request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Remote cache returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Remote caching is disabled: {0}")]
    CacheDisabled(String),

    #[error("Remote cache request timed out")]
    Timeout,

    #[error("Refusing to restore path outside the repository: {}", .0.display())]
    PathTraversal(PathBuf),

    #[error("Artifact digest mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("No caches are enabled")]
    NoCachesEnabled,

    #[error("Invalid file path: {0}")]
    InvalidFilePath(String),
}

impl From<reqwest::Error> for CacheError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e)
        }
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

/// Contract shared by every cache backend.
///
/// Paths passed to `put` and returned from `fetch` are relative to `anchor`,
/// normally the repository root.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Restore the artifact for `hash` under `anchor`; `None` on a miss
    async fn fetch(&self, anchor: &Path, hash: &str) -> Result<Option<CacheHit>, CacheError>;

    /// Store `files` under `hash`
    async fn put(
        &self,
        anchor: &Path,
        hash: &str,
        files: &[PathBuf],
        duration_ms: u64,
    ) -> Result<(), CacheError>;

    /// Remove the artifact for one hash
    async fn clean(&self, hash: &str) -> Result<(), CacheError>;

    /// Remove every artifact
    async fn clean_all(&self) -> Result<(), CacheError>;

    /// Flush pending work
    async fn shutdown(&self) {}
}

/// Options for building the cache stack
#[derive(Debug, Clone)]
pub struct CacheOpts {
    /// Absolute local cache directory
    pub dir: PathBuf,
    /// Async upload workers; 0 writes synchronously
    pub workers: usize,
    pub skip_filesystem: bool,
    pub skip_remote: bool,
    pub remote: Option<RemoteCacheOpts>,
}

impl CacheOpts {
    /// Build options from configuration, reading the remote token from its
    /// environment variable
    pub fn from_config(root: &Path, config: &CacheConfig) -> Self {
        let remote = config.remote.as_ref().map(|remote| RemoteCacheOpts {
            url: remote.url.clone(),
            scope: remote.scope.clone(),
            token: std::env::var(&remote.token_env).ok().filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(remote.timeout_secs),
        });

        Self {
            dir: root.join(&config.dir),
            workers: config.workers,
            skip_filesystem: config.remote_only,
            skip_remote: false,
            remote,
        }
    }
}

/// Build the cache stack: local first, then remote. A single backend is
/// used directly; several are multiplexed. Uploads go through an
/// [`AsyncCache`] when `workers > 0`.
pub fn open_cache(opts: &CacheOpts) -> Result<Arc<dyn CacheBackend>, CacheError> {
    let mut backends: Vec<Arc<dyn CacheBackend>> = Vec::new();

    if !opts.skip_filesystem {
        backends.push(Arc::new(FsCache::new(&opts.dir)));
    }
    if !opts.skip_remote {
        if let Some(remote) = &opts.remote {
            backends.push(Arc::new(HttpCache::new(remote.clone())?));
        }
    }

    let backend: Arc<dyn CacheBackend> = match backends.len() {
        0 => return Err(CacheError::NoCachesEnabled),
        1 => backends.remove(0),
        _ => Arc::new(CacheMultiplexer::new(backends)),
    };
    debug!(backend = backend.name(), workers = opts.workers, "opened cache");

    if opts.workers == 0 {
        return Ok(backend);
    }
    Ok(Arc::new(AsyncCache::new(backend, opts.workers)))
}

/// Check that a stored path is relative and stays below its anchor
pub(crate) fn check_relative(path: &Path) -> Result<(), CacheError> {
    use std::path::Component;

    if path.as_os_str().is_empty() {
        return Err(CacheError::InvalidFilePath(String::new()));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                warn!(path = %path.display(), "rejected cache path");
                return Err(CacheError::PathTraversal(path.to_path_buf()));
            }
        }
    }
    Ok(())
}

//! Remote artifact cache over HTTP
//!
//! Artifacts live at `<base>/artifacts/<hash>?scope=<id>`. Uploads carry
//! `x-artifact-duration` (milliseconds) and `x-artifact-digest` (SHA-256 of
//! the archive); downloads verify the digest when the server returns one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use super::archive::{restore_archive, write_archive};
use super::{CacheBackend, CacheError, CacheHit, CacheHitMetadata, CacheSource};

const DURATION_HEADER: &str = "x-artifact-duration";
const DIGEST_HEADER: &str = "x-artifact-digest";

/// Remote cache connection options
#[derive(Debug, Clone)]
pub struct RemoteCacheOpts {
    pub url: String,
    pub scope: Option<String>,
    pub token: Option<String>,
    pub timeout: Duration,
}

/// HTTP cache backend
pub struct HttpCache {
    client: Client,
    opts: RemoteCacheOpts,
}

impl HttpCache {
    pub fn new(opts: RemoteCacheOpts) -> Result<Self, CacheError> {
        let client = Client::builder()
            .timeout(opts.timeout)
            .user_agent(concat!("baton/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, opts })
    }

    fn artifact_url(&self, hash: &str) -> String {
        format!("{}/artifacts/{}", self.opts.url.trim_end_matches('/'), hash)
    }

    fn request(&self, method: Method, hash: &str) -> RequestBuilder {
        let mut request = self.client.request(method, self.artifact_url(hash));
        if let Some(scope) = &self.opts.scope {
            request = request.query(&[("scope", scope)]);
        }
        if let Some(token) = &self.opts.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn status_error(response: Response) -> CacheError {
        let status = response.status();
        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::FORBIDDEN && message.to_lowercase().contains("disabled") {
            return CacheError::CacheDisabled(message);
        }
        CacheError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

fn sha256(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[async_trait]
impl CacheBackend for HttpCache {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip(self, anchor), fields(url = %self.opts.url))]
    async fn fetch(&self, anchor: &Path, hash: &str) -> Result<Option<CacheHit>, CacheError> {
        let response = self.request(Method::GET, hash).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("remote cache miss");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::status_error(response).await);
        }

        let headers = response.headers();
        let duration = headers
            .get(DURATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let expected = headers
            .get(DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await?;
        if let Some(expected) = expected {
            let actual = sha256(&body);
            if actual != expected {
                return Err(CacheError::IntegrityMismatch { expected, actual });
            }
        }

        let anchor = anchor.to_path_buf();
        let files = tokio::task::spawn_blocking(move || restore_archive(&body[..], &anchor)).await??;
        debug!(files = files.len(), "remote cache hit");

        Ok(Some(CacheHit {
            metadata: CacheHitMetadata {
                source: CacheSource::Remote,
                time_saved: duration,
            },
            files,
        }))
    }

    #[instrument(skip(self, anchor, files), fields(url = %self.opts.url, files = files.len()))]
    async fn put(
        &self,
        anchor: &Path,
        hash: &str,
        files: &[PathBuf],
        duration_ms: u64,
    ) -> Result<(), CacheError> {
        let anchor = anchor.to_path_buf();
        let files = files.to_vec();
        let body = tokio::task::spawn_blocking(move || write_archive(Vec::new(), &anchor, &files)).await??;
        let digest = sha256(&body);

        let response = self
            .request(Method::PUT, hash)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(DURATION_HEADER, duration_ms.to_string())
            .header(DIGEST_HEADER, digest)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        debug!("uploaded artifact");
        Ok(())
    }

    /// Remote entries are evicted by the server; nothing to remove locally
    async fn clean(&self, _hash: &str) -> Result<(), CacheError> {
        Ok(())
    }

    /// Remote entries are evicted by the server; nothing to remove locally
    async fn clean_all(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

//! Layered cache: sequential fetch with write-through, fan-out put

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use super::{CacheBackend, CacheError, CacheHit};

/// Combines backends in priority order (fastest first)
pub struct CacheMultiplexer {
    backends: RwLock<Vec<Arc<dyn CacheBackend>>>,
}

impl CacheMultiplexer {
    pub fn new(backends: Vec<Arc<dyn CacheBackend>>) -> Self {
        Self {
            backends: RwLock::new(backends),
        }
    }

    /// Names of the backends still in use
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.snapshot().iter().map(|b| b.name()).collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn CacheBackend>> {
        match self.backends.read() {
            Ok(backends) => backends.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Drop a backend that reported itself disabled
    fn remove(&self, backend: &Arc<dyn CacheBackend>) {
        let mut backends = match self.backends.write() {
            Ok(backends) => backends,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = backends.len();
        backends.retain(|b| !same_backend(b, backend));
        if backends.len() < before {
            warn!(backend = backend.name(), "cache disabled by server, skipping it for the rest of the run");
        }
    }

    fn handle_error(&self, backend: &Arc<dyn CacheBackend>, op: &str, err: CacheError) {
        match err {
            CacheError::CacheDisabled(_) => self.remove(backend),
            err => warn!(backend = backend.name(), error = %err, "cache {} failed", op),
        }
    }
}

fn same_backend(a: &Arc<dyn CacheBackend>, b: &Arc<dyn CacheBackend>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[async_trait]
impl CacheBackend for CacheMultiplexer {
    fn name(&self) -> &'static str {
        "multiplexer"
    }

    /// Try each backend in order. A hit at index `i` is written through to
    /// every backend before `i`; write-through failures never turn the hit
    /// into a miss.
    async fn fetch(&self, anchor: &Path, hash: &str) -> Result<Option<CacheHit>, CacheError> {
        let backends = self.snapshot();

        for (i, backend) in backends.iter().enumerate() {
            let hit = match backend.fetch(anchor, hash).await {
                Ok(Some(hit)) => hit,
                Ok(None) => continue,
                Err(err) => {
                    self.handle_error(backend, "fetch", err);
                    continue;
                }
            };

            let skipped = &backends[..i];
            if !skipped.is_empty() {
                debug!(hash, source = backend.name(), targets = skipped.len(), "writing cache hit through");
                let puts = skipped
                    .iter()
                    .map(|b| b.put(anchor, hash, &hit.files, hit.metadata.time_saved));
                for (target, result) in skipped.iter().zip(join_all(puts).await) {
                    if let Err(err) = result {
                        self.handle_error(target, "write-through", err);
                    }
                }
            }
            return Ok(Some(hit));
        }

        Ok(None)
    }

    /// Store in every backend concurrently; failures are logged per backend
    async fn put(
        &self,
        anchor: &Path,
        hash: &str,
        files: &[PathBuf],
        duration_ms: u64,
    ) -> Result<(), CacheError> {
        let backends = self.snapshot();
        let puts = backends.iter().map(|b| b.put(anchor, hash, files, duration_ms));
        for (backend, result) in backends.iter().zip(join_all(puts).await) {
            if let Err(err) = result {
                self.handle_error(backend, "put", err);
            }
        }
        Ok(())
    }

    async fn clean(&self, hash: &str) -> Result<(), CacheError> {
        let backends = self.snapshot();
        let results = join_all(backends.iter().map(|b| b.clean(hash))).await;
        results.into_iter().collect()
    }

    async fn clean_all(&self) -> Result<(), CacheError> {
        let backends = self.snapshot();
        let results = join_all(backends.iter().map(|b| b.clean_all())).await;
        results.into_iter().collect()
    }

    async fn shutdown(&self) {
        let backends = self.snapshot();
        join_all(backends.iter().map(|b| b.shutdown())).await;
    }
}

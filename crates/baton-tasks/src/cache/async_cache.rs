//! Background uploads on a bounded worker pool

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use super::{CacheBackend, CacheError, CacheHit};

/// How long shutdown waits for queued uploads
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

struct PutRequest {
    anchor: PathBuf,
    hash: String,
    files: Vec<PathBuf>,
    duration_ms: u64,
}

/// Wraps a backend so `put` returns once the request is queued.
///
/// At most `workers` uploads run at a time. `shutdown` closes the queue and
/// waits for every queued upload, bounded by the drain timeout.
pub struct AsyncCache {
    inner: Arc<dyn CacheBackend>,
    sender: Mutex<Option<mpsc::Sender<PutRequest>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    drain_timeout: Duration,
}

impl AsyncCache {
    /// Must be called inside a tokio runtime
    pub fn new(inner: Arc<dyn CacheBackend>, workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(workers);
        let dispatcher = tokio::spawn(dispatch(inner.clone(), receiver, workers));

        Self {
            inner,
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    fn sender(&self) -> Option<mpsc::Sender<PutRequest>> {
        self.sender.lock().ok().and_then(|s| s.clone())
    }
}

async fn dispatch(inner: Arc<dyn CacheBackend>, mut receiver: mpsc::Receiver<PutRequest>, workers: usize) {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut uploads = JoinSet::new();

    loop {
        tokio::select! {
            request = receiver.recv() => {
                let Some(request) = request else { break };
                let Ok(permit) = semaphore.clone().acquire_owned().await else { break };
                let inner = inner.clone();
                uploads.spawn(async move {
                    let _permit = permit;
                    if let Err(err) = inner
                        .put(&request.anchor, &request.hash, &request.files, request.duration_ms)
                        .await
                    {
                        warn!(hash = %request.hash, error = %err, "background cache upload failed");
                    }
                });
            }
            Some(_) = uploads.join_next(), if !uploads.is_empty() => {}
        }
    }

    while uploads.join_next().await.is_some() {}
    debug!("cache upload queue drained");
}

#[async_trait]
impl CacheBackend for AsyncCache {
    fn name(&self) -> &'static str {
        "async"
    }

    async fn fetch(&self, anchor: &Path, hash: &str) -> Result<Option<CacheHit>, CacheError> {
        self.inner.fetch(anchor, hash).await
    }

    /// Queue an upload; falls back to a direct put after shutdown
    async fn put(
        &self,
        anchor: &Path,
        hash: &str,
        files: &[PathBuf],
        duration_ms: u64,
    ) -> Result<(), CacheError> {
        let request = PutRequest {
            anchor: anchor.to_path_buf(),
            hash: hash.to_string(),
            files: files.to_vec(),
            duration_ms,
        };
        match self.sender() {
            Some(sender) => match sender.send(request).await {
                Ok(()) => Ok(()),
                Err(mpsc::error::SendError(request)) => {
                    self.inner
                        .put(&request.anchor, &request.hash, &request.files, request.duration_ms)
                        .await
                }
            },
            None => self.inner.put(anchor, hash, files, duration_ms).await,
        }
    }

    async fn clean(&self, hash: &str) -> Result<(), CacheError> {
        self.inner.clean(hash).await
    }

    async fn clean_all(&self) -> Result<(), CacheError> {
        self.inner.clean_all().await
    }

    async fn shutdown(&self) {
        // Dropping the last sender ends the dispatcher loop
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let dispatcher = self.dispatcher.lock().ok().and_then(|mut d| d.take());

        if let Some(mut dispatcher) = dispatcher {
            match tokio::time::timeout(self.drain_timeout, &mut dispatcher).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "cache upload worker panicked"),
                Err(_) => {
                    warn!(timeout_secs = self.drain_timeout.as_secs(), "timed out waiting for cache uploads");
                    dispatcher.abort();
                }
            }
        }
        self.inner.shutdown().await;
    }
}

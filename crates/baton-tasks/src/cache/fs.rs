//! Local filesystem cache

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::archive::{CacheReader, CacheWriter};
use super::{CacheBackend, CacheError, CacheHit, CacheHitMetadata, CacheSource};

const ARCHIVE_EXT: &str = ".tar.zst";
const META_SUFFIX: &str = "-meta.json";

/// Sidecar stored next to each archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub hash: String,
    /// Original task duration in milliseconds
    pub duration: u64,
    /// When the entry was written (RFC 3339)
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Content-addressed archive store: `<dir>/<hash>.tar.zst` plus
/// `<dir>/<hash>-meta.json`
#[derive(Debug, Clone)]
pub struct FsCache {
    cache_dir: PathBuf,
}

impl FsCache {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn archive_path(&self, hash: &str) -> PathBuf {
        self.cache_dir.join(format!("{}{}", hash, ARCHIVE_EXT))
    }

    fn meta_path(&self, hash: &str) -> PathBuf {
        self.cache_dir.join(format!("{}{}", hash, META_SUFFIX))
    }

    fn read_meta(&self, hash: &str) -> Option<CacheMetadata> {
        let contents = fs::read_to_string(self.meta_path(hash)).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn write_meta(&self, meta: &CacheMetadata) -> Result<(), CacheError> {
        let path = self.meta_path(&meta.hash);
        let temp = path.with_extension(format!("json.{}.tmp", std::process::id()));
        let json = serde_json::to_string_pretty(meta)?;
        fs::write(&temp, json)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }

    fn fetch_blocking(&self, anchor: &Path, hash: &str) -> Result<Option<CacheHit>, CacheError> {
        let archive = self.archive_path(hash);
        if !archive.is_file() {
            debug!(hash, "local cache miss");
            return Ok(None);
        }

        let files = CacheReader::open(&archive)?.restore(anchor)?;
        let duration = self.read_meta(hash).map(|m| m.duration).unwrap_or(0);
        debug!(hash, files = files.len(), "local cache hit");

        Ok(Some(CacheHit {
            metadata: CacheHitMetadata {
                source: CacheSource::Local,
                time_saved: duration,
            },
            files,
        }))
    }

    fn put_blocking(
        &self,
        anchor: &Path,
        hash: &str,
        files: &[PathBuf],
        duration_ms: u64,
    ) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir)?;
        CacheWriter::create(&self.archive_path(hash)).write(anchor, files)?;
        self.write_meta(&CacheMetadata {
            hash: hash.to_string(),
            duration: duration_ms,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        })?;
        debug!(hash, files = files.len(), "stored in local cache");
        Ok(())
    }

    /// Hashes of every stored archive
    fn hashes(&self) -> Result<Vec<String>, CacheError> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&self.cache_dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if let Some(hash) = name.strip_suffix(ARCHIVE_EXT) {
                if !hash.starts_with('.') {
                    hashes.push(hash.to_string());
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    /// Entry count and total size on disk
    pub fn status(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        for hash in self.hashes()? {
            stats.entries += 1;
            for path in [self.archive_path(&hash), self.meta_path(&hash)] {
                if let Ok(meta) = fs::metadata(&path) {
                    stats.total_size += meta.len();
                }
            }
        }
        Ok(stats)
    }

    /// Remove entries older than `max_age`
    #[instrument(skip(self), fields(dir = %self.cache_dir.display()))]
    pub fn prune(&self, max_age: Duration) -> Result<PruneStats, CacheError> {
        info!(max_age_secs = max_age.as_secs(), "pruning cache");
        let mut stats = PruneStats::default();
        let cutoff = chrono::Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();

        for hash in self.hashes()? {
            stats.total += 1;
            let created = self
                .read_meta(&hash)
                .and_then(|m| m.created_at)
                .and_then(|c| chrono::DateTime::parse_from_rfc3339(&c).ok())
                .map(|c| c.with_timezone(&chrono::Utc))
                .or_else(|| {
                    fs::metadata(self.archive_path(&hash))
                        .and_then(|m| m.modified())
                        .ok()
                        .map(chrono::DateTime::<chrono::Utc>::from)
                });

            match created {
                Some(created) if created < cutoff => {
                    self.remove(&hash)?;
                    stats.removed += 1;
                }
                _ => stats.kept += 1,
            }
        }

        info!(total = stats.total, removed = stats.removed, kept = stats.kept, "cache prune complete");
        Ok(stats)
    }

    fn remove(&self, hash: &str) -> Result<(), CacheError> {
        for path in [self.archive_path(hash), self.meta_path(hash)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for FsCache {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn fetch(&self, anchor: &Path, hash: &str) -> Result<Option<CacheHit>, CacheError> {
        let cache = self.clone();
        let anchor = anchor.to_path_buf();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || cache.fetch_blocking(&anchor, &hash)).await?
    }

    async fn put(
        &self,
        anchor: &Path,
        hash: &str,
        files: &[PathBuf],
        duration_ms: u64,
    ) -> Result<(), CacheError> {
        let cache = self.clone();
        let anchor = anchor.to_path_buf();
        let hash = hash.to_string();
        let files = files.to_vec();
        tokio::task::spawn_blocking(move || cache.put_blocking(&anchor, &hash, &files, duration_ms))
            .await?
    }

    async fn clean(&self, hash: &str) -> Result<(), CacheError> {
        self.remove(hash)
    }

    async fn clean_all(&self) -> Result<(), CacheError> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir)?;
        }
        info!(dir = %self.cache_dir.display(), "local cache cleared");
        Ok(())
    }
}

/// Statistics from a prune operation
#[derive(Debug, Default)]
pub struct PruneStats {
    /// Total entries found
    pub total: usize,
    /// Entries removed
    pub removed: usize,
    /// Entries kept
    pub kept: usize,
}

/// Local cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    pub entries: usize,
    /// Total size in bytes
    pub total_size: u64,
}

impl CacheStats {
    /// Human-readable total size
    pub fn formatted_size(&self) -> String {
        const KB: f64 = 1024.0;
        let size = self.total_size as f64;
        if size < KB {
            format!("{} B", self.total_size)
        } else if size < KB * KB {
            format!("{:.1} KB", size / KB)
        } else if size < KB * KB * KB {
            format!("{:.1} MB", size / (KB * KB))
        } else {
            format!("{:.1} GB", size / (KB * KB * KB))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FsCache) {
        let temp = TempDir::new().unwrap();
        let cache = FsCache::new(&temp.path().join("cache"));
        (temp, cache)
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_put_then_fetch_into_fresh_repo() {
        let (temp, cache) = setup();
        let repo = temp.path().join("repo");
        write(&repo, "packages/util/dist/index.js", "built");
        let files = vec![PathBuf::from("packages/util/dist/index.js")];

        cache.put(&repo, "abc123", &files, 1500).await.unwrap();

        let fresh_repo = temp.path().join("fresh");
        fs::create_dir_all(&fresh_repo).unwrap();
        let fresh = FsCache::new(cache.cache_dir());
        let hit = fresh.fetch(&fresh_repo, "abc123").await.unwrap().unwrap();

        assert_eq!(hit.metadata.source, CacheSource::Local);
        assert_eq!(hit.metadata.time_saved, 1500);
        assert_eq!(hit.files, files);
        assert_eq!(
            fs::read(fresh_repo.join("packages/util/dist/index.js")).unwrap(),
            b"built"
        );
    }

    #[tokio::test]
    async fn test_miss() {
        let (temp, cache) = setup();
        assert!(cache.fetch(temp.path(), "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_clean_and_clean_all() {
        let (temp, cache) = setup();
        write(temp.path(), "a.txt", "a");
        let files = vec![PathBuf::from("a.txt")];
        cache.put(temp.path(), "one", &files, 0).await.unwrap();
        cache.put(temp.path(), "two", &files, 0).await.unwrap();

        let stats = cache.status().unwrap();
        assert_eq!(stats.entries, 2);
        assert!(stats.total_size > 0);

        cache.clean("one").await.unwrap();
        assert_eq!(cache.status().unwrap().entries, 1);

        cache.clean_all().await.unwrap();
        assert_eq!(cache.status().unwrap().entries, 0);
    }

    #[tokio::test]
    async fn test_prune_old_entries() {
        let (temp, cache) = setup();
        write(temp.path(), "a.txt", "a");
        let files = vec![PathBuf::from("a.txt")];
        cache.put(temp.path(), "fresh", &files, 0).await.unwrap();
        cache.put(temp.path(), "stale", &files, 0).await.unwrap();
        cache
            .write_meta(&CacheMetadata {
                hash: "stale".to_string(),
                duration: 0,
                created_at: Some("2000-01-01T00:00:00Z".to_string()),
            })
            .unwrap();

        let stats = cache.prune(Duration::from_secs(3600)).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.kept, 1);
        assert!(cache.fetch(temp.path(), "stale").await.unwrap().is_none());
    }

    #[test]
    fn test_formatted_size() {
        let stats = CacheStats {
            entries: 0,
            total_size: 1536,
        };
        assert_eq!(stats.formatted_size(), "1.5 KB");
        let stats = CacheStats {
            entries: 0,
            total_size: 500,
        };
        assert_eq!(stats.formatted_size(), "500 B");
    }
}

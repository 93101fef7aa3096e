//! `src/cache/page_cache.rs`
//! ============================================================================
//! # Rasterized PDF page cache
//!
//! Pages are keyed by path plus modification time, so an edited document is
//! rasterized again while page navigation and re-visits reuse the decoded
//! images. Failed and superseded loads are never cached.

use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant, SystemTime},
};

use compact_str::ToCompactString;
use moka::future::Cache;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::CacheConfig,
    error::{CoreError, CoreResult},
    preview::model::PageImage,
};

/// Cache key: normalized path and the file's mtime when it was loaded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub path: Arc<str>,
    pub modified: Option<SystemTime>,
}

impl PageKey {
    /// Build a key from the current metadata of `path`.
    pub async fn for_path(path: &Path) -> Self {
        let modified = tokio::fs::metadata(path)
            .await
            .and_then(|meta| meta.modified())
            .ok();

        Self {
            path: Arc::from(path.to_string_lossy().replace('\\', "/")),
            modified,
        }
    }
}

pub type Pages = Arc<[PageImage]>;

#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    total_load_time_ns: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[expect(clippy::cast_possible_truncation, reason = "Expected accuracy")]
    fn record_load(&self, duration: Duration, success: bool) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.total_load_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);

        if !success {
            self.load_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let loads = self.loads.load(Ordering::Relaxed);
        let total_load_time_ns = self.total_load_time_ns.load(Ordering::Relaxed);

        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads,
            load_failures: self.load_failures.load(Ordering::Relaxed),
            average_load_penalty: if loads > 0 {
                Duration::from_nanos(total_load_time_ns / loads)
            } else {
                Duration::ZERO
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub average_load_penalty: Duration,
}

impl CacheStatsSnapshot {
    #[expect(clippy::cast_precision_loss, reason = "Expected precision loss")]
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Clone)]
pub struct PageCache {
    inner: Cache<PageKey, Pages>,
    stats: Arc<CacheStats>,
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("entries", &self.inner.entry_count())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl PageCache {
    #[must_use]
    pub fn with_config(config: &CacheConfig) -> Self {
        let inner = Cache::builder()
            .max_capacity(config.max_documents)
            .time_to_idle(config.tti)
            .build();

        Self {
            inner,
            stats: Arc::new(CacheStats::default()),
        }
    }

    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Return cached pages for `key`, or run `loader` once.
    ///
    /// An empty page list is a decode error. Concurrent callers for the same
    /// key share one load.
    #[instrument(skip(self, loader), fields(cache_key = %key.path, operation_type = "page_cache_get_or_load"))]
    pub async fn get_or_load<F, Fut>(&self, key: PageKey, loader: F) -> CoreResult<Pages>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = CoreResult<Vec<PageImage>>> + Send,
    {
        if let Some(pages) = self.inner.get(&key).await {
            self.stats.record_hit();
            debug!(
                marker = "CACHE_OPERATION",
                operation_type = "cache_hit",
                cache_key = %key.path,
                pages = pages.len(),
                "Reusing rasterized pages"
            );
            return Ok(pages);
        }

        self.stats.record_miss();

        let stats = Arc::clone(&self.stats);
        let key_path = Arc::clone(&key.path);
        let load_start = Instant::now();

        let result = self
            .inner
            .try_get_with(key, async move {
                let loaded = loader().await.and_then(|pages| {
                    if pages.is_empty() {
                        Err(CoreError::decode(
                            Path::new(key_path.as_ref()),
                            "document has no pages",
                        ))
                    } else {
                        Ok(Pages::from(pages))
                    }
                });

                let elapsed = load_start.elapsed();
                stats.record_load(elapsed, loaded.is_ok());

                match &loaded {
                    Ok(pages) => info!(
                        marker = "CACHE_OPERATION",
                        operation_type = "loader_success",
                        cache_key = %key_path,
                        pages = pages.len(),
                        load_duration_ms = elapsed.as_millis(),
                        "Rasterized document cached"
                    ),
                    Err(e) => warn!(
                        marker = "CACHE_OPERATION",
                        operation_type = "loader_failure",
                        cache_key = %key_path,
                        error = %e,
                        "Rasterization failed, not caching"
                    ),
                }

                loaded
            })
            .await;

        result.map_err(unshare)
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Recover an owned error from moka's shared one.
fn unshare(err: Arc<CoreError>) -> CoreError {
    Arc::try_unwrap(err).unwrap_or_else(|shared| match &*shared {
        CoreError::Superseded { generation } => CoreError::Superseded {
            generation: *generation,
        },
        CoreError::Decode { path, reason } => CoreError::Decode {
            path: path.clone(),
            reason: reason.clone(),
        },
        CoreError::ExternalTool { command, reason } => CoreError::ExternalTool {
            command: command.clone(),
            reason: reason.clone(),
        },
        CoreError::ToolTimeout {
            command,
            timeout_ms,
        } => CoreError::ToolTimeout {
            command: command.clone(),
            timeout_ms: *timeout_ms,
        },
        other => CoreError::Cache(other.to_compact_string()),
    })
}

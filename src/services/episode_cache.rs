use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::episode::{Episode, SeasonKey};
use crate::repositories::episode::EpisodeRepository;

/// Default number of season listings kept in memory.
pub const DEFAULT_CAPACITY: u64 = 10_000;

/// Loads in flight for one key.
///
/// `epoch` is bumped by every invalidation. A load remembers the epoch it
/// started under and may only store its result if that epoch is still current,
/// so a fetch that raced a write can never reinstate pre-write data. The entry
/// is dropped as soon as the last load for the key finishes.
#[derive(Default)]
struct PendingLoads {
    epoch: u64,
    in_flight: usize,
}

type LoadTable = Arc<Mutex<HashMap<SeasonKey, PendingLoads>>>;

/// A bounded cache of episode listings keyed by `(show, season)`.
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct EpisodeCache {
    entries: Cache<SeasonKey, Arc<Vec<Episode>>>,
    loads: LoadTable,
    source: Arc<dyn EpisodeRepository>,
}

impl EpisodeCache {
    /// Creates a new `EpisodeCache` that loads misses from `source`.
    ///
    /// # Arguments
    ///
    /// * `source` - The episode storage read on a miss.
    /// * `capacity` - The most listings kept at once. Older, less used ones are evicted.
    /// * `max_age` - How long a listing may be served before it is reloaded. `None` keeps
    ///   listings until they are invalidated or evicted.
    pub fn new(
        source: Arc<dyn EpisodeRepository>,
        capacity: u64,
        max_age: Option<Duration>,
    ) -> Self {
        let mut builder = Cache::builder().max_capacity(capacity);
        if let Some(max_age) = max_age {
            builder = builder.time_to_live(max_age);
        }

        Self {
            entries: builder.build(),
            loads: Arc::new(Mutex::new(HashMap::new())),
            source,
        }
    }

    /// Gets the episodes of one season, loading them on a miss.
    ///
    /// The load runs in its own task with no lock held. If the caller goes
    /// away the load still completes and fills the cache.
    ///
    /// # Returns
    ///
    /// The listing ordered by episode number, or the storage error of the load.
    pub async fn get(&self, key: SeasonKey) -> Result<Arc<Vec<Episode>>> {
        if let Some(episodes) = self.entries.get(&key).await {
            tracing::debug!("Episode cache hit for {}", key);
            return Ok(episodes);
        }

        tracing::debug!("Episode cache miss for {}", key);
        let epoch = self.begin_load(key).await;

        let entries = self.entries.clone();
        let loads = self.loads.clone();
        let source = self.source.clone();
        tokio::spawn(async move {
            let loaded = source.find_by_season(key).await.map(Arc::new);
            finish_load(&loads, &entries, key, epoch, loaded.as_ref().ok()).await;
            loaded
        })
        .await
        .map_err(|e| AppError::Internal(format!("Episode load task failed: {}", e)))?
    }

    /// Drops the entry for `key`. Loads already in flight for it are not stored.
    pub async fn invalidate(&self, key: SeasonKey) {
        let mut loads = self.loads.lock().await;
        if let Some(pending) = loads.get_mut(&key) {
            pending.epoch += 1;
        }
        self.entries.invalidate(&key).await;
        tracing::info!("Episode cache invalidated for {}", key);
    }

    /// Loads `keys` into the cache one after another, stopping early once
    /// `cancel` fires. Returns how many keys were loaded.
    pub async fn warm(&self, keys: &[SeasonKey], cancel: &CancellationToken) -> usize {
        let mut loaded = 0;

        for key in keys {
            if cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.get(*key) => match result {
                    Ok(_) => loaded += 1,
                    Err(e) => tracing::warn!("Failed to warm episode cache for {}: {}", key, e),
                },
            }
        }

        if cancel.is_cancelled() {
            tracing::info!("Episode cache warm-up cancelled after {} of {} seasons", loaded, keys.len());
        } else {
            tracing::info!("Episode cache warmed with {} of {} seasons", loaded, keys.len());
        }
        loaded
    }

    /// Registers a load for `key` and returns the epoch it runs under.
    async fn begin_load(&self, key: SeasonKey) -> u64 {
        let mut loads = self.loads.lock().await;
        let pending = loads.entry(key).or_default();
        pending.in_flight += 1;
        pending.epoch
    }

    /// The number of cached listings.
    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count() as usize
    }

    /// The number of keys with a load in flight.
    #[cfg(test)]
    async fn pending_keys(&self) -> usize {
        self.loads.lock().await.len()
    }
}

async fn finish_load(
    loads: &Mutex<HashMap<SeasonKey, PendingLoads>>,
    entries: &Cache<SeasonKey, Arc<Vec<Episode>>>,
    key: SeasonKey,
    epoch: u64,
    episodes: Option<&Arc<Vec<Episode>>>,
) {
    let mut loads = loads.lock().await;
    let current = match loads.get_mut(&key) {
        Some(pending) => {
            pending.in_flight = pending.in_flight.saturating_sub(1);
            let current = pending.epoch == epoch;
            if pending.in_flight == 0 {
                loads.remove(&key);
            }
            current
        }
        None => false,
    };

    match episodes {
        Some(episodes) if current => entries.insert(key, episodes.clone()).await,
        Some(_) => tracing::debug!("Discarding episode load for {} superseded by a write", key),
        None => {}
    }
}

//! Inventory trigger and its cache.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::collector::MetricSource;
use crate::collector::inventory::InventorySample;
use crate::collector::SourceError;
use crate::scheduler::Job;
use crate::sink::{Dispatcher, PayloadAssembler};

/// Default inventory refresh interval (24 hours).
pub const DEFAULT_INVENTORY_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Result of [`InventoryCache::refresh_if_stale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// The cached value was young enough; the platform was not queried.
    Cached,
    /// The platform was queried and the cache replaced.
    Refreshed,
}

#[derive(Debug)]
struct CacheEntry {
    value: InventorySample,
    refreshed_at: Instant,
}

/// Last inventory reading plus when it was taken.
#[derive(Debug)]
pub struct InventoryCache<S> {
    source: S,
    max_age: Duration,
    entry: Option<CacheEntry>,
}

impl<S> InventoryCache<S>
where
    S: MetricSource<Output = InventorySample>,
{
    /// Create an empty cache whose entries expire after `max_age`.
    pub fn new(source: S, max_age: Duration) -> Self {
        Self {
            source,
            max_age,
            entry: None,
        }
    }

    /// Cached value, if any.
    pub fn get(&self) -> Option<&InventorySample> {
        self.entry.as_ref().map(|e| &e.value)
    }

    /// Whether the cache is absent or at least `max_age` old at `now`.
    pub fn is_stale_at(&self, now: Instant) -> bool {
        match &self.entry {
            Some(entry) => now.saturating_duration_since(entry.refreshed_at) >= self.max_age,
            None => true,
        }
    }

    /// Query the platform only if the cache is stale.
    ///
    /// A failed query leaves the previous entry in place.
    pub async fn refresh_if_stale(&mut self) -> Result<Refresh, SourceError> {
        self.refresh_if_stale_at(Instant::now()).await
    }

    /// [`refresh_if_stale`](Self::refresh_if_stale) against an explicit clock.
    pub async fn refresh_if_stale_at(&mut self, now: Instant) -> Result<Refresh, SourceError> {
        if !self.is_stale_at(now) {
            return Ok(Refresh::Cached);
        }
        let value = self.source.sample().await?;
        self.entry = Some(CacheEntry {
            value,
            refreshed_at: now,
        });
        Ok(Refresh::Refreshed)
    }
}

/// Inventory trigger: republishes only when the cache was refreshed.
#[derive(Debug)]
pub struct InventoryJob<S> {
    cache: InventoryCache<S>,
    interval: Duration,
    assembler: PayloadAssembler,
    dispatcher: Dispatcher,
}

impl<S> InventoryJob<S>
where
    S: MetricSource<Output = InventorySample>,
{
    /// Create the job; the cache lifetime equals the trigger interval.
    pub fn new(
        source: S,
        interval: Duration,
        assembler: PayloadAssembler,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            cache: InventoryCache::new(source, interval),
            interval,
            assembler,
            dispatcher,
        }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &InventoryCache<S> {
        &self.cache
    }
}

#[async_trait]
impl<S> Job for InventoryJob<S>
where
    S: MetricSource<Output = InventorySample>,
{
    fn name(&self) -> &'static str {
        "inventory"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&mut self) {
        match self.cache.refresh_if_stale().await {
            Ok(Refresh::Refreshed) => {
                if let Some(inventory) = self.cache.get() {
                    let point = self.assembler.assemble(inventory);
                    self.dispatcher.dispatch(vec![point], "inventory");
                    tracing::info!(host = ?inventory.host_name, "Inventory refreshed");
                }
            }
            Ok(Refresh::Cached) => tracing::debug!("Inventory cache fresh, skipped"),
            Err(e) => tracing::warn!(error = %e, "Inventory refresh failed"),
        }
    }
}

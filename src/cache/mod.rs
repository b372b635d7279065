//! Two-tier, bounded, in-memory bitmap cache with LRU-style eviction.

use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::bitmap::Bitmap;

/// Which of the two bounded compartments an entry lives in. The low tier is
/// drained first under pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTier {
    High,
    Low,
}

/// Emitted when the high tier evicts an entry to make room; the coordinator
/// consumes this channel and may persist the bitmap before it is dropped.
#[derive(Debug, Clone)]
pub struct EvictedEntry {
    pub url: String,
    pub bitmap: Bitmap,
}

/// A single bounded compartment. `None` means the tier was configured with
/// a zero limit and is effectively disabled: every `get` misses and every
/// `put` is a no-op.
struct Tier(Option<LruCache<String, Bitmap>>);

impl Tier {
    fn bounded(limit: usize) -> Self {
        Tier(NonZeroUsize::new(limit).map(LruCache::new))
    }

    fn get(&mut self, url: &str) -> Option<Bitmap> {
        self.0.as_mut().and_then(|c| c.get(url).cloned())
    }

    /// Returns `Some((evicted_url, evicted_bitmap))` only when the
    /// evicted entry's url differs from the one just inserted -- a
    /// same-key push just replaces the value, which is not an eviction.
    fn push(&mut self, url: String, bitmap: Bitmap) -> Option<(String, Bitmap)> {
        let cache = self.0.as_mut()?;
        cache
            .push(url.clone(), bitmap)
            .filter(|(evicted_url, _)| *evicted_url != url)
    }

    fn pop(&mut self, url: &str) {
        if let Some(cache) = self.0.as_mut() {
            cache.pop(url);
        }
    }

    fn clear(&mut self) {
        if let Some(cache) = self.0.as_mut() {
            cache.clear();
        }
    }

    fn len(&self) -> usize {
        self.0.as_ref().map(|c| c.len()).unwrap_or(0)
    }
}

struct Tiers {
    high: Tier,
    low: Tier,
}

/// Two bounded maps, `high` and `low`, with LRU-style eviction and
/// priority-aware memory-pressure handling.
pub struct MemoryCache {
    tiers: RwLock<Tiers>,
    clear_low_on_pressure: bool,
    clear_all_on_pressure: bool,
    eviction_sink: mpsc::UnboundedSender<EvictedEntry>,
}

impl MemoryCache {
    /// `eviction_sink` receives a [`EvictedEntry`] every time the high tier
    /// evicts a record to make room for a new insertion; the coordinator is
    /// the intended consumer. A zero tier limit disables that tier.
    pub fn new(
        high_tier_limit: usize,
        low_tier_limit: usize,
        clear_low_on_pressure: bool,
        clear_all_on_pressure: bool,
        eviction_sink: mpsc::UnboundedSender<EvictedEntry>,
    ) -> Self {
        Self {
            tiers: RwLock::new(Tiers {
                high: Tier::bounded(high_tier_limit),
                low: Tier::bounded(low_tier_limit),
            }),
            clear_low_on_pressure,
            clear_all_on_pressure,
            eviction_sink,
        }
    }

    /// Searches both tiers; a hit refreshes the entry's recency in
    /// whichever tier it lives in.
    pub async fn get(&self, url: &str) -> Option<Bitmap> {
        let mut tiers = self.tiers.write().await;
        if let Some(bitmap) = tiers.high.get(url) {
            return Some(bitmap);
        }
        if let Some(bitmap) = tiers.low.get(url) {
            return Some(bitmap);
        }
        None
    }

    /// Inserts into the requested tier, moving the entry out of the other
    /// tier first if present there. Evicting the oldest entry of a full
    /// tier happens before insertion; high-tier evictions are reported on
    /// the eviction sink.
    pub async fn put(&self, url: &str, bitmap: Bitmap, tier: CacheTier) {
        let mut tiers = self.tiers.write().await;
        match tier {
            CacheTier::High => {
                tiers.low.pop(url);
                if let Some((evicted_url, evicted_bitmap)) = tiers.high.push(url.to_string(), bitmap) {
                    debug!(url = %evicted_url, "high tier evicted entry");
                    let _ = self.eviction_sink.send(EvictedEntry {
                        url: evicted_url,
                        bitmap: evicted_bitmap,
                    });
                }
            }
            CacheTier::Low => {
                tiers.high.pop(url);
                tiers.low.push(url.to_string(), bitmap);
            }
        }
    }

    pub async fn remove(&self, url: &str) {
        let mut tiers = self.tiers.write().await;
        tiers.high.pop(url);
        tiers.low.pop(url);
    }

    /// Drains the low tier. Intended for both the explicit
    /// `clear_low_tier` admin op and a pressure signal when
    /// `clear_low_on_pressure` is set.
    pub async fn evict_low_tier(&self) {
        let mut tiers = self.tiers.write().await;
        tiers.low.clear();
    }

    pub async fn evict_all(&self) {
        let mut tiers = self.tiers.write().await;
        tiers.high.clear();
        tiers.low.clear();
    }

    /// Applies the configured memory-pressure policy: drains the low tier
    /// if `clear_low_on_pressure`, or both tiers if `clear_all_on_pressure`.
    pub async fn on_memory_pressure(&self) {
        if self.clear_all_on_pressure {
            self.evict_all().await;
        } else if self.clear_low_on_pressure {
            self.evict_low_tier().await;
        }
    }

    pub async fn count(&self, tier: CacheTier) -> usize {
        let tiers = self.tiers.read().await;
        match tier {
            CacheTier::High => tiers.high.len(),
            CacheTier::Low => tiers.low.len(),
        }
    }
}

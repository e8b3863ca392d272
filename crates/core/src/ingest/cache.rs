use crate::domain::price::{PriceSnapshot, SourceId};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

pub const DEFAULT_TTL_MINUTES: i64 = 15;

/// Time source for TTL checks, injected so expiry is testable without
/// wall-clock sleeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    inserted_at: DateTime<Utc>,
    snapshot: PriceSnapshot,
}

/// Short-TTL memoization of the last good reading per source, guarding
/// the upstream sites from redundant fetches. Entries expire a fixed TTL
/// after insertion; a failed refresh never evicts the previous entry.
pub struct PriceCache {
    ttl: Duration,
    entries: RwLock<HashMap<SourceId, CacheEntry>>,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_ttl_from_env() -> Self {
        let minutes = std::env::var("PRICE_CACHE_TTL_MINUTES")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(DEFAULT_TTL_MINUTES);
        Self::new(Duration::minutes(minutes))
    }

    pub fn get(&self, source: SourceId, now: DateTime<Utc>) -> Option<PriceSnapshot> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(&source)?;
        (now - entry.inserted_at < self.ttl).then(|| entry.snapshot.clone())
    }

    pub fn put(&self, snapshot: PriceSnapshot, now: DateTime<Utc>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                snapshot.source,
                CacheEntry {
                    inserted_at: now,
                    snapshot,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(source: SourceId, per_gram: f64) -> PriceSnapshot {
        PriceSnapshot::new(Utc::now(), per_gram, per_gram, per_gram, None, None, source).unwrap()
    }

    #[test]
    fn entry_is_served_within_ttl() {
        let cache = PriceCache::new(Duration::minutes(15));
        let t0 = Utc::now();
        cache.put(snapshot(SourceId::Emasku, 1_874_000.0), t0);

        let hit = cache.get(SourceId::Emasku, t0 + Duration::minutes(14));
        assert_eq!(hit.unwrap().price_per_gram, 1_874_000.0);
    }

    #[test]
    fn entry_expires_after_ttl() {
        let cache = PriceCache::new(Duration::minutes(15));
        let t0 = Utc::now();
        cache.put(snapshot(SourceId::Emasku, 1_874_000.0), t0);

        assert!(cache.get(SourceId::Emasku, t0 + Duration::minutes(15)).is_none());
    }

    #[test]
    fn sources_are_cached_independently() {
        let cache = PriceCache::new(Duration::minutes(15));
        let t0 = Utc::now();
        cache.put(snapshot(SourceId::Emasku, 1_874_000.0), t0);

        assert!(cache.get(SourceId::Pegadaian, t0).is_none());
        assert!(cache.get(SourceId::Emasku, t0).is_some());
    }

    #[test]
    fn put_overwrites_previous_entry() {
        let cache = PriceCache::new(Duration::minutes(15));
        let t0 = Utc::now();
        cache.put(snapshot(SourceId::Emasku, 1_874_000.0), t0);
        cache.put(snapshot(SourceId::Emasku, 1_880_000.0), t0 + Duration::minutes(1));

        let hit = cache.get(SourceId::Emasku, t0 + Duration::minutes(2));
        assert_eq!(hit.unwrap().price_per_gram, 1_880_000.0);
    }
}

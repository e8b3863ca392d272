use crate::domain::price::{PriceSnapshot, SourceId};
use crate::ingest::cache::{Clock, PriceCache};
use crate::ingest::error::{AggregateFailure, SourceError};
use crate::ingest::source::{PriceSourceClient, DEFAULT_TIMEOUT_SECS};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchOptions {
    /// Bypass the cache and force a live fetch. A failed forced fetch
    /// leaves stale cache entries intact.
    pub refresh: bool,
    /// Attempt only this source instead of the priority order.
    pub source: Option<SourceId>,
}

type FetchResult = Result<PriceSnapshot, AggregateFailure>;

#[derive(Default)]
struct CycleSlot {
    last: Option<(FetchOptions, FetchResult)>,
}

/// Tries sources in priority order until one yields a valid snapshot.
/// Each source gets exactly one bounded attempt per cycle; all failures
/// are collected into an [`AggregateFailure`] when the list is exhausted.
///
/// Cycles are coalesced: while one cycle is in flight, callers with the
/// same options wait for it and receive its result instead of starting a
/// duplicate network sequence.
pub struct FallbackAggregator {
    sources: Vec<Arc<dyn PriceSourceClient>>,
    cache: PriceCache,
    clock: Arc<dyn Clock>,
    attempt_timeout: Duration,
    generation: AtomicU64,
    slot: Mutex<CycleSlot>,
}

impl FallbackAggregator {
    pub fn new(
        sources: Vec<Arc<dyn PriceSourceClient>>,
        cache: PriceCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let timeout_secs = std::env::var("SOURCE_ATTEMPT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::with_attempt_timeout(sources, cache, clock, Duration::from_secs(timeout_secs))
    }

    pub fn with_attempt_timeout(
        sources: Vec<Arc<dyn PriceSourceClient>>,
        cache: PriceCache,
        clock: Arc<dyn Clock>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            cache,
            clock,
            attempt_timeout,
            generation: AtomicU64::new(0),
            slot: Mutex::new(CycleSlot::default()),
        }
    }

    pub async fn fetch(&self, opts: FetchOptions) -> FetchResult {
        // Fast path: the first source we would consult has a fresh entry.
        if let Some(snapshot) = self.head_cached(opts) {
            return Ok(snapshot);
        }

        let observed = self.generation.load(Ordering::SeqCst);
        let mut slot = self.slot.lock().await;

        // A cycle completed while we waited for the lock; callers that
        // were queued behind it all observe that cycle's outcome.
        if self.generation.load(Ordering::SeqCst) != observed {
            if let Some((key, result)) = &slot.last {
                if *key == opts {
                    return result.clone();
                }
            }
            if let Some(snapshot) = self.head_cached(opts) {
                return Ok(snapshot);
            }
        }

        let result = self.run_cycle(opts).await;
        slot.last = Some((opts, result.clone()));
        self.generation.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn order(&self, opts: FetchOptions) -> Vec<Arc<dyn PriceSourceClient>> {
        match opts.source {
            Some(id) => self
                .sources
                .iter()
                .filter(|s| s.id() == id)
                .cloned()
                .collect(),
            None => self.sources.clone(),
        }
    }

    fn head_cached(&self, opts: FetchOptions) -> Option<PriceSnapshot> {
        if opts.refresh {
            return None;
        }
        let head = self.order(opts).into_iter().next()?;
        self.cache.get(head.id(), self.clock.now())
    }

    async fn run_cycle(&self, opts: FetchOptions) -> FetchResult {
        let order = self.order(opts);
        if order.is_empty() {
            let id = opts.source.unwrap_or(SourceId::Emasku);
            return Err(AggregateFailure {
                attempts: vec![(id, SourceError::NotConfigured)],
            });
        }

        let mut attempts = Vec::new();
        for source in order {
            let id = source.id();
            if !opts.refresh {
                if let Some(snapshot) = self.cache.get(id, self.clock.now()) {
                    return Ok(snapshot);
                }
            }

            match self.attempt(source.as_ref()).await {
                Ok(snapshot) => {
                    self.cache.put(snapshot.clone(), self.clock.now());
                    return Ok(snapshot);
                }
                Err(err) => {
                    tracing::warn!(source = %id, error = %err, "price source attempt failed; falling back");
                    attempts.push((id, err));
                }
            }
        }

        let failure = AggregateFailure { attempts };
        tracing::error!(error = %failure, "price fetch cycle exhausted every source");
        Err(failure)
    }

    /// One attempt per source per cycle, bounded by the attempt timeout.
    /// Expiry is an ordinary source failure and the fallback continues.
    async fn attempt(&self, source: &dyn PriceSourceClient) -> Result<PriceSnapshot, SourceError> {
        let fetched_at = self.clock.now();
        match tokio::time::timeout(self.attempt_timeout, source.fetch(fetched_at)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.attempt_timeout.as_secs())),
        }
    }
}

//! Memoized forecasts.
//!
//! Entries are keyed by `(skill, as_of, config fingerprint)` and carry a
//! token identifying the exact input window and ontology version they were
//! computed from. A lookup with a different token is a miss, so a stale
//! forecast is never served even if explicit invalidation was skipped.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::config::fingerprint_of;
use crate::demand::Period;
use crate::skill::SkillId;

use super::ForecastResult;

/// Cache key: surviving skill id, as-of period, forecast config fingerprint.
pub type CacheKey = (SkillId, Period, u64);

#[derive(Debug, Clone)]
struct Entry {
    token: u64,
    result: ForecastResult,
}

/// Concurrent forecast memoization table.
#[derive(Debug, Default)]
pub struct ForecastCache {
    entries: DashMap<CacheKey, Entry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Token for an input window: its first period, every count in it and the
/// ontology version the counts were folded under.
pub fn window_token(first: Option<Period>, series: &[u64], ontology_version: u64) -> u64 {
    fingerprint_of(&(first, series, ontology_version))
}

impl ForecastCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `key`, if it was computed from the same window.
    pub fn get(&self, key: &CacheKey, token: u64) -> Option<ForecastResult> {
        let hit = self
            .entries
            .get(key)
            .filter(|e| e.token == token)
            .map(|e| e.result.clone());
        match hit {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(skill = %key.0, as_of = %key.1, "forecast cache hit");
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        hit
    }

    pub fn insert(&self, key: CacheKey, token: u64, result: ForecastResult) {
        self.entries.insert(key, Entry { token, result });
    }

    /// Drop every entry for `skill` whose window includes `period`.
    pub fn invalidate(&self, skill: SkillId, period: Period) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(id, as_of, _), _| !(*id == skill && *as_of >= period));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForecastConfig;
    use crate::forecast::Forecaster;

    fn sid(n: u64) -> SkillId {
        SkillId::new(n).unwrap()
    }

    fn result(skill: SkillId, as_of: Period, series: &[u64]) -> ForecastResult {
        Forecaster::new(ForecastConfig::default())
            .unwrap()
            .forecast(skill, as_of, series, 0)
    }

    #[test]
    fn hit_requires_matching_token() {
        let cache = ForecastCache::new();
        let series = [1, 2, 3];
        let key = (sid(1), Period(2), 42);
        let token = window_token(Some(Period(0)), &series, 1);
        cache.insert(key, token, result(sid(1), Period(2), &series));

        assert!(cache.get(&key, token).is_some());
        let grown = window_token(Some(Period(0)), &[1, 2, 4], 1);
        assert!(cache.get(&key, grown).is_none());
        let newer_ontology = window_token(Some(Period(0)), &series, 2);
        assert!(cache.get(&key, newer_ontology).is_none());
        assert_eq!(cache.stats(), (1, 2));
    }

    #[test]
    fn tokens_distinguish_window_start() {
        assert_ne!(
            window_token(Some(Period(0)), &[1, 2], 0),
            window_token(Some(Period(1)), &[1, 2], 0)
        );
    }

    #[test]
    fn invalidate_drops_only_affected_windows() {
        let cache = ForecastCache::new();
        for as_of in [3, 5, 7] {
            cache.insert((sid(1), Period(as_of), 0), 0, result(sid(1), Period(as_of), &[1]));
        }
        cache.insert((sid(2), Period(7), 0), 0, result(sid(2), Period(7), &[1]));

        assert_eq!(cache.invalidate(sid(1), Period(5)), 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&(sid(1), Period(3), 0), 0).is_some());
        assert!(cache.get(&(sid(2), Period(7), 0), 0).is_some());
    }
}

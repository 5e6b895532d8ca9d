//! UTC-midnight-aligned daily request budget (§4.3 "Daily budget").
//!
//! Persisted through the shared cache manager under a day-stamped key so
//! the count survives a process restart within the same UTC day. A
//! single in-process counter is kept for the hot path; it is reloaded
//! whenever the UTC date rolls over.

use std::sync::Arc;

use cascade_cache::{CacheKey, CacheManager};
use cascade_core::types::SourceName;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::warn;

const DEFAULT_DAILY_LIMIT: u64 = 10_000;
const WARN_THRESHOLD_PERCENT: f64 = 0.9;

struct State {
    day: Option<NaiveDate>,
    count: u64,
}

pub struct DailyBudget {
    limit: u64,
    cache: Arc<CacheManager>,
    state: Mutex<State>,
}

impl DailyBudget {
    #[must_use]
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self::with_limit(cache, DEFAULT_DAILY_LIMIT)
    }

    #[must_use]
    pub fn with_limit(cache: Arc<CacheManager>, limit: u64) -> Self {
        Self { limit, cache, state: Mutex::new(State { day: None, count: 0 }) }
    }

    /// Returns `true` and increments the count if the daily limit has not
    /// been reached, otherwise returns `false` without incrementing.
    pub async fn allow(&self) -> bool {
        let today = Utc::now().date_naive();
        let mut state = self.state.lock().await;

        if state.day != Some(today) {
            let key = day_key(today);
            let loaded = self
                .cache
                .get_raw(&key)
                .await
                .ok()
                .flatten()
                .and_then(|hit| hit.value.as_u64())
                .unwrap_or(0);
            state.day = Some(today);
            state.count = loaded;
        }

        if state.count >= self.limit {
            return false;
        }

        state.count += 1;
        let usage = state.count as f64 / self.limit as f64;
        if usage >= WARN_THRESHOLD_PERCENT {
            warn!(count = state.count, limit = self.limit, "scanner-intel daily budget nearing limit");
        }

        let key = day_key(today);
        let ttl = seconds_until_next_utc_midnight();
        if let Err(e) = self.cache.put_raw(&key, serde_json::json!(state.count), ttl).await {
            warn!(error = %e, "failed to persist scanner-intel daily budget count");
        }

        true
    }
}

fn day_key(day: NaiveDate) -> CacheKey {
    CacheKey::new(SourceName::Greynoise, format!("_daily_budget:{day}"))
}

fn seconds_until_next_utc_midnight() -> u64 {
    let now = Utc::now();
    let tomorrow = now.date_naive().succ_opt().unwrap_or(now.date_naive());
    let midnight = tomorrow.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    let midnight_utc = midnight.and_utc();
    (midnight_utc - now).num_seconds().max(1) as u64
}

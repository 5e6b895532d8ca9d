//! Scanner-intel HTTP source, GreyNoise-style (§4.7).
//!
//! Caching and the activity-filter decision live in the orchestrator;
//! this module only knows how to make one budgeted, rate-limited,
//! retried HTTP call per IP.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use cascade_core::types::GreynoiseRecord;
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::daily_budget::DailyBudget;

const DEFAULT_BASE_URL: &str = "https://api.greynoise.io";
const DEFAULT_RATE_PER_SEC: u32 = 10;
const DEFAULT_BURST: u32 = 10;
const MAX_RETRY_AFTER_SECS: u64 = 60;
const UPSTREAM_RETRY_ATTEMPTS: u32 = 2;
const UPSTREAM_RETRY_BASE_DELAY_MS: u64 = 500;

/// Why a lookup produced no record. Maps directly onto the cascade's
/// `_meta.skip_reasons` / `_meta.failure_reasons` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreynoiseFailure {
    DailyBudgetExhausted,
    RateLimited,
    UpstreamError,
    NetworkError,
}

impl GreynoiseFailure {
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::DailyBudgetExhausted => "daily_budget_exhausted",
            Self::RateLimited => "rate_limited",
            Self::UpstreamError => "upstream_error",
            Self::NetworkError => "network_error",
        }
    }
}

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

pub struct GreynoiseSource {
    http: Client,
    base_url: String,
    api_key_ref: String,
    api_key: OnceCell<String>,
    rate_limiter: DirectRateLimiter,
    daily_budget: Arc<DailyBudget>,
}

impl GreynoiseSource {
    #[must_use]
    pub fn new(api_key_ref: impl Into<String>, daily_budget: Arc<DailyBudget>) -> Self {
        Self::with_rate(api_key_ref, daily_budget, DEFAULT_RATE_PER_SEC, DEFAULT_BURST)
    }

    #[must_use]
    pub fn with_rate(
        api_key_ref: impl Into<String>,
        daily_budget: Arc<DailyBudget>,
        rate_per_sec: u32,
        burst: u32,
    ) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(rate_per_sec).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN));

        Self {
            http: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_ref: api_key_ref.into(),
            api_key: OnceCell::new(),
            rate_limiter: RateLimiter::direct(quota),
            daily_budget,
        }
    }

    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[instrument(skip(self), fields(ip = %ip))]
    pub async fn lookup(&self, ip: &str) -> Result<Option<GreynoiseRecord>, GreynoiseFailure> {
        if !self.daily_budget.allow().await {
            return Err(GreynoiseFailure::DailyBudgetExhausted);
        }

        self.rate_limiter.until_ready().await;

        let api_key = self
            .resolve_api_key()
            .await
            .map_err(|_| GreynoiseFailure::NetworkError)?;

        self.request_with_retries(ip, api_key).await
    }

    async fn resolve_api_key(&self) -> Result<&str, cascade_secrets::SecretError> {
        self.api_key
            .get_or_try_init(|| async { cascade_secrets::resolve(&self.api_key_ref).await })
            .await
            .map(String::as_str)
    }

    async fn request_with_retries(
        &self,
        ip: &str,
        api_key: &str,
    ) -> Result<Option<GreynoiseRecord>, GreynoiseFailure> {
        let url = format!("{}/v3/community/{ip}", self.base_url);

        let mut rate_limit_retries_left = 1u32;
        let mut upstream_attempt = 0u32;

        loop {
            debug!(url = %url, "scanner-intel request");
            let response = self
                .http
                .get(&url)
                .bearer_auth(api_key)
                .send()
                .await
                .map_err(|_| GreynoiseFailure::NetworkError)?;

            match response.status() {
                StatusCode::OK => {
                    let record: GreynoiseRecord =
                        response.json().await.map_err(|_| GreynoiseFailure::UpstreamError)?;
                    return Ok(Some(record));
                }
                StatusCode::NOT_FOUND => return Ok(None),
                StatusCode::TOO_MANY_REQUESTS => {
                    if rate_limit_retries_left == 0 {
                        return Err(GreynoiseFailure::RateLimited);
                    }
                    rate_limit_retries_left -= 1;
                    let retry_after = response
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(1)
                        .min(MAX_RETRY_AFTER_SECS);
                    warn!(retry_after, "scanner-intel rate limited, retrying once");
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                }
                status if status.is_server_error() => {
                    if upstream_attempt >= UPSTREAM_RETRY_ATTEMPTS {
                        return Err(GreynoiseFailure::UpstreamError);
                    }
                    let delay = UPSTREAM_RETRY_BASE_DELAY_MS * 2u64.pow(upstream_attempt);
                    upstream_attempt += 1;
                    warn!(status = %status, delay_ms = delay, "scanner-intel upstream error, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                _ => return Err(GreynoiseFailure::UpstreamError),
            }
        }
    }
}

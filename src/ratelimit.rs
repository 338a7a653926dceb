use anyhow::Context;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as GovernorRateLimiter};
use nonzero_ext::nonzero;
use std::{num::NonZeroU32, time::Duration};

// Fallback when the configured rate is zero. Config validation rejects that,
// but the limiter is also built directly in tests.
const MIN_REQ_PER_SEC: NonZeroU32 = nonzero!(1u32);

/// Pacing shared by every worker of a run. Booking pages and the geocoder
/// both go through the same limiter.
pub struct RateLimiter {
    req_per_sec: DefaultDirectRateLimiter,
    min_interval: Option<DefaultDirectRateLimiter>,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32, min_interval: Duration) -> anyhow::Result<Self> {
        // Limit to X total req/sec on average.
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(MIN_REQ_PER_SEC);
        let req_per_sec = GovernorRateLimiter::direct(Quota::per_second(rate));

        // No two requests closer than Y. A zero interval disables this stage.
        let min_interval = if min_interval.is_zero() {
            None
        } else {
            let quota = Quota::with_period(min_interval)
                .context("invalid minimum request interval")?;
            Some(GovernorRateLimiter::direct(quota))
        };

        Ok(RateLimiter {
            req_per_sec,
            min_interval,
        })
    }

    pub async fn wait_until_ready(&self) {
        // The average limiter goes first: callers queued behind the spacing
        // limiter would otherwise cross the per-second boundary together once
        // it frees up.
        self.req_per_sec.until_ready().await;
        if let Some(min_interval) = &self.min_interval {
            min_interval.until_ready().await;
        }
    }
}

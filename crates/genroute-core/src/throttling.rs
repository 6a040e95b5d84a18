use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock as _, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::ProviderError;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Client-side request pacing for one adapter.
///
/// Refusing locally is cheaper than provoking a vendor 429; the refusal is
/// reported as a rate-limit error so the dispatcher treats both the same way.
#[derive(Clone)]
pub struct RateGate {
    limiter: Arc<DirectRateLimiter>,
    clock: DefaultClock,
}

impl std::fmt::Debug for RateGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGate").finish_non_exhaustive()
    }
}

impl RateGate {
    /// Allows `requests` calls per `period`, all of which may burst at once.
    pub fn new(requests: NonZeroU32, period: Duration) -> Self {
        let quota = quota_from_window(period, requests);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            clock: DefaultClock::default(),
        }
    }

    /// Takes one request permit or reports how long until the next one.
    pub fn acquire(&self) -> Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    pub fn acquire_for(&self, provider: &str) -> Result<(), ProviderError> {
        self.acquire().map_err(|wait| {
            ProviderError::rate_limited(
                format!(
                    "{provider} local request rate exhausted; next slot in {}ms",
                    wait.as_millis()
                ),
                Some(wait),
            )
        })
    }
}

fn quota_from_window(period: Duration, requests: NonZeroU32) -> Quota {
    let seconds_per_cell = (period.as_secs_f64() / f64::from(requests.get())).max(0.001);
    let replenish = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(replenish)
        .unwrap_or_else(|| Quota::per_second(requests))
        .allow_burst(requests)
}

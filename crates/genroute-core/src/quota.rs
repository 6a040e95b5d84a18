//! Per-provider usage budgets over fixed windows.
//!
//! Quotas are soft: a provider over budget is only excluded from selection,
//! the request itself can still succeed elsewhere. If the counter store fails
//! the guard fails open so a broken store never blocks generation.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::health::duration_secs;

/// Longest quota window accepted from configuration.
pub const MAX_QUOTA_WINDOW: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Configured budget for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimit {
    pub limit: u64,
    #[serde(rename = "window_secs", with = "duration_secs")]
    pub window: Duration,
}

impl QuotaLimit {
    pub const fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }

    pub const fn daily(limit: u64) -> Self {
        Self::new(limit, Duration::from_secs(24 * 60 * 60))
    }
}

/// Usage counter for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRecord {
    pub used_amount: u64,
    pub limit_amount: u64,
    pub window_reset_at: Instant,
}

impl QuotaRecord {
    pub const fn remaining(&self) -> u64 {
        self.limit_amount.saturating_sub(self.used_amount)
    }

    pub const fn allows(&self, cost_units: u64) -> bool {
        self.used_amount.saturating_add(cost_units) <= self.limit_amount
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    #[error("quota store unavailable: {0}")]
    Unavailable(String),
}

/// Backing counter store. Providers without a configured limit have no record.
pub trait QuotaStore: Send + Sync + Debug {
    fn record(&self, provider: &str) -> Result<Option<QuotaRecord>, QuotaError>;

    /// Zeroes usage and moves the window forward when `now` has reached the reset time.
    /// Returns whether a reset happened.
    fn reset_if_due(&self, provider: &str, now: Instant) -> Result<bool, QuotaError>;

    fn add_usage(&self, provider: &str, cost_units: u64) -> Result<(), QuotaError>;
}

#[derive(Debug)]
struct WindowState {
    record: QuotaRecord,
    window: Duration,
}

/// Process-local store with one lock per provider.
#[derive(Debug, Default)]
pub struct InMemoryQuotaStore {
    windows: HashMap<String, Mutex<WindowState>>,
}

impl InMemoryQuotaStore {
    pub fn new<I, S>(limits: I, now: Instant) -> Self
    where
        I: IntoIterator<Item = (S, QuotaLimit)>,
        S: Into<String>,
    {
        let windows = limits
            .into_iter()
            .map(|(name, limit)| {
                let state = WindowState {
                    record: QuotaRecord {
                        used_amount: 0,
                        limit_amount: limit.limit,
                        window_reset_at: instant_after(now, limit.window),
                    },
                    window: limit.window,
                };
                (name.into(), Mutex::new(state))
            })
            .collect();

        Self { windows }
    }

    fn with_state<T>(
        &self,
        provider: &str,
        apply: impl FnOnce(&mut WindowState) -> T,
    ) -> Result<Option<T>, QuotaError> {
        let Some(state) = self.windows.get(provider) else {
            return Ok(None);
        };
        let mut state = state.lock().map_err(|_| {
            QuotaError::Unavailable(format!("quota counter for '{provider}' is poisoned"))
        })?;
        Ok(Some(apply(&mut state)))
    }
}

impl QuotaStore for InMemoryQuotaStore {
    fn record(&self, provider: &str) -> Result<Option<QuotaRecord>, QuotaError> {
        self.with_state(provider, |state| state.record)
    }

    fn reset_if_due(&self, provider: &str, now: Instant) -> Result<bool, QuotaError> {
        let reset = self.with_state(provider, |state| {
            if now < state.record.window_reset_at || state.window.is_zero() {
                return false;
            }

            // Skip every window that elapsed while idle so the boundary stays aligned.
            let overdue = now.saturating_duration_since(state.record.window_reset_at);
            let windows_passed = overdue.as_nanos() / state.window.as_nanos() + 1;
            let advance = state
                .window
                .saturating_mul(u32::try_from(windows_passed).unwrap_or(u32::MAX));
            state.record.used_amount = 0;
            state.record.window_reset_at = instant_after(state.record.window_reset_at, advance);
            true
        })?;

        Ok(reset.unwrap_or(false))
    }

    fn add_usage(&self, provider: &str, cost_units: u64) -> Result<(), QuotaError> {
        self.with_state(provider, |state| {
            state.record.used_amount = state.record.used_amount.saturating_add(cost_units);
        })?;
        Ok(())
    }
}

/// `at + by`, clamped to the latest instant the platform can represent.
fn instant_after(at: Instant, by: Duration) -> Instant {
    if let Some(later) = at.checked_add(by) {
        return later;
    }

    let mut step = by / 2;
    let mut latest = at;
    while !step.is_zero() {
        if let Some(later) = latest.checked_add(step) {
            latest = later;
        } else {
            step /= 2;
        }
    }
    latest
}

/// Budget gate consulted by the dispatcher before each attempt.
#[derive(Debug, Clone)]
pub struct QuotaGuard {
    store: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
}

impl Default for QuotaGuard {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryQuotaStore::default()), Arc::new(SystemClock))
    }
}

impl QuotaGuard {
    pub fn new(store: Arc<dyn QuotaStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn in_memory<I, S>(limits: I, clock: Arc<dyn Clock>) -> Self
    where
        I: IntoIterator<Item = (S, QuotaLimit)>,
        S: Into<String>,
    {
        let store = InMemoryQuotaStore::new(limits, clock.now());
        Self::new(Arc::new(store), clock)
    }

    /// False only when the provider has a known budget that `cost_units` would exceed.
    pub fn has_budget(&self, provider: &str, cost_units: u64) -> bool {
        self.maybe_reset_window(provider);

        match self.store.record(provider) {
            Ok(Some(record)) => record.allows(cost_units),
            Ok(None) => true,
            Err(error) => {
                warn!(provider, %error, "quota check failed; allowing request");
                true
            }
        }
    }

    /// Charges usage after a successful invocation.
    pub fn consume(&self, provider: &str, cost_units: u64) {
        if let Err(error) = self.store.add_usage(provider, cost_units) {
            warn!(provider, cost_units, %error, "failed to record quota usage");
        }
    }

    pub fn maybe_reset_window(&self, provider: &str) {
        match self.store.reset_if_due(provider, self.clock.now()) {
            Ok(true) => debug!(provider, "quota window rolled over"),
            Ok(false) => {}
            Err(error) => warn!(provider, %error, "quota window rollover failed"),
        }
    }

    pub fn usage(&self, provider: &str) -> Option<QuotaRecord> {
        self.maybe_reset_window(provider);
        self.store.record(provider).ok().flatten()
    }

    pub fn time_until_reset(&self, record: &QuotaRecord) -> Duration {
        record
            .window_reset_at
            .saturating_duration_since(self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[derive(Debug)]
    struct BrokenStore;

    impl QuotaStore for BrokenStore {
        fn record(&self, _provider: &str) -> Result<Option<QuotaRecord>, QuotaError> {
            Err(QuotaError::Unavailable(String::from("redis down")))
        }

        fn reset_if_due(&self, _provider: &str, _now: Instant) -> Result<bool, QuotaError> {
            Err(QuotaError::Unavailable(String::from("redis down")))
        }

        fn add_usage(&self, _provider: &str, _cost_units: u64) -> Result<(), QuotaError> {
            Err(QuotaError::Unavailable(String::from("redis down")))
        }
    }

    fn guard(limit: u64, window: Duration) -> (QuotaGuard, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let guard = QuotaGuard::in_memory(
            [("elevenlabs", QuotaLimit::new(limit, window))],
            clock.clone(),
        );
        (guard, clock)
    }

    #[test]
    fn budget_check_includes_the_requested_cost() {
        let (guard, _clock) = guard(100, Duration::from_secs(60));

        assert!(guard.has_budget("elevenlabs", 100));
        guard.consume("elevenlabs", 60);
        assert!(guard.has_budget("elevenlabs", 40));
        assert!(!guard.has_budget("elevenlabs", 41));
        assert_eq!(guard.usage("elevenlabs").map(|record| record.remaining()), Some(40));
    }

    #[test]
    fn has_budget_does_not_charge_usage() {
        let (guard, _clock) = guard(10, Duration::from_secs(60));
        for _ in 0..5 {
            assert!(guard.has_budget("elevenlabs", 10));
        }
        assert_eq!(guard.usage("elevenlabs").map(|record| record.used_amount), Some(0));
    }

    #[test]
    fn window_resets_lazily_and_stays_aligned() {
        let (guard, clock) = guard(10, Duration::from_secs(60));
        let first_reset = guard.usage("elevenlabs").expect("configured").window_reset_at;
        guard.consume("elevenlabs", 10);
        assert!(!guard.has_budget("elevenlabs", 1));

        clock.advance(Duration::from_secs(150));
        assert!(guard.has_budget("elevenlabs", 10));

        let record = guard.usage("elevenlabs").expect("configured");
        assert_eq!(record.used_amount, 0);
        assert_eq!(record.window_reset_at, first_reset + Duration::from_secs(120));
    }

    #[test]
    fn oversized_window_clamps_instead_of_overflowing() {
        let (guard, clock) = guard(10, Duration::MAX);
        let reset_at = guard.usage("elevenlabs").expect("configured").window_reset_at;

        assert!(reset_at > clock.now());
        guard.consume("elevenlabs", 10);
        clock.advance(Duration::from_secs(86_400));
        assert!(!guard.has_budget("elevenlabs", 1));
    }

    #[test]
    fn providers_without_limits_are_unlimited() {
        let (guard, _clock) = guard(1, Duration::from_secs(60));
        guard.consume("openai", 1_000_000);
        assert!(guard.has_budget("openai", u64::MAX));
        assert!(guard.usage("openai").is_none());
    }

    #[test]
    fn fails_open_when_store_errors() {
        let guard = QuotaGuard::new(Arc::new(BrokenStore), Arc::new(ManualClock::new()));

        assert!(guard.has_budget("suno", 1_000));
        guard.consume("suno", 5);
        assert!(guard.usage("suno").is_none());
    }
}

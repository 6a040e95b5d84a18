//! Per-provider health with time-based half-open recovery.
//!
//! A provider becomes unhealthy once it reaches `failure_threshold`
//! consecutive failures and stays so until `cooldown` has elapsed since its
//! last failure. After that the next real call acts as the probe: success
//! clears the counter, failure restarts the cooldown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};

/// Health thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub failure_threshold: u32,
    #[serde(rename = "cooldown_secs", with = "duration_secs")]
    pub cooldown: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Health counters for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthRecord {
    pub consecutive_failures: u32,
    pub last_failure_at: Option<Instant>,
}

impl HealthRecord {
    /// `healthy = failures < threshold OR now - last_failure >= cooldown`.
    pub fn is_healthy(&self, config: &HealthConfig, now: Instant) -> bool {
        if self.consecutive_failures < config.failure_threshold {
            return true;
        }

        match self.last_failure_at {
            Some(failed_at) => now.saturating_duration_since(failed_at) >= config.cooldown,
            None => true,
        }
    }

    /// Remaining cooldown, or zero when the provider is eligible.
    pub fn cooldown_remaining(&self, config: &HealthConfig, now: Instant) -> Duration {
        if self.is_healthy(config, now) {
            return Duration::ZERO;
        }

        self.last_failure_at
            .map(|failed_at| {
                config
                    .cooldown
                    .saturating_sub(now.saturating_duration_since(failed_at))
            })
            .unwrap_or(Duration::ZERO)
    }
}

/// Thread-safe health registry. Each provider's record sits behind its own lock,
/// so providers never contend with each other.
#[derive(Debug)]
pub struct HealthTracker {
    config: HealthConfig,
    clock: Arc<dyn Clock>,
    records: HashMap<String, Mutex<HealthRecord>>,
}

impl HealthTracker {
    pub fn new<I, S>(providers: I, config: HealthConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_clock(providers, config, Arc::new(SystemClock))
    }

    pub fn with_clock<I, S>(providers: I, config: HealthConfig, clock: Arc<dyn Clock>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let records = providers
            .into_iter()
            .map(|name| (name.into(), Mutex::new(HealthRecord::default())))
            .collect();

        Self {
            config,
            clock,
            records,
        }
    }

    pub const fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Unknown providers are reported healthy; they have no record to fail.
    pub fn is_healthy(&self, provider: &str) -> bool {
        let now = self.clock.now();
        self.records
            .get(provider)
            .map(|record| lock(record).is_healthy(&self.config, now))
            .unwrap_or(true)
    }

    pub fn record_outcome(&self, provider: &str, success: bool) {
        let Some(record) = self.records.get(provider) else {
            return;
        };
        let now = self.clock.now();
        let mut record = lock(record);

        if success {
            if record.consecutive_failures >= self.config.failure_threshold {
                info!(
                    provider,
                    failures = record.consecutive_failures,
                    "provider recovered"
                );
            }
            record.consecutive_failures = 0;
            return;
        }

        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        record.last_failure_at = Some(now);

        if record.consecutive_failures == self.config.failure_threshold {
            warn!(
                provider,
                failures = record.consecutive_failures,
                cooldown_secs = self.config.cooldown.as_secs(),
                "provider marked unhealthy"
            );
        }
    }

    pub fn record(&self, provider: &str) -> Option<HealthRecord> {
        self.records.get(provider).map(|record| *lock(record))
    }

    pub fn cooldown_remaining(&self, provider: &str) -> Duration {
        let now = self.clock.now();
        self.records
            .get(provider)
            .map(|record| lock(record).cooldown_remaining(&self.config, now))
            .unwrap_or(Duration::ZERO)
    }
}

// Records are plain counters, so a panic while holding the lock cannot leave
// them half-updated in a way that matters.
fn lock(record: &Mutex<HealthRecord>) -> std::sync::MutexGuard<'_, HealthRecord> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

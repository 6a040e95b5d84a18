//! Request dispatch with priority fallback.
//!
//! For every call the dispatcher walks the fallback chain for the request's
//! task in priority order:
//!
//! 1. **Select** adapters that support the task.
//! 2. **Filter** each one just before its turn: skip it if it is unhealthy or
//!    lacks quota budget for the estimated cost. Skips are not attempts.
//! 3. **Attempt** the first survivor. Success records health and charges
//!    quota. Failure records health and moves on, unless fallback is off or
//!    `max_attempts` is reached.
//!
//! Only [`DispatchError`] ever leaves [`RequestDispatcher::dispatch`]; raw
//! [`ProviderError`]s are folded into its attempt history.
//!
//! # Cancellation
//!
//! Dropping the `dispatch` future drops the in-flight `invoke` with it. Its
//! outcome is then unknown, so nothing is recorded for that adapter.

use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::chain::FallbackChain;
use crate::health::HealthTracker;
use crate::quota::QuotaGuard;
use crate::{
    GenerationOutput, GenerationRequest, ProviderAdapter, ProviderError, ProviderErrorKind,
    ProviderResponse, TaskType,
};

/// One failed `invoke` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptFailure {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl AttemptFailure {
    fn new(provider: &str, error: &ProviderError) -> Self {
        Self {
            provider: provider.to_owned(),
            kind: error.kind(),
            message: error.message().to_owned(),
            retry_after_ms: error.retry_after().map(duration_ms),
        }
    }
}

/// Why a candidate was passed over without being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Unhealthy,
    OverQuota,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedProvider {
    pub provider: String,
    pub reason: SkipReason,
}

/// Successful dispatch outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub provider_name: String,
    pub output: GenerationOutput,
    /// Adapters invoked, including the successful one. Skips do not count.
    pub attempt_count: u32,
    pub cost_units: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_attempts: Vec<AttemptFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedProvider>,
    pub latency_ms: u64,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub generated_at: OffsetDateTime,
}

/// The only errors `dispatch` surfaces to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no available provider for {task} generation ({} skipped)", .skipped.len())]
    NoAvailableProvider {
        task: TaskType,
        skipped: Vec<SkippedProvider>,
    },

    #[error("all providers failed for {task} generation: {}", summarize(.attempts))]
    AllProvidersFailed {
        task: TaskType,
        attempts: Vec<AttemptFailure>,
    },
}

impl DispatchError {
    /// HTTP status an API layer should answer with.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NoAvailableProvider { .. } => 503,
            Self::AllProvidersFailed { .. } => 502,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoAvailableProvider { .. } => "dispatch.no_available_provider",
            Self::AllProvidersFailed { .. } => "dispatch.all_providers_failed",
        }
    }

    pub fn attempts(&self) -> &[AttemptFailure] {
        match self {
            Self::NoAvailableProvider { .. } => &[],
            Self::AllProvidersFailed { attempts, .. } => attempts,
        }
    }

    pub fn skipped(&self) -> &[SkippedProvider] {
        match self {
            Self::NoAvailableProvider { skipped, .. } => skipped,
            Self::AllProvidersFailed { .. } => &[],
        }
    }
}

fn summarize(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(|attempt| format!("{}={}", attempt.provider, attempt.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Point-in-time view of one registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSnapshot {
    pub name: String,
    pub priority: i32,
    pub tasks: Vec<TaskType>,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub cooldown_remaining_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    pub resets_in_ms: u64,
}

impl ProviderSnapshot {
    pub fn status_label(&self) -> &'static str {
        if !self.healthy {
            return "unhealthy";
        }

        match &self.quota {
            Some(quota) if quota.remaining == 0 => "over_quota",
            _ if self.consecutive_failures > 0 => "degraded",
            _ => "healthy",
        }
    }
}

/// Stateless coordinator over the fallback chain, health tracker and quota guard.
#[derive(Debug)]
pub struct RequestDispatcher {
    chain: FallbackChain,
    health: HealthTracker,
    quota: QuotaGuard,
    attempt_timeout: Option<Duration>,
}

impl RequestDispatcher {
    pub fn new(chain: FallbackChain, health: HealthTracker, quota: QuotaGuard) -> Self {
        Self {
            chain,
            health,
            quota,
            attempt_timeout: None,
        }
    }

    /// Abandons any single `invoke` that runs longer than `timeout`,
    /// recording it as a transient failure.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub const fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    pub const fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub const fn quota(&self) -> &QuotaGuard {
        &self.quota
    }

    pub async fn dispatch(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, DispatchError> {
        let started = Instant::now();
        let task = request.task_type;
        let candidates = self.chain.ordered_adapters(task);
        let attempt_limit = request.attempt_limit(candidates.len());
        let mut skipped = Vec::new();
        let mut failures: Vec<AttemptFailure> = Vec::new();

        for adapter in candidates {
            let name = adapter.name();

            if !self.health.is_healthy(name) {
                debug!(provider = name, task = %task, "skipping unhealthy provider");
                skipped.push(SkippedProvider {
                    provider: name.to_owned(),
                    reason: SkipReason::Unhealthy,
                });
                continue;
            }

            let estimated_cost = request
                .estimated_cost
                .unwrap_or_else(|| adapter.estimate_cost(request));
            if !self.quota.has_budget(name, estimated_cost) {
                debug!(provider = name, task = %task, estimated_cost, "skipping provider over quota");
                skipped.push(SkippedProvider {
                    provider: name.to_owned(),
                    reason: SkipReason::OverQuota,
                });
                continue;
            }

            let attempt = failures.len() + 1;
            debug!(provider = name, task = %task, attempt, "invoking provider");

            match self.invoke(adapter, request).await {
                Ok(response) => {
                    self.health.record_outcome(name, true);
                    let cost_units = response.cost_units.unwrap_or(estimated_cost);
                    self.quota.consume(name, cost_units);

                    if !failures.is_empty() {
                        info!(
                            provider = name,
                            task = %task,
                            failed = failures.len(),
                            "fallback provider succeeded"
                        );
                    }

                    return Ok(GenerationResult {
                        provider_name: name.to_owned(),
                        output: response.output,
                        attempt_count: u32::try_from(attempt).unwrap_or(u32::MAX),
                        cost_units,
                        failed_attempts: failures,
                        skipped,
                        latency_ms: duration_ms(started.elapsed()),
                        generated_at: OffsetDateTime::now_utc(),
                    });
                }
                Err(error) => {
                    self.health.record_outcome(name, false);
                    log_failure(name, task, attempt, &error);
                    failures.push(AttemptFailure::new(name, &error));

                    if !request.fallback_enabled || failures.len() >= attempt_limit {
                        break;
                    }
                }
            }
        }

        if failures.is_empty() {
            warn!(task = %task, skipped = skipped.len(), "no provider available");
            return Err(DispatchError::NoAvailableProvider { task, skipped });
        }

        warn!(
            task = %task,
            attempts = failures.len(),
            latency_ms = duration_ms(started.elapsed()),
            "all providers failed"
        );
        Err(DispatchError::AllProvidersFailed {
            task,
            attempts: failures,
        })
    }

    async fn invoke(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &GenerationRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let response = match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, adapter.invoke(request))
                .await
                .unwrap_or_else(|_| {
                    Err(ProviderError::transient(format!(
                        "{} timed out after {}ms",
                        adapter.name(),
                        limit.as_millis()
                    )))
                })?,
            None => adapter.invoke(request).await?,
        };

        if response.output.task_type() != request.task_type {
            return Err(ProviderError::permanent(format!(
                "{} returned {} output for a {} request",
                adapter.name(),
                response.output.task_type(),
                request.task_type
            )));
        }

        Ok(response)
    }

    /// Provider states in chain order, optionally limited to one task.
    pub fn snapshots(&self, task: Option<TaskType>) -> Vec<ProviderSnapshot> {
        self.chain
            .all()
            .filter(|adapter| task.map_or(true, |task| adapter.supported_tasks().supports(task)))
            .map(|adapter| self.snapshot(adapter))
            .collect()
    }

    fn snapshot(&self, adapter: &dyn ProviderAdapter) -> ProviderSnapshot {
        let name = adapter.name();
        let record = self.health.record(name).unwrap_or_default();
        let quota = self.quota.usage(name).map(|usage| QuotaSnapshot {
            used: usage.used_amount,
            limit: usage.limit_amount,
            remaining: usage.remaining(),
            resets_in_ms: duration_ms(self.quota.time_until_reset(&usage)),
        });

        ProviderSnapshot {
            name: name.to_owned(),
            priority: adapter.priority(),
            tasks: adapter.supported_tasks().supported_tasks(),
            healthy: self.health.is_healthy(name),
            consecutive_failures: record.consecutive_failures,
            cooldown_remaining_ms: duration_ms(self.health.cooldown_remaining(name)),
            quota,
        }
    }
}

fn log_failure(provider: &str, task: TaskType, attempt: usize, error: &ProviderError) {
    match error.kind() {
        ProviderErrorKind::Permanent => warn!(
            provider,
            task = %task,
            attempt,
            kind = %error.kind(),
            error = error.message(),
            "provider rejected request"
        ),
        ProviderErrorKind::RateLimited => warn!(
            provider,
            task = %task,
            attempt,
            kind = %error.kind(),
            retry_after_ms = error.retry_after().map(duration_ms),
            error = error.message(),
            "provider rate limited"
        ),
        ProviderErrorKind::Transient => warn!(
            provider,
            task = %task,
            attempt,
            kind = %error.kind(),
            error = error.message(),
            "provider attempt failed"
        ),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

fn serialize_rfc3339<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let formatted = value
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&formatted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::health::HealthConfig;
    use crate::quota::QuotaLimit;
    use crate::{InvokeFuture, Payload, TaskSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Stub {
        name: &'static str,
        priority: i32,
        outcome: Result<GenerationOutput, ProviderError>,
        calls: AtomicUsize,
    }

    impl Stub {
        fn ok(name: &'static str, priority: i32) -> Arc<Self> {
            Arc::new(Self {
                name,
                priority,
                outcome: Ok(GenerationOutput::Text {
                    text: format!("from {name}"),
                }),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str, priority: i32, error: ProviderError) -> Arc<Self> {
            Arc::new(Self {
                name,
                priority,
                outcome: Err(error),
                calls: AtomicUsize::new(0),
            })
        }

        fn returning(name: &'static str, output: GenerationOutput) -> Arc<Self> {
            Arc::new(Self {
                name,
                priority: 1,
                outcome: Ok(output),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProviderAdapter for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn supported_tasks(&self) -> TaskSet {
            TaskSet::only(TaskType::Text)
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn invoke<'a>(&'a self, _request: &'a GenerationRequest) -> InvokeFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self.outcome.clone().map(ProviderResponse::new);
            Box::pin(async move { outcome })
        }
    }

    fn dispatcher(adapters: Vec<Arc<Stub>>) -> RequestDispatcher {
        let names = adapters.iter().map(|adapter| adapter.name).collect::<Vec<_>>();
        let chain = FallbackChain::new(
            adapters
                .into_iter()
                .map(|adapter| adapter as Arc<dyn ProviderAdapter>)
                .collect(),
        )
        .expect("valid chain");
        let clock = Arc::new(ManualClock::new());
        let health = HealthTracker::with_clock(names, HealthConfig::default(), clock.clone());
        let quota = QuotaGuard::in_memory(Vec::<(String, QuotaLimit)>::new(), clock);
        RequestDispatcher::new(chain, health, quota)
    }

    fn text_request() -> GenerationRequest {
        GenerationRequest::new(TaskType::Text, Payload::prompt("hello")).expect("valid request")
    }

    #[tokio::test]
    async fn no_fallback_stops_after_first_failure() {
        let primary = Stub::failing("primary", 1, ProviderError::transient("down"));
        let secondary = Stub::ok("secondary", 2);
        let dispatcher = dispatcher(vec![primary.clone(), secondary.clone()]);

        let error = dispatcher
            .dispatch(&text_request().with_fallback(false))
            .await
            .expect_err("fallback disabled");

        assert_eq!(error.attempts().len(), 1);
        assert_eq!(error.status_code(), 502);
        assert_eq!(secondary.calls(), 0);
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn mismatched_output_is_treated_as_permanent_failure() {
        let confused = Stub::returning(
            "confused",
            GenerationOutput::Music { tracks: Vec::new() },
        );
        let dispatcher = dispatcher(vec![confused]);

        let error = dispatcher
            .dispatch(&text_request())
            .await
            .expect_err("wrong output kind");

        assert_eq!(error.attempts()[0].kind, ProviderErrorKind::Permanent);
    }

    #[tokio::test]
    async fn unsupported_task_has_no_candidates() {
        let dispatcher = dispatcher(vec![Stub::ok("text-only", 1)]);
        let request = GenerationRequest::new(TaskType::Music, Payload::prompt("a song"))
            .expect("valid request");

        let error = dispatcher.dispatch(&request).await.expect_err("no music adapter");

        assert_eq!(
            error,
            DispatchError::NoAvailableProvider {
                task: TaskType::Music,
                skipped: Vec::new(),
            }
        );
        assert_eq!(error.status_code(), 503);
    }

    #[tokio::test]
    async fn success_resets_health_and_reports_cost_estimate() {
        let dispatcher = dispatcher(vec![Stub::ok("solo", 1)]);
        dispatcher.health().record_outcome("solo", false);

        let result = dispatcher
            .dispatch(&text_request().with_estimated_cost(7))
            .await
            .expect("dispatch succeeds");

        assert_eq!(result.provider_name, "solo");
        assert_eq!(result.attempt_count, 1);
        assert_eq!(result.cost_units, 7);
        assert_eq!(
            dispatcher.health().record("solo").map(|record| record.consecutive_failures),
            Some(0)
        );
    }

    #[test]
    fn error_message_lists_every_attempt() {
        let error = DispatchError::AllProvidersFailed {
            task: TaskType::Image,
            attempts: vec![
                AttemptFailure::new("openai", &ProviderError::transient("503")),
                AttemptFailure::new("stability", &ProviderError::permanent("400")),
            ],
        };

        assert_eq!(
            error.to_string(),
            "all providers failed for image generation: openai=TRANSIENT, stability=PERMANENT"
        );
    }
}

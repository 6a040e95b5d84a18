//! Orchestrator configuration and dispatcher assembly.
//!
//! A config file lists the providers to register, their priorities and
//! optional quota and pacing limits:
//!
//! ```toml
//! attempt_timeout_ms = 90000
//!
//! [health]
//! failure_threshold = 3
//! cooldown_secs = 60
//!
//! [[providers]]
//! name = "elevenlabs"
//! kind = "elevenlabs"
//! priority = 10
//!
//! [providers.quota]
//! limit = 100000
//! window_secs = 86400
//!
//! [providers.rate_limit]
//! requests = 5
//! per_secs = 1
//! ```
//!
//! API keys are never read from the file. Each provider resolves its key
//! from `api_key_env` when set, then `GENROUTE_<KIND>_API_KEY`, then the
//! vendor's usual variable.

use std::env;
use std::fmt::{Debug, Display, Formatter};
use std::fs;
use std::num::NonZeroU32;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapters::{AdapterSettings, ElevenLabsAdapter, GeminiAdapter, OpenAiAdapter, SunoAdapter};
use crate::chain::FallbackChain;
use crate::clock::{Clock, SystemClock};
use crate::dispatch::RequestDispatcher;
use crate::health::{HealthConfig, HealthTracker};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::quota::{QuotaGuard, QuotaLimit, QuotaStore, MAX_QUOTA_WINDOW};
use crate::throttling::RateGate;
use crate::{ConfigError, ProviderAdapter, TaskSet, TaskType, ValidationError};

/// Vendor backing a configured provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    ElevenLabs,
    Suno,
}

impl ProviderKind {
    pub const ALL: [Self; 4] = [Self::OpenAi, Self::Gemini, Self::ElevenLabs, Self::Suno];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::ElevenLabs => "elevenlabs",
            Self::Suno => "suno",
        }
    }

    /// The vendor's conventional API key variable.
    pub const fn vendor_key_env(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::ElevenLabs => "ELEVENLABS_API_KEY",
            Self::Suno => "SUNO_API_KEY",
        }
    }

    pub fn genroute_key_env(self) -> String {
        format!("GENROUTE_{}_API_KEY", self.as_str().to_ascii_uppercase())
    }

    pub fn default_settings(self) -> AdapterSettings {
        match self {
            Self::OpenAi => OpenAiAdapter::default_settings(),
            Self::Gemini => GeminiAdapter::default_settings(),
            Self::ElevenLabs => ElevenLabsAdapter::default_settings(),
            Self::Suno => SunoAdapter::default_settings(),
        }
    }

    pub fn build_adapter(
        self,
        http_client: Arc<dyn HttpClient>,
        api_key: String,
        settings: AdapterSettings,
    ) -> Arc<dyn ProviderAdapter> {
        match self {
            Self::OpenAi => Arc::new(OpenAiAdapter::new(http_client, api_key, settings)),
            Self::Gemini => Arc::new(GeminiAdapter::new(http_client, api_key, settings)),
            Self::ElevenLabs => Arc::new(ElevenLabsAdapter::new(http_client, api_key, settings)),
            Self::Suno => Arc::new(SunoAdapter::new(http_client, api_key, settings)),
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ValidationError::InvalidProviderKind {
                value: value.to_owned(),
            })
    }
}

/// Client-side pacing for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub per_secs: u64,
}

impl RateLimitConfig {
    fn rate_gate(self) -> Option<RateGate> {
        let requests = NonZeroU32::new(self.requests)?;
        if self.per_secs == 0 {
            return None;
        }
        Some(RateGate::new(requests, Duration::from_secs(self.per_secs)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registration name; defaults to the kind's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<TaskType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

fn enabled_by_default() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            name: None,
            kind,
            priority: None,
            enabled: true,
            tasks: None,
            api_key_env: None,
            base_url: None,
            model: None,
            voice: None,
            timeout_ms: None,
            quota: None,
            rate_limit: None,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.as_str())
    }

    /// Environment variables consulted for the API key, in order.
    pub fn key_env_candidates(&self) -> Vec<String> {
        let mut candidates = Vec::with_capacity(3);
        if let Some(custom) = &self.api_key_env {
            candidates.push(custom.clone());
        }
        candidates.push(self.kind.genroute_key_env());
        candidates.push(self.kind.vendor_key_env().to_owned());
        candidates
    }

    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| env::var(name).ok())
    }

    pub fn resolve_api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.key_env_candidates()
            .iter()
            .filter_map(|name| lookup(name.as_str()))
            .find(|value| !value.trim().is_empty())
    }

    pub fn adapter_settings(&self) -> AdapterSettings {
        let mut settings = self.kind.default_settings().with_name(self.name());
        if let Some(priority) = self.priority {
            settings = settings.with_priority(priority);
        }
        if let Some(base_url) = &self.base_url {
            settings = settings.with_base_url(base_url.clone());
        }
        if let Some(model) = &self.model {
            settings = settings.with_model(model.clone());
        }
        if let Some(voice) = &self.voice {
            settings = settings.with_voice(voice.clone());
        }
        if let Some(timeout_ms) = self.timeout_ms {
            settings = settings.with_timeout_ms(timeout_ms);
        }
        if let Some(tasks) = &self.tasks {
            settings = settings.with_tasks(TaskSet::from_tasks(tasks));
        }
        if let Some(rate_gate) = self.rate_limit.and_then(RateLimitConfig::rate_gate) {
            settings = settings.with_rate_gate(rate_gate);
        }
        settings
    }
}

/// Top-level orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub health: HealthConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_ms: Option<u64>,
    pub providers: Vec<ProviderConfig>,
}

impl Default for OrchestratorConfig {
    /// Every supported vendor at its default priority, no quotas.
    fn default() -> Self {
        Self {
            health: HealthConfig::default(),
            attempt_timeout_ms: None,
            providers: ProviderKind::ALL.into_iter().map(ProviderConfig::new).collect(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }

        let mut seen = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let name = provider.name();
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyProviderName.into());
            }
            if seen.contains(&name) {
                return Err(ConfigError::DuplicateProvider {
                    name: name.to_owned(),
                });
            }
            seen.push(name);

            if let Some(quota) = provider.quota {
                check_quota_window(name, &quota)?;
            }
            if provider
                .rate_limit
                .is_some_and(|limit| limit.requests == 0 || limit.per_secs == 0)
            {
                return Err(ConfigError::InvalidRateLimit {
                    name: name.to_owned(),
                });
            }
        }

        Ok(())
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }
}

/// Assembles a [`RequestDispatcher`] from a config or from adapters
/// registered by hand.
///
/// # Example
///
/// ```rust,ignore
/// let dispatcher = DispatcherBuilder::from_config(&OrchestratorConfig::from_path("genroute.toml")?)?
///     .build()?;
///
/// // Or register adapters directly
/// let dispatcher = DispatcherBuilder::new()
///     .register(Arc::new(my_adapter))
///     .with_quota("my-adapter", QuotaLimit::daily(10_000))
///     .build()?;
/// ```
pub struct DispatcherBuilder {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    health: HealthConfig,
    quotas: Vec<(String, QuotaLimit)>,
    quota_store: Option<Arc<dyn QuotaStore>>,
    clock: Arc<dyn Clock>,
    attempt_timeout: Option<Duration>,
}

impl Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field(
                "adapters",
                &self.adapters.iter().map(|adapter| adapter.name()).collect::<Vec<_>>(),
            )
            .field("health", &self.health)
            .field("quotas", &self.quotas)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
            health: HealthConfig::default(),
            quotas: Vec::new(),
            quota_store: None,
            clock: Arc::new(SystemClock),
            attempt_timeout: None,
        }
    }

    /// Builds real vendor adapters for every enabled provider whose API key
    /// resolves from the process environment.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, ConfigError> {
        Self::from_config_with(
            config,
            Arc::new(ReqwestHttpClient::new()),
            |name| env::var(name).ok(),
        )
    }

    /// Like [`from_config`](Self::from_config) with an explicit transport and
    /// key lookup.
    pub fn from_config_with(
        config: &OrchestratorConfig,
        http_client: Arc<dyn HttpClient>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut builder = Self::new().with_health_config(config.health);
        if let Some(timeout) = config.attempt_timeout() {
            builder = builder.with_attempt_timeout(timeout);
        }

        for provider in &config.providers {
            let name = provider.name();
            if !provider.enabled {
                debug!(provider = name, "provider disabled in config");
                continue;
            }

            let Some(api_key) = provider.resolve_api_key_with(&lookup) else {
                warn!(
                    provider = name,
                    kind = %provider.kind,
                    env = ?provider.key_env_candidates(),
                    "no API key found; provider not registered"
                );
                continue;
            };

            let adapter =
                provider
                    .kind
                    .build_adapter(http_client.clone(), api_key, provider.adapter_settings());
            builder = builder.register(adapter);
            if let Some(quota) = provider.quota {
                builder = builder.with_quota(name, quota);
            }
        }

        Ok(builder)
    }

    pub fn register(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_health_config(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    pub fn with_quota(mut self, provider: impl Into<String>, limit: QuotaLimit) -> Self {
        self.quotas.push((provider.into(), limit));
        self
    }

    /// Replaces the in-memory quota store; `with_quota` limits are then ignored.
    pub fn with_quota_store(mut self, store: Arc<dyn QuotaStore>) -> Self {
        self.quota_store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|adapter| adapter.name()).collect()
    }

    pub fn build(self) -> Result<RequestDispatcher, ConfigError> {
        if self.health.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        for (name, limit) in &self.quotas {
            check_quota_window(name, limit)?;
        }

        let chain = FallbackChain::new(self.adapters)?;
        let health = HealthTracker::with_clock(chain.names(), self.health, self.clock.clone());
        let quota = match self.quota_store {
            Some(store) => QuotaGuard::new(store, self.clock),
            None => QuotaGuard::in_memory(self.quotas, self.clock),
        };

        let dispatcher = RequestDispatcher::new(chain, health, quota);
        Ok(match self.attempt_timeout {
            Some(timeout) => dispatcher.with_attempt_timeout(timeout),
            None => dispatcher,
        })
    }
}

fn check_quota_window(name: &str, limit: &QuotaLimit) -> Result<(), ConfigError> {
    if limit.window.is_zero() {
        return Err(ConfigError::ZeroQuotaWindow {
            name: name.to_owned(),
        });
    }
    if limit.window > MAX_QUOTA_WINDOW {
        return Err(ConfigError::QuotaWindowTooLong {
            name: name.to_owned(),
            max_secs: MAX_QUOTA_WINDOW.as_secs(),
        });
    }
    Ok(())
}

//! # Genroute Core
//!
//! Provider orchestration for generative AI requests.
//!
//! ## Overview
//!
//! Given a generation request (text, image, speech or music), this crate
//! picks a provider, invokes it and falls back to lower-priority providers
//! when one fails:
//!
//! - **Provider adapters** behind one [`ProviderAdapter`] trait
//! - **Fallback chain** ordering adapters by priority per task
//! - **Health tracking** with consecutive-failure thresholds and cooldowns
//! - **Quota guard** enforcing soft per-provider budgets over fixed windows
//! - **Request dispatcher** tying the above together
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Vendor adapters (OpenAI, Gemini, ElevenLabs, Suno) |
//! | [`chain`] | Priority-ordered adapter registry |
//! | [`clock`] | Time source for health and quota windows |
//! | [`config`] | TOML configuration and dispatcher builder |
//! | [`dispatch`] | Request dispatcher and its errors |
//! | [`error`] | Validation and configuration errors |
//! | [`health`] | Per-provider health tracking |
//! | [`http_client`] | HTTP client abstraction |
//! | [`provider`] | Requests, outputs and the adapter trait |
//! | [`quota`] | Usage budgets and stores |
//! | [`task`] | Task types and capability sets |
//! | [`throttling`] | Client-side request pacing |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use genroute_core::{DispatcherBuilder, GenerationRequest, OrchestratorConfig, Payload, TaskType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OrchestratorConfig::from_path("genroute.toml")?;
//!     let dispatcher = DispatcherBuilder::from_config(&config)?.build()?;
//!
//!     let request = GenerationRequest::new(TaskType::Image, Payload::prompt("a lighthouse at dusk"))?;
//!     let result = dispatcher.dispatch(&request).await?;
//!
//!     println!("{} answered after {} attempt(s)", result.provider_name, result.attempt_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / HTTP     │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Request         │────▶│ Health Tracker   │
//! │ Dispatcher      │────▶│ Quota Guard      │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Fallback Chain  │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Provider        │────▶│ HTTP Client      │
//! │ (Adapter Trait) │     │ (reqwest/none)   │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Adapter failures never reach the caller directly. The dispatcher folds
//! them into a [`DispatchError`]:
//!
//! ```rust
//! use genroute_core::{DispatchError, ProviderErrorKind};
//!
//! fn handle_error(error: DispatchError) -> u16 {
//!     match &error {
//!         DispatchError::NoAvailableProvider { skipped, .. } => {
//!             // Everything was unhealthy or over quota
//!             eprintln!("{} provider(s) skipped", skipped.len());
//!         }
//!         DispatchError::AllProvidersFailed { attempts, .. } => {
//!             let rejected = attempts
//!                 .iter()
//!                 .filter(|attempt| attempt.kind == ProviderErrorKind::Permanent)
//!                 .count();
//!             eprintln!("{rejected} provider(s) rejected the request");
//!         }
//!     }
//!     error.status_code()
//! }
//! ```
//!
//! ## Security
//!
//! - API keys are read from environment variables only (never logged)

pub mod adapters;
pub mod chain;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod http_client;
pub mod provider;
pub mod quota;
pub mod task;
pub mod throttling;

// Adapter implementations
pub use adapters::{AdapterSettings, ElevenLabsAdapter, GeminiAdapter, OpenAiAdapter, SunoAdapter};

// Orchestration
pub use chain::FallbackChain;
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{
    AttemptFailure, DispatchError, GenerationResult, ProviderSnapshot, QuotaSnapshot,
    RequestDispatcher, SkipReason, SkippedProvider,
};
pub use health::{HealthConfig, HealthRecord, HealthTracker};
pub use quota::{
    InMemoryQuotaStore, QuotaError, QuotaGuard, QuotaLimit, QuotaRecord, QuotaStore, MAX_QUOTA_WINDOW,
};

// Configuration
pub use config::{DispatcherBuilder, OrchestratorConfig, ProviderConfig, ProviderKind, RateLimitConfig};

// Errors
pub use error::{ConfigError, ValidationError};

// Provider contract and request/response types
pub use provider::{
    GenerationOutput, GenerationRequest, ImageArtifact, InvokeFuture, MusicTrack, Payload,
    ProviderAdapter, ProviderError, ProviderErrorKind, ProviderResponse,
};
pub use task::{TaskSet, TaskType};

pub use throttling::RateGate;

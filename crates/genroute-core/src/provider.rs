//! Provider adapter contract and the request/response types that flow through it.
//!
//! Every vendor integration implements [`ProviderAdapter`]. The dispatcher only
//! ever sees this trait, so adding a vendor means adding one adapter and
//! registering it at startup.
//!
//! # Tasks
//!
//! | Task | Required payload | Output |
//! |------|------------------|--------|
//! | Text | `prompt` | [`GenerationOutput::Text`] |
//! | Image | `prompt` | [`GenerationOutput::Image`] |
//! | Speech | `prompt` (text to speak), optional `voice` | [`GenerationOutput::Audio`] |
//! | Music | `prompt`, optional `style`, `duration` | [`GenerationOutput::Music`] |
//!
//! # Example
//!
//! ```rust,ignore
//! use genroute_core::{GenerationRequest, Payload, ProviderAdapter, TaskType};
//!
//! async fn run(adapter: &dyn ProviderAdapter) {
//!     let request = GenerationRequest::new(TaskType::Text, Payload::prompt("hello"))?;
//!     let response = adapter.invoke(&request).await?;
//!     println!("{:?}", response.output);
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{TaskSet, TaskType, ValidationError};

/// Provider-agnostic request parameters (prompt, duration, voice, style, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, Value>);

impl Payload {
    pub const PROMPT: &'static str = "prompt";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt(prompt: impl Into<String>) -> Self {
        let prompt: String = prompt.into();
        Self::new().with(Self::PROMPT, prompt)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Reads an unsigned integer parameter, accepting numeric strings as well.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ValidationError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(number)) => number.as_u64().map(Some).ok_or_else(|| {
                ValidationError::InvalidParameter {
                    key: key.to_owned(),
                    expected: "a non-negative integer",
                }
            }),
            Some(Value::String(text)) => text.trim().parse::<u64>().map(Some).map_err(|_| {
                ValidationError::InvalidParameter {
                    key: key.to_owned(),
                    expected: "a non-negative integer",
                }
            }),
            Some(_) => Err(ValidationError::InvalidParameter {
                key: key.to_owned(),
                expected: "a non-negative integer",
            }),
        }
    }

    pub fn prompt_text(&self) -> &str {
        self.get_str(Self::PROMPT).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// A single generation call. Built once by the caller and only borrowed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub task_type: TaskType,
    pub payload: Payload,
    pub fallback_enabled: bool,
    /// Ceiling on adapters tried. `None` means the whole chain.
    pub max_attempts: Option<NonZeroU32>,
    /// Overrides the adapter's own cost estimate for quota checks.
    pub estimated_cost: Option<u64>,
}

impl GenerationRequest {
    pub fn new(task_type: TaskType, payload: Payload) -> Result<Self, ValidationError> {
        if payload.prompt_text().trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }

        Ok(Self {
            task_type,
            payload,
            fallback_enabled: true,
            max_attempts: None,
            estimated_cost: None,
        })
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Result<Self, ValidationError> {
        self.max_attempts =
            Some(NonZeroU32::new(max_attempts).ok_or(ValidationError::ZeroMaxAttempts)?);
        Ok(self)
    }

    pub fn with_estimated_cost(mut self, cost_units: u64) -> Self {
        self.estimated_cost = Some(cost_units);
        self
    }

    pub fn prompt(&self) -> &str {
        self.payload.prompt_text()
    }

    /// Effective attempt ceiling for a chain of `chain_len` candidates.
    pub fn attempt_limit(&self, chain_len: usize) -> usize {
        self.max_attempts
            .map(|limit| limit.get() as usize)
            .unwrap_or(chain_len)
    }
}

/// Generated image reference. Vendors return either a hosted URL or inline base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageArtifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
}

/// Generated music track reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicTrack {
    pub id: String,
    pub audio_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Output payload; the variant always matches the request's task type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationOutput {
    Text {
        text: String,
    },
    Image {
        images: Vec<ImageArtifact>,
    },
    Audio {
        mime_type: String,
        byte_len: usize,
        #[serde(skip)]
        data: Vec<u8>,
    },
    Music {
        tracks: Vec<MusicTrack>,
    },
}

impl GenerationOutput {
    pub fn audio(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self::Audio {
            mime_type: mime_type.into(),
            byte_len: data.len(),
            data,
        }
    }

    pub const fn task_type(&self) -> TaskType {
        match self {
            Self::Text { .. } => TaskType::Text,
            Self::Image { .. } => TaskType::Image,
            Self::Audio { .. } => TaskType::Speech,
            Self::Music { .. } => TaskType::Music,
        }
    }
}

/// What an adapter hands back on success. Cost is in the adapter's own unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub output: GenerationOutput,
    /// Vendor-reported usage. `None` falls back to the pre-call estimate.
    pub cost_units: Option<u64>,
}

impl ProviderResponse {
    pub fn new(output: GenerationOutput) -> Self {
        Self {
            output,
            cost_units: None,
        }
    }

    pub fn with_cost(mut self, cost_units: u64) -> Self {
        self.cost_units = Some(cost_units);
        self
    }
}

/// Adapter-level failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderErrorKind {
    /// Network error, timeout or 5xx. Worth trying elsewhere.
    Transient,
    /// The vendor rejected the request shape (4xx other than 429).
    Permanent,
    /// 429 or exhausted client-side pacing.
    RateLimited,
}

impl ProviderErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "TRANSIENT",
            Self::Permanent => "PERMANENT",
            Self::RateLimited => "RATE_LIMITED",
        }
    }
}

impl Display for ProviderErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured adapter error. Always caught by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({kind})")]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
    retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Transient,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Permanent,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            kind: ProviderErrorKind::RateLimited,
            message: message.into(),
            retry_after,
        }
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

pub type InvokeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + 'a>>;

/// Uniform capability interface implemented once per vendor.
///
/// Adapters are registered at startup and shared across concurrent dispatches,
/// so they keep no per-request state.
pub trait ProviderAdapter: Send + Sync {
    /// Unique name used for health, quota and diagnostics.
    fn name(&self) -> &str;

    fn supported_tasks(&self) -> TaskSet;

    /// Lower is tried first.
    fn priority(&self) -> i32;

    /// Pre-call cost estimate in the adapter's own unit, used for quota checks.
    fn estimate_cost(&self, _request: &GenerationRequest) -> u64 {
        1
    }

    fn invoke<'a>(&'a self, request: &'a GenerationRequest) -> InvokeFuture<'a>;
}

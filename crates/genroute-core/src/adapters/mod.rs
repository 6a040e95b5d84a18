//! Vendor adapters and the HTTP plumbing they share.
//!
//! | Adapter | Tasks | Cost unit |
//! |---------|-------|-----------|
//! | [`OpenAiAdapter`] | text, image, speech | tokens / images / characters |
//! | [`GeminiAdapter`] | text | tokens |
//! | [`ElevenLabsAdapter`] | speech | characters |
//! | [`SunoAdapter`] | music | tracks |
//!
//! Failure classification is shared: transport errors and 5xx are
//! transient, 429 is rate limited, every other non-2xx status and any
//! response body the adapter cannot understand is permanent.

mod elevenlabs;
mod gemini;
mod openai;
mod suno;

pub use elevenlabs::ElevenLabsAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use suno::SunoAdapter;

use serde_json::Value;

use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::throttling::RateGate;
use crate::{ProviderError, TaskSet, TaskType};

const ERROR_SNIPPET_CHARS: usize = 200;

/// Registration settings shared by every vendor adapter.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub name: String,
    pub priority: i32,
    pub base_url: String,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub timeout_ms: u64,
    /// Narrows the vendor's task set; `None` keeps all of it.
    pub tasks: Option<TaskSet>,
    pub rate_gate: Option<RateGate>,
}

impl AdapterSettings {
    pub fn new(name: impl Into<String>, priority: i32, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority,
            base_url: base_url.into(),
            model: None,
            voice: None,
            timeout_ms: 60_000,
            tasks: None,
            rate_gate: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_tasks(mut self, tasks: TaskSet) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn with_rate_gate(mut self, rate_gate: RateGate) -> Self {
        self.rate_gate = Some(rate_gate);
        self
    }

    pub(crate) fn effective_tasks(&self, vendor: TaskSet) -> TaskSet {
        self.tasks
            .map(|configured| vendor.intersection(configured))
            .unwrap_or(vendor)
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Sends one vendor request with pacing and status classification applied.
pub(crate) async fn send(
    settings: &AdapterSettings,
    client: &dyn HttpClient,
    request: HttpRequest,
) -> Result<HttpResponse, ProviderError> {
    if let Some(gate) = &settings.rate_gate {
        gate.acquire_for(&settings.name)?;
    }

    let response = client
        .execute(request.with_timeout_ms(settings.timeout_ms))
        .await
        .map_err(|error| transport_error(&settings.name, &error))?;

    if !response.is_success() {
        return Err(status_error(&settings.name, &response));
    }

    Ok(response)
}

pub(crate) fn transport_error(provider: &str, error: &HttpError) -> ProviderError {
    if error.retryable() {
        ProviderError::transient(format!("{provider} transport error: {}", error.message()))
    } else {
        ProviderError::permanent(format!("{provider} transport error: {}", error.message()))
    }
}

pub(crate) fn status_error(provider: &str, response: &HttpResponse) -> ProviderError {
    let detail = error_detail(response);
    let message = format!("{provider} returned status {}: {detail}", response.status);

    match response.status {
        429 => ProviderError::rate_limited(message, response.retry_after()),
        408 | 500..=599 => ProviderError::transient(message),
        _ => ProviderError::permanent(message),
    }
}

pub(crate) fn parse_json(provider: &str, response: &HttpResponse) -> Result<Value, ProviderError> {
    serde_json::from_slice(&response.body).map_err(|error| {
        ProviderError::permanent(format!("{provider} returned malformed JSON: {error}"))
    })
}

/// Audio bytes and MIME type from a speech response. A JSON or empty body
/// means the vendor answered with something other than audio.
pub(crate) fn audio_body(
    provider: &str,
    response: HttpResponse,
    default_mime: &str,
) -> Result<(String, Vec<u8>), ProviderError> {
    let mime_type = response.header("content-type").unwrap_or(default_mime).to_owned();
    if mime_type.contains("json") {
        return Err(ProviderError::permanent(format!(
            "{provider} returned {mime_type} instead of audio: {}",
            error_detail(&response)
        )));
    }
    if response.body.is_empty() {
        return Err(ProviderError::permanent(format!("{provider} returned empty audio")));
    }
    Ok((mime_type, response.body))
}

pub(crate) fn unsupported_task(provider: &str, task: TaskType) -> ProviderError {
    ProviderError::permanent(format!("{provider} does not support {task} generation"))
}

pub(crate) fn optional_u64(
    provider: &str,
    payload: &crate::Payload,
    key: &str,
) -> Result<Option<u64>, ProviderError> {
    payload
        .get_u64(key)
        .map_err(|error| ProviderError::permanent(format!("{provider}: {error}")))
}

/// Vendor error text, preferring the usual `{"error": {"message": ...}}` shapes.
fn error_detail(response: &HttpResponse) -> String {
    let parsed = serde_json::from_slice::<Value>(&response.body).ok();
    let message = parsed.as_ref().and_then(|body| {
        body.pointer("/error/message")
            .or_else(|| body.pointer("/detail/message"))
            .or_else(|| body.get("msg"))
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    });

    let text = message.unwrap_or_else(|| response.text().into_owned());
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::from("<empty body>");
    }

    trimmed.chars().take(ERROR_SNIPPET_CHARS).collect()
}
